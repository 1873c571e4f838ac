//! Credential strategies
//!
//! Each outgoing request asks the configured strategy to attach credentials.
//! The password and browser strategies acquire a session on first use and
//! then behave like the plain cookie strategy they wrap, until `reset`.

use reqwest::header::{HeaderName, HeaderValue, COOKIE};
use reqwest::Request;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::cookie_extractor::{BrowserType, CookieError, CookieExtractor, CookieQuery, CookieStore};
use crate::client::{Client, ClientError};
use crate::config::CredentialsConfig;
use crate::security::{Sanitizer, SecureString};

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "LEETCODE_SESSION";
/// Cookie carrying the CSRF token
pub const CSRF_COOKIE: &str = "csrftoken";
/// Header that must repeat the CSRF token
pub const CSRF_HEADER: &str = "x-csrftoken";

/// Errors raised while attaching credentials
#[derive(Debug, Error)]
pub enum AuthError {
    /// Login succeeded but did not yield both session cookies
    #[error("no credential found")]
    NoCredentialFound,

    /// The browser has no session or CSRF cookie for the site
    #[error("no cookie found in browser")]
    NoBrowserCookie,

    /// The client's base URI has no host to match cookies against
    #[error("Invalid base URI: {0}")]
    InvalidBaseUri(String),

    /// A token contains characters that cannot go into an HTTP header
    #[error("Credential is not a valid header value")]
    InvalidHeaderValue,

    /// Reading the browser cookie store failed
    #[error("Cookie store error: {0}")]
    CookieStore(#[from] CookieError),

    /// The login call failed
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Session and CSRF token pair
///
/// Only counts as established when both halves are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    session_token: SecureString,
    csrf_token: SecureString,
}

impl Session {
    pub fn new(session_token: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            session_token: SecureString::new(session_token.into()),
            csrf_token: SecureString::new(csrf_token.into()),
        }
    }

    pub fn session_token(&self) -> &str {
        self.session_token.expose()
    }

    pub fn csrf_token(&self) -> &str {
        self.csrf_token.expose()
    }

    /// True iff both tokens are non-empty
    pub fn is_established(&self) -> bool {
        !self.session_token.is_empty() && !self.csrf_token.is_empty()
    }

    fn clear(&mut self) {
        self.session_token.clear();
        self.csrf_token.clear();
    }
}

/// Attaches a fixed session as cookies plus the CSRF header
#[derive(Debug, Clone, Default)]
pub struct CookieAuth {
    session: Session,
}

impl CookieAuth {
    pub fn new(session_token: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            session: Session::new(session_token, csrf_token),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Adds both cookies and the CSRF header to `request`
    pub fn add_credentials(&self, request: &mut Request) -> Result<(), AuthError> {
        append_cookie(request, SESSION_COOKIE, self.session.session_token())?;
        append_cookie(request, CSRF_COOKIE, self.session.csrf_token())?;

        let mut csrf = HeaderValue::from_str(self.session.csrf_token())
            .map_err(|_| AuthError::InvalidHeaderValue)?;
        csrf.set_sensitive(true);
        request
            .headers_mut()
            .insert(HeaderName::from_static(CSRF_HEADER), csrf);
        Ok(())
    }

    /// Forgets the session
    pub fn reset(&mut self) {
        self.session.clear();
    }

    pub(crate) fn has_auth(&self) -> bool {
        self.session.is_established()
    }
}

/// Appends `name=value` to the request's Cookie header, keeping existing cookies
fn append_cookie(request: &mut Request, name: &str, value: &str) -> Result<(), AuthError> {
    let pair = format!("{}={}", name, value);
    let headers = request.headers_mut();
    let combined = match headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.is_empty() => format!("{}; {}", existing, pair),
        _ => pair,
    };

    let mut header = HeaderValue::from_str(&combined).map_err(|_| AuthError::InvalidHeaderValue)?;
    header.set_sensitive(true);
    headers.insert(COOKIE, header);
    Ok(())
}

/// Logs in with username and password on first use
#[derive(Debug)]
pub struct PasswordAuth {
    username: String,
    password: SecureString,
    cookies: CookieAuth,
}

impl PasswordAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecureString::new(password.into()),
            cookies: CookieAuth::default(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn add_credentials(
        &mut self,
        request: &mut Request,
        client: &dyn Client,
    ) -> Result<(), AuthError> {
        if !self.cookies.has_auth() {
            tracing::warn!("logging in with username and password");
            let response = client.login(&self.username, self.password.expose()).await?;

            for (name, value) in &response.cookies {
                match name.as_str() {
                    SESSION_COOKIE => self.cookies.session.session_token.replace(value.as_str()),
                    CSRF_COOKIE => self.cookies.session.csrf_token.replace(value.as_str()),
                    _ => {}
                }
            }

            if !self.cookies.has_auth() {
                self.cookies.reset();
                return Err(AuthError::NoCredentialFound);
            }
            tracing::debug!(
                "logged in as {} (session {})",
                self.username,
                Sanitizer::sanitize_token(self.cookies.session.session_token())
            );
        }

        self.cookies.add_credentials(request)
    }

    pub fn reset(&mut self) {
        self.cookies.reset();
    }
}

/// Reads the session from the local browser cookie store on first use
pub struct BrowserAuth {
    browsers: Vec<BrowserType>,
    store: Arc<dyn CookieStore>,
    cookies: CookieAuth,
}

impl BrowserAuth {
    /// Creates a browser strategy from identifiers such as `"chrome"`
    ///
    /// Unknown identifiers are ignored. If none are recognised every
    /// supported browser is searched.
    pub fn new<S: AsRef<str>>(browsers: &[S], store: Arc<dyn CookieStore>) -> Self {
        let browsers = browsers
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| !name.trim().is_empty())
            .filter_map(|name| match name.parse::<BrowserType>() {
                Ok(browser) => Some(browser),
                Err(e) => {
                    tracing::warn!("Ignoring browser option: {}", e);
                    None
                }
            })
            .collect();

        Self {
            browsers,
            store,
            cookies: CookieAuth::default(),
        }
    }

    /// Browsers searched, in order; empty means all supported browsers
    pub fn browsers(&self) -> &[BrowserType] {
        &self.browsers
    }

    pub async fn add_credentials(
        &mut self,
        request: &mut Request,
        client: &dyn Client,
    ) -> Result<(), AuthError> {
        if !self.cookies.has_auth() {
            // The domain comes from the client handed in here. Callers that
            // authenticate with one client and send with another get cookies
            // for the first client's site.
            let base_uri = client.base_uri();
            let domain = reqwest::Url::parse(&base_uri)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string))
                .ok_or_else(|| AuthError::InvalidBaseUri(base_uri.clone()))?;

            tracing::warn!(domain = %domain, "reading credentials from browser");
            let sessions = self
                .store
                .find(&self.browsers, &CookieQuery::valid(domain.as_str(), SESSION_COOKIE))?;
            let csrf_tokens = self
                .store
                .find(&self.browsers, &CookieQuery::valid(domain.as_str(), CSRF_COOKIE))?;

            let (Some(session), Some(csrf)) = (sessions.first(), csrf_tokens.first()) else {
                return Err(AuthError::NoBrowserCookie);
            };

            self.cookies.session = Session::new(session.value.as_str(), csrf.value.as_str());
            tracing::debug!(
                "found credentials in browser (session {})",
                Sanitizer::sanitize_token(&session.value)
            );
        }

        self.cookies.add_credentials(request)
    }

    pub fn reset(&mut self) {
        self.cookies.reset();
    }
}

impl fmt::Debug for BrowserAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserAuth")
            .field("browsers", &self.browsers)
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

/// The credential strategy chosen for a site
#[derive(Debug)]
pub enum CredentialStrategy {
    /// Sends requests without credentials
    NoAuth,
    /// Sends a configured session
    CookiePair(CookieAuth),
    /// Logs in with username and password on first use
    PasswordLogin(PasswordAuth),
    /// Imports the session from a local browser on first use
    BrowserImport(BrowserAuth),
}

impl CredentialStrategy {
    /// Picks the strategy for `config`
    ///
    /// First match wins: browser import, configured session, password login,
    /// then no authentication.
    pub fn from_config(config: &CredentialsConfig) -> Self {
        Self::from_config_with_store(config, Arc::new(CookieExtractor::new()))
    }

    /// Same as [`from_config`](Self::from_config) with an explicit cookie store
    pub fn from_config_with_store(config: &CredentialsConfig, store: Arc<dyn CookieStore>) -> Self {
        if !config.read_from_browser.is_empty() {
            let browsers: Vec<&str> = config.read_from_browser.split(',').collect();
            return Self::BrowserImport(BrowserAuth::new(browsers.as_slice(), store));
        }
        if !config.session.is_empty() {
            if config.csrf_token.is_empty() {
                tracing::warn!("session configured without csrf_token, it will not be sent");
            }
            return Self::CookiePair(CookieAuth::new(
                config.session.as_str(),
                config.csrf_token.as_str(),
            ));
        }
        if !config.username.is_empty() {
            return Self::PasswordLogin(PasswordAuth::new(
                config.username.as_str(),
                config.password.as_str(),
            ));
        }
        Self::NoAuth
    }

    /// Attaches credentials to `request`, acquiring a session first if needed
    pub async fn add_credentials(
        &mut self,
        request: &mut Request,
        client: &dyn Client,
    ) -> Result<(), AuthError> {
        match self {
            Self::NoAuth => Ok(()),
            Self::CookiePair(auth) if auth.has_auth() => auth.add_credentials(request),
            Self::CookiePair(_) => {
                tracing::debug!("no session held, sending request without cookies");
                Ok(())
            }
            Self::PasswordLogin(auth) => auth.add_credentials(request, client).await,
            Self::BrowserImport(auth) => auth.add_credentials(request, client).await,
        }
    }

    /// Drops any held session
    pub fn reset(&mut self) {
        match self {
            Self::NoAuth => {}
            Self::CookiePair(auth) => auth.reset(),
            Self::PasswordLogin(auth) => auth.reset(),
            Self::BrowserImport(auth) => auth.reset(),
        }
    }

    /// True if `reset` can be followed by acquiring a new session
    pub fn can_reacquire(&self) -> bool {
        matches!(self, Self::PasswordLogin(_) | Self::BrowserImport(_))
    }

    /// True if a complete session is currently held
    pub fn has_session(&self) -> bool {
        match self {
            Self::NoAuth => false,
            Self::CookiePair(auth) => auth.has_auth(),
            Self::PasswordLogin(auth) => auth.cookies.has_auth(),
            Self::BrowserImport(auth) => auth.cookies.has_auth(),
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoAuth => "none",
            Self::CookiePair(_) => "cookies",
            Self::PasswordLogin(_) => "password",
            Self::BrowserImport(_) => "browser",
        }
    }
}
