//! Authentication module - Credential strategies and browser cookie import
//!
//! - `CredentialStrategy` decides what to attach to each request
//! - `CookieExtractor` reads sessions from local browser cookie databases

mod chromium;
mod cookie_extractor;
mod credentials;

pub use cookie_extractor::{
    BrowserType, Cookie, CookieError, CookieExtractor, CookieQuery, CookieStore,
};
pub use credentials::{
    AuthError, BrowserAuth, CookieAuth, CredentialStrategy, PasswordAuth, Session, CSRF_COOKIE,
    CSRF_HEADER, SESSION_COOKIE,
};
