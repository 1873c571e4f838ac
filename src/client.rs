//! Question bank HTTP client
//!
//! Defines the `Client` capability the credential strategies and the question
//! cache depend on, and `LeetCodeClient`, the reqwest implementation of it.

use async_trait::async_trait;
use reqwest::header::{COOKIE, REFERER};
use reqwest::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::auth::{AuthError, CredentialStrategy, CSRF_COOKIE, CSRF_HEADER};
use crate::config::AppConfig;
use crate::security::Sanitizer;

/// Errors returned by the question bank client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network error during the request
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with an unexpected status
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The server rejected the attached credentials
    #[error("Credentials rejected by server")]
    Unauthorized,

    /// The response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Credentials could not be attached to the request
    #[error("Authentication failed: {0}")]
    Auth(Box<AuthError>),
}

impl From<AuthError> for ClientError {
    fn from(err: AuthError) -> Self {
        Self::Auth(Box::new(err))
    }
}

/// Cookies set by a login response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginResponse {
    /// `(name, value)` pairs in the order the server sent them
    pub cookies: Vec<(String, String)>,
}

/// A topic tag attached to a remote question
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicTag {
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

/// A question as returned by the remote question list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteQuestion {
    pub question_frontend_id: String,
    pub title_slug: String,
    pub title: String,
    #[serde(default)]
    pub translated_title: Option<String>,
    pub difficulty: String,
    #[serde(default)]
    pub topic_tags: Vec<TopicTag>,
    #[serde(default)]
    pub is_paid_only: bool,
}

/// Operations the credential strategies and the cache need from a client
///
/// How these are transported is up to the implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Client: Send + Sync {
    /// Performs a username/password login and returns the cookies it set
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ClientError>;

    /// Fetches the complete question list
    async fn get_all_questions(&self) -> Result<Vec<RemoteQuestion>, ClientError>;

    /// Base URI of the site, e.g. `https://leetcode.com`
    fn base_uri(&self) -> String;
}

const QUESTION_LIST_QUERY: &str = r#"
query problemsetQuestionList($categorySlug: String, $limit: Int, $skip: Int, $filters: QuestionListFilterInput) {
  problemsetQuestionList(categorySlug: $categorySlug, limit: $limit, skip: $skip, filters: $filters) {
    total
    questions {
      questionFrontendId
      titleSlug
      title
      translatedTitle
      difficulty
      isPaidOnly
      topicTags { slug name }
    }
  }
}"#;

const QUESTION_LIST_LIMIT: u32 = 10_000;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionListData {
    problemset_question_list: QuestionList,
}

#[derive(Debug, Deserialize)]
struct QuestionList {
    questions: Vec<RemoteQuestion>,
}

/// reqwest-backed client for a LeetCode-style site
///
/// Owns the credential strategy for its site. Every authenticated request
/// locks the strategy, so the first login or browser read happens once even
/// when requests are issued concurrently.
pub struct LeetCodeClient {
    http: reqwest::Client,
    base_uri: String,
    credentials: Mutex<CredentialStrategy>,
}

impl LeetCodeClient {
    /// Creates a client for `base_uri` using the given strategy
    pub fn new(
        base_uri: impl Into<String>,
        credentials: CredentialStrategy,
    ) -> Result<Self, ClientError> {
        // Login answers with a redirect that carries the session cookies.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            base_uri: base_uri.into().trim_end_matches('/').to_string(),
            credentials: Mutex::new(credentials),
        })
    }

    /// Creates a client from configuration, selecting the credential strategy
    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        Self::new(
            config.base_url.clone(),
            CredentialStrategy::from_config(&config.credentials),
        )
    }

    /// Name of the credential strategy in use
    pub async fn credentials_kind(&self) -> &'static str {
        self.credentials.lock().await.kind()
    }

    /// Drops any acquired session so the next request acquires a new one
    pub async fn reset_credentials(&self) {
        self.credentials.lock().await.reset();
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_uri, path)
    }

    async fn send_authenticated(&self, mut request: Request) -> Result<Response, ClientError> {
        {
            let mut credentials = self.credentials.lock().await;
            credentials.add_credentials(&mut request, self).await?;
        }

        tracing::debug!(
            "{} {}",
            request.method(),
            Sanitizer::sanitize_url(request.url().as_str())
        );
        let response = self.http.execute(request).await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let mut credentials = self.credentials.lock().await;
            // A configured cookie pair cannot be re-acquired, so it is kept
            if credentials.can_reacquire() {
                tracing::warn!("Server rejected credentials ({}), dropping session", status);
                credentials.reset();
            } else {
                tracing::warn!("Server rejected credentials ({})", status);
            }
            return Err(ClientError::Unauthorized);
        }

        Ok(response)
    }
}

async fn error_for_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status { status, body })
}

#[async_trait]
impl Client for LeetCodeClient {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let url = self.url("/accounts/login/");

        // The login form needs the csrftoken the login page hands out.
        let page = error_for_status(self.http.get(&url).send().await?).await?;
        let csrf = page
            .cookies()
            .find(|c| c.name() == CSRF_COOKIE)
            .map(|c| c.value().to_string())
            .unwrap_or_default();

        let response = self
            .http
            .post(&url)
            .header(REFERER, url.as_str())
            .header(CSRF_HEADER, csrf.as_str())
            .header(COOKIE, format!("{}={}", CSRF_COOKIE, csrf))
            .form(&[
                ("csrfmiddlewaretoken", csrf.as_str()),
                ("login", username),
                ("password", password),
                ("next", "/"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && !status.is_redirection() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let cookies = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();

        Ok(LoginResponse { cookies })
    }

    async fn get_all_questions(&self) -> Result<Vec<RemoteQuestion>, ClientError> {
        let body = serde_json::json!({
            "query": QUESTION_LIST_QUERY,
            "variables": {
                "categorySlug": "",
                "skip": 0,
                "limit": QUESTION_LIST_LIMIT,
                "filters": {},
            },
        });

        let request = self
            .http
            .post(self.url("/graphql"))
            .header(REFERER, self.url("/problemset/"))
            .json(&body)
            .build()?;

        let response = error_for_status(self.send_authenticated(request).await?).await?;

        let parsed: GraphQlResponse<QuestionListData> = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("Failed to parse question list: {}", e)))?;

        if let Some(err) = parsed.errors.first() {
            return Err(ClientError::Parse(err.message.clone()));
        }

        let data = parsed
            .data
            .ok_or_else(|| ClientError::Parse("Question list response has no data".into()))?;

        tracing::debug!(
            "Fetched {} questions",
            data.problemset_question_list.questions.len()
        );
        Ok(data.problemset_question_list.questions)
    }

    fn base_uri(&self) -> String {
        self.base_uri.clone()
    }
}
