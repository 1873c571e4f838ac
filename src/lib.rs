//! Questbank - credential resolution and question cache for LeetCode-style sites
//!
//! ## Features
//!
//! - Pick one credential strategy from configuration (browser cookies,
//!   explicit session cookies, username/password login, or anonymous)
//! - Attach credentials to outgoing requests and drop them when the server
//!   rejects them
//! - Import session cookies from local Chrome, Edge and Firefox profiles
//! - Keep a local JSON snapshot of the question list with slug/id lookup and
//!   a staleness warning
//!
//! ## Architecture
//!
//! - **Auth**: Credential strategies and browser cookie extraction
//! - **Client**: HTTP client for login and the question list
//! - **Cache**: Lazily loaded question snapshot
//! - **Config**: JSON configuration file
//! - **Security**: Sanitization and zeroizing secret strings

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod security;

pub use auth::{AuthError, BrowserType, CredentialStrategy};
pub use cache::{CacheError, CacheStatus, QuestionCache, QuestionRecord};
pub use client::{Client, ClientError, LeetCodeClient};
pub use config::{AppConfig, ConfigError, CredentialsConfig};

/// Default filter when `RUST_LOG` is unset or invalid
pub const DEFAULT_LOG_FILTER: &str = "questbank=debug,info";

/// Installs the global tracing subscriber
///
/// `RUST_LOG` replaces [`DEFAULT_LOG_FILTER`] when set. Calling it more than
/// once is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .try_init();
}

fn log_filter(env: Option<&str>) -> tracing_subscriber::EnvFilter {
    env.and_then(|directives| tracing_subscriber::EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
}
