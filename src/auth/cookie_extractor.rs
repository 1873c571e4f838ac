//! Browser cookie extraction
//!
//! Reads cookies straight from the SQLite cookie databases of Chrome, Edge
//! and Firefox so that a session already established in the browser can be
//! reused.

use rusqlite::Connection;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use super::chromium::ChromiumDecryptor;

/// Errors that can occur during cookie extraction
#[derive(Debug, Error)]
pub enum CookieError {
    /// Browser database not found
    #[error("Cookie database not found for {browser}: {path}")]
    DatabaseNotFound { browser: String, path: String },

    /// Database access error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Cookie decryption failed
    #[error("Cookie decryption failed: {0}")]
    Decryption(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable not set
    #[error("Environment variable not set: {0}")]
    EnvVar(String),
}

/// Supported browser types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserType {
    /// Google Chrome
    Chrome,
    /// Microsoft Edge
    Edge,
    /// Mozilla Firefox
    Firefox,
}

impl BrowserType {
    /// Returns the display name of the browser
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chrome => "Chrome",
            Self::Edge => "Edge",
            Self::Firefox => "Firefox",
        }
    }

    /// Returns all supported browser types in preference order
    pub fn all() -> &'static [BrowserType] {
        &[Self::Chrome, Self::Edge, Self::Firefox]
    }

    fn is_chromium(&self) -> bool {
        matches!(self, Self::Chrome | Self::Edge)
    }
}

impl fmt::Display for BrowserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BrowserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" => Ok(Self::Chrome),
            "edge" => Ok(Self::Edge),
            "firefox" => Ok(Self::Firefox),
            other => Err(format!("unsupported browser: {}", other)),
        }
    }
}

/// A single cookie extracted from a browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value (decrypted)
    pub value: String,
    /// Domain the cookie belongs to
    pub domain: String,
    /// Path the cookie applies to
    pub path: String,
    /// Expiration timestamp (Unix epoch seconds), `None` for session cookies
    pub expires: Option<i64>,
}

/// Filter applied when reading cookies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieQuery {
    /// Substring the cookie's domain must contain
    pub domain: String,
    /// Exact cookie name
    pub name: String,
    /// Skip cookies that have already expired
    pub valid_only: bool,
}

impl CookieQuery {
    /// Matches unexpired cookies named `name` whose domain contains `domain`
    pub fn valid(domain: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            valid_only: true,
        }
    }
}

/// Source of browser cookies
///
/// Results are ordered by browser preference; callers take the first match.
#[cfg_attr(test, mockall::automock)]
pub trait CookieStore: Send + Sync {
    /// Returns all cookies matching `query` from the given browsers
    fn find(&self, browsers: &[BrowserType], query: &CookieQuery) -> Result<Vec<Cookie>, CookieError>;
}

/// Chromium schema version that started prefixing values with a host digest
const HOST_DIGEST_SCHEMA_VERSION: i64 = 24;

/// Seconds between 1601-01-01 (Chromium epoch) and 1970-01-01
const CHROMIUM_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

/// Cookie extractor backed by the browsers' SQLite databases
#[derive(Debug, Default)]
pub struct CookieExtractor {
    databases: HashMap<BrowserType, PathBuf>,
}

impl CookieExtractor {
    /// Creates an extractor that uses the browsers' default profile locations
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `path` as the cookie database for `browser` instead of the default
    pub fn with_database(mut self, browser: BrowserType, path: impl Into<PathBuf>) -> Self {
        self.databases.insert(browser, path.into());
        self
    }

    #[cfg(not(target_os = "windows"))]
    fn home_dir() -> Result<PathBuf, CookieError> {
        std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| CookieError::EnvVar("HOME".into()))
    }

    /// Directory holding the browser's profiles
    fn user_data_dir(browser: BrowserType) -> Result<PathBuf, CookieError> {
        #[cfg(target_os = "windows")]
        {
            let env = if browser == BrowserType::Firefox { "APPDATA" } else { "LOCALAPPDATA" };
            let base = std::env::var(env)
                .map(PathBuf::from)
                .map_err(|_| CookieError::EnvVar(env.into()))?;
            Ok(match browser {
                BrowserType::Chrome => base.join("Google").join("Chrome").join("User Data"),
                BrowserType::Edge => base.join("Microsoft").join("Edge").join("User Data"),
                BrowserType::Firefox => base.join("Mozilla").join("Firefox").join("Profiles"),
            })
        }

        #[cfg(target_os = "macos")]
        {
            let base = Self::home_dir()?.join("Library").join("Application Support");
            Ok(match browser {
                BrowserType::Chrome => base.join("Google").join("Chrome"),
                BrowserType::Edge => base.join("Microsoft Edge"),
                BrowserType::Firefox => base.join("Firefox").join("Profiles"),
            })
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let home = Self::home_dir()?;
            Ok(match browser {
                BrowserType::Chrome => home.join(".config").join("google-chrome"),
                BrowserType::Edge => home.join(".config").join("microsoft-edge"),
                BrowserType::Firefox => home.join(".mozilla").join("firefox"),
            })
        }
    }

    /// Returns the cookie database path for a browser
    pub fn cookie_path(&self, browser: BrowserType) -> Result<PathBuf, CookieError> {
        if let Some(path) = self.databases.get(&browser) {
            return Ok(path.clone());
        }

        let user_data = Self::user_data_dir(browser)?;
        if browser.is_chromium() {
            let profile = user_data.join("Default");
            let network = profile.join("Network").join("Cookies");
            return Ok(if network.exists() { network } else { profile.join("Cookies") });
        }

        // Firefox keeps one directory per profile; use the default one
        if user_data.exists() {
            for entry in std::fs::read_dir(&user_data)? {
                let entry = entry?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.ends_with(".default") || name.ends_with(".default-release") {
                    return Ok(entry.path().join("cookies.sqlite"));
                }
            }
        }
        Err(CookieError::DatabaseNotFound {
            browser: browser.name().into(),
            path: user_data.to_string_lossy().into(),
        })
    }

    /// Checks if a browser has a cookie database available
    pub fn is_browser_available(&self, browser: BrowserType) -> bool {
        self.cookie_path(browser).map(|p| p.exists()).unwrap_or(false)
    }

    /// Reads matching cookies from one browser
    pub fn extract_cookies(
        &self,
        browser: BrowserType,
        query: &CookieQuery,
    ) -> Result<Vec<Cookie>, CookieError> {
        let db_path = self.cookie_path(browser)?;
        if !db_path.exists() {
            return Err(CookieError::DatabaseNotFound {
                browser: browser.name().into(),
                path: db_path.to_string_lossy().into(),
            });
        }

        // A running browser keeps the database locked; read from a copy in a
        // private directory that is removed when `snapshot_dir` drops
        let snapshot_dir = tempfile::Builder::new().prefix("questbank-cookies").tempdir()?;
        let snapshot = snapshot_dir.path().join(
            db_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("cookies.db")),
        );
        std::fs::copy(&db_path, &snapshot)?;

        if browser.is_chromium() {
            let local_state = Self::user_data_dir(browser)
                .map(|dir| dir.join("Local State"))
                .unwrap_or_default();
            self.extract_chromium_cookies(&snapshot, query, ChromiumDecryptor::new(browser, local_state))
        } else {
            self.extract_firefox_cookies(&snapshot, query)
        }
    }

    fn extract_chromium_cookies(
        &self,
        db_path: &Path,
        query: &CookieQuery,
        mut decryptor: ChromiumDecryptor,
    ) -> Result<Vec<Cookie>, CookieError> {
        let conn = Connection::open(db_path)?;

        let version: i64 = conn
            .query_row(
                "SELECT CAST(value AS INTEGER) FROM meta WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);
        decryptor.set_host_digest(version >= HOST_DIGEST_SCHEMA_VERSION);

        let mut stmt = conn.prepare(
            "SELECT name, value, encrypted_value, host_key, path, expires_utc
             FROM cookies
             WHERE host_key LIKE ?1 ESCAPE '\\' AND name = ?2",
        )?;

        let rows = stmt.query_map([like_pattern(&query.domain), query.name.clone()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let now = chrono::Utc::now().timestamp();
        let mut cookies = Vec::new();
        for row in rows {
            let (name, plain, encrypted, domain, path, expires_utc) = row?;

            // expires_utc counts microseconds since 1601; 0 marks a session cookie
            let expires = (expires_utc != 0)
                .then(|| expires_utc / 1_000_000 - CHROMIUM_EPOCH_OFFSET_SECS);
            if query.valid_only && expires.is_some_and(|e| e <= now) {
                continue;
            }

            let value = if !plain.is_empty() {
                plain
            } else {
                match decryptor.decrypt(&encrypted) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!("Skipping cookie {} for {}: {}", name, domain, e);
                        continue;
                    }
                }
            };

            cookies.push(Cookie { name, value, domain, path, expires });
        }

        Ok(cookies)
    }

    fn extract_firefox_cookies(
        &self,
        db_path: &Path,
        query: &CookieQuery,
    ) -> Result<Vec<Cookie>, CookieError> {
        let conn = Connection::open(db_path)?;

        // Firefox stores values in plaintext
        let mut stmt = conn.prepare(
            "SELECT name, value, host, path, expiry
             FROM moz_cookies
             WHERE host LIKE ?1 ESCAPE '\\' AND name = ?2",
        )?;

        let rows = stmt.query_map([like_pattern(&query.domain), query.name.clone()], |row| {
            let expiry: i64 = row.get(4)?;
            Ok(Cookie {
                name: row.get(0)?,
                value: row.get(1)?,
                domain: row.get(2)?,
                path: row.get(3)?,
                expires: (expiry != 0).then_some(expiry),
            })
        })?;

        let now = chrono::Utc::now().timestamp();
        let mut cookies = Vec::new();
        for cookie in rows {
            let cookie = cookie?;
            if query.valid_only && cookie.expires.is_some_and(|e| e <= now) {
                continue;
            }
            cookies.push(cookie);
        }

        Ok(cookies)
    }
}

impl CookieStore for CookieExtractor {
    fn find(&self, browsers: &[BrowserType], query: &CookieQuery) -> Result<Vec<Cookie>, CookieError> {
        let browsers = if browsers.is_empty() { BrowserType::all() } else { browsers };

        let mut found = Vec::new();
        for &browser in browsers {
            match self.extract_cookies(browser, query) {
                Ok(cookies) => {
                    tracing::debug!("{} cookie(s) named {} in {}", cookies.len(), query.name, browser);
                    found.extend(cookies);
                }
                Err(CookieError::DatabaseNotFound { browser, path }) => {
                    tracing::debug!("No cookie database for {} at {}", browser, path);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }
}

/// LIKE pattern for "domain contains", with SQL wildcards in the input escaped
fn like_pattern(domain: &str) -> String {
    let escaped = domain.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn firefox_db(dir: &Path, rows: &[(&str, &str, &str, i64)]) -> PathBuf {
        let path = dir.join("cookies.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE moz_cookies (name TEXT, value TEXT, host TEXT, path TEXT, expiry INTEGER)",
        )
        .unwrap();
        for (name, value, host, expiry) in rows {
            conn.execute(
                "INSERT INTO moz_cookies VALUES (?1, ?2, ?3, '/', ?4)",
                rusqlite::params![name, value, host, expiry],
            )
            .unwrap();
        }
        path
    }

    fn chromium_db(dir: &Path, rows: &[(&str, &str, &str, i64)]) -> PathBuf {
        let path = dir.join("Cookies");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE cookies (name TEXT, value TEXT, encrypted_value BLOB, host_key TEXT,
                                   path TEXT, expires_utc INTEGER)",
        )
        .unwrap();
        for (name, value, host, expires_utc) in rows {
            conn.execute(
                "INSERT INTO cookies VALUES (?1, ?2, X'', ?3, '/', ?4)",
                rusqlite::params![name, value, host, expires_utc],
            )
            .unwrap();
        }
        path
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    fn encrypted_chromium_db(dir: &Path, schema_version: Option<i64>, rows: &[(&str, Vec<u8>, &str)]) -> PathBuf {
        let path = dir.join("Cookies");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE meta (key TEXT PRIMARY KEY, value TEXT);
             CREATE TABLE cookies (name TEXT, value TEXT, encrypted_value BLOB, host_key TEXT,
                                   path TEXT, expires_utc INTEGER)",
        )
        .unwrap();
        if let Some(version) = schema_version {
            conn.execute(
                "INSERT INTO meta VALUES ('version', ?1)",
                rusqlite::params![version.to_string()],
            )
            .unwrap();
        }
        for (name, encrypted, host) in rows {
            conn.execute(
                "INSERT INTO cookies VALUES (?1, '', ?2, ?3, '/', 0)",
                rusqlite::params![name, encrypted, host],
            )
            .unwrap();
        }
        path
    }

    fn future_unix() -> i64 {
        chrono::Utc::now().timestamp() + 86_400
    }

    #[test]
    fn test_browser_type_name() {
        assert_eq!(BrowserType::Chrome.name(), "Chrome");
        assert_eq!(BrowserType::Edge.name(), "Edge");
        assert_eq!(BrowserType::Firefox.to_string(), "Firefox");
    }

    #[test]
    fn test_browser_type_from_str() {
        assert_eq!("chrome".parse::<BrowserType>(), Ok(BrowserType::Chrome));
        assert_eq!(" Firefox ".parse::<BrowserType>(), Ok(BrowserType::Firefox));
        assert_eq!("EDGE".parse::<BrowserType>(), Ok(BrowserType::Edge));
        assert!("netscape".parse::<BrowserType>().is_err());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("leetcode.com"), "%leetcode.com%");
        assert_eq!(like_pattern("a_b%"), "%a\\_b\\%%");
    }

    #[test]
    fn test_firefox_filters_by_name_domain_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let db = firefox_db(
            dir.path(),
            &[
                ("LEETCODE_SESSION", "live", ".leetcode.com", future_unix()),
                ("LEETCODE_SESSION", "expired", "leetcode.com", 1),
                ("LEETCODE_SESSION", "other-site", ".example.com", future_unix()),
                ("csrftoken", "csrf", ".leetcode.com", 0),
            ],
        );
        let extractor = CookieExtractor::new().with_database(BrowserType::Firefox, db);

        let cookies = extractor
            .find(&[BrowserType::Firefox], &CookieQuery::valid("leetcode.com", "LEETCODE_SESSION"))
            .unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "live");

        let csrf = extractor
            .find(&[BrowserType::Firefox], &CookieQuery::valid("leetcode.com", "csrftoken"))
            .unwrap();
        assert_eq!(csrf.len(), 1);
        assert_eq!(csrf[0].expires, None);
    }

    #[test]
    fn test_expired_cookies_kept_when_not_filtering() {
        let dir = tempfile::tempdir().unwrap();
        let db = firefox_db(dir.path(), &[("LEETCODE_SESSION", "expired", "leetcode.com", 1)]);
        let extractor = CookieExtractor::new().with_database(BrowserType::Firefox, db);

        let query = CookieQuery {
            valid_only: false,
            ..CookieQuery::valid("leetcode.com", "LEETCODE_SESSION")
        };
        assert_eq!(extractor.find(&[BrowserType::Firefox], &query).unwrap().len(), 1);
    }

    #[test]
    fn test_chromium_plaintext_values() {
        let dir = tempfile::tempdir().unwrap();
        let future = (future_unix() + CHROMIUM_EPOCH_OFFSET_SECS) * 1_000_000;
        let db = chromium_db(
            dir.path(),
            &[
                ("csrftoken", "abc", ".leetcode.cn", future),
                ("csrftoken", "old", ".leetcode.cn", 1_000_000),
                ("csrftoken", "session-only", "leetcode.cn", 0),
            ],
        );
        let extractor = CookieExtractor::new().with_database(BrowserType::Chrome, db);

        let cookies = extractor
            .find(&[BrowserType::Chrome], &CookieQuery::valid("leetcode.cn", "csrftoken"))
            .unwrap();
        let values: Vec<_> = cookies.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["abc", "session-only"]);
    }

    #[test]
    fn test_missing_database_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let db = firefox_db(dir.path(), &[("csrftoken", "ff", "leetcode.com", 0)]);
        let extractor = CookieExtractor::new()
            .with_database(BrowserType::Chrome, dir.path().join("missing"))
            .with_database(BrowserType::Firefox, db);

        let cookies = extractor
            .find(
                &[BrowserType::Chrome, BrowserType::Firefox],
                &CookieQuery::valid("leetcode.com", "csrftoken"),
            )
            .unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "ff");
    }

    #[test]
    fn test_results_follow_browser_order() {
        let chrome_dir = tempfile::tempdir().unwrap();
        let firefox_dir = tempfile::tempdir().unwrap();
        let chrome = chromium_db(chrome_dir.path(), &[("csrftoken", "from-chrome", "leetcode.com", 0)]);
        let firefox = firefox_db(firefox_dir.path(), &[("csrftoken", "from-firefox", "leetcode.com", 0)]);
        let extractor = CookieExtractor::new()
            .with_database(BrowserType::Chrome, chrome)
            .with_database(BrowserType::Firefox, firefox);

        let cookies = extractor
            .find(
                &[BrowserType::Firefox, BrowserType::Chrome],
                &CookieQuery::valid("leetcode.com", "csrftoken"),
            )
            .unwrap();
        assert_eq!(cookies[0].value, "from-firefox");
        assert_eq!(cookies[1].value, "from-chrome");
    }

    #[test]
    fn test_concurrent_reads_of_same_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = firefox_db(
            dir.path(),
            &[
                ("LEETCODE_SESSION", "com", ".leetcode.com", 0),
                ("LEETCODE_SESSION", "cn", ".leetcode.cn", 0),
            ],
        );
        let extractor = CookieExtractor::new().with_database(BrowserType::Firefox, db);

        std::thread::scope(|s| {
            for i in 0..8 {
                let extractor = &extractor;
                s.spawn(move || {
                    let (domain, expected) = if i % 2 == 0 { ("leetcode.com", "com") } else { ("leetcode.cn", "cn") };
                    let cookies = extractor
                        .find(&[BrowserType::Firefox], &CookieQuery::valid(domain, "LEETCODE_SESSION"))
                        .unwrap();
                    assert_eq!(cookies.len(), 1);
                    assert_eq!(cookies[0].value, expected);
                });
            }
        });
    }

    #[test]
    fn test_predictable_temp_paths_do_not_block_reads() {
        let dir = tempfile::tempdir().unwrap();
        let db = firefox_db(dir.path(), &[("csrftoken", "x", "leetcode.com", 0)]);
        let extractor = CookieExtractor::new().with_database(BrowserType::Firefox, db);

        // Another user could squat on any name derived from the pid
        let squatted = std::env::temp_dir()
            .join(format!("questbank_cookies_firefox_{}.db", std::process::id()));
        std::fs::create_dir_all(&squatted).unwrap();

        let result = extractor.find(&[BrowserType::Firefox], &CookieQuery::valid("leetcode.com", "csrftoken"));
        let _ = std::fs::remove_dir(&squatted);
        assert_eq!(result.unwrap()[0].value, "x");
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn test_chromium_encrypted_values_on_linux() {
        use crate::auth::chromium::tests::linux_v10;

        let dir = tempfile::tempdir().unwrap();
        let db = encrypted_chromium_db(
            dir.path(),
            None,
            &[
                ("LEETCODE_SESSION", linux_v10(b"linux-session"), ".leetcode.com"),
                ("LEETCODE_SESSION", b"v11-keyring-bytes".to_vec(), "leetcode.com"),
            ],
        );
        let extractor = CookieExtractor::new().with_database(BrowserType::Chrome, db);

        let cookies = extractor
            .find(&[BrowserType::Chrome], &CookieQuery::valid("leetcode.com", "LEETCODE_SESSION"))
            .unwrap();
        // The keyring-encrypted row is skipped
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "linux-session");
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn test_chromium_schema_24_strips_host_digest() {
        use crate::auth::chromium::tests::linux_v10;

        let mut plain = vec![0x5a; 32];
        plain.extend_from_slice(b"csrf-value");

        let dir = tempfile::tempdir().unwrap();
        let db = encrypted_chromium_db(dir.path(), Some(24), &[("csrftoken", linux_v10(&plain), ".leetcode.com")]);
        let extractor = CookieExtractor::new().with_database(BrowserType::Edge, db);

        let cookies = extractor
            .find(&[BrowserType::Edge], &CookieQuery::valid("leetcode.com", "csrftoken"))
            .unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "csrf-value");
    }
}
