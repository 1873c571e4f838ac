//! Redaction helpers for log output

/// Sanitizer for values that end up in log lines
pub struct Sanitizer;

impl Sanitizer {
    /// Masks a token, keeping only its last 4 characters
    ///
    /// # Examples
    ///
    /// ```
    /// use questbank_lib::security::Sanitizer;
    ///
    /// assert_eq!(Sanitizer::sanitize_token("eyJhbGciOiJIUzI1NiJ9.abcd"), "***abcd");
    /// assert_eq!(Sanitizer::sanitize_token("abc"), "****");
    /// ```
    pub fn sanitize_token(token: &str) -> String {
        let count = token.chars().count();
        if count <= 4 {
            return "****".to_string();
        }
        let tail: String = token.chars().skip(count - 4).collect();
        format!("***{}", tail)
    }

    /// Drops query string and fragment from a URL
    ///
    /// ```
    /// use questbank_lib::security::Sanitizer;
    ///
    /// assert_eq!(
    ///     Sanitizer::sanitize_url("https://leetcode.com/graphql?session=x#top"),
    ///     "https://leetcode.com/graphql"
    /// );
    /// ```
    pub fn sanitize_url(url: &str) -> &str {
        let end = url.find(['?', '#']).unwrap_or(url.len());
        &url[..end]
    }
}
