//! Zeroizing string for session tokens and passwords
//!
//! Credentials held by the strategies live for the whole process, so they are
//! kept in a type that wipes its buffer when dropped or cleared and never
//! prints its content.

use std::fmt;
use zeroize::Zeroize;

/// A string that zeroes its memory when dropped or cleared
///
/// # Example
///
/// ```
/// use questbank_lib::security::SecureString;
///
/// let mut token = SecureString::from("abc123");
/// assert_eq!(token.expose(), "abc123");
/// token.clear();
/// assert!(token.is_empty());
/// ```
#[derive(Clone, Default)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    /// Wraps an owned string without copying it
    pub fn new(s: String) -> Self {
        Self { inner: s }
    }

    /// Returns the secret value
    ///
    /// Named so call sites that leak the value into a request are easy to find.
    pub fn expose(&self) -> &str {
        &self.inner
    }

    /// Returns true if no value is held
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Wipes the value, leaving an empty string
    pub fn clear(&mut self) {
        self.inner.zeroize();
    }

    /// Replaces the value, wiping the previous one first
    pub fn replace(&mut self, value: impl Into<String>) {
        self.inner.zeroize();
        self.inner = value.into();
    }
}

impl Drop for SecureString {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.is_empty() {
            f.write_str("SecureString(<empty>)")
        } else {
            f.write_str("SecureString([REDACTED])")
        }
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(self.inner.as_bytes(), other.inner.as_bytes())
    }
}

impl Eq for SecureString {}

impl PartialEq<&str> for SecureString {
    fn eq(&self, other: &&str) -> bool {
        constant_time_eq(self.inner.as_bytes(), other.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
