//! Security module - Secret handling and log redaction
//!
//! - `SecureString` keeps session tokens and passwords out of `Debug` output
//!   and wipes them on drop
//! - `Sanitizer` masks tokens and URLs before they reach the log

mod sanitizer;
mod secure_string;

pub use sanitizer::Sanitizer;
pub use secure_string::SecureString;
