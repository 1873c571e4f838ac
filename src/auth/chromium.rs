//! Chromium cookie value decryption
//!
//! Chrome and Edge store `encrypted_value` with a platform-specific scheme:
//!
//! - Windows: a raw DPAPI blob (old profiles), or `v10`/`v11` + AES-256-GCM
//!   keyed by a DPAPI-protected key kept in the profile's `Local State` file
//! - macOS: `v10` + AES-128-CBC, key derived with PBKDF2-SHA1 (1003 rounds)
//!   from the "Safe Storage" password in the login Keychain
//! - Linux: `v10` + AES-128-CBC, key derived with PBKDF2-SHA1 (1 round) from
//!   the fixed password `peanuts`. `v11` values are keyed by the desktop
//!   keyring and are reported as undecryptable.
//!
//! Cookie databases from schema version 24 on prefix the plaintext with the
//! SHA-256 of the host key; that prefix is dropped.

use std::path::PathBuf;

use super::cookie_extractor::{BrowserType, CookieError};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const VERSION_PREFIX_LEN: usize = 3;
const HOST_DIGEST_LEN: usize = 32;

const CBC_SALT: &[u8] = b"saltysalt";
const CBC_IV: [u8; 16] = [b' '; 16];
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
const MACOS_ROUNDS: u32 = 1003;
#[cfg_attr(any(windows, target_os = "macos"), allow(dead_code))]
const LINUX_ROUNDS: u32 = 1;
#[cfg_attr(any(windows, target_os = "macos"), allow(dead_code))]
const LINUX_PASSWORD: &[u8] = b"peanuts";

/// Lazily loads the profile key and decrypts cookie values with it
pub(crate) struct ChromiumDecryptor {
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    browser: BrowserType,
    #[cfg_attr(not(windows), allow(dead_code))]
    local_state: PathBuf,
    key: Option<Vec<u8>>,
    host_digest: bool,
}

impl ChromiumDecryptor {
    pub(crate) fn new(browser: BrowserType, local_state: PathBuf) -> Self {
        Self {
            browser,
            local_state,
            key: None,
            host_digest: false,
        }
    }

    /// Strip the host-key digest that newer databases put before each value
    pub(crate) fn set_host_digest(&mut self, enabled: bool) {
        self.host_digest = enabled;
    }

    #[cfg(all(test, target_os = "macos"))]
    pub(crate) fn with_key(mut self, key: Vec<u8>) -> Self {
        self.key = Some(key);
        self
    }

    pub(crate) fn decrypt(&mut self, encrypted: &[u8]) -> Result<String, CookieError> {
        if encrypted.is_empty() {
            return Ok(String::new());
        }

        let mut plain = self.decrypt_platform(encrypted)?;
        if self.host_digest {
            if plain.len() < HOST_DIGEST_LEN {
                return Err(CookieError::Decryption("Missing host digest".into()));
            }
            plain.drain(..HOST_DIGEST_LEN);
        }

        String::from_utf8(plain).map_err(|e| CookieError::Decryption(format!("UTF-8 error: {}", e)))
    }

    #[cfg(windows)]
    fn decrypt_platform(&mut self, encrypted: &[u8]) -> Result<Vec<u8>, CookieError> {
        if !is_versioned(encrypted) {
            return dpapi_unprotect(encrypted);
        }

        let key = match self.key.take() {
            Some(key) => key,
            None => {
                let content = std::fs::read_to_string(&self.local_state)?;
                dpapi_unprotect(&protected_key_from_local_state(&content)?)?
            }
        };
        let result = decrypt_gcm(&key, encrypted);
        self.key = Some(key);
        result
    }

    #[cfg(target_os = "macos")]
    fn decrypt_platform(&mut self, encrypted: &[u8]) -> Result<Vec<u8>, CookieError> {
        if !is_versioned(encrypted) {
            return Ok(encrypted.to_vec());
        }

        let key = match self.key.take() {
            Some(key) => key,
            None => {
                let password = keychain_password(self.browser)?;
                derive_cbc_key(password.as_bytes(), MACOS_ROUNDS)?.to_vec()
            }
        };
        let result = decrypt_cbc(&key, &encrypted[VERSION_PREFIX_LEN..]);
        self.key = Some(key);
        result
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    fn decrypt_platform(&mut self, encrypted: &[u8]) -> Result<Vec<u8>, CookieError> {
        if encrypted.starts_with(b"v11") {
            return Err(CookieError::Decryption(
                "v11 values are keyed by the desktop keyring, which is not supported".into(),
            ));
        }
        if !encrypted.starts_with(b"v10") {
            return Ok(encrypted.to_vec());
        }

        let key = match self.key.take() {
            Some(key) => key,
            None => derive_cbc_key(LINUX_PASSWORD, LINUX_ROUNDS)?.to_vec(),
        };
        let result = decrypt_cbc(&key, &encrypted[VERSION_PREFIX_LEN..]);
        self.key = Some(key);
        result
    }

    #[cfg(not(any(windows, unix)))]
    fn decrypt_platform(&mut self, _encrypted: &[u8]) -> Result<Vec<u8>, CookieError> {
        Err(CookieError::Decryption(
            "Chromium cookie decryption is not available on this platform".into(),
        ))
    }
}

#[cfg_attr(all(unix, not(target_os = "macos")), allow(dead_code))]
fn is_versioned(encrypted: &[u8]) -> bool {
    encrypted.starts_with(b"v10") || encrypted.starts_with(b"v11")
}

/// Decrypts `v10`/`v11` + nonce + ciphertext + tag with AES-256-GCM
#[cfg_attr(not(windows), allow(dead_code))]
fn decrypt_gcm(key: &[u8], encrypted: &[u8]) -> Result<Vec<u8>, CookieError> {
    use aes_gcm::{
        aead::{Aead, KeyInit},
        Aes256Gcm, Nonce,
    };

    if encrypted.len() < VERSION_PREFIX_LEN + NONCE_LEN + TAG_LEN {
        return Err(CookieError::Decryption("Encrypted data too short".into()));
    }

    let (nonce, ciphertext) = encrypted[VERSION_PREFIX_LEN..].split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CookieError::Decryption(format!("Invalid key: {}", e)))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| CookieError::Decryption(format!("AES-GCM decryption failed: {}", e)))
}

/// PBKDF2-HMAC-SHA1 over `saltysalt`, 16-byte output
#[cfg_attr(windows, allow(dead_code))]
fn derive_cbc_key(password: &[u8], rounds: u32) -> Result<[u8; 16], CookieError> {
    use hmac::Hmac;
    use sha1::Sha1;

    pbkdf2::pbkdf2_array::<Hmac<Sha1>, 16>(password, CBC_SALT, rounds)
        .map_err(|e| CookieError::Decryption(format!("Key derivation failed: {}", e)))
}

/// AES-128-CBC with a blank IV and PKCS#7 padding
#[cfg_attr(windows, allow(dead_code))]
fn decrypt_cbc(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CookieError> {
    use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};

    type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

    Aes128CbcDec::new_from_slices(key, &CBC_IV)
        .map_err(|e| CookieError::Decryption(format!("Invalid key: {}", e)))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| CookieError::Decryption(format!("AES-CBC decryption failed: {}", e)))
}

#[cfg(target_os = "macos")]
fn keychain_password(browser: BrowserType) -> Result<String, CookieError> {
    let (service, account) = match browser {
        BrowserType::Edge => ("Microsoft Edge Safe Storage", "Microsoft Edge"),
        _ => ("Chrome Safe Storage", "Chrome"),
    };

    keyring::Entry::new(service, account)
        .and_then(|entry| entry.get_password())
        .map_err(|e| CookieError::Decryption(format!("Keychain lookup for {} failed: {}", service, e)))
}

/// Extracts the still DPAPI-protected key from `Local State` JSON
#[cfg_attr(not(windows), allow(dead_code))]
fn protected_key_from_local_state(content: &str) -> Result<Vec<u8>, CookieError> {
    use base64::Engine;

    let json: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| CookieError::Decryption(format!("Local State parse error: {}", e)))?;
    let encoded = json
        .get("os_crypt")
        .and_then(|v| v.get("encrypted_key"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| CookieError::Decryption("Local State has no encrypted_key".into()))?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| CookieError::Decryption(format!("Base64 error: {}", e)))?;

    decoded
        .strip_prefix(b"DPAPI")
        .map(<[u8]>::to_vec)
        .ok_or_else(|| CookieError::Decryption("Invalid key format".into()))
}

#[cfg(windows)]
fn dpapi_unprotect(data: &[u8]) -> Result<Vec<u8>, CookieError> {
    use windows::Win32::Security::Cryptography::{
        CryptUnprotectData, CRYPTPROTECT_UI_FORBIDDEN, CRYPT_INTEGER_BLOB,
    };

    #[link(name = "kernel32")]
    extern "system" {
        fn LocalFree(hmem: *mut std::ffi::c_void) -> *mut std::ffi::c_void;
    }

    let mut input = CRYPT_INTEGER_BLOB {
        cbData: data.len() as u32,
        pbData: data.as_ptr() as *mut u8,
    };
    let mut output = CRYPT_INTEGER_BLOB::default();

    // SAFETY: `input` borrows `data` for the duration of the call; `output` is
    // allocated by Windows and released with LocalFree after copying.
    unsafe {
        CryptUnprotectData(
            &mut input,
            None,
            None,
            None,
            None,
            CRYPTPROTECT_UI_FORBIDDEN,
            &mut output,
        )
        .map_err(|e| CookieError::Decryption(format!("CryptUnprotectData failed: {}", e)))?;

        if output.pbData.is_null() {
            return Ok(Vec::new());
        }
        let plain = std::slice::from_raw_parts(output.pbData, output.cbData as usize).to_vec();
        LocalFree(output.pbData as *mut std::ffi::c_void);
        Ok(plain)
    }
}
