//! Encryption of account tokens at rest
//!
//! Tokens are encrypted with [age](https://age-encryption.org) to the X25519
//! recipient derived from the configured identity, and stored base64-encoded.
//! The identity string is the only secret; losing it makes every stored token
//! unreadable, and a malformed one is rejected before the store opens.
//!
//! ```
//! use libsocialcast::credentials::TokenCipher;
//!
//! # fn example() -> libsocialcast::Result<()> {
//! let cipher = TokenCipher::from_key(&TokenCipher::generate_key())?;
//! let sealed = cipher.encrypt("EAAG...")?;
//! assert_eq!(cipher.decrypt(&sealed)?, "EAAG...");
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Write};
use std::str::FromStr;

use age::secrecy::ExposeSecret;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{CredentialError, Result};

pub struct TokenCipher {
    identity: age::x25519::Identity,
    recipient: age::x25519::Recipient,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("recipient", &self.recipient.to_string())
            .finish()
    }
}

impl TokenCipher {
    /// Parse an `AGE-SECRET-KEY-1...` identity
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::MalformedKey` if the string is not a valid identity.
    pub fn from_key(key: &str) -> Result<Self> {
        let identity = age::x25519::Identity::from_str(key.trim())
            .map_err(|e| CredentialError::MalformedKey(e.to_string()))?;
        let recipient = identity.to_public();
        Ok(Self {
            identity,
            recipient,
        })
    }

    /// Generate a fresh identity suitable for `[security] encryption_key`
    pub fn generate_key() -> String {
        age::x25519::Identity::generate()
            .to_string()
            .expose_secret()
            .clone()
    }

    /// Public half of the identity, safe to print
    pub fn recipient(&self) -> String {
        self.recipient.to_string()
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let recipients: Vec<Box<dyn age::Recipient + Send>> = vec![Box::new(self.recipient.clone())];
        let encryptor = age::Encryptor::with_recipients(recipients)
            .ok_or_else(|| CredentialError::Encryption("no recipients".to_string()))?;

        let mut encrypted = vec![];
        let mut writer = encryptor
            .wrap_output(&mut encrypted)
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;
        writer
            .write_all(plaintext.as_bytes())
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        Ok(STANDARD.encode(encrypted))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let encrypted = STANDARD
            .decode(stored)
            .map_err(|e| CredentialError::Decryption(format!("not base64: {}", e)))?;

        let decryptor = match age::Decryptor::new(&encrypted[..]) {
            Ok(age::Decryptor::Recipients(d)) => d,
            Ok(_) => {
                return Err(CredentialError::Decryption(
                    "Invalid encryption format (expected recipient)".to_string(),
                )
                .into())
            }
            Err(e) => return Err(CredentialError::Decryption(e.to_string()).into()),
        };

        let mut decrypted = vec![];
        let mut reader = decryptor
            .decrypt(std::iter::once(&self.identity as &dyn age::Identity))
            .map_err(|e| CredentialError::Decryption(e.to_string()))?;
        reader
            .read_to_end(&mut decrypted)
            .map_err(|e| CredentialError::Decryption(e.to_string()))?;

        Ok(String::from_utf8(decrypted)
            .map_err(|e| CredentialError::Decryption(format!("Invalid UTF-8: {}", e)))?)
    }
}
