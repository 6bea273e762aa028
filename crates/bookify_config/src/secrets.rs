// --- File: crates/bookify_config/src/secrets.rs ---
//! Token vault: AES-256-GCM sealing for OAuth tokens at rest.
//!
//! Ciphertext produced here is opaque to every other crate; the account
//! repository stores and returns it verbatim.

use base64::{engine::general_purpose, Engine as _};
use ring::aead::{self, LessSafeKey, Nonce, UnboundKey, NONCE_LEN};
use ring::error::Unspecified;
use ring::rand::{SecureRandom, SystemRandom};
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::info;

/// Error type for secret management operations
#[derive(Debug)]
pub enum SecretError {
    /// Error encrypting a secret
    EncryptionError(String),
    /// Error decrypting a secret
    DecryptionError(String),
    /// Error with the encryption key
    KeyError(String),
    /// I/O error
    IoError(std::io::Error),
    /// Base64 error
    Base64Error(base64::DecodeError),
    /// Ring crypto error
    CryptoError,
}

impl fmt::Display for SecretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretError::EncryptionError(msg) => write!(f, "Encryption error: {}", msg),
            SecretError::DecryptionError(msg) => write!(f, "Decryption error: {}", msg),
            SecretError::KeyError(msg) => write!(f, "Key error: {}", msg),
            SecretError::IoError(err) => write!(f, "I/O error: {}", err),
            SecretError::Base64Error(err) => write!(f, "Base64 error: {}", err),
            SecretError::CryptoError => write!(f, "Cryptographic operation failed"),
        }
    }
}

impl std::error::Error for SecretError {}

impl From<std::io::Error> for SecretError {
    fn from(err: std::io::Error) -> Self {
        SecretError::IoError(err)
    }
}

impl From<base64::DecodeError> for SecretError {
    fn from(err: base64::DecodeError) -> Self {
        SecretError::Base64Error(err)
    }
}

impl From<Unspecified> for SecretError {
    fn from(_: Unspecified) -> Self {
        SecretError::CryptoError
    }
}

/// Get the encryption key from the environment or generate a new one
fn get_encryption_key() -> Result<[u8; 32], SecretError> {
    // Try to get the key from the environment variable
    if let Ok(key_b64) = env::var("BOOKIFY_ENCRYPTION_KEY") {
        return decode_key(&key_b64);
    }

    // If not found in environment, check for a key file
    let key_path =
        env::var("BOOKIFY_ENCRYPTION_KEY_PATH").unwrap_or_else(|_| ".bookify_key".to_string());

    if Path::new(&key_path).exists() {
        let key_b64 = fs::read_to_string(&key_path)?;
        return decode_key(key_b64.trim());
    }

    // Generate a new key
    let rng = SystemRandom::new();
    let mut key = [0u8; 32];
    rng.fill(&mut key)
        .map_err(|_| SecretError::KeyError("Failed to generate encryption key".to_string()))?;

    // Save the key to a file
    let key_b64 = general_purpose::STANDARD.encode(key);
    fs::write(&key_path, &key_b64)?;

    info!("Generated new encryption key and saved to {}", key_path);
    info!("For production, set the BOOKIFY_ENCRYPTION_KEY environment variable.");

    Ok(key)
}

fn decode_key(key_b64: &str) -> Result<[u8; 32], SecretError> {
    let key_bytes = general_purpose::STANDARD.decode(key_b64)?;
    if key_bytes.len() != 32 {
        return Err(SecretError::KeyError(format!(
            "Encryption key must be 32 bytes, got {} bytes",
            key_bytes.len()
        )));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&key_bytes);
    Ok(key)
}

/// Encrypt a string using AES-256-GCM. The random nonce is prepended to the
/// ciphertext; the whole blob is base64-encoded.
pub fn encrypt_string(plaintext: &str) -> Result<String, SecretError> {
    let key = get_encryption_key()?;
    let unbound_key = UnboundKey::new(&aead::AES_256_GCM, &key)
        .map_err(|_| SecretError::EncryptionError("Failed to create encryption key".to_string()))?;
    let sealing_key = LessSafeKey::new(unbound_key);

    let rng = SystemRandom::new();
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| SecretError::EncryptionError("Failed to generate nonce".to_string()))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.as_bytes().to_vec();
    sealing_key
        .seal_in_place_append_tag(nonce, aead::Aad::empty(), &mut in_out)
        .map_err(|_| SecretError::EncryptionError("Failed to encrypt data".to_string()))?;

    let mut blob = nonce_bytes.to_vec();
    blob.extend_from_slice(&in_out);
    Ok(general_purpose::STANDARD.encode(&blob))
}

/// Decrypt a string produced by [`encrypt_string`].
pub fn decrypt_string(ciphertext_b64: &str) -> Result<String, SecretError> {
    let key = get_encryption_key()?;
    let unbound_key = UnboundKey::new(&aead::AES_256_GCM, &key)
        .map_err(|_| SecretError::DecryptionError("Failed to create decryption key".to_string()))?;
    let opening_key = LessSafeKey::new(unbound_key);

    let blob = general_purpose::STANDARD.decode(ciphertext_b64)?;
    if blob.len() < NONCE_LEN {
        return Err(SecretError::DecryptionError(
            "Ciphertext too short".to_string(),
        ));
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| SecretError::DecryptionError("Invalid nonce".to_string()))?;

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(nonce, aead::Aad::empty(), &mut in_out)
        .map_err(|_| SecretError::DecryptionError("Failed to decrypt data".to_string()))?;

    String::from_utf8(plaintext.to_vec()).map_err(|_| {
        SecretError::DecryptionError("Failed to convert decrypted data to string".to_string())
    })
}

/// Marker for encrypted values
pub const ENCRYPTED_MARKER: &str = "encrypted:";

/// Check if a string is an encrypted value
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_MARKER)
}

/// Encrypt a value if it's not already encrypted
pub fn ensure_encrypted(value: &str) -> Result<String, SecretError> {
    if is_encrypted(value) {
        Ok(value.to_string())
    } else {
        let encrypted = encrypt_string(value)?;
        Ok(format!("{}{}", ENCRYPTED_MARKER, encrypted))
    }
}

/// Decrypt a value if it's encrypted
pub fn ensure_decrypted(value: &str) -> Result<String, SecretError> {
    if is_encrypted(value) {
        let encrypted_part = &value[ENCRYPTED_MARKER.len()..];
        decrypt_string(encrypted_part)
    } else {
        Ok(value.to_string())
    }
}
