//! Ed25519 key types and operations.
//!
//! Secret keys are exchanged as `name:base64(secret || public)`, public keys
//! as `name:base64(public)`. A provider is identified on the wire by its
//! provider id, `ed25519:` followed by the unpadded URL-safe base64 of the
//! public key.

use crate::error::{SignerError, SignerResult};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::fmt;

/// Prefix of every provider id.
pub const PROVIDER_ID_PREFIX: &str = "ed25519:";

/// A secret (private) key for signing.
pub struct SecretKey {
    inner: SigningKey,
}

fn split_named(s: &str) -> SignerResult<(&str, Vec<u8>)> {
    let (name, b64) = s
        .split_once(':')
        .ok_or_else(|| SignerError::KeyParsing("expected 'keyname:base64' format".to_string()))?;
    if name.is_empty() {
        return Err(SignerError::KeyParsing("empty key name".to_string()));
    }
    let bytes = STANDARD
        .decode(b64)
        .map_err(|e| SignerError::KeyParsing(format!("invalid base64: {e}")))?;
    Ok((name, bytes))
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        let mut rng = rand_core::OsRng;
        Self {
            inner: SigningKey::generate(&mut rng),
        }
    }

    /// Parse `keyname:base64(secret || public)`.
    ///
    /// The embedded public half must match the secret.
    pub fn from_key_string(s: &str) -> SignerResult<(String, Self)> {
        let (name, bytes) = split_named(s)?;
        if bytes.len() != 64 {
            return Err(SignerError::KeyParsing(format!(
                "expected 64 bytes, got {}",
                bytes.len()
            )));
        }

        let secret_bytes: [u8; 32] = bytes[..32]
            .try_into()
            .map_err(|_| SignerError::KeyParsing("invalid secret key bytes".to_string()))?;
        let inner = SigningKey::from_bytes(&secret_bytes);
        if inner.verifying_key().as_bytes() != &bytes[32..] {
            return Err(SignerError::KeyParsing(
                "public half does not match secret key".to_string(),
            ));
        }

        Ok((name.to_string(), Self { inner }))
    }

    /// Encode as `keyname:base64(secret || public)`.
    pub fn to_key_string(&self, key_name: &str) -> String {
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(self.inner.as_bytes());
        bytes.extend_from_slice(self.inner.verifying_key().as_bytes());
        format!("{key_name}:{}", STANDARD.encode(&bytes))
    }

    /// Get the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.inner
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// A public key for verification.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    fn from_raw(bytes: &[u8]) -> SignerResult<Self> {
        let key_bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            SignerError::KeyParsing(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        let inner = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| SignerError::KeyParsing(format!("invalid public key: {e}")))?;
        Ok(Self { inner })
    }

    /// Parse `keyname:base64(public)`.
    pub fn from_key_string(s: &str) -> SignerResult<(String, Self)> {
        let (name, bytes) = split_named(s)?;
        Ok((name.to_string(), Self::from_raw(&bytes)?))
    }

    /// Encode as `keyname:base64(public)`.
    pub fn to_key_string(&self, key_name: &str) -> String {
        format!("{key_name}:{}", STANDARD.encode(self.inner.as_bytes()))
    }

    /// The provider id derived from this key.
    pub fn provider_id(&self) -> String {
        format!(
            "{PROVIDER_ID_PREFIX}{}",
            URL_SAFE_NO_PAD.encode(self.inner.as_bytes())
        )
    }

    /// Recover the public key from a provider id.
    pub fn from_provider_id(id: &str) -> SignerResult<Self> {
        let encoded = id
            .strip_prefix(PROVIDER_ID_PREFIX)
            .ok_or_else(|| SignerError::InvalidProviderId(id.to_string()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| SignerError::InvalidProviderId(id.to_string()))?;
        Self::from_raw(&bytes).map_err(|_| SignerError::InvalidProviderId(id.to_string()))
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.inner
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.provider_id();
        write!(f, "PublicKey({}...)", &id[..PROVIDER_ID_PREFIX.len() + 8])
    }
}

/// A named key pair.
pub struct KeyPair {
    /// The key name, recorded in the key string.
    pub name: String,
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl KeyPair {
    /// Generate a new key pair with the given name.
    pub fn generate(name: impl Into<String>) -> Self {
        let secret = SecretKey::generate();
        let public = secret.public_key();
        Self {
            name: name.into(),
            secret,
            public,
        }
    }

    /// Parse from the secret key string format.
    pub fn from_secret_key(s: &str) -> SignerResult<Self> {
        let (name, secret) = SecretKey::from_key_string(s)?;
        let public = secret.public_key();
        Ok(Self {
            name,
            secret,
            public,
        })
    }

    pub fn to_secret_key(&self) -> String {
        self.secret.to_key_string(&self.name)
    }

    pub fn to_public_key(&self) -> String {
        self.public.to_key_string(&self.name)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("name", &self.name)
            .field("public", &self.public)
            .finish()
    }
}
