//! Advertisement signing and verification.

use crate::error::{SignerError, SignerResult};
use crate::head::SignedHead;
use crate::key::{KeyPair, PublicKey};
use adchain_core::{Advertisement, ContentHash, Link};
use ed25519_dalek::Signer as _;
use ed25519_dalek::Verifier;

/// Signing identity used by the engine.
pub trait Signer: Send + Sync {
    /// Sign a digest and return the raw 64-byte signature.
    fn sign_digest(&self, digest: &ContentHash) -> Vec<u8>;

    /// Provider id advertised alongside signatures.
    fn provider_id(&self) -> String;

    /// Stamp the provider id on `ad` and attach a signature.
    fn sign_advertisement(&self, ad: &mut Advertisement) {
        ad.provider = self.provider_id();
        ad.signature = self.sign_digest(&ad.signing_digest());
    }

    /// Sign a chain head.
    fn sign_head(&self, head: Link) -> SignedHead {
        let provider = self.provider_id();
        let signature = self.sign_digest(&SignedHead::signing_digest(&head, &provider));
        SignedHead {
            head,
            provider,
            signature,
        }
    }
}

/// Ed25519 signer over a named key pair.
pub struct AdvertisementSigner {
    keypair: KeyPair,
    provider_id: String,
}

impl AdvertisementSigner {
    /// Create a new signer from a key pair.
    pub fn new(keypair: KeyPair) -> Self {
        let provider_id = keypair.public.provider_id();
        Self {
            keypair,
            provider_id,
        }
    }

    /// Create from a secret key string.
    pub fn from_secret_key(s: &str) -> SignerResult<Self> {
        Ok(Self::new(KeyPair::from_secret_key(s)?))
    }

    /// Generate a new signer with a random key.
    pub fn generate(key_name: impl Into<String>) -> Self {
        Self::new(KeyPair::generate(key_name))
    }

    pub fn key_name(&self) -> &str {
        &self.keypair.name
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.keypair.public
    }

    /// Get the secret key string, for writing key files.
    pub fn secret_key(&self) -> String {
        self.keypair.to_secret_key()
    }
}

impl Signer for AdvertisementSigner {
    fn sign_digest(&self, digest: &ContentHash) -> Vec<u8> {
        self.keypair
            .secret
            .signing_key()
            .sign(digest.as_bytes())
            .to_bytes()
            .to_vec()
    }

    fn provider_id(&self) -> String {
        self.provider_id.clone()
    }
}

fn verify_digest(digest: &ContentHash, signature: &[u8], public_key: &PublicKey) -> SignerResult<()> {
    let sig_array: [u8; 64] = signature.try_into().map_err(|_| {
        SignerError::InvalidSignature(format!("expected 64 bytes, got {}", signature.len()))
    })?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_array);

    public_key
        .verifying_key()
        .verify(digest.as_bytes(), &signature)
        .map_err(|_| SignerError::VerificationFailed)
}

/// Verify an advertisement signature.
///
/// With no `public_key`, the key is recovered from the advertisement's
/// provider id. With one, the provider id must also match it.
pub fn verify_advertisement(ad: &Advertisement, public_key: Option<&PublicKey>) -> SignerResult<()> {
    let key = match public_key {
        Some(key) => {
            let expected = key.provider_id();
            if ad.provider != expected {
                return Err(SignerError::ProviderMismatch {
                    expected,
                    actual: ad.provider.clone(),
                });
            }
            key.clone()
        }
        None => PublicKey::from_provider_id(&ad.provider)?,
    };
    verify_digest(&ad.signing_digest(), &ad.signature, &key)
}

/// Verify a signed head against the key named by its provider id.
pub fn verify_head(head: &SignedHead) -> SignerResult<PublicKey> {
    let key = PublicKey::from_provider_id(&head.provider)?;
    verify_digest(
        &SignedHead::signing_digest(&head.head, &head.provider),
        &head.signature,
        &key,
    )?;
    Ok(key)
}
