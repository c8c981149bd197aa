//! Provider identity and signing for adchain.
//!
//! This crate provides:
//! - Ed25519 key generation, parsing and provider id derivation
//! - Advertisement and head signing
//! - Signature verification

pub mod error;
pub mod head;
pub mod key;
pub mod signer;

pub use error::{SignerError, SignerResult};
pub use head::SignedHead;
pub use key::{KeyPair, PublicKey, SecretKey};
pub use signer::{AdvertisementSigner, Signer, verify_advertisement, verify_head};
