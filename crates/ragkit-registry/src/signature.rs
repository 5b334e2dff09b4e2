//! Cryptographic signatures for plugin manifests.
//!
//! Uses Ed25519 for signing and verification. A manifest binds a plugin's
//! name and version to a signature from a known signer; the registry calls
//! the [`SignatureVerifier`] collaborator on every registration that carries
//! a manifest.

use crate::error::{RegistryError, Result};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A signed statement about a plugin build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// The plugin name the signature covers.
    pub name: String,
    /// The plugin version the signature covers.
    pub version: String,
    /// Hex-encoded Ed25519 signature over the canonical content.
    pub signature: String,
    /// Identifier of the signing key.
    #[serde(rename = "signerId")]
    pub signer_id: String,
}

/// Result of one verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    /// True when the signature checks out against a trusted key.
    pub verified: bool,
    /// Failure reason when `verified` is false.
    pub error: Option<String>,
}

impl VerificationOutcome {
    /// A successful verification.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            verified: true,
            error: None,
        }
    }

    /// A failed verification with a reason.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            error: Some(reason.into()),
        }
    }
}

/// Collaborator the registry calls to verify manifests.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` (from `signer_id`) over the manifest content.
    fn verify(
        &self,
        manifest: &PluginManifest,
        signature: &str,
        signer_id: &str,
    ) -> VerificationOutcome;
}

/// The canonical byte string a manifest signature covers.
///
/// Binds the signature to a specific plugin name and version.
fn canonical_content(name: &str, version: &str) -> Vec<u8> {
    format!("ragkit-plugin:{name}:{version}").into_bytes()
}

/// Trusted public keys indexed by signer id.
#[derive(Debug, Clone, Default)]
pub struct TrustedKeys {
    keys: HashMap<String, VerifyingKey>,
}

/// On-disk shape of one trusted key entry.
#[derive(Debug, Serialize, Deserialize)]
struct TrustedKeyEntry {
    signer_id: String,
    /// Hex-encoded 32-byte Ed25519 public key.
    public_key: String,
}

impl TrustedKeys {
    /// Create an empty key set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trusted key for a signer.
    pub fn add_key(&mut self, signer_id: impl Into<String>, key: VerifyingKey) {
        self.keys.insert(signer_id.into(), key);
    }

    /// Look up a signer's key.
    #[must_use]
    pub fn get(&self, signer_id: &str) -> Option<&VerifyingKey> {
        self.keys.get(signer_id)
    }

    /// Number of trusted signers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no signers are trusted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Load trusted keys from a JSON file:
    /// `[{"signer_id": "...", "public_key": "<hex>"}, ...]`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<TrustedKeyEntry> = serde_json::from_str(&raw)?;
        let mut keys = Self::new();
        for entry in entries {
            let bytes = hex::decode(&entry.public_key).map_err(|e| {
                RegistryError::InvalidArgument(format!(
                    "trusted key for '{}' is not valid hex: {e}",
                    entry.signer_id
                ))
            })?;
            let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
                RegistryError::InvalidArgument(format!(
                    "trusted key for '{}' must be 32 bytes, got {}",
                    entry.signer_id,
                    v.len()
                ))
            })?;
            let key = VerifyingKey::from_bytes(&bytes).map_err(|e| {
                RegistryError::InvalidArgument(format!(
                    "trusted key for '{}' is invalid: {e}",
                    entry.signer_id
                ))
            })?;
            keys.add_key(entry.signer_id, key);
        }
        Ok(keys)
    }
}

/// Built-in Ed25519 verifier backed by a [`TrustedKeys`] set.
#[derive(Debug, Clone, Default)]
pub struct Ed25519Verifier {
    keys: TrustedKeys,
}

impl Ed25519Verifier {
    /// Create a verifier over the given trusted keys.
    #[must_use]
    pub fn new(keys: TrustedKeys) -> Self {
        Self { keys }
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(
        &self,
        manifest: &PluginManifest,
        signature: &str,
        signer_id: &str,
    ) -> VerificationOutcome {
        let Some(key) = self.keys.get(signer_id) else {
            return VerificationOutcome::failed(format!("unknown signer: {signer_id}"));
        };
        let sig_bytes = match hex::decode(signature) {
            Ok(bytes) => bytes,
            Err(e) => return VerificationOutcome::failed(format!("signature is not valid hex: {e}")),
        };
        let sig_bytes: [u8; 64] = match <[u8; 64]>::try_from(sig_bytes) {
            Ok(bytes) => bytes,
            Err(v) => {
                return VerificationOutcome::failed(format!(
                    "signature must be 64 bytes, got {}",
                    v.len()
                ))
            }
        };
        let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        let content = canonical_content(&manifest.name, &manifest.version);
        if key.verify(&content, &sig).is_ok() {
            VerificationOutcome::ok()
        } else {
            VerificationOutcome::failed("signature does not match manifest content")
        }
    }
}

/// A signing key pair for producing plugin manifests.
///
/// Intended for build tooling and tests; the registry itself only verifies.
pub struct KeyPair {
    signing_key: SigningKey,
    /// Identifier other parties will know this signer by.
    pub signer_id: String,
}

impl KeyPair {
    /// Generate a new random key pair.
    #[must_use]
    pub fn generate(signer_id: impl Into<String>) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            signing_key,
            signer_id: signer_id.into(),
        }
    }

    /// The public half for distribution to registries.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign a plugin's name and version into a manifest.
    #[must_use]
    pub fn sign_manifest(&self, name: impl Into<String>, version: impl Into<String>) -> PluginManifest {
        let name = name.into();
        let version = version.into();
        let sig = self.signing_key.sign(&canonical_content(&name, &version));
        PluginManifest {
            name,
            version,
            signature: hex::encode(sig.to_bytes()),
            signer_id: self.signer_id.clone(),
        }
    }
}
