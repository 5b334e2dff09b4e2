//! RAGKIT Plugin Registry
//!
//! Namespace-scoped lookup of interchangeable pipeline stage implementations
//! with contract validation and cryptographic manifest verification:
//! - **Contracts**: JSON-Schema-validated documents declaring what each
//!   category must implement; registration checks the plugin's reported
//!   capabilities and version compatibility against them.
//! - **Signatures**: Ed25519 manifests verified through a pluggable
//!   [`SignatureVerifier`], with an audit record per attempt.
//! - **Environment defaults**: production verifies signatures and fails
//!   closed; development registers fail-open with one-shot warnings.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragkit_registry::{PluginRegistry, RegistryConfig};
//! use ragkit::core::PluginHandle;
//! use std::sync::Arc;
//!
//! let registry = PluginRegistry::new(RegistryConfig::default());
//! registry.load_contracts_json(include_str!("../contracts.json"))?;
//! registry.register("embedder", "openai", PluginHandle::Embedder(Arc::new(my_embedder)), None)?;
//! let embedder = registry.get("embedder", "openai")?;
//! ```

pub mod audit;
pub mod contract;
pub mod error;
pub mod registry;
pub mod signature;

pub use audit::{AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use contract::{ContractProperty, PluginContract, PropertyKind};
pub use error::{RegistryError, Result};
pub use registry::{Environment, PluginEntry, PluginRegistry, RegistryConfig};
pub use signature::{
    Ed25519Verifier, KeyPair, PluginManifest, SignatureVerifier, TrustedKeys, VerificationOutcome,
};
