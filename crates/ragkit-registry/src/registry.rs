//! The plugin registry: namespace-scoped lookup with contract and signature
//! validation at registration time.
//!
//! All validation happens in [`PluginRegistry::register`]; lookups never
//! fail for reasons other than absence. Entries are immutable once inserted
//! and removed only by [`PluginRegistry::clear`].
//!
//! Construction is explicit (dependency injection); there is no process-wide
//! singleton. Use [`PluginRegistry::from_env`] to pick up the
//! environment-dependent defaults.

use crate::audit::{AuditRecord, AuditSink, TracingAuditSink};
use crate::contract::PluginContract;
use crate::error::{RegistryError, Result};
use crate::signature::{Ed25519Verifier, PluginManifest, SignatureVerifier, TrustedKeys};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use ragkit::core::{PluginCategory, PluginHandle, PluginMetadata};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};

/// Deployment environment, detected from `RAGKIT_ENV` (or `NODE_ENV` for
/// parity with JS deployments). Anything other than `production` is
/// development.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Fail-fast defaults; signature verification off.
    Development,
    /// Fail-closed defaults; signature verification on.
    Production,
}

impl Environment {
    /// Detect the environment from process variables.
    #[must_use]
    pub fn detect() -> Self {
        let value = std::env::var("RAGKIT_ENV")
            .or_else(|_| std::env::var("NODE_ENV"))
            .unwrap_or_default();
        if value.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Deployment environment; drives the remaining defaults.
    pub environment: Environment,
    /// Verify manifests when present.
    pub verify_signatures: bool,
    /// Treat verification failure as fatal. When false, failures demote to a
    /// logged warning and registration proceeds.
    pub fail_closed: bool,
    /// Optional JSON file of trusted signer keys.
    pub trusted_keys_path: Option<PathBuf>,
    /// Suppress one-shot contract warnings.
    pub disable_contract_warnings: bool,
    /// Validate contract documents against the JSON Schema on load.
    pub validate_contract_schema: bool,
}

impl RegistryConfig {
    /// Defaults for a given environment: production verifies signatures and
    /// fails closed; development does neither.
    #[must_use]
    pub fn for_environment(environment: Environment) -> Self {
        let production = environment == Environment::Production;
        Self {
            environment,
            verify_signatures: production,
            fail_closed: production,
            trusted_keys_path: None,
            disable_contract_warnings: false,
            validate_contract_schema: true,
        }
    }

    /// Defaults for the detected environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::for_environment(Environment::detect())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

/// A registered plugin. Immutable after registration.
#[derive(Clone)]
pub struct PluginEntry {
    /// The plugin's self-reported metadata.
    pub metadata: PluginMetadata,
    /// The plugin itself.
    pub handle: PluginHandle,
    /// The manifest supplied at registration, if any.
    pub manifest: Option<PluginManifest>,
    /// Whether the manifest passed verification. False when verification is
    /// disabled or no manifest was supplied.
    pub verified: bool,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
}

/// Process-scoped namespace of interchangeable stage implementations.
pub struct PluginRegistry {
    config: RegistryConfig,
    contracts: RwLock<HashMap<PluginCategory, PluginContract>>,
    entries: RwLock<HashMap<(PluginCategory, String), PluginEntry>>,
    verifier: Arc<dyn SignatureVerifier>,
    audit: Arc<dyn AuditSink>,
    warned: Mutex<HashSet<(String, String)>>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::from_env()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry").finish_non_exhaustive()
    }
}

impl PluginRegistry {
    /// Create a registry with the given configuration.
    ///
    /// When `trusted_keys_path` is set but unreadable, the registry starts
    /// with an empty key set (every verification then fails, which is the
    /// safe direction under fail-closed) and logs the load error.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        let keys = match &config.trusted_keys_path {
            Some(path) => match TrustedKeys::from_path(path) {
                Ok(keys) => keys,
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Failed to load trusted keys");
                    TrustedKeys::new()
                }
            },
            None => TrustedKeys::new(),
        };
        Self {
            config,
            contracts: RwLock::new(HashMap::new()),
            entries: RwLock::new(HashMap::new()),
            verifier: Arc::new(Ed25519Verifier::new(keys)),
            audit: Arc::new(TracingAuditSink),
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Create a registry with environment-detected defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(RegistryConfig::from_env())
    }

    /// Replace the signature verifier collaborator.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Replace the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Load contract documents.
    ///
    /// Each document is JSON-Schema-validated (unless disabled) and parsed.
    /// An invalid contract is fatal in development and skipped with an error
    /// log in production - a broken contract must not block a production
    /// pipeline from starting. Returns the number of contracts loaded.
    pub fn load_contracts(&self, documents: &[serde_json::Value]) -> Result<usize> {
        let mut loaded = 0;
        for doc in documents {
            let parsed = if self.config.validate_contract_schema {
                PluginContract::from_document(doc)
            } else {
                serde_json::from_value(doc.clone()).map_err(RegistryError::from)
            };
            match parsed {
                Ok(contract) => {
                    self.contracts.write().insert(contract.category, contract);
                    loaded += 1;
                }
                Err(err) => match self.config.environment {
                    Environment::Production => {
                        error!(error = %err, "Skipping invalid contract document");
                    }
                    Environment::Development => return Err(err),
                },
            }
        }
        Ok(loaded)
    }

    /// Load contracts from a JSON string holding an array of documents.
    pub fn load_contracts_json(&self, raw: &str) -> Result<usize> {
        let documents: Vec<serde_json::Value> = serde_json::from_str(raw)?;
        self.load_contracts(&documents)
    }

    /// The loaded contract for a category, if any.
    #[must_use]
    pub fn contract(&self, category: PluginCategory) -> Option<PluginContract> {
        self.contracts.read().get(&category).cloned()
    }

    /// Register a plugin under `(category, name)`.
    ///
    /// Fails with `UnknownCategory`, `InvalidArgument`, `ContractViolation`
    /// (naming the first violation), or `SignatureInvalid` (fail-closed
    /// mode). In fail-open mode a failed verification demotes to a logged
    /// warning and registration proceeds. Returns `&Self` for chaining.
    pub fn register(
        &self,
        category: &str,
        name: &str,
        handle: PluginHandle,
        manifest: Option<PluginManifest>,
    ) -> Result<&Self> {
        if category.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "category must not be empty".to_string(),
            ));
        }
        if name.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "plugin name must not be empty".to_string(),
            ));
        }
        let category = PluginCategory::parse(category)
            .ok_or_else(|| RegistryError::UnknownCategory(category.to_string()))?;
        if handle.category() != category {
            return Err(RegistryError::InvalidArgument(format!(
                "handle is a {} plugin, registered as {category}",
                handle.category()
            )));
        }

        let metadata = handle.metadata();
        self.validate_metadata(name, &metadata, category)?;
        self.validate_contract(name, &metadata, &handle, category)?;
        let verified = self.verify_manifest(name, manifest.as_ref())?;

        let key = (category, name.to_string());
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(RegistryError::InvalidArgument(format!(
                "plugin '{name}' is already registered in category '{category}'"
            )));
        }
        entries.insert(
            key,
            PluginEntry {
                metadata,
                handle,
                manifest,
                verified,
                registered_at: Utc::now(),
            },
        );
        Ok(self)
    }

    /// Look up a plugin by category and name.
    pub fn get(&self, category: &str, name: &str) -> Result<PluginHandle> {
        let category = PluginCategory::parse(category)
            .ok_or_else(|| RegistryError::UnknownCategory(category.to_string()))?;
        self.entries
            .read()
            .get(&(category, name.to_string()))
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| RegistryError::NotFound {
                category,
                name: name.to_string(),
            })
    }

    /// Full entry lookup, including manifest and verification state.
    pub fn entry(&self, category: &str, name: &str) -> Result<PluginEntry> {
        let category = PluginCategory::parse(category)
            .ok_or_else(|| RegistryError::UnknownCategory(category.to_string()))?;
        self.entries
            .read()
            .get(&(category, name.to_string()))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                category,
                name: name.to_string(),
            })
    }

    /// Names registered in a category. Order unspecified.
    pub fn list(&self, category: &str) -> Result<Vec<String>> {
        let category = PluginCategory::parse(category)
            .ok_or_else(|| RegistryError::UnknownCategory(category.to_string()))?;
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|(c, _)| *c == category)
            .map(|(_, name)| name.clone())
            .collect())
    }

    /// Remove every registered plugin. The only mutator besides `register`;
    /// must not race registrations.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of registered plugins across all categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of one-shot warnings emitted so far.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warned.lock().len()
    }

    fn validate_metadata(
        &self,
        name: &str,
        metadata: &PluginMetadata,
        category: PluginCategory,
    ) -> Result<()> {
        if metadata.name.is_empty() {
            return Err(RegistryError::ContractViolation {
                plugin: name.to_string(),
                reason: "metadata.name must not be empty".to_string(),
            });
        }
        if metadata.version.is_empty() {
            return Err(RegistryError::ContractViolation {
                plugin: name.to_string(),
                reason: "metadata.version must not be empty".to_string(),
            });
        }
        if semver::Version::parse(&metadata.version).is_err() {
            return Err(RegistryError::ContractViolation {
                plugin: name.to_string(),
                reason: format!("metadata.version '{}' is not valid semver", metadata.version),
            });
        }
        if metadata.category != category {
            return Err(RegistryError::ContractViolation {
                plugin: name.to_string(),
                reason: format!(
                    "metadata.type '{}' does not match category '{category}'",
                    metadata.category
                ),
            });
        }
        Ok(())
    }

    fn validate_contract(
        &self,
        name: &str,
        metadata: &PluginMetadata,
        handle: &PluginHandle,
        category: PluginCategory,
    ) -> Result<()> {
        let contract = self.contracts.read().get(&category).cloned();
        let Some(contract) = contract else {
            self.warn_once(
                "missing-contract",
                category.as_str(),
                "No contract loaded for category; registering without method validation",
            );
            return Ok(());
        };

        match contract.check_version(&metadata.version) {
            Ok(()) => {}
            Err(RegistryError::ContractViolation { reason, .. }) => {
                return Err(RegistryError::ContractViolation {
                    plugin: name.to_string(),
                    reason,
                });
            }
            Err(other) => return Err(other),
        }

        let capabilities = handle.capabilities();
        if let Some(missing) = contract.first_missing(&capabilities) {
            return Err(RegistryError::ContractViolation {
                plugin: name.to_string(),
                reason: format!("missing method '{missing}'"),
            });
        }
        Ok(())
    }

    /// Verify a manifest when present and verification is enabled. Emits one
    /// audit record per attempt. Returns whether the entry counts as
    /// verified.
    fn verify_manifest(&self, name: &str, manifest: Option<&PluginManifest>) -> Result<bool> {
        let Some(manifest) = manifest else {
            return Ok(false);
        };
        if !self.config.verify_signatures {
            return Ok(false);
        }

        let outcome = self
            .verifier
            .verify(manifest, &manifest.signature, &manifest.signer_id);
        self.audit.emit(AuditRecord::signature_verification(
            name,
            &manifest.signer_id,
            &manifest.version,
            outcome.verified,
            outcome.error.clone(),
        ));

        if outcome.verified {
            return Ok(true);
        }
        let reason = outcome
            .error
            .unwrap_or_else(|| "verification failed".to_string());
        if self.config.fail_closed {
            return Err(RegistryError::SignatureInvalid {
                plugin: name.to_string(),
                reason,
            });
        }
        warn!(
            plugin = %name,
            signer = %manifest.signer_id,
            reason = %reason,
            "Plugin signature verification failed; registering anyway (fail-open)"
        );
        Ok(false)
    }

    fn warn_once(&self, kind: &str, context: &str, message: &str) {
        if self.config.disable_contract_warnings
            || self.config.environment == Environment::Production
        {
            return;
        }
        let mut warned = self.warned.lock();
        if warned.insert((kind.to_string(), context.to_string())) {
            warn!(kind, context, "{message}");
        }
    }
}
