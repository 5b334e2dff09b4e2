//! Plugin contracts: declarative descriptions of what a category must
//! implement, validated against a JSON Schema at load time.
//!
//! A contract document looks like:
//!
//! ```json
//! {
//!   "category": "embedder",
//!   "version": "1.0.0",
//!   "required_methods": ["embed"],
//!   "properties": {
//!     "embed_query": { "type": "function", "signature": "(text) -> vector" }
//!   }
//! }
//! ```
//!
//! The effective required-method set is the union of `required_methods` and
//! every function-typed property. In Rust the trait system already pins the
//! signatures; registration checks membership against the plugin's reported
//! capabilities and the contract/plugin version compatibility.

use crate::error::{RegistryError, Result};
use ragkit::core::PluginCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// JSON Schema every contract document must satisfy.
const CONTRACT_SCHEMA: &str = r##"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "title": "ragkit plugin contract",
  "type": "object",
  "required": ["category", "version"],
  "additionalProperties": false,
  "properties": {
    "category": {
      "type": "string",
      "enum": ["loader", "embedder", "retriever", "reranker", "llm", "evaluator"]
    },
    "version": {
      "type": "string",
      "pattern": "^\\d+\\.\\d+\\.\\d+$"
    },
    "required_methods": {
      "type": "array",
      "items": { "type": "string", "minLength": 1 }
    },
    "properties": {
      "type": "object",
      "additionalProperties": {
        "type": "object",
        "required": ["type"],
        "additionalProperties": false,
        "properties": {
          "type": {
            "type": "string",
            "enum": ["function", "string", "number", "boolean", "object"]
          },
          "signature": { "type": "string" }
        }
      }
    }
  }
}"##;

fn contract_validator() -> &'static jsonschema::Validator {
    static VALIDATOR: OnceLock<jsonschema::Validator> = OnceLock::new();
    // SAFETY: CONTRACT_SCHEMA is a compile-time constant and valid draft-07.
    #[allow(clippy::expect_used)]
    VALIDATOR.get_or_init(|| {
        let schema: serde_json::Value =
            serde_json::from_str(CONTRACT_SCHEMA).expect("contract schema is valid JSON");
        jsonschema::validator_for(&schema).expect("contract schema compiles")
    })
}

/// The declared shape of one contract property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractProperty {
    /// Whether the property is an operation or a scalar attribute.
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    /// Optional human-readable signature hint for function properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Property kinds a contract can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// A callable operation the plugin must expose.
    Function,
    /// A string attribute.
    String,
    /// A numeric attribute.
    Number,
    /// A boolean attribute.
    Boolean,
    /// A structured attribute.
    Object,
}

/// A category contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginContract {
    /// The category this contract governs.
    pub category: PluginCategory,
    /// Contract version (semver). Plugins must match the major version.
    pub version: String,
    /// Explicitly required operation names.
    #[serde(default)]
    pub required_methods: Vec<String>,
    /// Declared properties; function-typed entries are also required.
    #[serde(default)]
    pub properties: HashMap<String, ContractProperty>,
}

impl PluginContract {
    /// Validate a raw contract document against the schema and parse it.
    pub fn from_document(doc: &serde_json::Value) -> Result<Self> {
        if let Err(error) = contract_validator().validate(doc) {
            return Err(RegistryError::ContractSchemaInvalid(error.to_string()));
        }
        let contract: PluginContract = serde_json::from_value(doc.clone())?;
        // Schema already pins the format; parse so comparisons can be semver.
        semver::Version::parse(&contract.version)?;
        Ok(contract)
    }

    /// The full required-method set: `required_methods` plus every
    /// function-typed property, deduplicated, in a stable order.
    #[must_use]
    pub fn required_method_set(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.required_methods.clone();
        let mut function_props: Vec<&String> = self
            .properties
            .iter()
            .filter(|(_, p)| p.kind == PropertyKind::Function)
            .map(|(name, _)| name)
            .collect();
        function_props.sort();
        for name in function_props {
            if !methods.iter().any(|m| m == name) {
                methods.push(name.clone());
            }
        }
        methods
    }

    /// The first required method absent from `capabilities`, if any.
    #[must_use]
    pub fn first_missing(&self, capabilities: &[&str]) -> Option<String> {
        self.required_method_set()
            .into_iter()
            .find(|method| !capabilities.contains(&method.as_str()))
    }

    /// Check that a plugin version is compatible with this contract
    /// (same semver major).
    pub fn check_version(&self, plugin_version: &str) -> Result<()> {
        let contract = semver::Version::parse(&self.version)?;
        let plugin = semver::Version::parse(plugin_version)?;
        if plugin.major != contract.major {
            return Err(RegistryError::ContractViolation {
                plugin: String::new(),
                reason: format!(
                    "plugin version {plugin} is incompatible with contract version {contract}"
                ),
            });
        }
        Ok(())
    }
}
