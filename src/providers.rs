pub mod aws;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::plugin::proto::schema::Block;
use crate::plugin::{CtyType, CtyValue, Diagnostics, ImportedResource, PluginError};

/// Version reported to providers in `Configure`.
pub const DEFAULT_TERRAFORM_VERSION: &str = "0.12.11";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Diagnostics(Diagnostics),
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Provider configuration as given on the command line.
///
/// Attributes listed here are sent with their value; every other attribute
/// of the provider schema is sent as unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub terraform_version: String,
    pub attributes: BTreeMap<String, String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            terraform_version: DEFAULT_TERRAFORM_VERSION.to_string(),
            attributes: BTreeMap::new(),
        }
    }
}

impl ProviderConfig {
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    async fn configure(&self, config: &ProviderConfig) -> Result<(), ProviderError>;
    async fn import_resource(
        &self,
        type_name: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError>;
}

/// Builds the configuration object for a provider schema block.
pub fn config_object(
    block: &Block,
    attributes: &BTreeMap<String, String>,
) -> Result<CtyValue, ProviderError> {
    let mut object: BTreeMap<String, CtyValue> = BTreeMap::new();

    for attr in &block.attributes {
        object.insert(attr.name.clone(), CtyValue::Unknown);
    }
    for nested in &block.block_types {
        object.insert(nested.type_name.clone(), CtyValue::Unknown);
    }

    for (name, raw) in attributes {
        let attr = block
            .attributes
            .iter()
            .find(|a| &a.name == name)
            .ok_or_else(|| {
                ProviderError::Config(format!(
                    "provider schema has no attribute named {:?}",
                    name
                ))
            })?;

        let ty = CtyType::from_json(&attr.r#type)?;
        let value = CtyValue::from_str_for(&ty, raw)
            .map_err(|reason| ProviderError::Config(format!("attribute {:?}: {}", name, reason)))?;
        object.insert(name.clone(), value);
    }

    Ok(CtyValue::Object(object))
}
