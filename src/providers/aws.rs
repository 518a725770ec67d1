use std::path::PathBuf;

use async_trait::async_trait;

use super::{Provider, ProviderConfig, ProviderError, config_object};
use crate::plugin::{GrpcProvider, ImportedResource, LaunchOptions, PluginClient, PluginMeta};

pub const PLUGIN_NAME: &str = "terraform-provider-aws";
pub const PLUGIN_VERSION: &str = "v2.33.0";
pub const PLUGIN_PATH: &str = "./terraform-provider-aws_v2.33.0_x4";

pub const DEFAULT_PROFILE: &str = "tfsweeper";
pub const DEFAULT_REGION: &str = "us-west-2";

pub fn plugin_meta(path: impl Into<PathBuf>, version: impl Into<String>) -> PluginMeta {
    PluginMeta {
        name: PLUGIN_NAME.to_string(),
        version: version.into(),
        path: path.into(),
    }
}

pub fn default_plugin_meta() -> PluginMeta {
    plugin_meta(PLUGIN_PATH, PLUGIN_VERSION)
}

/// Provider configuration carrying the AWS profile and region.
pub fn provider_config(
    profile: &str,
    region: &str,
    terraform_version: &str,
    extra: impl IntoIterator<Item = (String, String)>,
) -> ProviderConfig {
    let mut config = ProviderConfig {
        terraform_version: terraform_version.to_string(),
        ..ProviderConfig::default()
    };
    config.attributes.extend(extra);
    config
        .with_attribute("profile", profile)
        .with_attribute("region", region)
}

/// The AWS provider plugin, running as a child process.
pub struct AwsProvider {
    plugin: PluginClient,
    provider: GrpcProvider,
}

impl AwsProvider {
    pub async fn launch(meta: &PluginMeta, options: &LaunchOptions) -> Result<Self, ProviderError> {
        let plugin = PluginClient::start(meta, options).await?;
        let provider = plugin.provider();
        Ok(Self { plugin, provider })
    }

    pub async fn shutdown(self) {
        if let Err(e) = self.provider.stop().await {
            tracing::debug!(error = %e, "provider stop failed");
        }
        self.plugin.kill().await;
    }
}

#[async_trait]
impl Provider for AwsProvider {
    fn name(&self) -> &str {
        "aws"
    }

    async fn configure(&self, config: &ProviderConfig) -> Result<(), ProviderError> {
        let block = self.provider.provider_block().await?;
        let object = config_object(&block, &config.attributes)?;

        tracing::debug!(
            terraform_version = %config.terraform_version,
            attributes = block.attributes.len() + block.block_types.len(),
            configured = config.attributes.len(),
            "configuring provider"
        );

        let diags = self
            .provider
            .configure(&config.terraform_version, &object)
            .await?;
        diags.log_warnings("Configure");
        if diags.has_errors() {
            return Err(ProviderError::Diagnostics(diags));
        }
        Ok(())
    }

    async fn import_resource(
        &self,
        type_name: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let (imported, diags) = self.provider.import_resource_state(type_name, id).await?;
        diags.log_warnings("ImportResourceState");
        if diags.has_errors() {
            return Err(ProviderError::Diagnostics(diags));
        }
        Ok(imported)
    }
}
