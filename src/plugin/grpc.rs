use serde_json::Value;
use tokio::sync::OnceCell;

use super::cty::{CtyValue, msgpack_to_json};
use super::proto::{self, ProviderClient};
use super::{Diagnostic, Diagnostics, PluginError};

/// One object returned by `ImportResourceState`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedResource {
    pub type_name: String,
    pub state: Value,
}

/// A provider reached over the tfplugin5 gRPC protocol.
#[derive(Debug)]
pub struct GrpcProvider {
    client: ProviderClient,
    schema: OnceCell<proto::get_provider_schema::Response>,
}

impl GrpcProvider {
    pub fn new(client: ProviderClient) -> Self {
        Self {
            client,
            schema: OnceCell::new(),
        }
    }

    /// Fetches the provider schema on first use and caches it.
    pub async fn schema(&self) -> Result<&proto::get_provider_schema::Response, PluginError> {
        self.schema
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .clone()
                    .get_schema(proto::get_provider_schema::Request {})
                    .await?;

                let diags = Diagnostics::from(response.diagnostics.clone());
                diags.log_warnings("GetSchema");
                if diags.has_errors() {
                    return Err(PluginError::Diagnostics(diags));
                }

                tracing::debug!(
                    resource_types = response.resource_schemas.len(),
                    data_sources = response.data_source_schemas.len(),
                    "provider schema loaded"
                );
                Ok::<_, PluginError>(response)
            })
            .await
    }

    /// Provider configuration block from the schema; empty if the provider has none.
    pub async fn provider_block(&self) -> Result<proto::schema::Block, PluginError> {
        let schema = self.schema().await?;
        Ok(schema
            .provider
            .as_ref()
            .and_then(|s| s.block.clone())
            .unwrap_or_default())
    }

    pub async fn configure(
        &self,
        terraform_version: &str,
        config: &CtyValue,
    ) -> Result<Diagnostics, PluginError> {
        let msgpack = config.to_msgpack()?;
        let request = proto::configure::Request {
            terraform_version: terraform_version.to_string(),
            config: Some(proto::DynamicValue {
                msgpack,
                json: Vec::new(),
            }),
        };

        let response = self.client.clone().configure(request).await?;
        Ok(Diagnostics::from(response.diagnostics))
    }

    pub async fn import_resource_state(
        &self,
        type_name: &str,
        id: &str,
    ) -> Result<(Vec<ImportedResource>, Diagnostics), PluginError> {
        let schema = self.schema().await?;
        if !schema.resource_schemas.contains_key(type_name) {
            let diags = Diagnostics::from(vec![Diagnostic::error(
                "Unsupported resource type",
                format!("the provider does not support resource type {:?}", type_name),
            )]);
            return Ok((Vec::new(), diags));
        }

        let request = proto::import_resource_state::Request {
            type_name: type_name.to_string(),
            id: id.to_string(),
        };
        let response = self.client.clone().import_resource_state(request).await?;

        let mut diags = Diagnostics::from(response.diagnostics);
        let mut imported = Vec::with_capacity(response.imported_resources.len());
        for resource in response.imported_resources {
            match decode_dynamic(resource.state) {
                Ok(state) => imported.push(ImportedResource {
                    type_name: resource.type_name,
                    state,
                }),
                Err(e) => diags.push(Diagnostic::error(
                    "Invalid imported state",
                    format!("failed to decode {} state: {}", resource.type_name, e),
                )),
            }
        }

        Ok((imported, diags))
    }

    /// Asks the provider to abort in-flight operations.
    pub async fn stop(&self) -> Result<(), PluginError> {
        let response = self.client.clone().stop(proto::stop::Request {}).await?;
        if response.error.is_empty() {
            Ok(())
        } else {
            Err(PluginError::Rpc(tonic::Status::internal(response.error)))
        }
    }
}

/// Decodes a state value, preferring msgpack over JSON.
fn decode_dynamic(value: Option<proto::DynamicValue>) -> Result<Value, PluginError> {
    let Some(value) = value else {
        return Ok(Value::Null);
    };

    if !value.msgpack.is_empty() {
        msgpack_to_json(&value.msgpack)
    } else if !value.json.is_empty() {
        serde_json::from_slice(&value.json).map_err(|e| PluginError::Encoding(e.to_string()))
    } else {
        Ok(Value::Null)
    }
}
