//! Wire types for the subset of Terraform plugin protocol 5 (`tfplugin5`)
//! used by the sweep, plus the go-plugin controller service.
//!
//! Messages are declared by hand with prost derives so the crate builds
//! without `protoc`. Field tags match `tfplugin5.proto`.

use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{Request, Status};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DynamicValue {
    #[prost(bytes = "vec", tag = "1")]
    pub msgpack: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub json: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Diagnostic {
    #[prost(enumeration = "diagnostic::Severity", tag = "1")]
    pub severity: i32,
    #[prost(string, tag = "2")]
    pub summary: String,
    #[prost(string, tag = "3")]
    pub detail: String,
    #[prost(message, optional, tag = "4")]
    pub attribute: Option<AttributePath>,
}

pub mod diagnostic {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Severity {
        Invalid = 0,
        Error = 1,
        Warning = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AttributePath {
    #[prost(message, repeated, tag = "1")]
    pub steps: Vec<attribute_path::Step>,
}

pub mod attribute_path {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Step {
        #[prost(oneof = "step::Selector", tags = "1, 2, 3")]
        pub selector: Option<step::Selector>,
    }

    pub mod step {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Selector {
            #[prost(string, tag = "1")]
            AttributeName(String),
            #[prost(string, tag = "2")]
            ElementKeyString(String),
            #[prost(int64, tag = "3")]
            ElementKeyInt(i64),
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Schema {
    #[prost(int64, tag = "1")]
    pub version: i64,
    #[prost(message, optional, tag = "2")]
    pub block: Option<schema::Block>,
}

pub mod schema {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Block {
        #[prost(int64, tag = "1")]
        pub version: i64,
        #[prost(message, repeated, tag = "2")]
        pub attributes: Vec<Attribute>,
        #[prost(message, repeated, tag = "3")]
        pub block_types: Vec<NestedBlock>,
        #[prost(string, tag = "4")]
        pub description: String,
        #[prost(int32, tag = "5")]
        pub description_kind: i32,
        #[prost(bool, tag = "6")]
        pub deprecated: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Attribute {
        #[prost(string, tag = "1")]
        pub name: String,
        /// JSON-encoded cty type.
        #[prost(bytes = "vec", tag = "2")]
        pub r#type: Vec<u8>,
        #[prost(string, tag = "3")]
        pub description: String,
        #[prost(bool, tag = "4")]
        pub required: bool,
        #[prost(bool, tag = "5")]
        pub optional: bool,
        #[prost(bool, tag = "6")]
        pub computed: bool,
        #[prost(bool, tag = "7")]
        pub sensitive: bool,
        #[prost(int32, tag = "8")]
        pub description_kind: i32,
        #[prost(bool, tag = "9")]
        pub deprecated: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NestedBlock {
        #[prost(string, tag = "1")]
        pub type_name: String,
        #[prost(message, optional, tag = "2")]
        pub block: Option<Block>,
        #[prost(int32, tag = "3")]
        pub nesting: i32,
        #[prost(int64, tag = "4")]
        pub min_items: i64,
        #[prost(int64, tag = "5")]
        pub max_items: i64,
    }
}

pub mod get_provider_schema {
    use std::collections::HashMap;

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Request {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Response {
        #[prost(message, optional, tag = "1")]
        pub provider: Option<super::Schema>,
        #[prost(map = "string, message", tag = "2")]
        pub resource_schemas: HashMap<String, super::Schema>,
        #[prost(map = "string, message", tag = "3")]
        pub data_source_schemas: HashMap<String, super::Schema>,
        #[prost(message, repeated, tag = "4")]
        pub diagnostics: Vec<super::Diagnostic>,
    }
}

pub mod configure {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Request {
        #[prost(string, tag = "1")]
        pub terraform_version: String,
        #[prost(message, optional, tag = "2")]
        pub config: Option<super::DynamicValue>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Response {
        #[prost(message, repeated, tag = "1")]
        pub diagnostics: Vec<super::Diagnostic>,
    }
}

pub mod import_resource_state {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Request {
        #[prost(string, tag = "1")]
        pub type_name: String,
        #[prost(string, tag = "2")]
        pub id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ImportedResource {
        #[prost(string, tag = "1")]
        pub type_name: String,
        #[prost(message, optional, tag = "2")]
        pub state: Option<super::DynamicValue>,
        #[prost(bytes = "vec", tag = "3")]
        pub private: Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Response {
        #[prost(message, repeated, tag = "1")]
        pub imported_resources: Vec<ImportedResource>,
        #[prost(message, repeated, tag = "2")]
        pub diagnostics: Vec<super::Diagnostic>,
    }
}

pub mod stop {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Request {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Response {
        #[prost(string, tag = "1")]
        pub error: String,
    }
}

/// Unary client for the `tfplugin5.Provider` service.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    inner: tonic::client::Grpc<Channel>,
}

impl ProviderClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    pub async fn get_schema(
        &mut self,
        request: get_provider_schema::Request,
    ) -> Result<get_provider_schema::Response, Status> {
        self.unary(request, "/tfplugin5.Provider/GetSchema").await
    }

    pub async fn configure(
        &mut self,
        request: configure::Request,
    ) -> Result<configure::Response, Status> {
        self.unary(request, "/tfplugin5.Provider/Configure").await
    }

    pub async fn import_resource_state(
        &mut self,
        request: import_resource_state::Request,
    ) -> Result<import_resource_state::Response, Status> {
        self.unary(request, "/tfplugin5.Provider/ImportResourceState")
            .await
    }

    pub async fn stop(&mut self, request: stop::Request) -> Result<stop::Response, Status> {
        self.unary(request, "/tfplugin5.Provider/Stop").await
    }

    async fn unary<Req, Resp>(&mut self, request: Req, path: &'static str) -> Result<Resp, Status>
    where
        Req: ::prost::Message + 'static,
        Resp: ::prost::Message + Default + 'static,
    {
        grpc_unary(&mut self.inner, request, path).await
    }
}

/// Client for go-plugin's `plugin.GRPCController` service.
#[derive(Debug, Clone)]
pub struct ControllerClient {
    inner: tonic::client::Grpc<Channel>,
}

impl ControllerClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Asks the plugin process to exit gracefully.
    pub async fn shutdown(&mut self) -> Result<(), Status> {
        grpc_unary::<(), ()>(&mut self.inner, (), "/plugin.GRPCController/Shutdown").await
    }
}

async fn grpc_unary<Req, Resp>(
    grpc: &mut tonic::client::Grpc<Channel>,
    request: Req,
    path: &'static str,
) -> Result<Resp, Status>
where
    Req: ::prost::Message + 'static,
    Resp: ::prost::Message + Default + 'static,
{
    grpc.ready()
        .await
        .map_err(|e| Status::unknown(format!("service was not ready: {}", e)))?;

    let codec: ProstCodec<Req, Resp> = ProstCodec::default();
    let response = grpc
        .unary(Request::new(request), PathAndQuery::from_static(path), codec)
        .await?;
    Ok(response.into_inner())
}
