//! Runs the provider client against an in-process tfplugin5 server.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use prost::Message;
use serde_json::json;
use tonic::Status;
use tonic::body::BoxBody;
use tonic::codec::ProstCodec;
use tonic::codegen::http;
use tonic::server::NamedService;
use tonic::transport::server::TcpIncoming;
use tonic::transport::{Endpoint, Server};
use tower::Service;

use tfsweeper::plugin::cty::{CtyValue, msgpack_to_json};
use tfsweeper::plugin::proto::{self, ProviderClient};
use tfsweeper::plugin::{GrpcProvider, Severity};

/// Provider plugin double. Records every call it receives.
#[derive(Default)]
struct FakePlugin {
    calls: Mutex<Vec<String>>,
    configured: Mutex<Option<proto::configure::Request>>,
}

impl FakePlugin {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn configured(&self) -> Option<proto::configure::Request> {
        self.configured.lock().unwrap().clone()
    }

    fn get_schema(&self) -> proto::get_provider_schema::Response {
        self.record("GetSchema");

        let attribute = |name: &str, ty: &str| proto::schema::Attribute {
            name: name.to_string(),
            r#type: ty.as_bytes().to_vec(),
            optional: true,
            ..Default::default()
        };
        let provider = proto::Schema {
            version: 0,
            block: Some(proto::schema::Block {
                attributes: vec![
                    attribute("profile", r#""string""#),
                    attribute("region", r#""string""#),
                    attribute("max_retries", r#""number""#),
                ],
                block_types: vec![proto::schema::NestedBlock {
                    type_name: "assume_role".to_string(),
                    nesting: 3,
                    ..Default::default()
                }],
                ..Default::default()
            }),
        };

        let mut response = proto::get_provider_schema::Response {
            provider: Some(provider),
            ..Default::default()
        };
        for type_name in ["aws_vpc", "aws_subnet"] {
            response
                .resource_schemas
                .insert(type_name.to_string(), proto::Schema::default());
        }
        response
    }

    fn configure(&self, request: proto::configure::Request) -> proto::configure::Response {
        self.record("Configure");

        let region = request
            .config
            .as_ref()
            .and_then(|config| msgpack_to_json(&config.msgpack).ok())
            .and_then(|config| config["region"].as_str().map(str::to_string));
        *self.configured.lock().unwrap() = Some(request);

        let diagnostics = match region.as_deref() {
            Some("nowhere-1") => vec![error_diagnostic("Invalid AWS Region: nowhere-1")],
            _ => Vec::new(),
        };
        proto::configure::Response { diagnostics }
    }

    fn import(
        &self,
        request: proto::import_resource_state::Request,
    ) -> proto::import_resource_state::Response {
        self.record(format!(
            "ImportResourceState {} {}",
            request.type_name, request.id
        ));

        let imported = |msgpack: Vec<u8>| proto::import_resource_state::ImportedResource {
            type_name: request.type_name.clone(),
            state: Some(proto::DynamicValue {
                msgpack,
                json: Vec::new(),
            }),
            private: Vec::new(),
        };

        match request.id.as_str() {
            "vpc-gone" => proto::import_resource_state::Response {
                imported_resources: Vec::new(),
                diagnostics: vec![error_diagnostic("Cannot import non-existent remote object")],
            },
            // array header promising two items, followed by only one
            "vpc-corrupt" => proto::import_resource_state::Response {
                imported_resources: vec![imported(vec![0x92, 0x01])],
                diagnostics: Vec::new(),
            },
            id => {
                let state = CtyValue::object([("id", CtyValue::string(id)), ("arn", CtyValue::Unknown)])
                    .to_msgpack()
                    .unwrap();
                proto::import_resource_state::Response {
                    imported_resources: vec![imported(state)],
                    diagnostics: Vec::new(),
                }
            }
        }
    }
}

fn error_diagnostic(summary: &str) -> proto::Diagnostic {
    proto::Diagnostic {
        severity: proto::diagnostic::Severity::Error as i32,
        summary: summary.to_string(),
        ..Default::default()
    }
}

/// Answers one unary call with `handler`.
async fn unary<Req, Resp, F>(req: http::Request<BoxBody>, mut handler: F) -> http::Response<BoxBody>
where
    Req: Message + Default + 'static,
    Resp: Message + 'static,
    F: FnMut(Req) -> Result<Resp, Status> + Send + 'static,
{
    let service = tower::service_fn(move |request: tonic::Request<Req>| {
        std::future::ready(handler(request.into_inner()).map(tonic::Response::new))
    });
    let mut grpc = tonic::server::Grpc::new(ProstCodec::<Resp, Req>::default());
    grpc.unary(service, req).await
}

async fn route(plugin: Arc<FakePlugin>, req: http::Request<BoxBody>) -> http::Response<BoxBody> {
    let path = req.uri().path().to_string();
    match path.as_str() {
        "/tfplugin5.Provider/GetSchema" => {
            unary(req, move |_: proto::get_provider_schema::Request| {
                Ok(plugin.get_schema())
            })
            .await
        }
        "/tfplugin5.Provider/Configure" => {
            unary(req, move |request: proto::configure::Request| {
                Ok(plugin.configure(request))
            })
            .await
        }
        "/tfplugin5.Provider/ImportResourceState" => {
            unary(req, move |request: proto::import_resource_state::Request| {
                Ok(plugin.import(request))
            })
            .await
        }
        "/tfplugin5.Provider/Stop" => {
            unary(req, move |_: proto::stop::Request| {
                plugin.record("Stop");
                Ok(proto::stop::Response::default())
            })
            .await
        }
        "/plugin.GRPCController/Shutdown" => {
            unary(req, move |_: ()| {
                plugin.record("Shutdown");
                Ok(())
            })
            .await
        }
        other => {
            plugin.record(other);
            let message = format!("{} is not served", other);
            unary(req, move |_: ()| {
                Err::<(), _>(Status::unimplemented(message.clone()))
            })
            .await
        }
    }
}

type RouteFuture =
    Pin<Box<dyn Future<Output = Result<http::Response<BoxBody>, Infallible>> + Send>>;

#[derive(Clone)]
struct ProviderServer(Arc<FakePlugin>);

impl NamedService for ProviderServer {
    const NAME: &'static str = "tfplugin5.Provider";
}

impl Service<http::Request<BoxBody>> for ProviderServer {
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = RouteFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<BoxBody>) -> Self::Future {
        let plugin = self.0.clone();
        Box::pin(async move { Ok(route(plugin, req).await) })
    }
}

#[derive(Clone)]
struct ControllerServer(Arc<FakePlugin>);

impl NamedService for ControllerServer {
    const NAME: &'static str = "plugin.GRPCController";
}

impl Service<http::Request<BoxBody>> for ControllerServer {
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = RouteFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<BoxBody>) -> Self::Future {
        let plugin = self.0.clone();
        Box::pin(async move { Ok(route(plugin, req).await) })
    }
}

async fn serve(plugin: Arc<FakePlugin>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let incoming = TcpIncoming::from_listener(listener, true, None).unwrap();

    tokio::spawn(
        Server::builder()
            .add_service(ProviderServer(plugin.clone()))
            .add_service(ControllerServer(plugin))
            .serve_with_incoming(incoming),
    );
    addr
}

async fn connect(addr: SocketAddr) -> GrpcProvider {
    let channel = Endpoint::from_shared(format!("http://{}", addr))
        .unwrap()
        .connect()
        .await
        .unwrap();
    GrpcProvider::new(ProviderClient::new(channel))
}

#[tokio::test]
async fn test_schema_is_fetched_once() {
    let plugin = Arc::new(FakePlugin::default());
    let provider = connect(serve(plugin.clone()).await).await;

    let schema = provider.schema().await.unwrap();
    assert!(schema.resource_schemas.contains_key("aws_vpc"));
    let block = provider.provider_block().await.unwrap();
    assert_eq!(block.attributes.len(), 3);
    provider.import_resource_state("aws_vpc", "vpc-1").await.unwrap();
    provider.import_resource_state("aws_subnet", "subnet-1").await.unwrap();

    let schema_calls = plugin.calls().iter().filter(|c| *c == "GetSchema").count();
    assert_eq!(schema_calls, 1);
}

#[tokio::test]
async fn test_import_decodes_msgpack_state() {
    let plugin = Arc::new(FakePlugin::default());
    let provider = connect(serve(plugin.clone()).await).await;

    let (imported, diags) = provider
        .import_resource_state("aws_vpc", "vpc-1")
        .await
        .unwrap();

    assert!(!diags.has_errors());
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].type_name, "aws_vpc");
    assert_eq!(imported[0].state, json!({"id": "vpc-1", "arn": "<unknown>"}));
}

#[tokio::test]
async fn test_unsupported_type_never_reaches_plugin() {
    let plugin = Arc::new(FakePlugin::default());
    let provider = connect(serve(plugin.clone()).await).await;

    let (imported, diags) = provider
        .import_resource_state("aws_not_a_thing", "x-1")
        .await
        .unwrap();

    assert!(imported.is_empty());
    let error = diags.errors().next().unwrap();
    assert_eq!(error.summary, "Unsupported resource type");
    assert_eq!(plugin.calls(), vec!["GetSchema"]);
}

#[tokio::test]
async fn test_undecodable_state_becomes_error_diagnostic() {
    let plugin = Arc::new(FakePlugin::default());
    let provider = connect(serve(plugin.clone()).await).await;

    let (imported, diags) = provider
        .import_resource_state("aws_vpc", "vpc-corrupt")
        .await
        .unwrap();

    assert!(imported.is_empty());
    let error = diags.errors().next().unwrap();
    assert_eq!(error.severity, Severity::Error);
    assert_eq!(error.summary, "Invalid imported state");
    assert!(error.detail.starts_with("failed to decode aws_vpc state"));
}

#[tokio::test]
async fn test_configure_sends_msgpack_object() {
    let plugin = Arc::new(FakePlugin::default());
    let provider = connect(serve(plugin.clone()).await).await;

    let config = CtyValue::object([
        ("profile", CtyValue::string("tfsweeper")),
        ("region", CtyValue::string("us-west-2")),
    ]);
    let diags = provider.configure("0.12.11", &config).await.unwrap();
    assert!(!diags.has_errors());

    let request = plugin.configured().unwrap();
    assert_eq!(request.terraform_version, "0.12.11");
    let sent = request.config.unwrap().msgpack;
    assert_eq!(sent, config.to_msgpack().unwrap());
}

#[tokio::test]
async fn test_stop_is_received() {
    let plugin = Arc::new(FakePlugin::default());
    let provider = connect(serve(plugin.clone()).await).await;

    provider.stop().await.unwrap();
    assert_eq!(plugin.calls(), vec!["Stop"]);
}

/// Full launch path: a script hands the in-process server's address to the
/// host through the go-plugin handshake.
#[cfg(unix)]
mod launched {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;

    use serial_test::serial;
    use tfsweeper::plugin::{LaunchOptions, PluginMeta};
    use tfsweeper::providers::aws::{self, AwsProvider};
    use tfsweeper::{Provider, ProviderError};

    use super::*;

    fn fake_plugin(dir: &Path, addr: SocketAddr) -> PluginMeta {
        let path = dir.join("terraform-provider-aws_v2.33.0_x4");
        let script = format!("#!/bin/sh\necho \"1|5|tcp|{}|grpc|\"\nsleep 30\n", addr);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        aws::plugin_meta(path, aws::PLUGIN_VERSION)
    }

    async fn launch(plugin: Arc<FakePlugin>, dir: &Path) -> AwsProvider {
        let addr = serve(plugin).await;
        let options = LaunchOptions {
            start_timeout: Duration::from_secs(5),
            ..LaunchOptions::default()
        };
        AwsProvider::launch(&fake_plugin(dir, addr), &options)
            .await
            .unwrap()
    }

    #[tokio::test]
    #[serial]
    async fn test_aws_provider_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = Arc::new(FakePlugin::default());
        let provider = launch(plugin.clone(), dir.path()).await;

        let config = aws::provider_config("tfsweeper", "us-west-2", "0.12.11", Vec::new());
        provider.configure(&config).await.unwrap();

        let request = plugin.configured().unwrap();
        assert_eq!(request.terraform_version, "0.12.11");
        let sent = request.config.unwrap().msgpack;
        assert!(sent.windows(3).any(|w| w == [0xd4, 0x00, 0x00]));
        assert_eq!(
            msgpack_to_json(&sent).unwrap(),
            json!({
                "assume_role": "<unknown>",
                "max_retries": "<unknown>",
                "profile": "tfsweeper",
                "region": "us-west-2",
            })
        );

        let err = provider
            .import_resource("aws_vpc", "vpc-gone")
            .await
            .unwrap_err();
        match err {
            ProviderError::Diagnostics(diags) => {
                assert!(diags.has_errors());
                assert!(diags.to_string().contains("Cannot import non-existent remote object"));
            }
            other => panic!("expected Diagnostics error, got {:?}", other),
        }

        let imported = provider.import_resource("aws_vpc", "vpc-1").await.unwrap();
        assert_eq!(imported.len(), 1);

        provider.shutdown().await;
        assert_eq!(
            plugin.calls(),
            vec![
                "GetSchema",
                "Configure",
                "ImportResourceState aws_vpc vpc-gone",
                "ImportResourceState aws_vpc vpc-1",
                "Stop",
                "Shutdown",
            ]
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_aws_provider_configure_errors() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = Arc::new(FakePlugin::default());
        let provider = launch(plugin.clone(), dir.path()).await;

        let rejected = aws::provider_config("tfsweeper", "nowhere-1", "0.12.11", Vec::new());
        let err = provider.configure(&rejected).await.unwrap_err();
        assert!(matches!(err, ProviderError::Diagnostics(_)), "got {:?}", err);
        assert!(err.to_string().contains("Invalid AWS Region: nowhere-1"));

        let typo = aws::provider_config(
            "tfsweeper",
            "us-west-2",
            "0.12.11",
            vec![("profle".to_string(), "ops".to_string())],
        );
        let err = provider.configure(&typo).await.unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)), "got {:?}", err);

        // the typo is caught before anything is sent
        let configures = plugin.calls().iter().filter(|c| *c == "Configure").count();
        assert_eq!(configures, 1);
    }
}
