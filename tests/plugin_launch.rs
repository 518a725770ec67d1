#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serial_test::serial;
use tfsweeper::plugin::handshake::MAGIC_COOKIE_VALUE;
use tfsweeper::plugin::{LaunchOptions, PluginClient, PluginError, PluginMeta};

/// Writes an executable shell script standing in for a provider binary.
fn fake_plugin(dir: &Path, body: &str) -> PluginMeta {
    let path = dir.join("terraform-provider-fake_v0.0.1");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    PluginMeta {
        name: "terraform-provider-fake".to_string(),
        version: "v0.0.1".to_string(),
        path: PathBuf::from(path),
    }
}

fn quick() -> LaunchOptions {
    LaunchOptions {
        start_timeout: Duration::from_secs(2),
        ..LaunchOptions::default()
    }
}

async fn start_err(meta: &PluginMeta, options: &LaunchOptions) -> PluginError {
    match PluginClient::start(meta, options).await {
        Ok(_) => panic!("expected plugin start to fail"),
        Err(e) => e,
    }
}

#[tokio::test]
#[serial]
async fn test_plugin_exiting_before_handshake() {
    let dir = tempfile::tempdir().unwrap();
    let meta = fake_plugin(dir.path(), "exit 1");

    let err = start_err(&meta, &quick()).await;
    assert!(matches!(err, PluginError::ExitedEarly), "got {:?}", err);
}

#[tokio::test]
#[serial]
async fn test_plugin_printing_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let meta = fake_plugin(
        dir.path(),
        "echo 'This binary is a plugin. These are not meant to be executed directly.'",
    );

    let err = start_err(&meta, &quick()).await;
    match err {
        PluginError::Handshake { line, .. } => assert!(line.starts_with("This binary is a plugin")),
        other => panic!("expected Handshake error, got {:?}", other),
    }
}

#[tokio::test]
#[serial]
async fn test_plugin_that_never_answers_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let meta = fake_plugin(dir.path(), "sleep 30");
    let options = LaunchOptions {
        start_timeout: Duration::from_millis(300),
        ..LaunchOptions::default()
    };

    let err = start_err(&meta, &options).await;
    assert!(matches!(err, PluginError::StartTimeout), "got {:?}", err);
}

#[tokio::test]
#[serial]
async fn test_plugin_receives_handshake_environment() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("missing.sock");
    // Only answers when the cookie and protocol version were passed through.
    let body = format!(
        "[ \"$TF_PLUGIN_MAGIC_COOKIE\" = \"{}\" ] || exit 1\n\
         [ \"$PLUGIN_PROTOCOL_VERSIONS\" = \"5\" ] || exit 1\n\
         echo \"1|5|unix|{}|grpc|\"\n\
         sleep 30",
        MAGIC_COOKIE_VALUE,
        socket.display()
    );
    let meta = fake_plugin(dir.path(), &body);

    // The handshake is valid but nothing listens on the socket.
    let err = start_err(&meta, &quick()).await;
    match err {
        PluginError::Connect { address, .. } => assert_eq!(address, socket.display().to_string()),
        other => panic!("expected Connect error, got {:?}", other),
    }
}
