use std::sync::Arc;
use std::time::Duration;

use storebus::backoff::ConstantBackoff;
use storebus::config::NodeConfig;
use storebus::coordination::client::ExchangeClient;
use storebus::coordination::registry::HandlerRegistry;
use storebus::coordination::server::ExchangeServer;
use storebus::error::{ExchangeError, FailureRegistry};
use storebus::hosts::registry::HostRegistry;
use storebus::hosts::selector::HostSelector;
use storebus::storage::memory::{MemoryPartitionStorage, MemoryStorage};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut instance = "demo".to_string();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--instance" if i + 1 < args.len() => {
                instance = args[i + 1].clone();
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    tracing::info!("Starting exchange node '{}'", instance);

    // 1. Shared stores (one process here; any contract-compliant backend works):
    let requests = MemoryPartitionStorage::new();
    let plain = MemoryStorage::new();
    let results = MemoryStorage::new();

    let failures = Arc::new(FailureRegistry::new());
    let hosts = HostRegistry::new(plain.clone());
    let selector = HostSelector::new(plain.clone());

    // 2. Handlers:
    let handlers = HandlerRegistry::new();
    handlers.register("echo", |envelope, _cancel| async move {
        tracing::info!("echoing payload for {}", envelope.audit.correlation_id);
        serde_json::to_vec(&envelope.payload)
            .map_err(|e| ExchangeError::HandlingFailed(e.to_string()))
    });
    handlers.register("fail", |_envelope, _cancel| async move {
        Err(ExchangeError::Domain {
            kind: "demo_failure".to_string(),
            message: "this handler always fails".to_string(),
        })
    });

    // 3. Server loop:
    let mut config = NodeConfig::new(&instance);
    config.accepted_message_types = vec!["echo".to_string(), "fail".to_string()];

    let shutdown = CancellationToken::new();
    let server = ExchangeServer::new(
        config,
        requests.clone(),
        plain.clone(),
        results.clone(),
        plain.clone(),
        hosts,
        handlers,
        failures.clone(),
        shutdown.clone(),
    );

    let server_handle = {
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!("server loop failed: {}", e);
            }
        })
    };

    // Give the loop a moment to publish its registration.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // 4. Client round-trip against the same stores:
    let backoff = Arc::new(ConstantBackoff::new(Duration::from_millis(50), 20));
    let client = ExchangeClient::new(
        requests,
        plain.clone(),
        results,
        selector,
        backoff,
        failures,
        "demo-user",
    );

    let response = client
        .request(
            "echo",
            serde_json::json!({"hello": "world"}),
            CancellationToken::new(),
        )
        .await?;
    tracing::info!("echo response: {}", String::from_utf8_lossy(&response));

    match client
        .request("fail", serde_json::json!({}), CancellationToken::new())
        .await
    {
        Ok(_) => tracing::warn!("fail handler unexpectedly succeeded"),
        Err(e) => tracing::info!("fail handler surfaced: {}", e),
    }

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    shutdown.cancel();
    let _ = server_handle.await;

    Ok(())
}
