use std::time::Duration;

use sea_orm::Database;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use courier_core::Config as _;
use courier_relay::config::RelayConfig;
use courier_relay::domain::codec::{CodecRegistry, JsonObjectCodec};
use courier_relay::state::AppState;

#[tokio::main]
async fn main() {
    courier_core::init_tracing();

    let config = RelayConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let mut codecs = CodecRegistry::new();
    for message_type in config.message_types() {
        codecs = codecs.register(&message_type, JsonObjectCodec);
    }

    let state = AppState::new(db, codecs, config.dispatch_options());
    let dispatcher = state.dispatcher();

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    let poll_interval = Duration::from_millis(config.relay_poll_interval_ms);
    info!(
        poll_interval_ms = config.relay_poll_interval_ms,
        batch_size = state.dispatch_options.batch_size,
        instance_id = %state.instance_id,
        "relay dispatcher started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
        if let Err(e) = dispatcher.execute(&cancel).await {
            // Transient infrastructure outages must not kill the worker;
            // the next cycle simply tries again.
            error!(error = %e, kind = e.kind(), "dispatch cycle failed");
        }
    }

    info!("relay dispatcher stopped");
}
