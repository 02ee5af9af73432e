mod config;
mod logging;

use std::process::ExitCode;

use config::FeedConfig;
use mtx_client::{MatrixClient, SyncHandler};
use mtx_core::{RequestError, SyncResponse, joined_room_lines};
use tracing::{error, info, warn};

/// Prints `sender: body` for every message in joined rooms.
struct FeedPrinter;

impl SyncHandler for FeedPrinter {
    fn on_sync(&mut self, outcome: Result<&SyncResponse, &RequestError>) {
        match outcome {
            Ok(response) => {
                for line in joined_room_lines(response) {
                    println!("{line}");
                }
            }
            Err(err) => eprintln!("sync failed: {err}"),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let config = match FeedConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let sync_config = config.sync_config();

    let client = match MatrixClient::new(config.client.clone()) {
        Ok(client) => client,
        Err(err) => {
            error!(code = err.code(), error = %err, "failed to build client");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = client.login(&config.user, &config.password).await {
        error!(code = err.code(), error = %err, category = ?err.category(), "login failed");
        eprintln!("login failed: {err}");
        return ExitCode::FAILURE;
    }

    if let Some(since) = config.since {
        let mut session = client.session().await;
        session.next_batch = Some(since);
        if let Err(err) = client.restore_session(session).await {
            error!(code = err.code(), error = %err, "failed to apply resume token");
            return ExitCode::FAILURE;
        }
    }

    if let Err(err) = client.start_sync(sync_config, FeedPrinter).await {
        error!(code = err.code(), error = %err, "failed to start sync");
        return ExitCode::FAILURE;
    }
    info!(homeserver = %config.client.homeserver, "streaming joined rooms; press Ctrl-C to stop");

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for Ctrl-C");
    }

    match client.stop_sync().await {
        Ok(since) => {
            info!(since = ?since, "stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(code = err.code(), error = %err, "sync did not stop cleanly");
            ExitCode::FAILURE
        }
    }
}
