//! Snapshot task server
//!
//! Runs the snapshotter with the REST API enabled so a release coordinator
//! can drive it over HTTP. Settings come from the environment (a `.env` file
//! is read if present):
//!
//! - `DATASERVICE_API` - data service base URL
//! - `COORDINATOR_API` - release coordinator base URL
//! - `SNAPSHOT_DIR` - object store root directory
//! - `DATABASE_PATH` - SQLite task store path
//! - `BIND_ADDRESS` - API listen address (default 127.0.0.1:3000)
//! - `RUST_LOG` - log filter (default `snapshot_task=info,tower_http=info`)
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:3000/swagger-ui
//! - Submit actions via POST http://localhost:3000/tasks
//! - Stream events via GET http://localhost:3000/events

use snapshot_task::{Config, Snapshotter, run_with_shutdown};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("snapshot_task=info,tower_http=info")),
        )
        .init();

    let mut config = Config::default();
    if let Ok(url) = std::env::var("DATASERVICE_API") {
        config.data_source.base_url = url;
    }
    if let Ok(url) = std::env::var("COORDINATOR_API") {
        config.coordinator.base_url = url;
    }
    if let Ok(dir) = std::env::var("SNAPSHOT_DIR") {
        config.publish.object_store_dir = dir.into();
    }
    if let Ok(path) = std::env::var("DATABASE_PATH") {
        config.persistence.database_path = path.into();
    }
    if let Ok(addr) = std::env::var("BIND_ADDRESS") {
        config.api.bind_address = addr.parse()?;
    }

    let snapshotter = Snapshotter::new(config.clone()).await?;
    let bind_address = config.api.bind_address;

    // The API server runs until the process exits
    Arc::new(snapshotter.clone()).spawn_api_server();

    println!("Starting snapshot-task server");
    println!("Swagger UI: http://{}/swagger-ui", bind_address);
    println!("Events stream: http://{}/events", bind_address);
    println!();
    println!("Example commands:");
    println!("  curl -X POST http://{}/tasks \\", bind_address);
    println!("    -H 'Content-Type: application/json' \\");
    println!(
        "    -d '{{\"action\": \"initialize\", \"task_id\": \"TA_1\", \"release_id\": \"RE_1\"}}'"
    );
    println!();
    println!("  curl -N http://{}/events", bind_address);

    run_with_shutdown(snapshotter).await?;

    Ok(())
}
