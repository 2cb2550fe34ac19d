use actix_web::{web, App, HttpServer};
use chirp::auth::TokenStore;
use chirp::config::{Config, StoreBackend};
use chirp::handlers::{self, AppState};
use chirp::service::Services;
use chirp::store::{MemoryStore, ScyllaStore, Store};
use env_logger::Builder;
use log::{error, info};
use std::io;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config = Config::from_env();

    Builder::new()
        .filter_level(config.log_level)
        .format_timestamp_secs()
        .init();

    info!("Starting chirp backend...");

    let store: Arc<dyn Store> = match config.store {
        StoreBackend::Memory => {
            info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Scylla => {
            let session = chirp::db::create_session(&config.scylla_node, &config.keyspace)
                .await
                .map_err(|e| {
                    error!("Failed to create database session: {}", e);
                    io::Error::new(io::ErrorKind::Other, e.to_string())
                })?;
            info!("Connected to ScyllaDB at {}", config.scylla_node);
            Arc::new(ScyllaStore::new(Arc::new(session)))
        }
    };

    let tokens = TokenStore::new(config.token_ttl);
    let sweeper = tokens.spawn_sweeper(config.sweep_interval);

    let state = web::Data::new(AppState {
        services: Services::new(store, config.bcrypt_cost),
        tokens,
    });

    info!(
        "Listening on {} with {} workers",
        config.bind_addr, config.workers
    );
    let result = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .workers(config.workers)
    .bind(&config.bind_addr)?
    .run()
    .await;

    sweeper.shutdown().await;
    info!("Shut down");
    result
}
