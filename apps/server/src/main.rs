#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

use std::sync::Arc;

use actix_extensible_rate_limit::backend::memory::InMemoryBackend;
use actix_extensible_rate_limit::RateLimiter;
use actix_web::{web, App, HttpServer};
use hokm_server::config::{ServerConfig, StoreProfile};
use hokm_server::middleware::rate_limit::upgrade_rate_limit_config;
use hokm_server::routes;
use hokm_server::state::app_state::AppState;
use hokm_server::state::security_config::SecurityConfig;
use hokm_server::store::{MemoryStateStore, RedisStateStore, StateStore};
use hokm_server::ws;

mod telemetry;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry::init_tracing();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    };

    let store: Arc<dyn StateStore> = match &config.store {
        StoreProfile::Redis(url) => match RedisStateStore::connect(url).await {
            Ok(store) => {
                println!("✅ Connected to redis state store");
                Arc::new(store)
            }
            Err(err) => {
                eprintln!("❌ Failed to connect to redis: {err}");
                std::process::exit(1);
            }
        },
        StoreProfile::Memory => {
            tracing::warn!("APP_REDIS_URL not set; using in-memory state store (no durability)");
            Arc::new(MemoryStateStore::new())
        }
    };

    let app_state = AppState::new(store, SecurityConfig::new(config.jwt_secret.as_bytes()));

    match app_state.rooms().restore_active().await {
        Ok(0) => {}
        Ok(count) => println!("♻️  Restored {count} active rooms from the store"),
        Err(err) => {
            eprintln!("❌ Failed to enumerate stored rooms: {err}");
            std::process::exit(1);
        }
    }

    println!("🚀 Starting Hokm Server on http://{}", config.listen_addr);

    let upgrade_limit_backend = InMemoryBackend::builder().build();
    let data = web::Data::new(app_state);

    HttpServer::new(move || {
        let upgrade_limiter = RateLimiter::builder(
            upgrade_limit_backend.clone(),
            upgrade_rate_limit_config().build(),
        )
        .add_headers()
        .build();

        App::new()
            .app_data(data.clone())
            .service(
                web::resource("/ws")
                    .wrap(upgrade_limiter)
                    .route(web::get().to(ws::session::upgrade)),
            )
            .configure(routes::configure)
    })
    .workers(num_cpus::get().min(8))
    .bind(&config.listen_addr)?
    .run()
    .await
}
