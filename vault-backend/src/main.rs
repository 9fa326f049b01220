use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod config;
mod controllers;
mod crypto;
mod db;
mod error;
mod inbound;
mod integrations;
mod models;
mod vault;
mod webhooks;

use config::Config;
use db::Database;
use vault::{CredentialStore, DispatchResolver};

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub store: CredentialStore,
    pub resolver: DispatchResolver,
}

/// `vault-backend issue-session <tenant_id>` prints a bearer token for the
/// tenant. The account system normally writes sessions; this is the
/// operator path for bootstrapping and support.
fn issue_session(db: &Database, config: &Config, tenant_id: &str) -> std::io::Result<()> {
    match db.create_session(tenant_id, config.session_ttl_hours) {
        Ok(session) => {
            println!("{}", session.token);
            log::info!(
                "Issued session for tenant {} (expires {})",
                tenant_id,
                session.expires_at
            );
            Ok(())
        }
        Err(e) => Err(std::io::Error::other(e.to_string())),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = match Database::new(&config.database_url) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            log::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [command, tenant_id] = args.as_slice() {
        if command == "issue-session" {
            return issue_session(&db, &config, tenant_id);
        }
    }

    let store = CredentialStore::new(db.clone(), config.field_cipher());
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let resolver = DispatchResolver::new(store.clone(), config.endpoints.clone(), http);

    if config.public_base_url.is_none() {
        log::warn!("PUBLIC_BASE_URL not set - Twilio signatures are checked against the connection URL");
    }
    log::info!("Starting vault backend on port {}", port);

    let state = web::Data::new(AppState {
        db,
        config,
        store,
        resolver,
    });

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::credentials::config)
            .configure(controllers::messages::config)
            .configure(controllers::payments::config)
            .configure(controllers::webhooks::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
