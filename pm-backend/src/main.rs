use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod ai;
mod config;
mod controllers;
mod vault;

use ai::{FieldSuggester, OpenAiSuggester};
use config::Config;
use vault::VaultService;

pub struct AppState {
    pub vault: VaultService,
    /// None when no suggestion backend is configured
    pub suggester: Option<Arc<dyn FieldSuggester>>,
    pub config: Config,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    log::info!("pm-backend v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using data directory: {:?}", config.data_dir);

    // An unusable vault root is fatal; individual bad files are not
    let vault = match VaultService::open(config.data_dir.clone()).await {
        Ok(vault) => vault,
        Err(e) => {
            log::error!("[VAULT] Failed to open vault: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };
    if let Ok(diag) = vault.diagnostics().await {
        if !diag.skipped.is_empty() {
            log::warn!("[VAULT] {} file(s) skipped at startup, see /api/vault/diagnostics", diag.skipped.len());
        }
    }

    let suggester: Option<Arc<dyn FieldSuggester>> = match OpenAiSuggester::from_config(&config.openai) {
        Some(s) => {
            log::info!("[STORY_ASSIST] Enabled with model {}", config.openai.model);
            Some(Arc::new(s))
        }
        None => {
            log::info!("[STORY_ASSIST] Disabled (no OPENAI_API_KEY)");
            None
        }
    };

    let bind_addr = config.bind_addr.clone();
    let port = config.port;
    log::info!("Starting server on {}:{}", bind_addr, port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                vault: vault.clone(),
                suggester: suggester.clone(),
                config: config.clone(),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config_routes)
            .configure(controllers::vault::config)
    })
    .bind((bind_addr.as_str(), port))?
    .run()
    .await
}
