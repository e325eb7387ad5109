use dotenv::dotenv;
use log::*;

use std::sync::Arc;

mod admin;
mod clock;
mod config;
mod error;
mod models;
mod polls;
mod render;
mod repository;
mod routes;

use crate::clock::SystemClock;
use crate::config::Settings;
use crate::polls::PollService;
use crate::render::Renderer;
use crate::repository::{MemoryRepository, PgRepository, PollRepository};

/**
 * Struct for carrying application state into tide request handlers
 */
#[derive(Clone)]
pub struct AppState {
    pub polls: PollService,
    pub views: Arc<Renderer>,
}

/**
 * Pick the storage backend, PostgreSQL when a database URL is configured
 */
async fn create_repository(settings: &Settings) -> Result<Arc<dyn PollRepository>, sqlx::Error> {
    match &settings.database_url {
        Some(url) => {
            let repo = PgRepository::connect(url, settings.max_connections).await?;
            info!("Connected to PostgreSQL");
            Ok(Arc::new(repo))
        }
        None => {
            warn!("DATABASE_URL is not set, polls will only be kept in memory");
            Ok(Arc::new(MemoryRepository::new()))
        }
    }
}

#[async_std::main]
async fn main() -> Result<(), std::io::Error> {
    dotenv().ok();
    pretty_env_logger::init();

    let settings = Settings::from_env().map_err(|err| {
        error!("Could not load configuration! {}", err);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
    })?;

    let views = Renderer::from_directory(&settings.templates_dir).map_err(|err| {
        error!("Could not load templates from {}! {:?}", settings.templates_dir, err);
        std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
    })?;

    match create_repository(&settings).await {
        Ok(repo) => {
            let state = AppState {
                polls: PollService::new(repo, Arc::new(SystemClock)),
                views: Arc::new(views),
            };
            let app = routes::build(state, settings.admin);
            info!("Listening on {}", settings.listen_addr);
            app.listen(settings.listen_addr).await?;
            Ok(())
        }
        Err(err) => {
            error!("Could not initialize storage! {:?}", err);
            Err(std::io::Error::new(std::io::ErrorKind::Other, err))
        }
    }
}
