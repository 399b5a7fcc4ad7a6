//Third-party-dependencies
use actix_cors::Cors;
use actix_web::{middleware::Logger, rt, web, App, HttpServer};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

use cohort_service::config::Config;
use cohort_service::routes;
use cohort_service::services::directory::InMemoryDirectory;
use cohort_service::services::formation::TeamFormationEngine;
use cohort_service::services::notification::OutboxChannel;
use cohort_service::utils::proposal_storage::FileProposalStore;
use cohort_service::utils::team_storage::FileTeamStore;

fn to_io(e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.storage_dir)?;

    let directory = InMemoryDirectory::load(&config.directory_file).map_err(to_io)?;
    let engine = TeamFormationEngine::new(
        Arc::new(directory),
        Arc::new(OutboxChannel::new(config.public_url.clone())),
        Arc::new(FileProposalStore::new(&config.storage_dir).map_err(to_io)?),
        Arc::new(FileTeamStore::new(&config.storage_dir).map_err(to_io)?),
        config.engine_settings(),
    );
    engine.restore_team_index().map_err(to_io)?;
    let engine = web::Data::new(engine);

    // Background expiry sweep
    let sweeper = engine.clone();
    let interval_secs = config.sweep_interval_secs.max(1);
    rt::spawn(async move {
        let mut ticker = rt::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let report = sweeper.run_maintenance();
            if report.failures > 0 {
                error!("❌ Maintenance finished with {} failures, retrying next tick", report.failures);
            }
        }
    });

    info!("Server started at {}", config.bind_addr);
    let jwt_secret = config.jwt_secret.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .app_data(engine.clone())
            .configure(|cfg| routes::configure(cfg, &jwt_secret))
    })
        .bind(&config.bind_addr)?
        .run()
        .await
}
