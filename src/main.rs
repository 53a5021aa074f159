use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;

use civicideas::core::config::{AppConfig, DEV_JWT_SECRET};
use civicideas::core::shared::utils::{create_conn, redact_url, run_migrations};
use civicideas::core::shared::AppState;
use civicideas::main_module::{run_server, seed_database};
use civicideas::security::{JwtConfig, JwtManager, PasswordConfig, PasswordHasher2};

const USAGE: &str = "Usage: civicideas [serve|migrate|seed]";

fn io_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(format!("{context}: {err}"))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "serve".to_string());
    if matches!(command.as_str(), "--help" | "-h") {
        println!("{USAGE}");
        return Ok(());
    }
    if !matches!(command.as_str(), "serve" | "migrate" | "seed") {
        eprintln!("Unknown command: {command}");
        eprintln!("{USAGE}");
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Unknown command: {command}"),
        ));
    }

    let config = AppConfig::load().map_err(|e| io_error("Failed to load configuration", e))?;
    if config.jwt_secret() == DEV_JWT_SECRET {
        warn!("No JWT secret configured, using the development secret - DO NOT USE IN PRODUCTION");
    }

    info!("Connecting to {}", redact_url(&config.database.url));
    let pool = create_conn(&config.database).map_err(|e| {
        error!("Failed to create database pool: {e}");
        io_error("Database pool creation failed", e)
    })?;

    if command == "migrate" || config.database.run_migrations {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| io_error("Database connection failed", e))?;
            run_migrations(&mut conn).map_err(|e| io_error("Migrations failed", e))
        })
        .await
        .map_err(|e| io_error("Migration task failed", e))??;
        if command == "migrate" {
            info!("Migrations are up to date");
            return Ok(());
        }
    }

    let password_config = PasswordConfig {
        min_length: config.auth.password_min_length,
        ..Default::default()
    };
    let hasher = PasswordHasher2::new(Default::default(), password_config)
        .map_err(|e| io_error("Failed to initialize password hasher", e))?;

    if command == "seed" {
        let seed_config = config.seed.clone();
        let report = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| io_error("Database connection failed", e))?;
            seed_database(&mut conn, &hasher, &seed_config).map_err(|e| io_error("Seeding failed", e))
        })
        .await
        .map_err(|e| io_error("Seed task failed", e))??;
        println!(
            "Seeded {} categories and {} tags; staff account created: {}",
            report.categories, report.tags, report.admin_created
        );
        return Ok(());
    }

    let jwt_manager = JwtManager::new(JwtConfig::from(&config.auth), config.jwt_secret())
        .map_err(|e| io_error("Failed to initialize JWT manager", e))?;
    info!("JWT manager initialized");

    let app_state = Arc::new(AppState::new(pool, config, jwt_manager, hasher));
    run_server(app_state).await
}
