use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware};
use backend::auth::CredentialVerifier;
use backend::config::AppConfig;
use backend::db;
use backend::db::user_repository::UserRepository;
use backend::inference::InferenceEngine;
use backend::inference::torch_model::TorchDetector;
use backend::state::AppServices;
use backend::storage::{LocalStore, ObjectStore, S3Service};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "detectd", version, about = "Object detection prediction service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Create a user account
    AddUser {
        username: String,
        password: String,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn other_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, e);
    std::io::Error::other(format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve { config: None }) {
        Command::Serve { config } => serve(config).await,
        Command::AddUser {
            username,
            password,
            config,
        } => add_user(config, &username, &password).await,
    }
}

async fn add_user(config: Option<PathBuf>, username: &str, password: &str) -> std::io::Result<()> {
    let config = AppConfig::load(config.as_deref())
        .map_err(|e| other_error("Invalid configuration", e))?;
    let pool = db::connect(&config.database_url)
        .await
        .map_err(|e| other_error("Failed to open database", e))?;
    let verifier = CredentialVerifier::new(UserRepository::new(pool));
    let user = verifier
        .register(username, password)
        .await
        .map_err(|e| other_error("Failed to create user", e))?;
    log::info!("Created user '{}' with id {}", user.username, user.id);
    Ok(())
}

async fn serve(config: Option<PathBuf>) -> std::io::Result<()> {
    let config = AppConfig::load(config.as_deref())
        .map_err(|e| other_error("Invalid configuration", e))?;

    let pool = db::connect(&config.database_url)
        .await
        .map_err(|e| other_error("Failed to open database", e))?;
    CredentialVerifier::new(UserRepository::new(pool.clone()))
        .ensure_seed_user(&config.seed_username, &config.seed_password)
        .await
        .map_err(|e| other_error("Failed to seed user", e))?;

    let local = LocalStore::new(&config.upload_dir);
    local
        .init()
        .await
        .map_err(|e| other_error("Failed to prepare upload directories", e))?;

    let remote: Option<Arc<dyn ObjectStore>> = match config.s3_target() {
        Some((bucket, region)) => {
            let service = S3Service::connect(
                bucket.to_string(),
                region.to_string(),
                Duration::from_secs(config.s3_timeout_secs),
            )
            .await;
            log::info!("Remote storage enabled: bucket {} in {}", bucket, region);
            Some(Arc::new(service))
        }
        None => {
            log::warn!("S3 not configured (AWS_REGION/AWS_S3_BUCKET); remote ingestion disabled");
            None
        }
    };

    let detector = TorchDetector::load(
        &config.model_path,
        config.input_size,
        config.confidence_threshold,
        config.iou_threshold,
    )
    .map_err(|e| other_error("Model loading failed", e))?;
    let engine = InferenceEngine::new(Box::new(detector));

    let services = AppServices::new(
        pool,
        engine,
        local,
        remote,
        config.recent_window_days,
    );

    let bind_address = config.bind_addr();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .configure(|cfg| services.configure(cfg))
    })
    .bind(&bind_address)?
    .run()
    .await
}
