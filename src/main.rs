use std::process::ExitCode;

use tracing::{error, info};

use imghost::rbac::sync_role_permissions;
use imghost::web::WebServer;
use imghost::{Config, Database};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> ExitCode {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = match Config::load_with_env(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    if let Err(e) = imghost::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        imghost::logging::init_console_only(&config.logging.level);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server stopped: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> imghost::Result<()> {
    config.validate()?;

    let db = Database::open(&config.database.path).await?;
    let report = sync_role_permissions(db.pool(), &config.permissions.roles).await?;
    if report.changed() {
        info!(
            roles = report.roles_created,
            permissions = report.permissions_created,
            grants = report.grants_created,
            "Role permissions synchronized"
        );
    }

    info!(
        "imghost starting on {}:{}",
        config.server.host, config.server.port
    );
    let server = WebServer::new(config, db)?;
    server.run().await?;
    Ok(())
}
