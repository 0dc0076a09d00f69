//! Web server for imghost.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::auth::TokenService;
use crate::cache::PermissionCache;
use crate::{Config, Database, HostError};

use super::handlers::AppState;
use super::router::{create_health_router, create_router};

/// Interval between access token cleanups.
const CLEANUP_INTERVAL_SECS: u64 = 3600;

/// Web server for the API.
pub struct WebServer {
    addr: SocketAddr,
    app_state: Arc<AppState>,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: Config, db: Database) -> crate::Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| HostError::Config(format!("invalid server address: {e}")))?;
        let app_state = AppState::new(db, config)?;

        Ok(Self {
            addr,
            app_state: Arc::new(app_state),
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.app_state
    }

    /// Start the token cleanup background task.
    ///
    /// Runs every hour and deletes expired and revoked access tokens.
    fn start_token_cleanup_task(db: Database, cache: Arc<PermissionCache>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));

            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;

                match TokenService::new(db.pool(), &cache).cleanup().await {
                    Ok(count) if count > 0 => {
                        tracing::info!(deleted_count = count, "Cleaned up expired/revoked access tokens");
                    }
                    Ok(_) => tracing::debug!("No expired access tokens to clean up"),
                    Err(e) => tracing::warn!(error = %e, "Failed to cleanup access tokens"),
                }
            }
        });
    }

    async fn bind(self) -> Result<(TcpListener, axum::Router), std::io::Error> {
        let db = self.app_state.db.clone();
        let cache = Arc::clone(self.app_state.resolver.cache());
        let router = create_router(self.app_state).merge(create_health_router());

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        // Start token cleanup background task after successful bind
        Self::start_token_cleanup_task(db, cache);
        tracing::info!("Token cleanup task started (runs every hour)");
        tracing::info!("Web server listening on http://{}", local_addr);

        Ok((listener, router))
    }

    /// Run the web server.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let (listener, router) = self.bind().await?;
        axum::serve(listener, router).await
    }

    /// Run the server in the background and return the bound address.
    ///
    /// Useful for tests binding to port 0.
    pub async fn run_with_addr(self) -> Result<SocketAddr, std::io::Error> {
        let (listener, router) = self.bind().await?;
        let local_addr = listener.local_addr()?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
