//! Configuration module for imghost.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::{HostError, Result};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins (empty allows any origin).
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Secret used to sign session JWTs.
    #[serde(default)]
    pub jwt_secret: String,
    /// Session JWT lifetime in seconds.
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_jwt_expiry() -> u64 {
    24 * 60 * 60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            jwt_secret: String::new(),
            jwt_expiry_secs: default_jwt_expiry(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/imghost.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// File storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding images, thumbnails and private files.
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// URL prefix under which the proxy serves public images.
    #[serde(default = "default_image_url_prefix")]
    pub image_url_prefix: String,
    /// Maximum image size in megabytes.
    #[serde(default = "default_max_image_size")]
    pub max_image_size_mb: u64,
    /// Maximum private file size in megabytes.
    #[serde(default = "default_max_private_size")]
    pub max_private_size_mb: u64,
    /// Thumbnail width in pixels.
    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,
    /// Directory receiving decrypted copies of encrypted files.
    #[serde(default = "default_temp_path")]
    pub temp_path: String,
    /// Most files accepted by one batch upload.
    #[serde(default = "default_max_batch_files")]
    pub max_batch_files: usize,
}

fn default_storage_root() -> String {
    "data/uploads".to_string()
}

fn default_image_url_prefix() -> String {
    "/files/images/".to_string()
}

fn default_max_image_size() -> u64 {
    10
}

fn default_max_private_size() -> u64 {
    100
}

fn default_thumbnail_width() -> u32 {
    300
}

fn default_temp_path() -> String {
    "data/tmp".to_string()
}

fn default_max_batch_files() -> usize {
    10
}

impl StorageConfig {
    /// Maximum image size in bytes.
    pub fn max_image_bytes(&self) -> u64 {
        self.max_image_size_mb * 1024 * 1024
    }

    /// Maximum private file size in bytes.
    pub fn max_private_bytes(&self) -> u64 {
        self.max_private_size_mb * 1024 * 1024
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            image_url_prefix: default_image_url_prefix(),
            max_image_size_mb: default_max_image_size(),
            max_private_size_mb: default_max_private_size(),
            thumbnail_width: default_thumbnail_width(),
            temp_path: default_temp_path(),
            max_batch_files: default_max_batch_files(),
        }
    }
}

/// Access token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Lifetime of newly created access tokens, in days.
    #[serde(default = "default_token_expiry_days")]
    pub expiry_days: i64,
    /// Lifetime of cached proxy access decisions, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_token_expiry_days() -> i64 {
    30
}

fn default_cache_ttl() -> u64 {
    600
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            expiry_days: default_token_expiry_days(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file. Empty logs to stdout only.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/imghost.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Role and route permission configuration.
///
/// `roles` is reconciled into the database at startup; `routes` is the
/// route-to-permission map consulted on every API request. Route keys are
/// either `"METHOD /path"` or a bare `"/path"`, and may contain `:param`
/// segments.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionsConfig {
    /// Role name to permission names.
    #[serde(default = "default_roles")]
    pub roles: BTreeMap<String, Vec<String>>,
    /// Route key to required permission names (empty = public).
    #[serde(default = "default_routes")]
    pub routes: BTreeMap<String, Vec<String>>,
}

fn perms(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn default_roles() -> BTreeMap<String, Vec<String>> {
    let mut roles = BTreeMap::new();
    roles.insert(
        "admin".to_string(),
        perms(&[
            "admin",
            "manage_private_files",
            "upload_file",
            "download_file",
            "delete_file",
            "view_file",
            "manage_all_files",
        ]),
    );
    roles.insert(
        "user".to_string(),
        perms(&[
            "manage_private_files",
            "upload_file",
            "download_file",
            "view_file",
        ]),
    );
    roles
}

fn default_routes() -> BTreeMap<String, Vec<String>> {
    let mut routes = BTreeMap::new();
    routes.insert("/api/auth/register".to_string(), Vec::new());
    routes.insert("/api/auth/login".to_string(), Vec::new());
    routes.insert("/api/verify-token".to_string(), Vec::new());
    routes.insert("POST /api/images".to_string(), perms(&["upload_file"]));
    routes.insert("POST /api/images/batch".to_string(), perms(&["upload_file"]));
    routes.insert("/api/images/:id".to_string(), perms(&["view_file"]));
    routes.insert(
        "DELETE /api/images/:id".to_string(),
        perms(&["delete_file"]),
    );
    routes.insert("/api/images/:id/tags".to_string(), perms(&["view_file"]));
    routes.insert(
        "POST /api/images/:id/tags".to_string(),
        perms(&["upload_file"]),
    );
    routes.insert(
        "/api/images/:id/tags/:tag_id".to_string(),
        perms(&["upload_file"]),
    );
    routes.insert("/api/tags".to_string(), perms(&["view_file"]));
    routes.insert("POST /api/tags".to_string(), perms(&["upload_file"]));
    routes.insert(
        "/api/private-files".to_string(),
        perms(&["manage_private_files"]),
    );
    routes.insert(
        "/api/private-files/batch".to_string(),
        perms(&["manage_private_files"]),
    );
    routes.insert(
        "/api/private-files/:id".to_string(),
        perms(&["manage_private_files"]),
    );
    routes.insert(
        "/api/private-files/:id/download".to_string(),
        perms(&["manage_private_files", "download_file"]),
    );
    routes.insert("/api/tokens".to_string(), perms(&["view_file"]));
    routes.insert("/api/tokens/:id".to_string(), perms(&["view_file"]));
    routes.insert("/api/users".to_string(), perms(&["admin"]));
    routes.insert("/api/users/:id".to_string(), perms(&["admin"]));
    routes.insert("/api/users/:id/roles".to_string(), perms(&["admin"]));
    routes.insert("/api/users/:id/roles/:role".to_string(), perms(&["admin"]));
    routes.insert("/api/users/:id/status".to_string(), perms(&["admin"]));
    routes.insert("/api/users/:id/permissions".to_string(), perms(&["admin"]));
    // any signed-in user may read their own permissions
    routes.insert("/api/users/me/permissions".to_string(), Vec::new());
    routes.insert("/api/roles".to_string(), perms(&["admin"]));
    routes.insert("/api/roles/:role/active".to_string(), perms(&["admin"]));
    routes.insert("/api/roles/:role/permissions".to_string(), perms(&["admin"]));
    routes.insert(
        "/api/roles/:role/permissions/:permission".to_string(),
        perms(&["admin"]),
    );
    routes.insert("/api/permissions".to_string(), perms(&["admin"]));
    routes.insert("/api/permissions/sync".to_string(), perms(&["admin"]));
    routes
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            roles: default_roles(),
            routes: default_routes(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// File storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Access token configuration.
    #[serde(default)]
    pub tokens: TokenConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Roles and route permissions.
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(HostError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| HostError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `IMGHOST_JWT_SECRET`: Override the JWT secret key
    pub fn apply_env_overrides(&mut self) {
        if let Ok(jwt_secret) = std::env::var("IMGHOST_JWT_SECRET") {
            if !jwt_secret.is_empty() {
                self.server.jwt_secret = jwt_secret;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if the JWT secret is missing, a size ceiling is zero,
    /// or a route key is malformed.
    pub fn validate(&self) -> Result<()> {
        if self.server.jwt_secret.is_empty() {
            return Err(HostError::Config(
                "server.jwt_secret must be set (or IMGHOST_JWT_SECRET)".to_string(),
            ));
        }
        if self.storage.max_image_size_mb == 0 || self.storage.max_private_size_mb == 0 {
            return Err(HostError::Config(
                "storage size limits must be greater than zero".to_string(),
            ));
        }
        if self.storage.thumbnail_width == 0 {
            return Err(HostError::Config(
                "storage.thumbnail_width must be greater than zero".to_string(),
            ));
        }
        if self.storage.max_batch_files == 0 {
            return Err(HostError::Config(
                "storage.max_batch_files must be greater than zero".to_string(),
            ));
        }
        crate::rbac::RouteTable::from_map(&self.permissions.routes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert!(config.server.jwt_secret.is_empty());
        assert_eq!(config.server.jwt_expiry_secs, 86400);

        assert_eq!(config.database.path, "data/imghost.db");

        assert_eq!(config.storage.root, "data/uploads");
        assert_eq!(config.storage.max_image_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.storage.max_private_bytes(), 100 * 1024 * 1024);
        assert_eq!(config.storage.thumbnail_width, 300);
        assert_eq!(config.storage.max_batch_files, 10);

        assert_eq!(config.tokens.expiry_days, 30);
        assert_eq!(config.tokens.cache_ttl_secs, 600);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/imghost.log");

        assert!(config.permissions.roles.contains_key("admin"));
        assert_eq!(config.permissions.roles["user"].len(), 4);
        assert_eq!(
            config.permissions.routes["POST /api/images"],
            vec!["upload_file".to_string()]
        );
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tokens.expiry_days, 30);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 3000
cors_origins = ["http://localhost:5173"]
jwt_secret = "test-secret"
jwt_expiry_secs = 600

[database]
path = "custom/db.sqlite"

[storage]
root = "custom/uploads"
image_url_prefix = "https://cdn.example.com/i/"
max_image_size_mb = 5
max_private_size_mb = 50
thumbnail_width = 200
temp_path = "custom/tmp"

[tokens]
expiry_days = 7
cache_ttl_secs = 60

[logging]
level = "debug"
file = "custom/logs/app.log"

[permissions.roles]
editor = ["upload_file", "view_file"]

[permissions.routes]
"POST /images/upload" = ["upload_file"]
"/users/:id/roles" = ["admin"]
"/public" = []
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.server.jwt_secret, "test-secret");
        assert_eq!(config.server.jwt_expiry_secs, 600);

        assert_eq!(config.database.path, "custom/db.sqlite");

        assert_eq!(config.storage.root, "custom/uploads");
        assert_eq!(config.storage.image_url_prefix, "https://cdn.example.com/i/");
        assert_eq!(config.storage.max_image_bytes(), 5 * 1024 * 1024);
        assert_eq!(config.storage.thumbnail_width, 200);
        assert_eq!(config.storage.temp_path, "custom/tmp");

        assert_eq!(config.tokens.expiry_days, 7);
        assert_eq!(config.tokens.cache_ttl_secs, 60);

        assert_eq!(config.logging.level, "debug");

        assert_eq!(config.permissions.roles.len(), 1);
        assert_eq!(config.permissions.roles["editor"].len(), 2);
        assert_eq!(config.permissions.routes.len(), 3);
        assert!(config.permissions.routes["/public"].is_empty());

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = Config::parse("[server\nport = ");
        assert!(matches!(result, Err(HostError::Config(_))));
    }

    #[test]
    fn test_validate_requires_jwt_secret() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(HostError::Config(_))));

        let mut config = Config::default();
        config.server.jwt_secret = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = Config::default();
        config.server.jwt_secret = "secret".to_string();
        config.storage.max_image_size_mb = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_routes_resolve() {
        let table = crate::rbac::RouteTable::from_map(&default_routes()).unwrap();

        assert!(table.required("GET", "/api/users/me/permissions").is_empty());
        assert_eq!(table.required("GET", "/api/users/7/permissions"), ["admin"]);
        assert_eq!(table.required("POST", "/api/images/batch"), ["upload_file"]);
        assert_eq!(
            table.required("POST", "/api/private-files/batch"),
            ["manage_private_files"]
        );
        assert_eq!(table.required("GET", "/api/images/3/tags"), ["view_file"]);
        assert_eq!(table.required("POST", "/api/images/3/tags"), ["upload_file"]);
        assert_eq!(
            table.required("DELETE", "/api/roles/user/permissions/upload_file"),
            ["admin"]
        );
        assert_eq!(table.required("POST", "/api/permissions/sync"), ["admin"]);
    }

    #[test]
    fn test_validate_rejects_bad_route_key() {
        let mut config = Config::default();
        config.server.jwt_secret = "secret".to_string();
        config
            .permissions
            .routes
            .insert("FETCH /x".to_string(), vec!["admin".to_string()]);
        assert!(config.validate().is_err());
    }
}
