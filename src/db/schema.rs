//! Database schema and migrations for imghost.
//!
//! Migrations are applied in order when the database is opened; the
//! `schema_version` table records which ones have run.

/// Database migrations.
///
/// Timestamps are RFC 3339 UTC strings written by the application.
pub const MIGRATIONS: &[&str] = &[
    // v1: accounts
    r#"
CREATE TABLE users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    email       TEXT,
    password    TEXT NOT NULL,                    -- Argon2 hash
    status      TEXT NOT NULL DEFAULT 'active',   -- 'active', 'inactive', 'banned'
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    deleted_at  TEXT
);

CREATE UNIQUE INDEX idx_users_name ON users(name COLLATE NOCASE);
CREATE INDEX idx_users_status ON users(status);
"#,
    // v2: roles and permissions
    r#"
CREATE TABLE roles (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE permissions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE role_permissions (
    role_id       INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    permission_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
    PRIMARY KEY (role_id, permission_id)
);

CREATE TABLE user_roles (
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role_id     INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (user_id, role_id)
);

CREATE INDEX idx_user_roles_role_id ON user_roles(role_id);
"#,
    // v3: proxy/device access tokens
    r#"
CREATE TABLE access_tokens (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    token_hash   TEXT NOT NULL UNIQUE,            -- SHA-256 of the raw token
    user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    device_id    TEXT NOT NULL,
    ip_address   TEXT,
    status       TEXT NOT NULL DEFAULT 'active',  -- 'active', 'revoked'
    expires_at   TEXT NOT NULL,
    last_used_at TEXT,
    created_at   TEXT NOT NULL
);

CREATE INDEX idx_access_tokens_user_id ON access_tokens(user_id);
CREATE INDEX idx_access_tokens_expires_at ON access_tokens(expires_at);
"#,
    // v4: stored files
    r#"
CREATE TABLE images (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name           TEXT NOT NULL,
    description    TEXT NOT NULL DEFAULT '',
    file_hash      TEXT NOT NULL,
    size           INTEGER NOT NULL,
    ext            TEXT NOT NULL,
    mime_type      TEXT NOT NULL,
    storage_path   TEXT NOT NULL,
    thumbnail_path TEXT,
    views          INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL
);

CREATE UNIQUE INDEX idx_images_file_hash ON images(file_hash);
CREATE INDEX idx_images_user_id ON images(user_id);

CREATE TABLE private_files (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name          TEXT NOT NULL,
    file_hash     TEXT NOT NULL,
    size          INTEGER NOT NULL,
    ext           TEXT NOT NULL,
    mime_type     TEXT NOT NULL,
    storage_path  TEXT NOT NULL,
    is_encrypted  INTEGER NOT NULL DEFAULT 0,
    secret_hash   TEXT,                           -- Argon2 hash of the file password
    status        TEXT NOT NULL DEFAULT 'active', -- 'active', 'deleted'
    views         INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    deleted_at    TEXT
);

CREATE UNIQUE INDEX idx_private_files_owner_hash
    ON private_files(user_id, file_hash) WHERE status = 'active';
CREATE INDEX idx_private_files_storage_path ON private_files(storage_path);
"#,
    // v5: per-user image tags
    r#"
CREATE TABLE tags (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE UNIQUE INDEX idx_tags_owner_name ON tags(user_id, name COLLATE NOCASE);

CREATE TABLE image_tags (
    image_id    INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    tag_id      INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (image_id, tag_id)
);

CREATE INDEX idx_image_tags_tag_id ON image_tags(tag_id);
"#,
];
