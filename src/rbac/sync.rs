//! Reconcile configured roles into the database.

use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::info;

use crate::db::DbPool;
use crate::{HostError, Result};

/// Rows created by one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub roles_created: u64,
    pub permissions_created: u64,
    pub grants_created: u64,
}

impl SyncReport {
    /// Whether the run changed anything.
    pub fn changed(&self) -> bool {
        self.roles_created + self.permissions_created + self.grants_created > 0
    }
}

async fn ensure_named(
    conn: &mut SqliteConnection,
    table: &str,
    name: &str,
) -> Result<(i64, bool)> {
    let insert = format!(
        "INSERT OR IGNORE INTO {table} (name, description, created_at) VALUES (?, '', ?)"
    );
    let created = sqlx::query(&insert)
        .bind(name)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?
        .rows_affected()
        > 0;

    let select = format!("SELECT id FROM {table} WHERE name = ?");
    let id: i64 = sqlx::query_scalar(&select)
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;
    Ok((id, created))
}

/// Create every configured role, permission and role-permission link that
/// is missing.
///
/// Additive only: nothing absent from `roles` is removed. Runs in a single
/// transaction, so a failure leaves the database as it was. Callers should
/// invalidate all cached permission sets when the report shows changes.
pub async fn sync_role_permissions(
    pool: &DbPool,
    roles: &BTreeMap<String, Vec<String>>,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;

    for (role, permissions) in roles {
        if role.trim().is_empty() {
            return Err(HostError::Config("role name must not be empty".to_string()));
        }
        let (role_id, created) = ensure_named(&mut tx, "roles", role).await?;
        report.roles_created += u64::from(created);

        for permission in permissions {
            if permission.trim().is_empty() {
                return Err(HostError::Config(format!(
                    "role '{role}': permission name must not be empty"
                )));
            }
            let (permission_id, created) =
                ensure_named(&mut tx, "permissions", permission).await?;
            report.permissions_created += u64::from(created);

            let linked = sqlx::query(
                "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?, ?)",
            )
            .bind(role_id)
            .bind(permission_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| HostError::Database(e.to_string()))?
            .rows_affected();
            report.grants_created += linked;
        }
    }

    tx.commit()
        .await
        .map_err(|e| HostError::Database(e.to_string()))?;

    info!(
        roles = report.roles_created,
        permissions = report.permissions_created,
        grants = report.grants_created,
        "role permissions synchronized"
    );
    Ok(report)
}
