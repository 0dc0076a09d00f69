//! Role and permission entities.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Named group of permissions. Users only ever gain permissions through roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Inactive roles contribute nothing to their holders.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Named capability, e.g. `upload_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
