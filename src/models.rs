use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Role;

pub type Id = i64;

// serialized in full for snapshot persistence; API responses use the
// trimmed `routes::UserInfo` instead, so the hash never leaves the process
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Metadata record for an uploaded file. `storage_key` is the only handle
/// clients ever see; `display_name` stays internal to the record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredFile {
    pub id: Id,
    pub display_name: String,
    pub storage_key: String,
    pub extension: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewStoredFile {
    pub display_name: String,
    pub storage_key: String,
    pub extension: String,
}
