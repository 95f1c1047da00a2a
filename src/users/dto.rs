use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{Role, User};

#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    #[serde(alias = "clientId", alias = "assignedClientId")]
    pub assigned_client_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteUserQuery {
    #[serde(default)]
    pub force: bool,
}

/// Selection-list view of an account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectoryEntry {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<User> for DirectoryEntry {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            role: u.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub ok: bool,
    pub orphaned_timesheets: usize,
}
