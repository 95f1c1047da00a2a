use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{repo::ResetTokenStore, repo_types::PasswordResetToken};
use crate::timesheets::{
    repo::TimesheetStore,
    repo_types::{Status, Timesheet, TimesheetFilter},
};
use crate::users::{
    repo::UserStore,
    repo_types::{Role, User},
};

/// Process-local record store, used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    timesheets: RwLock<HashMap<Uuid, Timesheet>>,
    resets: RwLock<HashMap<Uuid, PasswordResetToken>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_creation(mut users: Vec<User>) -> Vec<User> {
    users.sort_by_key(|u| u.created_at);
    users
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        Ok(by_creation(self.users.read().await.values().cloned().collect()))
    }

    async fn list_by_role(&self, role: Role) -> anyhow::Result<Vec<User>> {
        Ok(by_creation(
            self.users
                .read()
                .await
                .values()
                .filter(|u| u.role == role)
                .cloned()
                .collect(),
        ))
    }

    async fn insert(&self, user: &User) -> anyhow::Result<bool> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Ok(false);
        }
        users.insert(user.id, user.clone());
        Ok(true)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        if let Some(u) = self.users.write().await.get_mut(&id) {
            u.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl TimesheetStore for MemoryStore {
    async fn insert(&self, ts: &Timesheet) -> anyhow::Result<()> {
        self.timesheets.write().await.insert(ts.id, ts.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Timesheet>> {
        Ok(self.timesheets.read().await.get(&id).cloned())
    }

    async fn set_staff(&self, id: Uuid, staff_id: Uuid) -> anyhow::Result<Option<Timesheet>> {
        Ok(self.timesheets.write().await.get_mut(&id).map(|t| {
            t.staff_id = staff_id;
            t.clone()
        }))
    }

    async fn set_status(
        &self,
        id: Uuid,
        from: Option<Status>,
        to: Status,
        approved_at: Option<OffsetDateTime>,
    ) -> anyhow::Result<Option<Timesheet>> {
        let mut all = self.timesheets.write().await;
        let Some(t) = all.get_mut(&id) else {
            return Ok(None);
        };
        if from.is_some_and(|s| s != t.status) {
            return Ok(None);
        }
        t.status = to;
        t.approved_at = approved_at;
        Ok(Some(t.clone()))
    }

    async fn list(&self, filter: TimesheetFilter) -> anyhow::Result<Vec<Timesheet>> {
        let mut rows: Vec<Timesheet> = self
            .timesheets
            .read()
            .await
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.recency().cmp(&a.recency()));
        Ok(rows)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        self.timesheets.write().await.remove(&id);
        Ok(())
    }

    async fn delete_all(&self) -> anyhow::Result<u64> {
        let mut all = self.timesheets.write().await;
        let n = all.len() as u64;
        all.clear();
        Ok(n)
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn insert(&self, token: &PasswordResetToken) -> anyhow::Result<()> {
        self.resets.write().await.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<PasswordResetToken>> {
        Ok(self
            .resets
            .read()
            .await
            .values()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn mark_used(&self, id: Uuid) -> anyhow::Result<()> {
        if let Some(t) = self.resets.write().await.get_mut(&id) {
            t.used = true;
        }
        Ok(())
    }
}
