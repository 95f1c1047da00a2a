use anyhow::Context;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::PgStore;
use crate::timesheets::repo_types::{Status, Timesheet, TimesheetFilter, TimesheetRow};

/// Timesheet store. Updates touch only the columns they own and hand back the
/// record as it stands afterwards.
#[async_trait]
pub trait TimesheetStore: Send + Sync {
    async fn insert(&self, ts: &Timesheet) -> anyhow::Result<()>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Timesheet>>;
    /// `None` when the record does not exist.
    async fn set_staff(&self, id: Uuid, staff_id: Uuid) -> anyhow::Result<Option<Timesheet>>;
    /// With `from` set, only a record currently in that status is changed;
    /// anything else yields `None`.
    async fn set_status(
        &self,
        id: Uuid,
        from: Option<Status>,
        to: Status,
        approved_at: Option<OffsetDateTime>,
    ) -> anyhow::Result<Option<Timesheet>>;
    async fn list(&self, filter: TimesheetFilter) -> anyhow::Result<Vec<Timesheet>>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<()>;
    async fn delete_all(&self) -> anyhow::Result<u64>;
}

#[async_trait]
impl TimesheetStore for PgStore {
    async fn insert(&self, ts: &Timesheet) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO timesheets
                (id, staff_id, client_id, date, hours, notes, status, created_at, approved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(ts.id)
        .bind(ts.staff_id)
        .bind(ts.client_id)
        .bind(ts.date)
        .bind(ts.hours)
        .bind(&ts.notes)
        .bind(ts.status.as_str())
        .bind(ts.created_at)
        .bind(ts.approved_at)
        .execute(&self.db)
        .await
        .context("insert timesheet")?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Timesheet>> {
        let row = sqlx::query_as::<_, TimesheetRow>(
            r#"
            SELECT id, staff_id, client_id, date, hours, notes, status, created_at, approved_at
            FROM timesheets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get timesheet")?;
        Ok(row.map(Timesheet::try_from).transpose()?)
    }

    async fn set_staff(&self, id: Uuid, staff_id: Uuid) -> anyhow::Result<Option<Timesheet>> {
        let row = sqlx::query_as::<_, TimesheetRow>(
            r#"
            UPDATE timesheets SET staff_id = $2
             WHERE id = $1
            RETURNING id, staff_id, client_id, date, hours, notes, status, created_at, approved_at
            "#,
        )
        .bind(id)
        .bind(staff_id)
        .fetch_optional(&self.db)
        .await
        .context("reassign timesheet")?;
        Ok(row.map(Timesheet::try_from).transpose()?)
    }

    async fn set_status(
        &self,
        id: Uuid,
        from: Option<Status>,
        to: Status,
        approved_at: Option<OffsetDateTime>,
    ) -> anyhow::Result<Option<Timesheet>> {
        let row = sqlx::query_as::<_, TimesheetRow>(
            r#"
            UPDATE timesheets SET status = $3, approved_at = $4
             WHERE id = $1 AND ($2::text IS NULL OR status = $2)
            RETURNING id, staff_id, client_id, date, hours, notes, status, created_at, approved_at
            "#,
        )
        .bind(id)
        .bind(from.map(|s| s.as_str()))
        .bind(to.as_str())
        .bind(approved_at)
        .fetch_optional(&self.db)
        .await
        .context("set timesheet status")?;
        Ok(row.map(Timesheet::try_from).transpose()?)
    }

    async fn list(&self, filter: TimesheetFilter) -> anyhow::Result<Vec<Timesheet>> {
        let rows = sqlx::query_as::<_, TimesheetRow>(
            r#"
            SELECT id, staff_id, client_id, date, hours, notes, status, created_at, approved_at
            FROM timesheets
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR staff_id = $2)
              AND ($3::uuid IS NULL OR client_id = $3)
              AND ($4::uuid IS NULL OR staff_id = $4 OR client_id = $4)
            ORDER BY COALESCE(approved_at, created_at) DESC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.staff_id)
        .bind(filter.client_id)
        .bind(filter.party_id)
        .fetch_all(&self.db)
        .await
        .context("list timesheets")?;
        rows.into_iter()
            .map(|r| Timesheet::try_from(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM timesheets WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete timesheet")?;
        Ok(())
    }

    async fn delete_all(&self) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM timesheets")
            .execute(&self.db)
            .await
            .context("delete all timesheets")?;
        Ok(res.rows_affected())
    }
}
