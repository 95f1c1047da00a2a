use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Submitted,
    Approved,
    Archived,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Submitted => "submitted",
            Status::Approved => "approved",
            Status::Archived => "archived",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown timesheet status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(Status::Submitted),
            "approved" => Ok(Status::Approved),
            "archived" => Ok(Status::Archived),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Timesheet record. `approved_at` is set iff `status` is `Approved`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Timesheet {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub client_id: Uuid,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub hours: f64,
    pub notes: String,
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub approved_at: Option<OffsetDateTime>,
}

impl Timesheet {
    /// Recency key used by every list: approval time when present, else creation time.
    pub fn recency(&self) -> OffsetDateTime {
        self.approved_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, FromRow)]
pub struct TimesheetRow {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub client_id: Uuid,
    pub date: Date,
    pub hours: f64,
    pub notes: String,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub approved_at: Option<OffsetDateTime>,
}

impl TryFrom<TimesheetRow> for Timesheet {
    type Error = UnknownStatus;

    fn try_from(r: TimesheetRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            staff_id: r.staff_id,
            client_id: r.client_id,
            date: r.date,
            hours: r.hours,
            notes: r.notes,
            status: r.status.parse()?,
            created_at: r.created_at,
            approved_at: r.approved_at,
        })
    }
}

/// Conjunctive filter over the timesheet store. `None` fields match anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimesheetFilter {
    pub status: Option<Status>,
    pub staff_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    /// Matches records where the user is either the staff member or the client.
    pub party_id: Option<Uuid>,
}

impl TimesheetFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn for_staff(mut self, staff_id: Uuid) -> Self {
        self.staff_id = Some(staff_id);
        self
    }

    pub fn for_client(mut self, client_id: Uuid) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn involving(mut self, user_id: Uuid) -> Self {
        self.party_id = Some(user_id);
        self
    }

    pub fn matches(&self, t: &Timesheet) -> bool {
        self.status.map_or(true, |s| t.status == s)
            && self.staff_id.map_or(true, |id| t.staff_id == id)
            && self.client_id.map_or(true, |id| t.client_id == id)
            && self
                .party_id
                .map_or(true, |id| t.staff_id == id || t.client_id == id)
    }
}
