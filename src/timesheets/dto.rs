use serde::{Deserialize, Serialize};

use super::repo_types::Timesheet;

#[derive(Debug, Default, Deserialize)]
pub struct SubmitTimesheetRequest {
    /// `YYYY-MM-DD`
    pub date: Option<String>,
    pub hours: Option<f64>,
    #[serde(alias = "clientId")]
    pub client_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReassignRequest {
    #[serde(alias = "toStaffId")]
    pub to_staff_id: Option<String>,
}

/// Timesheet plus the submitting staff member's contact details, for client views.
#[derive(Debug, Clone, Serialize)]
pub struct TimesheetView {
    #[serde(flatten)]
    pub timesheet: Timesheet,
    pub staff_name: Option<String>,
    pub staff_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u64>,
}
