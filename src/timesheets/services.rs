use std::collections::HashMap;

use time::{macros::format_description, Date, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{SubmitTimesheetRequest, TimesheetView},
    repo_types::{Status, Timesheet, TimesheetFilter},
};
use crate::{
    auth::guard::{authorize, scope_timesheet, Operation},
    error::{AppError, AppResult},
    mailer::Email,
    state::AppState,
    users::repo_types::{Role, UserSummary},
};

fn parse_id(raw: Option<&str>, field: &str) -> AppResult<Uuid> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation(format!("Missing field: {field}")))?;
    Uuid::parse_str(raw).map_err(|_| AppError::validation(format!("Invalid {field}")))
}

fn parse_date(raw: Option<&str>) -> AppResult<Date> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("Missing field: date"))?;
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|_| AppError::validation("Invalid date, expected YYYY-MM-DD"))
}

/// Staff submission. The new record starts `submitted`; the client is emailed.
#[instrument(skip(st, caller, req), fields(caller = %caller.id))]
pub async fn submit(
    st: &AppState,
    caller: &UserSummary,
    req: SubmitTimesheetRequest,
) -> AppResult<Timesheet> {
    authorize(caller, Operation::SubmitTimesheet)?;

    let date = parse_date(req.date.as_deref())?;
    let hours = req
        .hours
        .ok_or_else(|| AppError::validation("Missing field: hours"))?;
    if !hours.is_finite() || hours <= 0.0 {
        return Err(AppError::validation("Hours must be greater than zero"));
    }
    let client_id = parse_id(req.client_id.as_deref(), "clientId")?;

    if let Some(assigned) = caller.assigned_client_id {
        if assigned != client_id {
            warn!(caller = %caller.id, %client_id, "submit for unassigned client");
            return Err(AppError::Forbidden);
        }
    }

    let client = st
        .users
        .get(client_id)
        .await?
        .filter(|u| u.role == Role::Client)
        .ok_or_else(|| AppError::validation("Unknown client"))?;

    let ts = Timesheet {
        id: Uuid::new_v4(),
        staff_id: caller.id,
        client_id,
        date,
        hours,
        notes: req.notes.unwrap_or_default(),
        status: Status::Submitted,
        created_at: OffsetDateTime::now_utc(),
        approved_at: None,
    };
    st.timesheets.insert(&ts).await?;
    st.mailer.dispatch(Email::timesheet_submitted(&client.email, ts.id));

    info!(timesheet_id = %ts.id, %client_id, hours, "timesheet submitted");
    Ok(ts)
}

/// Client approval of one of its own pending timesheets. Every owner is emailed.
#[instrument(skip(st, caller), fields(caller = %caller.id))]
pub async fn approve(st: &AppState, caller: &UserSummary, id: Uuid) -> AppResult<Timesheet> {
    authorize(caller, Operation::ApproveTimesheet)?;
    let record = st.timesheets.get(id).await?;
    let ts = scope_timesheet(caller, Operation::ApproveTimesheet, record)?;

    // Only a record still pending moves; a concurrent archive or approve wins.
    let ts = st
        .timesheets
        .set_status(
            ts.id,
            Some(Status::Submitted),
            Status::Approved,
            Some(OffsetDateTime::now_utc()),
        )
        .await?
        .ok_or(AppError::NotFound)?;

    for owner in st.users.list_by_role(Role::Owner).await? {
        st.mailer.dispatch(Email::timesheet_approved(&owner.email, ts.id));
    }
    info!(timesheet_id = %ts.id, "timesheet approved");
    Ok(ts)
}

#[instrument(skip(st, caller, to_staff_id), fields(caller = %caller.id))]
pub async fn reassign(
    st: &AppState,
    caller: &UserSummary,
    id: Uuid,
    to_staff_id: Option<&str>,
) -> AppResult<Timesheet> {
    authorize(caller, Operation::ReassignTimesheet)?;
    let to_staff = parse_id(to_staff_id, "toStaffId")?;
    let record = st.timesheets.get(id).await?;
    let ts = scope_timesheet(caller, Operation::ReassignTimesheet, record)?;

    if st.config.reassign_require_staff {
        let is_staff = st
            .users
            .get(to_staff)
            .await?
            .is_some_and(|u| u.role == Role::Staff);
        if !is_staff {
            return Err(AppError::validation("Reassignment target is not a staff account"));
        }
    }

    let from = ts.staff_id;
    let ts = st
        .timesheets
        .set_staff(ts.id, to_staff)
        .await?
        .ok_or(AppError::NotFound)?;
    info!(timesheet_id = %ts.id, %from, to = %to_staff, "timesheet reassigned");
    Ok(ts)
}

/// Owner archive from any status. `approved_at` is cleared with the status.
#[instrument(skip(st, caller), fields(caller = %caller.id))]
pub async fn archive(st: &AppState, caller: &UserSummary, id: Uuid) -> AppResult<Timesheet> {
    authorize(caller, Operation::ArchiveTimesheet)?;
    let record = st.timesheets.get(id).await?;
    let ts = scope_timesheet(caller, Operation::ArchiveTimesheet, record)?;

    let ts = st
        .timesheets
        .set_status(ts.id, None, Status::Archived, None)
        .await?
        .ok_or(AppError::NotFound)?;
    info!(timesheet_id = %ts.id, "timesheet archived");
    Ok(ts)
}

/// Idempotent: unknown ids succeed.
#[instrument(skip(st, caller), fields(caller = %caller.id))]
pub async fn delete_one(st: &AppState, caller: &UserSummary, id: Uuid) -> AppResult<()> {
    authorize(caller, Operation::DeleteTimesheet)?;
    st.timesheets.delete(id).await?;
    info!(timesheet_id = %id, "timesheet deleted");
    Ok(())
}

#[instrument(skip(st, caller), fields(caller = %caller.id))]
pub async fn delete_all(st: &AppState, caller: &UserSummary) -> AppResult<u64> {
    authorize(caller, Operation::DeleteAllTimesheets)?;
    let n = st.timesheets.delete_all().await?;
    warn!(deleted = n, "all timesheets deleted");
    Ok(n)
}

/// Store filter behind each read operation, keyed on the caller where the view is personal.
fn query_filter(caller: &UserSummary, op: Operation) -> Option<TimesheetFilter> {
    let f = TimesheetFilter::all();
    Some(match op {
        Operation::ListPendingForClient => f.for_client(caller.id).with_status(Status::Submitted),
        Operation::ListApprovedHistoryForClient => {
            f.for_client(caller.id).with_status(Status::Approved)
        }
        Operation::ListHistoryForStaff => f.for_staff(caller.id),
        Operation::ListPendingForStaff => f.for_staff(caller.id).with_status(Status::Submitted),
        Operation::ListPendingForOwner => f.with_status(Status::Submitted),
        Operation::ListApproved => f.with_status(Status::Approved),
        Operation::ListFullHistoryForOwner | Operation::ListAll => f,
        _ => return None,
    })
}

/// Role-scoped read, most recent first.
pub async fn list(st: &AppState, caller: &UserSummary, op: Operation) -> AppResult<Vec<Timesheet>> {
    authorize(caller, op)?;
    let filter = query_filter(caller, op).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("{op:?} is not a timesheet query"))
    })?;
    Ok(st.timesheets.list(filter).await?)
}

/// Like [`list`], with the submitting staff member's name and email attached.
pub async fn list_with_staff(
    st: &AppState,
    caller: &UserSummary,
    op: Operation,
) -> AppResult<Vec<TimesheetView>> {
    let sheets = list(st, caller, op).await?;

    let mut staff: HashMap<Uuid, Option<(String, String)>> = HashMap::new();
    let mut out = Vec::with_capacity(sheets.len());
    for ts in sheets {
        if !staff.contains_key(&ts.staff_id) {
            let contact = st.users.get(ts.staff_id).await?.map(|u| (u.name, u.email));
            staff.insert(ts.staff_id, contact);
        }
        let (staff_name, staff_email) = match staff.get(&ts.staff_id).cloned().flatten() {
            Some((name, email)) => (Some(name), Some(email)),
            None => (None, None),
        };
        out.push(TimesheetView {
            timesheet: ts,
            staff_name,
            staff_email,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_user, add_user_assigned, settle};

    struct Cast {
        st: AppState,
        mail: std::sync::Arc<crate::mailer::testing::RecordingNotifier>,
        owner: UserSummary,
        staff: UserSummary,
        client: UserSummary,
    }

    async fn cast() -> Cast {
        let (st, mail) = AppState::fake();
        let owner = add_user(&st, Role::Owner, "owner@example.com").await;
        let staff = add_user(&st, Role::Staff, "staff@example.com").await;
        let client = add_user(&st, Role::Client, "client@example.com").await;
        Cast { st, mail, owner, staff, client }
    }

    fn submission(client: Uuid, date: &str, hours: f64) -> SubmitTimesheetRequest {
        SubmitTimesheetRequest {
            date: Some(date.into()),
            hours: Some(hours),
            client_id: Some(client.to_string()),
            notes: Some("site work".into()),
        }
    }

    #[tokio::test]
    async fn submit_then_approve_notifies_client_then_owner() {
        let c = cast().await;
        let ts = submit(&c.st, &c.staff, submission(c.client.id, "2025-09-13", 7.5))
            .await
            .unwrap();
        assert_eq!(ts.status, Status::Submitted);
        assert_eq!(ts.staff_id, c.staff.id);
        assert!(ts.approved_at.is_none());

        let pending = list(&c.st, &c.client, Operation::ListPendingForClient).await.unwrap();
        assert_eq!(pending.len(), 1);

        let approved = approve(&c.st, &c.client, ts.id).await.unwrap();
        assert_eq!(approved.status, Status::Approved);
        assert!(approved.approved_at.is_some());

        let history = list(&c.st, &c.client, Operation::ListApprovedHistoryForClient)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert!(list(&c.st, &c.client, Operation::ListPendingForClient)
            .await
            .unwrap()
            .is_empty());

        settle().await;
        let to_client = c.mail.sent_to("client@example.com");
        assert_eq!(to_client.len(), 1);
        assert!(to_client[0].subject.contains("submitted"));
        let to_owner = c.mail.sent_to("owner@example.com");
        assert_eq!(to_owner.len(), 1);
        assert!(to_owner[0].body.contains(&ts.id.to_string()));
    }

    #[tokio::test]
    async fn submit_validates_input() {
        let c = cast().await;
        let cases = [
            SubmitTimesheetRequest { date: None, ..submission(c.client.id, "2025-09-13", 1.0) },
            submission(c.client.id, "13/09/2025", 1.0),
            submission(c.client.id, "2025-09-13", 0.0),
            SubmitTimesheetRequest { client_id: None, ..submission(c.client.id, "2025-09-13", 1.0) },
            submission(Uuid::new_v4(), "2025-09-13", 1.0),
            // staff are not clients
            submission(c.staff.id, "2025-09-13", 1.0),
        ];
        for req in cases {
            let err = submit(&c.st, &c.staff, req).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{err:?}");
        }
        assert!(c.st.timesheets.list(TimesheetFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_is_staff_only_and_respects_assignment() {
        let c = cast().await;
        let err = submit(&c.st, &c.owner, submission(c.client.id, "2025-09-13", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let other = add_user(&c.st, Role::Client, "other@example.com").await;
        let bound =
            add_user_assigned(&c.st, Role::Staff, "bound@example.com", Some(c.client.id)).await;
        let err = submit(&c.st, &bound, submission(other.id, "2025-09-13", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
        assert!(submit(&c.st, &bound, submission(c.client.id, "2025-09-13", 1.0)).await.is_ok());
    }

    #[tokio::test]
    async fn approve_is_scoped_to_own_pending_records() {
        let c = cast().await;
        let other = add_user(&c.st, Role::Client, "other@example.com").await;
        let ts = submit(&c.st, &c.staff, submission(c.client.id, "2025-09-13", 2.0))
            .await
            .unwrap();

        // foreign and missing look the same
        assert!(matches!(approve(&c.st, &other, ts.id).await.unwrap_err(), AppError::NotFound));
        assert!(matches!(
            approve(&c.st, &c.client, Uuid::new_v4()).await.unwrap_err(),
            AppError::NotFound
        ));
        assert!(matches!(approve(&c.st, &c.staff, ts.id).await.unwrap_err(), AppError::Forbidden));

        approve(&c.st, &c.client, ts.id).await.unwrap();
        assert!(matches!(approve(&c.st, &c.client, ts.id).await.unwrap_err(), AppError::NotFound));

        settle().await;
        assert_eq!(c.mail.sent_to("owner@example.com").len(), 1);
    }

    #[tokio::test]
    async fn archive_from_any_state_is_terminal() {
        let c = cast().await;
        let a = submit(&c.st, &c.staff, submission(c.client.id, "2025-09-13", 1.0)).await.unwrap();
        let b = submit(&c.st, &c.staff, submission(c.client.id, "2025-09-14", 1.0)).await.unwrap();
        approve(&c.st, &c.client, b.id).await.unwrap();

        for id in [a.id, b.id] {
            let ts = archive(&c.st, &c.owner, id).await.unwrap();
            assert_eq!(ts.status, Status::Archived);
            assert!(ts.approved_at.is_none());
        }
        assert!(matches!(approve(&c.st, &c.client, a.id).await.unwrap_err(), AppError::NotFound));
        assert!(matches!(archive(&c.st, &c.client, a.id).await.unwrap_err(), AppError::Forbidden));
        assert!(matches!(
            archive(&c.st, &c.owner, Uuid::new_v4()).await.unwrap_err(),
            AppError::NotFound
        ));
    }

    #[tokio::test]
    async fn reassign_changes_staff_but_not_status() {
        let c = cast().await;
        let other_staff = add_user(&c.st, Role::Staff, "other@example.com").await;
        let ts = submit(&c.st, &c.staff, submission(c.client.id, "2025-09-13", 3.0)).await.unwrap();
        approve(&c.st, &c.client, ts.id).await.unwrap();

        let moved = reassign(&c.st, &c.owner, ts.id, Some(&other_staff.id.to_string()))
            .await
            .unwrap();
        assert_eq!(moved.staff_id, other_staff.id);
        assert_eq!(moved.status, Status::Approved);

        // unchecked target by default
        let anyone = Uuid::new_v4().to_string();
        assert!(reassign(&c.st, &c.owner, ts.id, Some(&anyone)).await.is_ok());

        assert!(matches!(
            reassign(&c.st, &c.owner, Uuid::new_v4(), Some(&anyone)).await.unwrap_err(),
            AppError::NotFound
        ));
        assert!(matches!(
            reassign(&c.st, &c.owner, ts.id, None).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn reassign_can_require_a_staff_target() {
        let (st, _) = AppState::fake_with(|cfg| cfg.reassign_require_staff = true);
        let owner = add_user(&st, Role::Owner, "owner@example.com").await;
        let staff = add_user(&st, Role::Staff, "staff@example.com").await;
        let client = add_user(&st, Role::Client, "client@example.com").await;
        let ts = submit(&st, &staff, submission(client.id, "2025-09-13", 1.0)).await.unwrap();

        let err = reassign(&st, &owner, ts.id, Some(&client.id.to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(reassign(&st, &owner, ts.id, Some(&staff.id.to_string())).await.is_ok());
    }

    #[tokio::test]
    async fn deletes_are_owner_only_and_idempotent() {
        let c = cast().await;
        let ts = submit(&c.st, &c.staff, submission(c.client.id, "2025-09-13", 1.0)).await.unwrap();
        submit(&c.st, &c.staff, submission(c.client.id, "2025-09-14", 1.0)).await.unwrap();

        assert!(matches!(delete_one(&c.st, &c.staff, ts.id).await.unwrap_err(), AppError::Forbidden));
        delete_one(&c.st, &c.owner, ts.id).await.unwrap();
        delete_one(&c.st, &c.owner, ts.id).await.unwrap();
        assert!(c.st.timesheets.get(ts.id).await.unwrap().is_none());

        assert_eq!(delete_all(&c.st, &c.owner).await.unwrap(), 1);
        assert!(list(&c.st, &c.owner, Operation::ListAll).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn role_views_filter_and_order_by_recency() {
        let c = cast().await;
        let first = submit(&c.st, &c.staff, submission(c.client.id, "2025-09-01", 1.0)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = submit(&c.st, &c.staff, submission(c.client.id, "2025-09-02", 1.0)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        // approving the older one makes it the most recent
        approve(&c.st, &c.client, first.id).await.unwrap();

        let history = list(&c.st, &c.owner, Operation::ListFullHistoryForOwner).await.unwrap();
        let ids: Vec<_> = history.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        let pending = list(&c.st, &c.owner, Operation::ListPendingForOwner).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);

        assert_eq!(list(&c.st, &c.owner, Operation::ListApproved).await.unwrap().len(), 1);
        assert_eq!(list(&c.st, &c.staff, Operation::ListHistoryForStaff).await.unwrap().len(), 2);
        assert_eq!(list(&c.st, &c.staff, Operation::ListPendingForStaff).await.unwrap().len(), 1);

        assert!(matches!(
            list(&c.st, &c.client, Operation::ListAll).await.unwrap_err(),
            AppError::Forbidden
        ));
        assert!(matches!(
            list(&c.st, &c.staff, Operation::ListPendingForOwner).await.unwrap_err(),
            AppError::Forbidden
        ));
    }

    #[tokio::test]
    async fn client_views_carry_staff_contact() {
        let c = cast().await;
        let ts = submit(&c.st, &c.staff, submission(c.client.id, "2025-09-13", 1.0)).await.unwrap();

        let views = list_with_staff(&c.st, &c.client, Operation::ListPendingForClient)
            .await
            .unwrap();
        assert_eq!(views[0].staff_name.as_deref(), Some("staff"));
        assert_eq!(views[0].staff_email.as_deref(), Some("staff@example.com"));

        reassign(&c.st, &c.owner, ts.id, Some(&Uuid::new_v4().to_string())).await.unwrap();
        let views = list_with_staff(&c.st, &c.client, Operation::ListPendingForClient)
            .await
            .unwrap();
        assert!(views[0].staff_name.is_none());
        assert!(views[0].staff_email.is_none());

        let json = serde_json::to_value(&views[0]).unwrap();
        assert_eq!(json["status"], "submitted");
        assert_eq!(json["date"], "2025-09-13");
        assert!(json["staff_name"].is_null());
    }
}
