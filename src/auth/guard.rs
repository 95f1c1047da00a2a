//! Declarative access rules. Every service operation starts with
//! [`authorize`]; ownership-scoped lookups go through [`scope_timesheet`].

use tracing::warn;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    timesheets::repo_types::{Status, Timesheet},
    users::repo_types::{Role, UserSummary},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ViewProfile,
    ListClients,
    ListStaff,
    SubmitTimesheet,
    ListPendingForClient,
    ListApprovedHistoryForClient,
    ApproveTimesheet,
    ListHistoryForStaff,
    ListPendingForStaff,
    ListPendingForOwner,
    ListFullHistoryForOwner,
    ListApproved,
    ListAll,
    ReassignTimesheet,
    ArchiveTimesheet,
    DeleteTimesheet,
    DeleteAllTimesheets,
    CreateUser,
    ListUsers,
    ListUserTimesheets,
    DeleteUser,
}

/// Predicate a record must satisfy relative to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    None,
    /// The caller is the record's client and the record is still awaiting approval.
    PendingClientOfRecord,
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub roles: &'static [Role],
    pub ownership: Ownership,
}

const ANY: &[Role] = &[Role::Owner, Role::Staff, Role::Client];
const OWNER: &[Role] = &[Role::Owner];
const STAFF: &[Role] = &[Role::Staff];
const OWNER_OR_STAFF: &[Role] = &[Role::Owner, Role::Staff];
const CLIENT: &[Role] = &[Role::Client];

impl Operation {
    pub const ALL: [Operation; 21] = [
        Operation::ViewProfile,
        Operation::ListClients,
        Operation::ListStaff,
        Operation::SubmitTimesheet,
        Operation::ListPendingForClient,
        Operation::ListApprovedHistoryForClient,
        Operation::ApproveTimesheet,
        Operation::ListHistoryForStaff,
        Operation::ListPendingForStaff,
        Operation::ListPendingForOwner,
        Operation::ListFullHistoryForOwner,
        Operation::ListApproved,
        Operation::ListAll,
        Operation::ReassignTimesheet,
        Operation::ArchiveTimesheet,
        Operation::DeleteTimesheet,
        Operation::DeleteAllTimesheets,
        Operation::CreateUser,
        Operation::ListUsers,
        Operation::ListUserTimesheets,
        Operation::DeleteUser,
    ];

    pub const fn rule(self) -> Rule {
        use Operation::*;
        let (roles, ownership) = match self {
            ViewProfile | ListClients => (ANY, Ownership::None),
            ListStaff => (OWNER_OR_STAFF, Ownership::None),
            SubmitTimesheet | ListHistoryForStaff | ListPendingForStaff => (STAFF, Ownership::None),
            ListPendingForClient | ListApprovedHistoryForClient => (CLIENT, Ownership::None),
            ApproveTimesheet => (CLIENT, Ownership::PendingClientOfRecord),
            ListPendingForOwner
            | ListFullHistoryForOwner
            | ListApproved
            | ListAll
            | ReassignTimesheet
            | ArchiveTimesheet
            | DeleteTimesheet
            | DeleteAllTimesheets
            | CreateUser
            | ListUsers
            | ListUserTimesheets
            | DeleteUser => (OWNER, Ownership::None),
        };
        Rule { roles, ownership }
    }
}

/// Role gate. Fails `Forbidden` when the caller's role is not listed for `op`.
pub fn authorize(caller: &UserSummary, op: Operation) -> AppResult<()> {
    if op.rule().roles.contains(&caller.role) {
        Ok(())
    } else {
        warn!(user_id = %caller.id, role = %caller.role, op = ?op, "forbidden");
        Err(AppError::Forbidden)
    }
}

/// Applies the ownership predicate of `op` to a looked-up record. Absence and
/// predicate failure are both reported as `NotFound`.
pub fn scope_timesheet(
    caller: &UserSummary,
    op: Operation,
    record: Option<Timesheet>,
) -> AppResult<Timesheet> {
    let ts = record.ok_or(AppError::NotFound)?;
    let visible = match op.rule().ownership {
        Ownership::None => true,
        Ownership::PendingClientOfRecord => {
            ts.client_id == caller.id && ts.status == Status::Submitted
        }
    };
    if visible {
        Ok(ts)
    } else {
        Err(AppError::NotFound)
    }
}

/// Parses a record id taken from the URL. A value that is not an id names no
/// record, so it reads as `NotFound`, but only once the role check has passed.
pub fn path_id(caller: &UserSummary, op: Operation, raw: &str) -> AppResult<Uuid> {
    match Uuid::parse_str(raw.trim()) {
        Ok(id) => Ok(id),
        Err(_) => {
            authorize(caller, op)?;
            Err(AppError::NotFound)
        }
    }
}
