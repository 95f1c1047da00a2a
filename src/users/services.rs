use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CreateUserRequest, DirectoryEntry},
    repo_types::{Role, User, UserSummary},
};
use crate::{
    auth::{
        guard::{authorize, Operation},
        password::hash_password,
        services::{is_valid_email, normalize_email},
    },
    error::{AppError, AppResult},
    mailer::Email,
    state::AppState,
    timesheets::repo_types::{Timesheet, TimesheetFilter},
};

/// Result of [`create_user`]. Re-inviting an existing email hands back the
/// stored account untouched so the owner can safely repeat an invitation.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(UserSummary),
    Existing(UserSummary),
}

fn required<'a>(value: &'a Option<String>, field: &str) -> AppResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::validation(format!("Missing field: {field}")))
}

#[instrument(skip(st, caller, req), fields(caller = %caller.id))]
pub async fn create_user(
    st: &AppState,
    caller: &UserSummary,
    req: CreateUserRequest,
) -> AppResult<CreateOutcome> {
    authorize(caller, Operation::CreateUser)?;

    let name = required(&req.name, "name")?.to_string();
    let email = normalize_email(required(&req.email, "email")?);
    let password = req
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::validation("Missing field: password"))?;
    let role: Role = required(&req.role, "role")?
        .parse()
        .map_err(|_| AppError::validation("Invalid role"))?;
    if role == Role::Owner {
        return Err(AppError::validation("Invalid role"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::validation("Invalid email"));
    }

    if let Some(existing) = st.users.find_by_email(&email).await? {
        info!(user_id = %existing.id, "create_user: email already registered, returning existing");
        return Ok(CreateOutcome::Existing(existing.into()));
    }

    let assigned_client_id = match (role, req.assigned_client_id) {
        (Role::Staff, Some(client_id)) => {
            match st.users.get(client_id).await? {
                Some(u) if u.role == Role::Client => Some(client_id),
                _ => return Err(AppError::validation("Assigned client does not exist")),
            }
        }
        _ => None,
    };

    let user = User {
        id: Uuid::new_v4(),
        name,
        email,
        password_hash: hash_password(password)?,
        role,
        assigned_client_id,
        created_at: OffsetDateTime::now_utc(),
    };
    if !st.users.insert(&user).await? {
        // Lost a race with a concurrent create for the same email.
        let existing = st
            .users
            .find_by_email(&user.email)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {} vanished after conflict", user.email))?;
        info!(user_id = %existing.id, "create_user: email registered concurrently, returning existing");
        return Ok(CreateOutcome::Existing(existing.into()));
    }
    st.mailer.dispatch(Email::invitation(&user.email, &user.name));

    info!(user_id = %user.id, role = %user.role, "user created");
    Ok(CreateOutcome::Created(user.into()))
}

pub async fn list_users(st: &AppState, caller: &UserSummary) -> AppResult<Vec<UserSummary>> {
    authorize(caller, Operation::ListUsers)?;
    let users = st.users.list().await?;
    Ok(users.into_iter().map(UserSummary::from).collect())
}

/// Every timesheet the user appears on, as staff or as client.
pub async fn list_user_timesheets(
    st: &AppState,
    caller: &UserSummary,
    user_id: Uuid,
) -> AppResult<Vec<Timesheet>> {
    authorize(caller, Operation::ListUserTimesheets)?;
    Ok(st
        .timesheets
        .list(TimesheetFilter::all().involving(user_id))
        .await?)
}

/// Removes an account. Without `force`, an account that still appears on
/// timesheets is refused with the affected records. Forced deletion leaves
/// those timesheets in place; the returned count says how many.
#[instrument(skip(st, caller), fields(caller = %caller.id))]
pub async fn delete_user(
    st: &AppState,
    caller: &UserSummary,
    user_id: Uuid,
    force: bool,
) -> AppResult<usize> {
    authorize(caller, Operation::DeleteUser)?;

    let target = st.users.get(user_id).await?.ok_or(AppError::NotFound)?;
    if target.role == Role::Owner {
        warn!(%user_id, "attempt to delete owner account");
        return Err(AppError::validation("The owner account cannot be deleted"));
    }

    let related = st
        .timesheets
        .list(TimesheetFilter::all().involving(user_id))
        .await?;
    if !related.is_empty() && !force {
        warn!(%user_id, count = related.len(), "delete blocked by timesheets");
        return Err(AppError::Conflict {
            message: "User has timesheets; pass force=true to delete anyway".into(),
            timesheets: related,
        });
    }

    st.users.delete(user_id).await?;
    if !related.is_empty() {
        warn!(%user_id, orphaned = related.len(), "user deleted, timesheets left orphaned");
    }
    st.mailer
        .dispatch(Email::account_deleted(&target.email, &target.name));
    info!(%user_id, "user deleted");
    Ok(related.len())
}

/// Client directory scoped to the caller.
pub async fn list_clients(st: &AppState, caller: &UserSummary) -> AppResult<Vec<DirectoryEntry>> {
    authorize(caller, Operation::ListClients)?;

    let visible: Vec<User> = match (caller.role, caller.assigned_client_id) {
        (Role::Client, _) => st.users.get(caller.id).await?.into_iter().collect(),
        (Role::Staff, Some(client_id)) => st
            .users
            .get(client_id)
            .await?
            .filter(|u| u.role == Role::Client)
            .into_iter()
            .collect(),
        _ => st.users.list_by_role(Role::Client).await?,
    };
    Ok(visible.into_iter().map(DirectoryEntry::from).collect())
}

pub async fn list_staff(st: &AppState, caller: &UserSummary) -> AppResult<Vec<DirectoryEntry>> {
    authorize(caller, Operation::ListStaff)?;
    let staff = st.users.list_by_role(Role::Staff).await?;
    Ok(staff.into_iter().map(DirectoryEntry::from).collect())
}

/// Ensures an owner and at least one client exist.
pub async fn seed_accounts(st: &AppState) -> anyhow::Result<()> {
    let seed = &st.config.seed;
    let wanted = [
        (Role::Owner, "Owner", &seed.owner_email, &seed.owner_password),
        (Role::Client, "Client", &seed.client_email, &seed.client_password),
    ];

    for (role, name, email, password) in wanted {
        if !st.users.list_by_role(role).await?.is_empty() {
            continue;
        }
        let email = normalize_email(email);
        if st.users.find_by_email(&email).await?.is_some() {
            warn!(%email, %role, "seed email already taken by another role; skipping");
            continue;
        }
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email,
            password_hash: hash_password(password)?,
            role,
            assigned_client_id: None,
            created_at: OffsetDateTime::now_utc(),
        };
        if !st.users.insert(&user).await? {
            warn!(email = %user.email, %role, "seed email taken concurrently; skipping");
            continue;
        }
        info!(user_id = %user.id, email = %user.email, %role, "seeded account");
    }
    Ok(())
}
