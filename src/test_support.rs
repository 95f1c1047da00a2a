use lazy_static::lazy_static;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::password::hash_password,
    state::AppState,
    users::repo_types::{Role, User, UserSummary},
};

pub const PASSWORD: &str = "password123";

lazy_static! {
    static ref PASSWORD_HASH: String = hash_password(PASSWORD).unwrap();
}

/// Inserts a user directly into the store; every such user logs in with [`PASSWORD`].
pub async fn add_user(st: &AppState, role: Role, email: &str) -> UserSummary {
    add_user_assigned(st, role, email, None).await
}

pub async fn add_user_assigned(
    st: &AppState,
    role: Role,
    email: &str,
    assigned_client_id: Option<Uuid>,
) -> UserSummary {
    let user = User {
        id: Uuid::new_v4(),
        name: email.split('@').next().unwrap_or(email).to_string(),
        email: email.to_string(),
        password_hash: PASSWORD_HASH.clone(),
        role,
        assigned_client_id,
        created_at: OffsetDateTime::now_utc(),
    };
    assert!(st.users.insert(&user).await.unwrap(), "{email} already taken");
    UserSummary::from(user)
}

/// Lets spawned notification tasks run.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
}
