mod app;
mod auth;
mod config;
mod db;
mod error;
mod extractors;
mod mailer;
mod memstore;
mod state;
mod timesheets;
mod users;

#[cfg(test)]
mod test_support;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        "timesheet_portal=debug,axum=info,tower_http=info".to_string()
    });
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = state::AppState::init().await?;
    users::services::seed_accounts(&state).await?;

    app::serve(app::build_app(state)).await
}
