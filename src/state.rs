use std::sync::Arc;

use crate::auth::repo::ResetTokenStore;
use crate::config::AppConfig;
use crate::db::PgStore;
use crate::mailer::{notifier_from_config, Dispatcher, Notifier};
use crate::memstore::MemoryStore;
use crate::timesheets::repo::TimesheetStore;
use crate::users::repo::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub timesheets: Arc<dyn TimesheetStore>,
    pub resets: Arc<dyn ResetTokenStore>,
    pub mailer: Dispatcher,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let notifier = notifier_from_config(&config.mail)?;

        match config.database_url.clone() {
            Some(url) => {
                let store = Arc::new(PgStore::connect(&url).await?);
                store.migrate().await?;
                tracing::info!("using postgres store");
                Ok(Self::from_parts(
                    config,
                    store.clone(),
                    store.clone(),
                    store,
                    notifier,
                ))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; records are kept in memory only");
                Ok(Self::in_memory(config, notifier))
            }
        }
    }

    pub fn in_memory(config: AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::from_parts(config, store.clone(), store.clone(), store, notifier)
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        timesheets: Arc<dyn TimesheetStore>,
        resets: Arc<dyn ResetTokenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            users,
            timesheets,
            resets,
            mailer: Dispatcher::new(notifier),
        }
    }
}

#[cfg(test)]
impl AppState {
    /// In-memory state with a recording mailer.
    pub fn fake() -> (Self, Arc<crate::mailer::testing::RecordingNotifier>) {
        Self::fake_with(|_| {})
    }

    pub fn fake_with(
        tweak: impl FnOnce(&mut AppConfig),
    ) -> (Self, Arc<crate::mailer::testing::RecordingNotifier>) {
        let mut config = Self::test_config();
        tweak(&mut config);
        let recorder = Arc::new(crate::mailer::testing::RecordingNotifier::default());
        (Self::in_memory(config, recorder.clone()), recorder)
    }

    pub fn test_config() -> AppConfig {
        use crate::config::{JwtConfig, MailConfig, SeedConfig};

        AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 60 * 24 * 7,
            },
            mail: MailConfig {
                host: None,
                port: 587,
                username: None,
                password: None,
                from: "no-reply@test.local".into(),
            },
            seed: SeedConfig {
                owner_email: "owner@example.com".into(),
                owner_password: "ownerpass".into(),
                client_email: "client@example.com".into(),
                client_password: "clientpass".into(),
            },
            public_base_url: "http://portal.test".into(),
            reset_ttl_minutes: 60,
            reassign_require_staff: false,
        }
    }
}
