use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use tracing::{info, warn};

use crate::config::MailConfig;

/// Outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn timesheet_submitted(to: &str, timesheet_id: uuid::Uuid) -> Self {
        Self::new(
            to,
            "Timesheet submitted for your approval",
            format!("A timesheet ({timesheet_id}) has been submitted for your approval."),
        )
    }

    pub fn timesheet_approved(to: &str, timesheet_id: uuid::Uuid) -> Self {
        Self::new(
            to,
            format!("Timesheet approved: {timesheet_id}"),
            format!("Timesheet {timesheet_id} has been approved."),
        )
    }

    pub fn invitation(to: &str, name: &str) -> Self {
        Self::new(
            to,
            "You have been invited to the timesheet portal",
            format!(
                "Hello {name},\n\nAn account was created for you. Email: {to}\n\
                 Please use the password provided by the owner to log in. \
                 You can reset your password if needed."
            ),
        )
    }

    pub fn password_reset(to: &str, link: &str) -> Self {
        Self::new(
            to,
            "Password reset",
            format!("Click to reset your password: {link}\n\nThis link expires in one hour and can be used once."),
        )
    }

    pub fn password_changed(to: &str, name: &str) -> Self {
        Self::new(
            to,
            "Your password was changed",
            format!("Hello {name},\n\nYour account password has been updated."),
        )
    }

    pub fn account_deleted(to: &str, name: &str) -> Self {
        Self::new(
            to,
            "Account deleted",
            format!("Hello {name},\n\nYour account has been deleted by the owner."),
        )
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// SMTP delivery through lettre.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(cfg: &MailConfig, host: &str) -> anyhow::Result<Self> {
        let builder = if cfg.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .context("smtp relay setup")?
        .port(cfg.port);

        let builder = match (&cfg.username, &cfg.password) {
            (Some(user), Some(pass)) => {
                builder.credentials(Credentials::new(user.clone(), pass.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
            from: cfg.from.parse().context("invalid MAIL_FROM address")?,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient.parse().context("invalid recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("build email")?;
        self.transport.send(message).await.context("smtp send")?;
        info!(to = %recipient, subject = %subject, "email sent");
        Ok(())
    }
}

/// Development fallback: writes messages to the log instead of sending them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(to = %recipient, subject = %subject, body = %body, "email (not sent, SMTP not configured)");
        Ok(())
    }
}

pub fn notifier_from_config(cfg: &MailConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    Ok(match &cfg.host {
        Some(host) => Arc::new(SmtpNotifier::new(cfg, host)?),
        None => {
            warn!("EMAIL_HOST not set; outgoing email will only be logged");
            Arc::new(LogNotifier)
        }
    })
}

/// Fire-and-forget delivery. Failures are logged and never reach the caller.
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn dispatch(&self, email: Email) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&email.to, &email.subject, &email.body).await {
                warn!(error = %e, to = %email.to, subject = %email.subject, "email delivery failed");
            }
        });
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn dispatch_delivers_in_background() {
        let rec = Arc::new(RecordingNotifier::default());
        let dispatcher = Dispatcher::new(rec.clone());
        dispatcher.dispatch(Email::timesheet_approved("owner@example.com", uuid::Uuid::nil()));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let sent = rec.sent_to("owner@example.com");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.starts_with("Timesheet approved"));
    }

    #[tokio::test]
    async fn dispatch_survives_delivery_failures() {
        let failing = Arc::new(FailingNotifier::default());
        let dispatcher = Dispatcher::new(failing.clone());
        dispatcher.dispatch(Email::new("a@example.com", "s", "b"));
        dispatcher.dispatch(Email::new("b@example.com", "s", "b"));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(failing.attempts(), 2);
    }

    #[test]
    fn reset_email_embeds_link() {
        let email = Email::password_reset("a@example.com", "http://host/reset.html?token=abc");
        assert!(email.body.contains("reset.html?token=abc"));
    }
}
