use std::path::PathBuf;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::NotificationEvent;
use crate::config::EmailConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("smtp transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build email: {0}")]
    Build(#[from] lettre::error::Error),
}

pub struct FileLogChannel {
    path: PathBuf,
}

impl FileLogChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let line = format!("{}\n", event.log_line());
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

pub struct EmailChannel {
    from: Mailbox,
    to: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let from: Mailbox = config.from.parse()?;
        let to: Mailbox = config.to.parse()?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .timeout(Some(config.timeout()));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            from,
            to,
            mailer: builder.build(),
        })
    }

    fn message(&self, event: &NotificationEvent) -> Result<Message, NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(event.email_subject())
            .header(ContentType::TEXT_PLAIN)
            .body(event.email_body())?;
        Ok(message)
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let message = self.message(event)?;
        self.mailer.send(message).await?;
        tracing::debug!(camera = %event.camera_id, to = %self.to, "alert email sent");
        Ok(())
    }
}

pub enum NotificationChannel {
    FileLog(FileLogChannel),
    Email(EmailChannel),
}

impl NotificationChannel {
    pub fn name(&self) -> &'static str {
        match self {
            NotificationChannel::FileLog(_) => "file",
            NotificationChannel::Email(_) => "email",
        }
    }

    pub async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        match self {
            NotificationChannel::FileLog(channel) => channel.deliver(event).await,
            NotificationChannel::Email(channel) => channel.deliver(event).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_config() -> EmailConfig {
        EmailConfig {
            enabled: true,
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            username: Some("alerts".into()),
            password: Some("secret".into()),
            from: "camwatch@example.com".into(),
            to: "owner@example.com".into(),
            timeout_secs: 10,
        }
    }

    #[tokio::test]
    async fn file_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.log");
        let channel = NotificationChannel::FileLog(FileLogChannel::new(&path));

        channel.deliver(&NotificationEvent::new("0", "person")).await.unwrap();
        channel.deliver(&NotificationEvent::new("1", "person")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] [Camera 0] Person detected"));
        assert!(lines[1].ends_with("] [Camera 1] Person detected"));
    }

    #[tokio::test]
    async fn file_log_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileLogChannel::new(dir.path().join("missing").join("n.log"));

        let err = channel
            .deliver(&NotificationEvent::new("0", "person"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Io(_)));
    }

    #[test]
    fn email_rejects_bad_address() {
        let mut config = email_config();
        config.to = "not-an-email".into();
        assert!(matches!(EmailChannel::new(&config), Err(NotifyError::Address(_))));
    }

    #[tokio::test]
    async fn email_message_carries_subject() {
        let channel = EmailChannel::new(&email_config()).unwrap();
        let message = channel.message(&NotificationEvent::new("3", "person")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Person Detected on Camera 3"));
        assert!(raw.contains("To: owner@example.com"));
    }
}
