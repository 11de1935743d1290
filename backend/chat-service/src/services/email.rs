//! Outbound mail for verification codes and sign-in alerts

use crate::config::EmailConfig;
use crate::error::{AppError, AppResult};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const NOOP_OUTBOX_CAPACITY: usize = 100;

/// Mail that would have gone out in no-op mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Async SMTP transport or, without a configured host, a logging no-op that
/// keeps the most recent messages in memory.
#[derive(Clone)]
pub struct EmailService {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
    outbox: Arc<Mutex<VecDeque<OutgoingMail>>>,
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> AppResult<Self> {
        let from = config
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| AppError::Config(format!("invalid SMTP_FROM address: {e}")))?;

        let transport = match &config.smtp_host {
            None => {
                warn!("SMTP host not configured; email service will operate in no-op mode");
                None
            }
            Some(host) => {
                let builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    .map_err(|e| {
                        AppError::Config(format!("failed to configure SMTP transport: {e}"))
                    })?
                    .port(config.smtp_port);

                let builder = if let (Some(username), Some(password)) =
                    (&config.smtp_username, &config.smtp_password)
                {
                    builder.credentials(Credentials::new(username.clone(), password.clone()))
                } else {
                    builder
                };

                Some(Arc::new(builder.build()))
            }
        };

        Ok(Self {
            transport,
            from,
            outbox: Arc::new(Mutex::new(VecDeque::new())),
        })
    }

    /// No-op mailer with the default sender.
    pub fn disabled() -> AppResult<Self> {
        Self::new(&EmailConfig {
            from_address: "chatline <no-reply@chatline.local>".into(),
            ..EmailConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    pub async fn send_verification_code(
        &self,
        recipient: &str,
        name: &str,
        code: &str,
        subject: &str,
    ) -> AppResult<()> {
        let body = format!(
            "Hi {name},\n\nYour chatline code is {code}.\nIt expires in 10 minutes.\n\n\
             If you did not request this, please ignore this email."
        );
        self.send_mail(recipient, subject, &body).await
    }

    pub async fn send_active_login_alert(
        &self,
        recipient: &str,
        name: &str,
        device: &str,
        address: &str,
        login_time: &str,
    ) -> AppResult<()> {
        let body = format!(
            "Hi {name},\n\nYour account was just signed in from a different device.\n\n\
             Time: {login_time}\nDevice: {device}\nIP address: {address}\n\n\
             If this was not you, change your password right away."
        );
        self.send_mail(recipient, "New sign-in to your chatline account", &body)
            .await
    }

    async fn send_mail(&self, recipient: &str, subject: &str, body: &str) -> AppResult<()> {
        if let Some(transport) = &self.transport {
            let to = recipient
                .parse::<Mailbox>()
                .map_err(|e| AppError::Email(format!("invalid recipient address: {e}")))?;

            let email = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(subject)
                .header(header::ContentType::TEXT_PLAIN)
                .body(body.to_string())
                .map_err(|e| AppError::Email(format!("failed to build message: {e}")))?;

            transport
                .send(email)
                .await
                .map_err(|e| AppError::Email(format!("failed to send: {e}")))?;
            info!(subject, "email sent");
        } else {
            info!(subject, recipient, "email service in no-op mode; skipping send");
            let mut outbox = self.outbox.lock().await;
            if outbox.len() == NOOP_OUTBOX_CAPACITY {
                outbox.pop_front();
            }
            outbox.push_back(OutgoingMail {
                recipient: recipient.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        }
        Ok(())
    }

    /// Messages recorded in no-op mode, oldest first.
    pub async fn outbox(&self) -> Vec<OutgoingMail> {
        self.outbox.lock().await.iter().cloned().collect()
    }
}
