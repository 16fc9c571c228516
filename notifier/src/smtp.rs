// notifier/src/smtp.rs
//! The one production [`Mailer`] implementation — a thin `lettre` wrapper.
//! Per SPEC_FULL.md §4.6, mail templates/branding beyond the single
//! template in `template.rs` are out of scope; this module only has to
//! get a rendered subject/body to an SMTP relay within the 15s budget
//! spec.md §5 allots.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::{Error, Mailer};

pub const SEND_TIMEOUT: Duration = Duration::from_secs(15);

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(relay: &str, username: String, password: String, from: String) -> Result<Self, Error> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(relay)
            .map_err(|e| Error::Mail(format!("invalid smtp relay {relay:?}: {e}")))?
            .credentials(Credentials::new(username, password))
            .timeout(Some(SEND_TIMEOUT))
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), Error> {
        let email = Message::builder()
            .from(self.from.parse().map_err(|e| Error::Mail(format!("bad from address: {e}")))?)
            .to(to.parse().map_err(|e| Error::Mail(format!("bad recipient address {to:?}: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| Error::Mail(format!("failed to build message: {e}")))?;

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| Error::Mail(format!("smtp send failed: {e}")))
    }
}
