//! Campaign dispatch over SMTP — async lettre transport.
//!
//! The dispatcher hands one rendered message to the configured relay; the
//! relay's list alias handles per-recipient fan-out. Deliverability is the
//! provider's problem, not the lifecycle engine's.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use lexfront_core::config::SmtpConfig;
use lexfront_core::error::{LexfrontError, Result};
use lexfront_lifecycle::campaign::Campaign;
use lexfront_lifecycle::notify::CampaignDispatcher;

/// SMTP-backed campaign dispatcher.
pub struct SmtpDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpDispatcher {
    /// Build a STARTTLS transport from config.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| LexfrontError::Dispatch(format!("SMTP relay: {e}")))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        let from = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| LexfrontError::Dispatch(format!("From address: {e}")))?;
        Ok(Self { transport, from })
    }

    fn build_message(&self, campaign: &Campaign) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.from.clone()) // list alias; relay expands recipients
            .subject(campaign.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(campaign.body_html.clone())
            .map_err(|e| LexfrontError::Dispatch(format!("Build message: {e}")))
    }
}

#[async_trait]
impl CampaignDispatcher for SmtpDispatcher {
    async fn send(&self, campaign: &Campaign, recipients: u32) -> Result<()> {
        let message = self.build_message(campaign)?;
        tracing::debug!(
            "📧 Handing '{}' to SMTP relay ({recipients} recipients)",
            campaign.subject
        );
        self.transport
            .send(message)
            .await
            .map_err(|e| LexfrontError::Dispatch(format!("SMTP send: {e}")))?;
        Ok(())
    }
}

/// Stand-in dispatcher for deployments without SMTP credentials: logs the
/// handoff and sleeps a fixed delay to mimic a relay round trip.
pub struct StubDispatcher {
    delay_ms: u64,
}

impl StubDispatcher {
    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

impl Default for StubDispatcher {
    fn default() -> Self {
        Self::new(500)
    }
}

#[async_trait]
impl CampaignDispatcher for StubDispatcher {
    async fn send(&self, campaign: &Campaign, recipients: u32) -> Result<()> {
        tracing::info!(
            "📧 [stub] Would send '{}' to {recipients} recipients",
            campaign.subject
        );
        tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        Ok(())
    }
}
