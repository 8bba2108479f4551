//! Newsletter campaign entity and its send state machine.
//!
//! draft → scheduled → sending → sent | failed, with a cancel path back to
//! draft. `Sending` is a visible intermediate state on purpose: a second
//! trigger (concurrent admin click, overlapping sweep tick) that observes a
//! campaign mid-dispatch must refuse to re-trigger it.

use chrono::{DateTime, Utc};
use lexfront_core::error::{LexfrontError, Result};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a campaign. `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CampaignState {
    Draft,
    Scheduled,
    Sending,
    Sent,
    Failed,
}

impl CampaignState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "scheduled" => Self::Scheduled,
            "sending" => Self::Sending,
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            _ => Self::Draft,
        }
    }

    /// Whether a send may begin from this state.
    pub fn can_send(&self) -> bool {
        matches!(self, Self::Draft | Self::Scheduled)
    }
}

/// An outbound newsletter campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Unique campaign ID, immutable.
    pub id: String,
    pub subject: String,
    pub body_html: String,
    pub state: CampaignState,
    /// Only meaningful while `Scheduled`; cleared on cancel and on the
    /// transition to `Sending`.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Set once, when the campaign reaches `Sent`.
    pub sent_at: Option<DateTime<Utc>>,
    /// Subscriber snapshot frozen at the moment sending begins. Must not
    /// change after the campaign leaves `Sending`.
    pub recipient_count: u32,
    pub open_count: u32,
    pub click_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Create a new draft campaign.
    pub fn new(subject: &str, body_html: &str) -> Self {
        let now = Utc::now();
        Self {
            id: format!("cmp-{}", uuid::Uuid::new_v4()),
            subject: subject.to_string(),
            body_html: body_html.to_string(),
            state: CampaignState::Draft,
            scheduled_for: None,
            sent_at: None,
            recipient_count: 0,
            open_count: 0,
            click_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the sweeper should send this campaign at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == CampaignState::Scheduled && self.scheduled_for.is_some_and(|t| t <= now)
    }

    /// Schedule the campaign. Unlike posts, the time must be strictly in
    /// the future — admins wanting an immediate send use send-now.
    pub fn schedule(&mut self, at: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        if !matches!(self.state, CampaignState::Draft | CampaignState::Scheduled) {
            return Err(LexfrontError::InvalidState(format!(
                "campaign {} is {} and cannot be scheduled",
                self.id,
                self.state.as_str()
            )));
        }
        if at <= now {
            return Err(LexfrontError::InvalidTrigger(format!(
                "scheduled time {at} is not in the future"
            )));
        }
        self.state = CampaignState::Scheduled;
        self.scheduled_for = Some(at);
        self.updated_at = now;
        Ok(())
    }

    /// Cancel a scheduled send, returning the campaign to draft.
    pub fn cancel_schedule(&mut self) -> Result<()> {
        if self.state != CampaignState::Scheduled {
            return Err(LexfrontError::InvalidState(format!(
                "campaign {} is {}, not scheduled",
                self.id,
                self.state.as_str()
            )));
        }
        self.state = CampaignState::Draft;
        self.scheduled_for = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Begin sending: snapshot the recipient count and enter `Sending`.
    /// Rejects any state other than draft/scheduled — this is the
    /// double-send guard.
    pub fn begin_sending(&mut self, recipients: u32, now: DateTime<Utc>) -> Result<()> {
        if !self.state.can_send() {
            return Err(LexfrontError::InvalidState(format!(
                "campaign {} is {} and cannot be sent",
                self.id,
                self.state.as_str()
            )));
        }
        self.state = CampaignState::Sending;
        self.recipient_count = recipients;
        self.scheduled_for = None;
        self.updated_at = now;
        Ok(())
    }

    /// Dispatch succeeded.
    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.state = CampaignState::Sent;
        self.sent_at = Some(now);
        self.updated_at = now;
    }

    /// Dispatch failed after retries. Terminal.
    pub fn mark_failed(&mut self) {
        self.state = CampaignState::Failed;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_schedule_requires_future_time() {
        let mut c = Campaign::new("March update", "<p>hi</p>");
        let now = Utc::now();
        assert!(matches!(
            c.schedule(now, now),
            Err(LexfrontError::InvalidTrigger(_))
        ));
        assert!(matches!(
            c.schedule(now - Duration::seconds(1), now),
            Err(LexfrontError::InvalidTrigger(_))
        ));
        assert_eq!(c.state, CampaignState::Draft);
        assert!(c.scheduled_for.is_none());

        c.schedule(now + Duration::hours(1), now).unwrap();
        assert_eq!(c.state, CampaignState::Scheduled);
    }

    #[test]
    fn test_reschedule_while_scheduled() {
        let mut c = Campaign::new("t", "");
        let now = Utc::now();
        c.schedule(now + Duration::hours(1), now).unwrap();
        c.schedule(now + Duration::hours(2), now).unwrap();
        assert_eq!(c.scheduled_for, Some(now + Duration::hours(2)));
    }

    #[test]
    fn test_cancel_returns_to_draft() {
        let mut c = Campaign::new("t", "");
        let now = Utc::now();
        c.schedule(now + Duration::hours(1), now).unwrap();
        c.cancel_schedule().unwrap();
        assert_eq!(c.state, CampaignState::Draft);
        assert!(c.scheduled_for.is_none());
        assert!(!c.is_due(now + Duration::hours(2)));
        // Cancel on a draft is not legal.
        assert!(c.cancel_schedule().is_err());
    }

    #[test]
    fn test_begin_sending_snapshots_and_guards() {
        let mut c = Campaign::new("t", "");
        let now = Utc::now();
        c.begin_sending(412, now).unwrap();
        assert_eq!(c.state, CampaignState::Sending);
        assert_eq!(c.recipient_count, 412);

        // Every non-draft/scheduled state refuses a second trigger.
        let mut again = c.clone();
        assert!(again.begin_sending(999, now).is_err());
        assert_eq!(again.recipient_count, 412);

        c.mark_sent(now);
        assert!(c.clone().begin_sending(999, now).is_err());
        c.mark_failed();
        assert!(c.begin_sending(999, now).is_err());
    }

    #[test]
    fn test_sent_sets_timestamp_failed_does_not() {
        let now = Utc::now();
        let mut ok = Campaign::new("t", "");
        ok.begin_sending(10, now).unwrap();
        ok.mark_sent(now);
        assert_eq!(ok.sent_at, Some(now));

        let mut bad = Campaign::new("t", "");
        bad.begin_sending(10, now).unwrap();
        bad.mark_failed();
        assert_eq!(bad.state, CampaignState::Failed);
        assert!(bad.sent_at.is_none());
        assert_eq!(bad.recipient_count, 10);
    }

    #[test]
    fn test_due_only_when_scheduled_and_elapsed() {
        let mut c = Campaign::new("t", "");
        let now = Utc::now();
        assert!(!c.is_due(now));
        c.schedule(now + Duration::minutes(5), now).unwrap();
        assert!(!c.is_due(now));
        assert!(c.is_due(now + Duration::minutes(5)));
    }
}
