//! Blog post entity and its publication state machine.
//!
//! Two states only: a post is a draft until it's published. The interesting
//! part is the optional trigger time — a draft with `publish_at` set is
//! picked up by the sweeper once the trigger elapses.

use chrono::{DateTime, Utc};
use lexfront_core::error::{LexfrontError, Result};
use serde::{Deserialize, Serialize};

/// Publication state of a post.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostState {
    Draft,
    Published,
}

impl PostState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "published" => Self::Published,
            _ => Self::Draft,
        }
    }
}

/// A blog post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Unique post ID, immutable.
    pub id: String,
    pub title: String,
    /// URL slug, used to build the public page URL.
    pub slug: String,
    pub body: String,
    pub state: PostState,
    /// Trigger time: when set on a draft, the sweeper publishes the post
    /// once this time elapses.
    pub publish_at: Option<DateTime<Utc>>,
    /// Set exactly once, at the moment the post becomes published.
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Create a new draft.
    pub fn new(title: &str, slug: &str, body: &str) -> Self {
        let now = Utc::now();
        Self {
            id: format!("post-{}", uuid::Uuid::new_v4()),
            title: title.to_string(),
            slug: slug.to_string(),
            body: body.to_string(),
            state: PostState::Draft,
            publish_at: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Public page URL for this post.
    pub fn url(&self, base_url: &str) -> String {
        format!("{}/blog/{}", base_url.trim_end_matches('/'), self.slug)
    }

    /// Whether the sweeper should publish this post at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == PostState::Draft && self.publish_at.is_some_and(|t| t <= now)
    }

    /// Publish the post. Idempotent: publishing an already-published post
    /// leaves it untouched (the sweeper may see the same row twice when a
    /// tick overlaps a slow predecessor). Returns whether anything changed.
    pub fn publish(&mut self, now: DateTime<Utc>) -> bool {
        if self.state == PostState::Published {
            return false;
        }
        self.state = PostState::Published;
        self.published_at = Some(now);
        self.publish_at = None;
        self.updated_at = now;
        true
    }

    /// Set the trigger time. Past and present times are accepted — they
    /// mean "publish on the next sweep", not an error. Only drafts can be
    /// scheduled.
    pub fn schedule(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.state != PostState::Draft {
            return Err(LexfrontError::InvalidState(format!(
                "post {} is already published",
                self.id
            )));
        }
        self.publish_at = Some(at);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Clear the trigger time.
    pub fn cancel_schedule(&mut self) -> Result<()> {
        if self.publish_at.is_none() {
            return Err(LexfrontError::InvalidState(format!(
                "post {} has no scheduled publication",
                self.id
            )));
        }
        self.publish_at = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Take a published post back to draft.
    pub fn unpublish(&mut self) -> Result<()> {
        if self.state != PostState::Published {
            return Err(LexfrontError::InvalidState(format!(
                "post {} is not published",
                self.id
            )));
        }
        self.state = PostState::Draft;
        self.published_at = None;
        self.publish_at = None;
        self.updated_at = Utc::now();
        Ok(())
    }
}
