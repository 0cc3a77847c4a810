//! Publication entity and its input rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, Owned};
use crate::error::{DomainError, DomainResult};
use crate::id::{PublicationId, UserId};

/// A stored publication with its author's nick joined in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub id: PublicationId,
    pub title: String,
    pub content: String,
    pub author_id: UserId,
    pub author_nick: String,
    pub likes: u64,
    pub created_at: DateTime<Utc>,
}

impl Publication {
    pub fn like(&mut self) {
        self.likes = self.likes.saturating_add(1);
    }

    /// Decrement the like counter, never below zero.
    pub fn unlike(&mut self) {
        self.likes = self.likes.saturating_sub(1);
    }
}

impl Entity for Publication {
    type Id = PublicationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for Publication {
    fn owner(&self) -> UserId {
        self.author_id
    }
}

/// Raw publication body. Has no author field: the author is always the
/// authenticated actor, whatever the client sends.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublicationPayload {
    pub title: String,
    pub content: String,
}

impl PublicationPayload {
    /// Validate a new publication and bind it to its author.
    pub fn prepare(self, author_id: UserId) -> DomainResult<PublicationDraft> {
        let edit = self.prepare_edit()?;
        Ok(PublicationDraft {
            title: edit.title,
            content: edit.content,
            author_id,
        })
    }

    /// Validate an edit of an existing publication.
    pub fn prepare_edit(self) -> DomainResult<PublicationEdit> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(DomainError::blank("title"));
        }
        if self.content.trim().is_empty() {
            return Err(DomainError::blank("content"));
        }
        Ok(PublicationEdit {
            title: title.to_string(),
            content: self.content,
        })
    }
}

/// Validated publication ready to be inserted. Title trimmed, content verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationDraft {
    pub title: String,
    pub content: String,
    pub author_id: UserId,
}

/// Validated replacement title/content for an existing publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationEdit {
    pub title: String,
    pub content: String,
}
