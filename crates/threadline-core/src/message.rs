//! Message entities.
//!
//! A message is identified by a [`MessageId`] that is either a client-local
//! token (optimistic, not yet acknowledged) or a server id. The two spaces
//! cannot collide because they are different variants.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use threadline_proto::{AttachmentUpload, ServerId, UserId, WireMessage};

use crate::StoreError;

/// Client-local identifier of an optimistic message.
///
/// Allocated by [`crate::MessageStore::append_optimistic`], unique for the
/// lifetime of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalToken(u64);

impl LocalToken {
    /// Wrap a raw token value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw token value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// Identity of a message in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Optimistic message awaiting server acknowledgement.
    Pending(LocalToken),
    /// Server-confirmed message.
    Confirmed(ServerId),
}

impl MessageId {
    /// Whether the server has not assigned an id yet.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Server id, if confirmed.
    pub fn server_id(&self) -> Option<ServerId> {
        match self {
            Self::Confirmed(id) => Some(*id),
            Self::Pending(_) => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending(token) => write!(f, "{token}"),
            Self::Confirmed(id) => write!(f, "{id}"),
        }
    }
}

/// File chosen by the viewer, held in memory until the send completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// File name shown in the transcript.
    pub name: String,
    /// File contents.
    pub content: Arc<[u8]>,
}

impl LocalFile {
    /// Upload form of this file.
    pub fn to_upload(&self) -> AttachmentUpload {
        AttachmentUpload { file_name: self.name.clone(), content: Arc::clone(&self.content) }
    }
}

/// Attachment of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// Uploaded file, addressed by URL.
    Remote(String),
    /// Local file of an optimistic message.
    Local(LocalFile),
}

impl Attachment {
    /// Display name: the local file name, or the last path segment of the URL.
    pub fn name(&self) -> &str {
        match self {
            Self::Local(file) => &file.name,
            Self::Remote(url) => url.rsplit('/').next().unwrap_or(url),
        }
    }
}

/// Delivery state of a message authored by the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Optimistic, send request in flight.
    Sending,
    /// Accepted by the server.
    Sent,
}

/// A message in the open conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Identity; pending until the server confirms.
    pub id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Counterpart the message was sent to.
    pub receiver_id: UserId,
    /// Text body.
    pub body: Option<String>,
    /// Attachment.
    pub attachment: Option<Attachment>,
    /// Whether the receiver has read the message.
    pub is_read: bool,
    /// Creation time; assigned locally for optimistic messages.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: Option<DateTime<Utc>>,
    /// Delivery state.
    pub status: MessageStatus,
}

impl Message {
    /// Server-confirmed message from its wire form.
    pub fn from_wire(wire: WireMessage) -> Self {
        Self {
            id: MessageId::Confirmed(wire.id),
            sender_id: wire.sender_id,
            receiver_id: wire.receiver_id,
            body: wire.body,
            attachment: wire.attachment.map(Attachment::Remote),
            is_read: wire.is_read,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
            status: MessageStatus::Sent,
        }
    }

    /// Overwrite every field with the server's canonical version.
    ///
    /// A local attachment survives when the server omits the URL so the
    /// transcript does not lose the file.
    pub(crate) fn adopt(&mut self, wire: WireMessage) {
        self.id = MessageId::Confirmed(wire.id);
        self.sender_id = wire.sender_id;
        self.receiver_id = wire.receiver_id;
        self.body = wire.body;
        if let Some(url) = wire.attachment {
            self.attachment = Some(Attachment::Remote(url));
        }
        self.is_read = wire.is_read;
        self.created_at = wire.created_at;
        self.updated_at = wire.updated_at;
        self.status = MessageStatus::Sent;
    }

    /// The participant that is not `viewer`.
    pub fn counterpart(&self, viewer: UserId) -> UserId {
        if self.sender_id == viewer { self.receiver_id } else { self.sender_id }
    }

    /// Whether the body is absent or whitespace.
    pub fn has_blank_body(&self) -> bool {
        is_blank(self.body.as_deref())
    }
}

/// Content the viewer composed for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Counterpart receiving the message.
    pub receiver_id: UserId,
    /// Text body.
    pub body: Option<String>,
    /// Attached file.
    pub attachment: Option<LocalFile>,
}

impl Draft {
    /// Text-only draft.
    pub fn text(receiver_id: UserId, body: impl Into<String>) -> Self {
        Self { receiver_id, body: Some(body.into()), attachment: None }
    }

    /// Attach a file.
    pub fn with_attachment(mut self, file: LocalFile) -> Self {
        self.attachment = Some(file);
        self
    }

    /// Rejects drafts that have neither a non-blank body nor an attachment.
    ///
    /// # Errors
    ///
    /// - `StoreError::EmptyDraft` if the draft has nothing to send
    pub fn validate(&self) -> Result<(), StoreError> {
        if is_blank(self.body.as_deref()) && self.attachment.is_none() {
            return Err(StoreError::EmptyDraft);
        }
        Ok(())
    }

    /// Body with surrounding whitespace removed; `None` when blank.
    pub fn normalized_body(&self) -> Option<String> {
        self.body.as_deref().map(str::trim).filter(|body| !body.is_empty()).map(str::to_owned)
    }
}

/// Server verdict on an optimistic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerOutcome {
    /// Accepted, with the canonical message when the server returned one.
    Accepted(Option<WireMessage>),
    /// Rejected; the optimistic change must be undone.
    Rejected,
}

pub(crate) fn is_blank(body: Option<&str>) -> bool {
    body.is_none_or(|body| body.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_drafts_are_rejected() {
        assert_eq!(Draft::text(2, "   \n").validate(), Err(StoreError::EmptyDraft));
        assert_eq!(
            Draft { receiver_id: 2, body: None, attachment: None }.validate(),
            Err(StoreError::EmptyDraft)
        );
    }

    #[test]
    fn attachment_only_and_combined_drafts_are_valid() {
        let file = LocalFile { name: "a.png".into(), content: Arc::from(&b"png"[..]) };
        let attachment_only = Draft { receiver_id: 2, body: None, attachment: Some(file.clone()) };
        assert!(attachment_only.validate().is_ok());
        assert!(Draft::text(2, "see").with_attachment(file).validate().is_ok());
    }

    #[test]
    fn normalized_body_trims() {
        assert_eq!(Draft::text(2, "  hi ").normalized_body().as_deref(), Some("hi"));
        assert_eq!(Draft::text(2, "  ").normalized_body(), None);
    }

    #[test]
    fn remote_attachment_name_is_last_segment() {
        let attachment = Attachment::Remote("https://cdn.example/files/report.pdf".into());
        assert_eq!(attachment.name(), "report.pdf");
    }

    #[test]
    fn ids_display_distinctly() {
        assert_eq!(MessageId::Pending(LocalToken::new(3)).to_string(), "local-3");
        assert_eq!(MessageId::Confirmed(3).to_string(), "3");
        assert_ne!(MessageId::Pending(LocalToken::new(3)), MessageId::Confirmed(3));
    }
}
