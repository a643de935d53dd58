//! Session lifecycle events.
//!
//! The session never throws past its boundary for background work;
//! everything the host application needs to know arrives on the event
//! channel, keeping the caller's event loop alive through network
//! failures.

use murmur_proto::{ActiveUser, Address, Message, MessageId};

/// Events emitted by a [`ChatSession`](crate::ChatSession).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A validated message arrived (from a peer, or the local echo of an
    /// own send).
    MessageReceived(Message),

    /// A previously unseen peer announced itself.
    UserJoined(ActiveUser),

    /// A peer went idle and was evicted from the active set.
    UserLeft(Address),

    /// `send_message` accepted a request.
    RequestInitiated { id: MessageId },

    /// The message was uploaded and its feed entry written.
    RequestUploaded { id: MessageId },

    /// An operation failed; `id` is set when it was a send.
    RequestError { id: Option<MessageId>, reason: String },

    /// Brackets `fetch_previous_messages`.
    LoadingPrevious(bool),

    /// This peer published a history checkpoint.
    CheckpointPublished { generation: u64 },
}
