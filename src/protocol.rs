//! `keep.*` outbound notification protocol.
//!
//! This module owns **every message the keep subsystem emits** towards
//! clients. Wire encoding is the transport's business; here each message is
//! a serde type routed by [`Audience`] through the [`Notifier`] seam.
//!
//! | Subject                          | Payload                   |
//! |----------------------------------|---------------------------|
//! | `keep.info`                      | [`KeepInfo`]              |
//! | `keep.component.info`            | [`ComponentInfo`]         |
//! | `keep.component.update`          | [`ComponentUpdate`]       |
//! | `keep.component.detail`          | [`ComponentDetailUpdate`] |
//! | `keep.claim`                     | [`ClaimNotification`]     |
//! | `keep.chat`                      | [`ChatMessage`]           |
//! | `keep.dialog`                    | [`ConfirmDialog`]         |
//! | `keep.event`                     | [`KeepEvent`]             |

use crate::types::{KeepId, KeepType, PlayerId, Realm, WorldPoint};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Common envelope
// ---------------------------------------------------------------------------

/// Every queued message is wrapped in this envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldEvent<T> {
    pub audience: Audience,
    pub frame: u64,
    pub payload: T,
}

impl<T> WorldEvent<T> {
    pub fn new(audience: Audience, frame: u64, payload: T) -> Self {
        Self {
            audience,
            frame,
            payload,
        }
    }
}

/// Who receives a message. The transport resolves it to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope")]
pub enum Audience {
    Player { id: PlayerId },
    Guild { name: String },
    Realm { realm: Realm },
    Region { region: u16 },
    Radius { region: u16, center: WorldPoint, radius: i32 },
    All,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeepInfo {
    pub keep_id: KeepId,
    pub name: String,
    pub realm: Realm,
    pub level: u8,
    pub keep_type: KeepType,
    pub guild: Option<String>,
    pub position: WorldPoint,
    pub heading: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub keep_id: KeepId,
    pub component_id: u16,
    pub skin: u8,
    pub x: i32,
    pub y: i32,
    pub heading: u16,
    pub height: u8,
    pub health_percent: u8,
    pub status: u8,
}

/// Keep-wide structural refresh (realm, level, size changes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentUpdate {
    pub keep_id: KeepId,
    pub realm: Realm,
    pub level: u8,
    pub level_changed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDetailUpdate {
    pub keep_id: KeepId,
    pub component_id: u16,
    pub height: u8,
    pub health_percent: u8,
    pub status: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimNotification {
    pub keep_id: KeepId,
    pub guild: String,
    pub level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    System,
    Important,
    Guild,
    Say,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub kind: ChatKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmDialog {
    pub keep_id: KeepId,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepEventKind {
    Claimed,
    Released,
    Upgraded,
    Captured,
    Raized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeepEvent {
    pub keep_id: KeepId,
    pub kind: KeepEventKind,
    pub realm: Realm,
    pub level: u8,
}

/// Union of every outbound payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "data")]
pub enum Outbound {
    KeepInfo(KeepInfo),
    ComponentInfo(ComponentInfo),
    ComponentUpdate(ComponentUpdate),
    ComponentDetailUpdate(ComponentDetailUpdate),
    Claim(ClaimNotification),
    Chat(ChatMessage),
    Dialog(ConfirmDialog),
    Event(KeepEvent),
}

impl Outbound {
    pub fn chat(kind: ChatKind, text: impl Into<String>) -> Self {
        Outbound::Chat(ChatMessage {
            kind,
            text: text.into(),
        })
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Outbound::KeepInfo(_) => subjects::KEEP_INFO,
            Outbound::ComponentInfo(_) => subjects::COMPONENT_INFO,
            Outbound::ComponentUpdate(_) => subjects::COMPONENT_UPDATE,
            Outbound::ComponentDetailUpdate(_) => subjects::COMPONENT_DETAIL,
            Outbound::Claim(_) => subjects::CLAIM,
            Outbound::Chat(_) => subjects::CHAT,
            Outbound::Dialog(_) => subjects::DIALOG,
            Outbound::Event(_) => subjects::EVENT,
        }
    }
}

// ---------------------------------------------------------------------------
// Notifier seam
// ---------------------------------------------------------------------------

/// Notification collaborator. Implementations must not call back into keeps.
pub trait Notifier: Send + Sync {
    fn send(&self, audience: Audience, message: Outbound);
}

/// Queue of outbound messages, drained by the driver (or by tests).
#[derive(Default)]
pub struct Outbox {
    queue: Mutex<Vec<WorldEvent<Outbound>>>,
    frame: Mutex<u64>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp subsequently queued messages with `frame`.
    pub fn set_frame(&self, frame: u64) {
        *self.frame.lock() = frame;
    }

    pub fn drain(&self) -> Vec<WorldEvent<Outbound>> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Copies of every queued message, in order, without draining.
    pub fn peek(&self) -> Vec<WorldEvent<Outbound>> {
        self.queue.lock().clone()
    }

    /// Text of every queued chat message (test helper as much as anything).
    pub fn chat_lines(&self) -> Vec<String> {
        self.queue
            .lock()
            .iter()
            .filter_map(|e| match &e.payload {
                Outbound::Chat(c) => Some(c.text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Notifier for Outbox {
    fn send(&self, audience: Audience, message: Outbound) {
        let frame = *self.frame.lock();
        self.queue
            .lock()
            .push(WorldEvent::new(audience, frame, message));
    }
}

// ---------------------------------------------------------------------------
// Subject helpers
// ---------------------------------------------------------------------------

pub mod subjects {
    pub const KEEP_INFO: &str = "keep.info";
    pub const COMPONENT_INFO: &str = "keep.component.info";
    pub const COMPONENT_UPDATE: &str = "keep.component.update";
    pub const COMPONENT_DETAIL: &str = "keep.component.detail";
    pub const CLAIM: &str = "keep.claim";
    pub const CHAT: &str = "keep.chat";
    pub const DIALOG: &str = "keep.dialog";
    pub const EVENT: &str = "keep.event";
}
