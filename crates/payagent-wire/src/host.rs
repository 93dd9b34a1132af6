//! Host browsing-environment primitives.
//!
//! The [`Host`] trait is everything the messaging layer needs from the
//! environment it runs in: creating and releasing browsing contexts, posting a
//! message scoped to a target origin, observing inbound message events, and
//! replacing the current location. A `Host` value is always a view from one
//! context ("self"): `subscribe` yields events delivered to that context and
//! `post_message` stamps outgoing events with its current origin.

use payagent_types::config::PopupConfig;
use payagent_types::PaymentResult;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

/// Inbound message events for one listener.
pub type MessageStream = mpsc::UnboundedReceiver<MessageEvent>;

/// Opaque reference to a browsing context (window or frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WindowHandle(u64);

impl WindowHandle {
    /// Wrap a host-assigned context id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The host-assigned context id.
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// An inbound cross-context message event.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// The context that posted the message.
    pub source: WindowHandle,
    /// The sender's origin at the time of posting, as stamped by the host.
    pub origin: String,
    /// The posted payload, unvalidated.
    pub data: Value,
}

/// Dimensions requested for a visible popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupFeatures {
    pub width: u32,
    pub height: u32,
}

impl From<PopupConfig> for PopupFeatures {
    fn from(config: PopupConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
        }
    }
}

impl Default for PopupFeatures {
    fn default() -> Self {
        PopupConfig::default().into()
    }
}

/// Browsing-environment primitives, as seen from the current context.
pub trait Host: Send + Sync {
    /// Origin of the current context.
    fn location_origin(&self) -> String;

    /// Open a visible top-level context at `url`, with this context as opener.
    fn open_window(&self, url: &str, features: PopupFeatures) -> PaymentResult<WindowHandle>;

    /// Close a context previously returned by [`Host::open_window`].
    fn close_window(&self, handle: WindowHandle);

    /// Embed a hidden frame at `url` inside the current context.
    fn create_frame(&self, url: &str) -> PaymentResult<WindowHandle>;

    /// Remove a frame previously returned by [`Host::create_frame`].
    fn remove_frame(&self, handle: WindowHandle);

    /// Post `message` to `target`. The host delivers it only if the target's
    /// current origin is exactly `target_origin`.
    fn post_message(
        &self,
        target: WindowHandle,
        message: Value,
        target_origin: &str,
    ) -> PaymentResult<()>;

    /// Register a listener for message events delivered to the current
    /// context. Every listener sees every event from registration on, in
    /// delivery order, however much other traffic arrives before it reads.
    /// The stream ends when the context navigates or closes. Dropping the
    /// receiver deregisters it.
    fn subscribe(&self) -> MessageStream;

    /// The context that opened the current one, if any.
    fn opener(&self) -> Option<WindowHandle>;

    /// The top-level context containing the current one (itself if top-level).
    fn top(&self) -> WindowHandle;

    /// Replace the current context's location with `url`.
    fn navigate(&self, url: &str) -> PaymentResult<()>;
}
