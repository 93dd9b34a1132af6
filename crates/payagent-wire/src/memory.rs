//! In-process simulated browser.
//!
//! [`SimulatedBrowser`] models the pieces of a browser the messaging layer
//! relies on: top-level contexts, popups with an opener, hidden frames with a
//! parent, per-context message event streams, target-origin scoped delivery,
//! and replace-navigation. Navigating or closing a context tears down its
//! listeners, the way a real page unload does. Every observable action is
//! appended to a bounded history log for assertions and CLI output.

use crate::host::{Host, MessageEvent, MessageStream, PopupFeatures, WindowHandle};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use payagent_types::origin::origin_of;
use payagent_types::{PaymentError, PaymentResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Maximum events retained in the history ring buffer.
const HISTORY_SIZE: usize = 1000;

/// Capacity of the browser-wide activity stream.
const ACTIVITY_CAPACITY: usize = 256;

/// What kind of browsing context an entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// A tab opened by the user.
    Tab,
    /// A popup opened by script.
    Popup,
    /// A hidden embedded frame.
    Frame,
}

/// Something that happened in the simulated browser.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BrowserEventKind {
    Opened {
        handle: WindowHandle,
        kind: ContextKind,
        url: String,
    },
    Closed {
        handle: WindowHandle,
    },
    Navigated {
        handle: WindowHandle,
        url: String,
    },
    Delivered {
        source: WindowHandle,
        target: WindowHandle,
        message_type: Option<String>,
    },
    Dropped {
        source: WindowHandle,
        target: WindowHandle,
        reason: String,
    },
}

/// A timestamped history entry.
#[derive(Debug, Clone, Serialize)]
pub struct BrowserEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: BrowserEventKind,
}

struct ContextEntry {
    kind: ContextKind,
    url: String,
    origin: String,
    opener: Option<WindowHandle>,
    parent: Option<WindowHandle>,
    listeners: Vec<mpsc::UnboundedSender<MessageEvent>>,
}

impl ContextEntry {
    /// Hand `event` to every live listener, forgetting the dropped ones.
    /// Returns whether anyone received it.
    fn deliver(&mut self, event: MessageEvent) -> bool {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
        !self.listeners.is_empty()
    }
}

struct BrowserInner {
    contexts: DashMap<WindowHandle, ContextEntry>,
    next_id: AtomicU64,
    history: Mutex<VecDeque<BrowserEvent>>,
    /// Close counts survive history eviction.
    closes: DashMap<WindowHandle, usize>,
    activity: broadcast::Sender<BrowserEvent>,
}

impl BrowserInner {
    fn record(&self, kind: BrowserEventKind) {
        let event = BrowserEvent {
            at: Utc::now(),
            kind,
        };
        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() >= HISTORY_SIZE {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
        let _ = self.activity.send(event);
    }

    fn create(
        &self,
        kind: ContextKind,
        url: &str,
        opener: Option<WindowHandle>,
        parent: Option<WindowHandle>,
    ) -> PaymentResult<WindowHandle> {
        let origin = origin_of(url)?;
        let handle = WindowHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.contexts.insert(
            handle,
            ContextEntry {
                kind,
                url: url.to_string(),
                origin,
                opener,
                parent,
                listeners: Vec::new(),
            },
        );
        debug!(%handle, ?kind, url, "Context opened");
        self.record(BrowserEventKind::Opened {
            handle,
            kind,
            url: url.to_string(),
        });
        Ok(handle)
    }

    /// Remove a context and, recursively, the frames embedded in it.
    fn remove(&self, handle: WindowHandle) {
        if self.contexts.remove(&handle).is_none() {
            return;
        }
        debug!(%handle, "Context closed");
        *self.closes.entry(handle).or_insert(0) += 1;
        self.record(BrowserEventKind::Closed { handle });
        for child in self.frames_of(handle) {
            self.remove(child);
        }
    }

    fn frames_of(&self, parent: WindowHandle) -> Vec<WindowHandle> {
        self.contexts
            .iter()
            .filter(|entry| entry.parent == Some(parent))
            .map(|entry| *entry.key())
            .collect()
    }
}

/// An in-process browser holding any number of contexts.
#[derive(Clone)]
pub struct SimulatedBrowser {
    inner: Arc<BrowserInner>,
}

impl SimulatedBrowser {
    /// Create an empty browser.
    pub fn new() -> Self {
        let (activity, _) = broadcast::channel(ACTIVITY_CAPACITY);
        Self {
            inner: Arc::new(BrowserInner {
                contexts: DashMap::new(),
                next_id: AtomicU64::new(1),
                history: Mutex::new(VecDeque::with_capacity(HISTORY_SIZE)),
                closes: DashMap::new(),
                activity,
            }),
        }
    }

    /// Open a top-level tab with no opener and return a host view of it.
    pub fn open_tab(&self, url: &str) -> PaymentResult<BrowserWindow> {
        let handle = self.inner.create(ContextKind::Tab, url, None, None)?;
        Ok(self.view(handle))
    }

    /// A host view of an existing context.
    pub fn window(&self, handle: WindowHandle) -> Option<BrowserWindow> {
        self.is_open(handle).then(|| self.view(handle))
    }

    fn view(&self, handle: WindowHandle) -> BrowserWindow {
        BrowserWindow {
            inner: Arc::clone(&self.inner),
            handle,
        }
    }

    /// Whether a context is still open.
    pub fn is_open(&self, handle: WindowHandle) -> bool {
        self.inner.contexts.contains_key(&handle)
    }

    /// Current origin of a context.
    pub fn origin_of(&self, handle: WindowHandle) -> Option<String> {
        self.inner.contexts.get(&handle).map(|e| e.origin.clone())
    }

    /// Current URL of a context.
    pub fn url_of(&self, handle: WindowHandle) -> Option<String> {
        self.inner.contexts.get(&handle).map(|e| e.url.clone())
    }

    /// Kind of a context.
    pub fn kind_of(&self, handle: WindowHandle) -> Option<ContextKind> {
        self.inner.contexts.get(&handle).map(|e| e.kind)
    }

    /// Number of open contexts.
    pub fn open_count(&self) -> usize {
        self.inner.contexts.len()
    }

    /// How many times a context has been closed (0 or 1 for a correct caller).
    pub fn close_count(&self, handle: WindowHandle) -> usize {
        self.inner.closes.get(&handle).map(|n| *n).unwrap_or(0)
    }

    /// Snapshot of the most recent events, oldest first.
    pub fn history(&self) -> Vec<BrowserEvent> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Follow browser activity as it happens.
    pub fn subscribe_activity(&self) -> broadcast::Receiver<BrowserEvent> {
        self.inner.activity.subscribe()
    }

    /// Wait for the next context of `kind` to open and return a host view of it.
    pub async fn next_opened(
        &self,
        activity: &mut broadcast::Receiver<BrowserEvent>,
        kind: ContextKind,
    ) -> PaymentResult<BrowserWindow> {
        loop {
            match activity.recv().await {
                Ok(BrowserEvent {
                    kind: BrowserEventKind::Opened { handle, kind: k, .. },
                    ..
                }) if k == kind => return Ok(self.view(handle)),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(PaymentError::Host("browser activity stream closed".into()));
                }
            }
        }
    }

    /// Wait until `handle` navigates and return its new URL.
    pub async fn next_navigation(
        &self,
        activity: &mut broadcast::Receiver<BrowserEvent>,
        handle: WindowHandle,
    ) -> PaymentResult<String> {
        loop {
            match activity.recv().await {
                Ok(BrowserEvent {
                    kind: BrowserEventKind::Navigated { handle: h, url },
                    ..
                }) if h == handle => return Ok(url),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(PaymentError::Host("browser activity stream closed".into()));
                }
            }
        }
    }

    /// Deliver a synthetic event to `target` as if the host had produced it,
    /// bypassing the target-origin check. Used to model forged traffic.
    pub fn dispatch(&self, target: WindowHandle, event: MessageEvent) -> bool {
        match self.inner.contexts.get_mut(&target) {
            Some(mut entry) => entry.deliver(event),
            None => false,
        }
    }
}

impl Default for SimulatedBrowser {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`Host`] view from one context of a [`SimulatedBrowser`].
#[derive(Clone)]
pub struct BrowserWindow {
    inner: Arc<BrowserInner>,
    handle: WindowHandle,
}

impl BrowserWindow {
    /// The context this view acts as.
    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    /// Current URL of this context.
    pub fn url(&self) -> Option<String> {
        self.inner.contexts.get(&self.handle).map(|e| e.url.clone())
    }

    fn require_open(&self) -> PaymentResult<()> {
        if self.inner.contexts.contains_key(&self.handle) {
            Ok(())
        } else {
            Err(PaymentError::Host(format!("context {} is closed", self.handle)))
        }
    }
}

impl Host for BrowserWindow {
    fn location_origin(&self) -> String {
        self.inner
            .contexts
            .get(&self.handle)
            .map(|e| e.origin.clone())
            .unwrap_or_else(|| "null".to_string())
    }

    fn open_window(&self, url: &str, features: PopupFeatures) -> PaymentResult<WindowHandle> {
        self.require_open()?;
        debug!(width = features.width, height = features.height, "Opening popup");
        self.inner
            .create(ContextKind::Popup, url, Some(self.handle), None)
    }

    fn close_window(&self, handle: WindowHandle) {
        self.inner.remove(handle);
    }

    fn create_frame(&self, url: &str) -> PaymentResult<WindowHandle> {
        self.require_open()?;
        self.inner
            .create(ContextKind::Frame, url, None, Some(self.handle))
    }

    fn remove_frame(&self, handle: WindowHandle) {
        self.inner.remove(handle);
    }

    fn post_message(
        &self,
        target: WindowHandle,
        message: Value,
        target_origin: &str,
    ) -> PaymentResult<()> {
        let source_origin = self.location_origin();
        let message_type = message
            .get("type")
            .and_then(Value::as_str)
            .map(String::from);

        let dropped = match self.inner.contexts.get_mut(&target) {
            None => Some("target closed".to_string()),
            Some(entry) if entry.origin != target_origin => Some(format!(
                "target origin {} does not match {}",
                entry.origin, target_origin
            )),
            Some(mut entry) => {
                entry.deliver(MessageEvent {
                    source: self.handle,
                    origin: source_origin,
                    data: message,
                });
                None
            }
        };

        match dropped {
            Some(reason) => {
                debug!(source = %self.handle, %target, %reason, "Message dropped");
                self.inner.record(BrowserEventKind::Dropped {
                    source: self.handle,
                    target,
                    reason,
                });
            }
            None => self.inner.record(BrowserEventKind::Delivered {
                source: self.handle,
                target,
                message_type,
            }),
        }
        Ok(())
    }

    fn subscribe(&self) -> MessageStream {
        let (tx, rx) = mpsc::unbounded_channel();
        // A closed context drops `tx` here, handing back a finished stream.
        if let Some(mut entry) = self.inner.contexts.get_mut(&self.handle) {
            entry.listeners.push(tx);
        }
        rx
    }

    fn opener(&self) -> Option<WindowHandle> {
        self.inner.contexts.get(&self.handle).and_then(|e| e.opener)
    }

    fn top(&self) -> WindowHandle {
        let mut current = self.handle;
        while let Some(parent) = self.inner.contexts.get(&current).and_then(|e| e.parent) {
            current = parent;
        }
        current
    }

    fn navigate(&self, url: &str) -> PaymentResult<()> {
        let origin = origin_of(url)?;
        {
            let mut entry = self
                .inner
                .contexts
                .get_mut(&self.handle)
                .ok_or_else(|| PaymentError::Host(format!("context {} is closed", self.handle)))?;
            entry.url = url.to_string();
            entry.origin = origin;
            // Unload: listeners registered by the previous document go away.
            entry.listeners.clear();
        }
        for frame in self.inner.frames_of(self.handle) {
            self.inner.remove(frame);
        }
        debug!(handle = %self.handle, url, "Context navigated");
        self.inner.record(BrowserEventKind::Navigated {
            handle: self.handle,
            url: url.to_string(),
        });
        Ok(())
    }
}
