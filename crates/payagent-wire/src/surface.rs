//! Transport surfaces: owned browsing contexts bound to one origin.
//!
//! A [`Surface`] is created in exactly one of three modes: attached to an
//! existing handle supplied by the counterpart (the opener of an agent page),
//! a new visible popup, or a new hidden frame. Its origin is derived once from
//! the target URL. Surfaces the caller created are released exactly once,
//! either by an explicit [`Surface::close`] or when the value is dropped.

use crate::host::{Host, PopupFeatures, WindowHandle};
use payagent_types::origin::origin_of;
use payagent_types::{PaymentError, PaymentResult};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// How a surface obtains its browsing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceMode {
    /// Bind to a context the counterpart already owns. `None` is a
    /// configuration error.
    Attach(Option<WindowHandle>),
    /// Open a visible popup for user interaction.
    Visible(PopupFeatures),
    /// Embed a hidden frame for a headless exchange.
    Invisible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    Borrowed,
    Window,
    Frame,
}

/// A browsing context bound to a single expected origin.
pub struct Surface {
    host: Arc<dyn Host>,
    handle: WindowHandle,
    origin: String,
    ownership: Ownership,
    closed: bool,
}

impl Surface {
    /// Create or attach a surface for `url`.
    ///
    /// The origin is computed before any context is created, so an invalid
    /// URL never leaves a stray window behind.
    pub fn open(host: Arc<dyn Host>, url: &str, mode: SurfaceMode) -> PaymentResult<Self> {
        let origin = origin_of(url)?;
        let (handle, ownership) = match mode {
            SurfaceMode::Attach(Some(handle)) => (handle, Ownership::Borrowed),
            SurfaceMode::Attach(None) => {
                return Err(PaymentError::Config(
                    "Invalid browsing context handle".to_string(),
                ));
            }
            SurfaceMode::Visible(features) => {
                (host.open_window(url, features)?, Ownership::Window)
            }
            SurfaceMode::Invisible => (host.create_frame(url)?, Ownership::Frame),
        };

        debug!(handle = %handle, origin = %origin, ?ownership, "Surface opened");

        Ok(Self {
            host,
            handle,
            origin,
            ownership,
            closed: false,
        })
    }

    /// Shorthand for [`SurfaceMode::Attach`].
    pub fn attach(
        host: Arc<dyn Host>,
        url: &str,
        handle: Option<WindowHandle>,
    ) -> PaymentResult<Self> {
        Self::open(host, url, SurfaceMode::Attach(handle))
    }

    /// The bound context.
    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    /// The origin every message to and from this surface is checked against.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The host this surface lives in.
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Whether [`Surface::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the context. Idempotent; attached contexts are left alone.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.ownership {
            Ownership::Borrowed => {}
            Ownership::Window => self.host.close_window(self.handle),
            Ownership::Frame => self.host.remove_frame(self.handle),
        }
        debug!(handle = %self.handle, "Surface closed");
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("handle", &self.handle)
            .field("origin", &self.origin)
            .field("ownership", &self.ownership)
            .field("closed", &self.closed)
            .finish()
    }
}
