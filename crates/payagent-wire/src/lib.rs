//! Payment Agent wire layer: cross-context messaging between browsing surfaces.
//!
//! ## Architecture
//!
//! - **Host**: the browsing environment's primitives (open/close contexts,
//!   scoped `postMessage`, inbound event stream, navigation)
//! - **Surface**: an owned popup, hidden frame, or attached opener bound to one origin
//! - **Channel**: origin-validated typed send / receive / request / serve
//! - **Router**: the agent-side counterpart bound to the opener
//! - **SimulatedBrowser**: an in-process `Host` used by tests and the CLI

pub mod channel;
pub mod host;
pub mod memory;
pub mod router;
pub mod surface;

pub use channel::{Channel, Subscription};
pub use host::{Host, MessageEvent, MessageStream, PopupFeatures, WindowHandle};
pub use memory::{BrowserEvent, BrowserEventKind, BrowserWindow, ContextKind, SimulatedBrowser};
pub use router::{Router, RouterReply};
pub use surface::{Surface, SurfaceMode};
