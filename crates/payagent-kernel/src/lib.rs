//! Payment Agent kernel: flow orchestration for the relying-party side.
//!
//! [`PaymentAgent`] is the public surface a relying party (or a payment app)
//! calls. Each call builds the agent URL, then hands it to a [`flow::Flow`],
//! which opens the surface, runs the typed exchanges and guarantees the
//! surface is closed before the call settles.

pub mod agent;
pub mod config;
pub mod flow;

pub use agent::{AgentOptions, PaymentAgent};
pub use flow::{Flow, FlowOutcome, FlowState};
