//! Core types for the Payment Agent messaging layer.
//!
//! This crate defines the message vocabulary exchanged between a relying
//! party, the Payment Agent and payment applications, plus the origin helpers,
//! error type and configuration shared by the wire and kernel crates. It
//! contains no business logic.

pub mod config;
pub mod error;
pub mod message;
pub mod origin;

pub use error::{PaymentError, PaymentResult};
pub use message::{Inbound, Message, MessageType, Operation, Subject};
