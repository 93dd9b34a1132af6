//! Shared error types for the Payment Agent messaging layer.

use thiserror::Error;

/// Top-level error type for every payment flow.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// A required argument (manifest, payment request) was missing or falsy.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A component was constructed with an invalid configuration
    /// (unknown router subject, missing attach handle).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A URL could not be parsed or has no usable origin.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A message from the bound endpoint matched the awaited type but was
    /// not a well-formed payment message.
    #[error("Payment protocol error: {0}")]
    Protocol(String),

    /// The inbound event stream of the current context went away
    /// (context closed or navigated) before a message arrived.
    #[error("Transport closed while waiting for {0}")]
    TransportClosed(String),

    /// No matching message arrived within the configured receive timeout.
    #[error("Timed out after {after:?} waiting for {awaited}")]
    Timeout {
        /// The message types that were awaited.
        awaited: String,
        /// The configured timeout.
        after: std::time::Duration,
    },

    /// The host environment refused a primitive (popup blocked, unknown handle).
    #[error("Host error: {0}")]
    Host(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias for Result with PaymentError.
pub type PaymentResult<T> = Result<T, PaymentError>;
