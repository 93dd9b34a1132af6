//! Typed, origin-validated channel bound to one surface.
//!
//! Outbound messages are always posted with the bound origin as the target
//! origin. Inbound events are accepted only when their source handle and
//! stamped origin both equal the binding and their `type` is one of the
//! awaited tags; everything else is skipped without settling the wait.

use crate::host::{Host, MessageStream, WindowHandle};
use crate::surface::Surface;
use payagent_types::{Inbound, Message, MessageType, PaymentError, PaymentResult};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A request/response channel to the context behind a [`Surface`].
#[derive(Clone)]
pub struct Channel {
    host: Arc<dyn Host>,
    end: WindowHandle,
    origin: String,
    timeout: Option<Duration>,
}

impl Channel {
    /// Bind a channel to a surface's handle and origin.
    pub fn new(surface: &Surface) -> Self {
        Self {
            host: Arc::clone(surface.host()),
            end: surface.handle(),
            origin: surface.origin().to_string(),
            timeout: None,
        }
    }

    /// Bound every receive on this channel by `timeout` (`None` waits forever).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The bound origin.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The bound context.
    pub fn end(&self) -> WindowHandle {
        self.end
    }

    /// Post a message to the bound context, scoped to the bound origin.
    pub fn send(&self, message_type: MessageType, data: Value) -> PaymentResult<()> {
        let message = Message::new(message_type, data);
        debug!(
            to = %self.end,
            origin = %self.origin,
            message_type = %message_type,
            "Sending payment message"
        );
        self.host
            .post_message(self.end, message.to_value(), &self.origin)
    }

    /// Start waiting for one of `types` from the bound context.
    ///
    /// The listener is registered before this returns, so anything delivered
    /// after the call is observed even if the subscription is awaited later.
    pub fn receive<I>(&self, types: I) -> Subscription
    where
        I: IntoIterator<Item = MessageType>,
    {
        Subscription {
            rx: self.host.subscribe(),
            end: self.end,
            origin: self.origin.clone(),
            accepted: types.into_iter().collect(),
            timeout: self.timeout,
        }
    }

    /// Send a null probe of `message_type` and wait for the reply of the same type.
    pub async fn request(&self, message_type: MessageType) -> PaymentResult<Message> {
        let reply = self.receive([message_type]);
        self.send(message_type, Value::Null)?;
        reply.recv().await
    }

    /// Wait for a probe of `message_type`, then answer it with `response`.
    pub async fn serve(&self, message_type: MessageType, response: Value) -> PaymentResult<()> {
        self.receive([message_type]).recv().await?;
        self.send(message_type, response)
    }
}

/// A single pending receive. Dropping it deregisters the listener.
pub struct Subscription {
    rx: MessageStream,
    end: WindowHandle,
    origin: String,
    accepted: Vec<MessageType>,
    timeout: Option<Duration>,
}

impl Subscription {
    /// The awaited types, as shown in errors and logs.
    pub fn awaited(&self) -> String {
        self.accepted
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Resolve with the first matching message.
    pub async fn recv(self) -> PaymentResult<Message> {
        match self.timeout {
            None => self.wait().await,
            Some(after) => {
                let awaited = self.awaited();
                tokio::time::timeout(after, self.wait())
                    .await
                    .unwrap_or(Err(PaymentError::Timeout { awaited, after }))
            }
        }
    }

    async fn wait(mut self) -> PaymentResult<Message> {
        loop {
            let Some(event) = self.rx.recv().await else {
                return Err(PaymentError::TransportClosed(self.awaited()));
            };

            if event.source != self.end || event.origin != self.origin {
                trace!(
                    source = %event.source,
                    origin = %event.origin,
                    "Ignoring message from unbound sender"
                );
                continue;
            }

            match Inbound::inspect(&event.data, &self.accepted) {
                Inbound::Accepted(message) => {
                    debug!(
                        from = %self.end,
                        message_type = %message.message_type,
                        "Received payment message"
                    );
                    return Ok(message);
                }
                Inbound::Malformed(message_type) => {
                    warn!(from = %self.end, %message_type, "Payment message without data");
                    return Err(PaymentError::Protocol(format!(
                        "{message_type} message has no data field"
                    )));
                }
                Inbound::Ignored => {
                    trace!(from = %self.end, "Ignoring unexpected message");
                }
            }
        }
    }
}
