//! Router: the agent-side counterpart of a flow.
//!
//! A [`Router`] runs inside an agent or payment-app context and talks back to
//! the context that spawned it (its opener, or the top-level context when it
//! runs in a frame). It is bound to one subject: `params` to pull or hand over
//! an operation's parameters, `result` to pull or hand over its result.

use crate::channel::Channel;
use crate::host::Host;
use crate::surface::Surface;
use payagent_types::origin::RouteParams;
use payagent_types::{MessageType, Operation, PaymentError, PaymentResult, Subject};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What a [`Router::request`] resolved with.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterReply {
    /// The counterpart origin the reply came from.
    pub origin: String,
    /// The reply's type tag.
    pub message_type: MessageType,
    /// The reply payload.
    pub data: Value,
}

/// Agent-side endpoint bound to the opener context.
#[derive(Clone)]
pub struct Router {
    subject: Subject,
    channel: Channel,
}

impl Router {
    /// Create a router for `subject` (`"params"` or `"result"`) talking to
    /// `origin_url`.
    ///
    /// The subject is checked before any channel is bound.
    pub fn new(host: Arc<dyn Host>, subject: &str, origin_url: &str) -> PaymentResult<Self> {
        let subject: Subject = subject.parse()?;
        let counterpart = host.opener().or_else(|| Some(host.top()));
        let surface = Surface::attach(host, origin_url, counterpart)?;
        debug!(
            subject = %subject,
            counterpart = %surface.handle(),
            origin = %surface.origin(),
            "Router bound"
        );
        Ok(Self {
            subject,
            channel: Channel::new(&surface),
        })
    }

    /// Create a router from the `route` and `origin` query parameters of the
    /// agent page's own URL.
    pub fn from_location(host: Arc<dyn Host>, location: &str) -> PaymentResult<Self> {
        let params = RouteParams::from_url(location)?;
        let route = params.route.ok_or_else(|| {
            PaymentError::Config(format!("agent URL has no route parameter: {location}"))
        })?;
        let origin = params.origin.ok_or_else(|| {
            PaymentError::Config(format!("agent URL has no origin parameter: {location}"))
        })?;
        Self::new(host, route.as_str(), &origin)
    }

    /// Bound every wait by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.channel = self.channel.with_timeout(timeout);
        self
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn origin(&self) -> &str {
        self.channel.origin()
    }

    fn tag(&self, op: Operation) -> MessageType {
        MessageType::Exchange {
            op,
            subject: self.subject,
        }
    }

    /// Tell the opener we are ready for `op.<subject>` and wait for it.
    pub async fn request(&self, op: Operation) -> PaymentResult<RouterReply> {
        let message = self.channel.request(self.tag(op)).await?;
        Ok(RouterReply {
            origin: self.channel.origin().to_string(),
            message_type: message.message_type,
            data: message.data,
        })
    }

    /// Hand `data` to the opener as `op.<subject>`.
    pub fn send(&self, op: Operation, data: Value) -> PaymentResult<()> {
        self.channel.send(self.tag(op), data)
    }

    /// Signal the opener that this context is done and it should navigate
    /// back to the agent.
    pub fn navigate(&self) -> PaymentResult<()> {
        self.channel.send(MessageType::Navigate, Value::Null)
    }
}
