//! Payment message vocabulary.
//!
//! Every message crossing a browsing-context boundary is a JSON object
//! `{"type": "<operation>.<subject>" | "navigate", "data": <any>}`. The type
//! tag is modeled as a closed union so that inbound traffic is validated at
//! the channel boundary instead of being trusted as-is.

use crate::error::PaymentError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The remote API operation a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Payment application registration.
    #[serde(rename = "registerApp")]
    RegisterApp,
    /// Payment request (pay flow).
    #[serde(rename = "request")]
    Request,
}

impl Operation {
    /// The wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::RegisterApp => "registerApp",
            Operation::Request => "request",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registerApp" => Ok(Operation::RegisterApp),
            "request" => Ok(Operation::Request),
            other => Err(PaymentError::Config(format!(
                "unknown operation \"{other}\""
            ))),
        }
    }
}

/// Which half of an operation a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    /// The operation's input parameters.
    Params,
    /// The operation's result.
    Result,
}

impl Subject {
    /// The wire name of the subject.
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Params => "params",
            Subject::Result => "result",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subject {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "params" => Ok(Subject::Params),
            "result" => Ok(Subject::Result),
            _ => Err(PaymentError::Config(
                "subject must be \"params\" or \"result\"".to_string(),
            )),
        }
    }
}

/// The `type` tag of a payment message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MessageType {
    /// `<operation>.<subject>`, e.g. `request.params`.
    Exchange {
        /// The operation.
        op: Operation,
        /// Params or result.
        subject: Subject,
    },
    /// The literal `navigate` signal.
    Navigate,
}

impl MessageType {
    /// Shorthand for an `<op>.params` tag.
    pub fn params(op: Operation) -> Self {
        MessageType::Exchange {
            op,
            subject: Subject::Params,
        }
    }

    /// Shorthand for an `<op>.result` tag.
    pub fn result(op: Operation) -> Self {
        MessageType::Exchange {
            op,
            subject: Subject::Result,
        }
    }

    /// Parse a wire tag, returning `None` for anything outside the vocabulary.
    pub fn parse(tag: &str) -> Option<Self> {
        if tag == "navigate" {
            return Some(MessageType::Navigate);
        }
        let (op, subject) = tag.split_once('.')?;
        Some(MessageType::Exchange {
            op: op.parse().ok()?,
            subject: subject.parse().ok()?,
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Exchange { op, subject } => write!(f, "{op}.{subject}"),
            MessageType::Navigate => f.write_str("navigate"),
        }
    }
}

impl FromStr for MessageType {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::parse(s)
            .ok_or_else(|| PaymentError::Protocol(format!("unknown message type \"{s}\"")))
    }
}

impl TryFrom<String> for MessageType {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MessageType> for String {
    fn from(value: MessageType) -> Self {
        value.to_string()
    }
}

/// A validated payment message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The message tag.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Opaque application payload; `null` for probes and `navigate`.
    pub data: Value,
}

impl Message {
    /// Build a message.
    pub fn new(message_type: MessageType, data: Value) -> Self {
        Self { message_type, data }
    }

    /// A null-payload readiness probe.
    pub fn probe(message_type: MessageType) -> Self {
        Self::new(message_type, Value::Null)
    }

    /// Encode to the JSON object posted across contexts.
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::with_capacity(2);
        map.insert("type".to_string(), Value::String(self.message_type.to_string()));
        map.insert("data".to_string(), self.data.clone());
        Value::Object(map)
    }
}

/// Classification of a raw inbound payload against a set of accepted types.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Not a payment message, or not one of the awaited types.
    Ignored,
    /// A well-formed message of an awaited type.
    Accepted(Message),
    /// An awaited type without a `data` field.
    Malformed(MessageType),
}

impl Inbound {
    /// Inspect a raw payload. Only the `type` and `data` keys are consulted.
    pub fn inspect(raw: &Value, accepted: &[MessageType]) -> Self {
        let Some(obj) = raw.as_object() else {
            return Inbound::Ignored;
        };
        let Some(message_type) = obj
            .get("type")
            .and_then(Value::as_str)
            .and_then(MessageType::parse)
        else {
            return Inbound::Ignored;
        };
        if !accepted.contains(&message_type) {
            return Inbound::Ignored;
        }
        match obj.get("data") {
            Some(data) => Inbound::Accepted(Message::new(message_type, data.clone())),
            None => Inbound::Malformed(message_type),
        }
    }
}
