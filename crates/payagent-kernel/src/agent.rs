//! Public Payment Agent API.
//!
//! Mirrors the browser payment API a relying party expects: register a
//! payment app, request a payment, and the two calls a payment app makes
//! while handling a request (fetch the pending request, acknowledge it).

use crate::flow::Flow;
use payagent_types::config::AgentConfig;
use payagent_types::origin::{update_query_parameter, PARAM_OP, PARAM_ORIGIN, PARAM_ROUTE};
use payagent_types::{Operation, PaymentError, PaymentResult, Subject};
use payagent_wire::Host;
use serde_json::{json, Value};
use std::sync::Arc;

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOptions {
    /// Agent URL overriding the configured default.
    pub agent_url: Option<String>,
}

impl AgentOptions {
    pub fn with_agent_url(url: impl Into<String>) -> Self {
        Self {
            agent_url: Some(url.into()),
        }
    }
}

/// The payment API installed for one browsing context.
pub struct PaymentAgent {
    host: Arc<dyn Host>,
    config: AgentConfig,
}

impl PaymentAgent {
    pub fn new(host: Arc<dyn Host>, config: AgentConfig) -> Self {
        Self { host, config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn flow(&self) -> Flow {
        Flow::new(Arc::clone(&self.host), &self.config)
    }

    fn build_url(
        &self,
        base: &str,
        op: Option<Operation>,
        route: Subject,
    ) -> PaymentResult<String> {
        let mut url = base.to_string();
        if let Some(op) = op {
            url = update_query_parameter(&url, PARAM_OP, op.as_str())?;
        }
        url = update_query_parameter(&url, PARAM_ROUTE, route.as_str())?;
        update_query_parameter(&url, PARAM_ORIGIN, &self.host.location_origin())
    }

    fn agent_url<'a>(&'a self, options: &'a AgentOptions, default: &'a str) -> &'a str {
        options.agent_url.as_deref().unwrap_or(default)
    }

    /// The URL `register_app` opens.
    pub fn register_url(&self, options: &AgentOptions) -> PaymentResult<String> {
        let base = self.agent_url(options, &self.config.register_url);
        self.build_url(base, Some(Operation::RegisterApp), Subject::Params)
    }

    /// The URL `request` opens.
    pub fn request_url(&self, options: &AgentOptions) -> PaymentResult<String> {
        let base = self.agent_url(options, &self.config.mediator_url);
        self.build_url(base, Some(Operation::Request), Subject::Params)
    }

    /// The URL `acknowledge` frames and then navigates to.
    pub fn acknowledge_url(&self, options: &AgentOptions) -> PaymentResult<String> {
        let base = self.agent_url(options, &self.config.mediator_url);
        self.build_url(base, Some(Operation::Request), Subject::Result)
    }

    /// The URL `get_pending_request` frames.
    pub fn pending_request_url(&self, options: &AgentOptions) -> PaymentResult<String> {
        let base = self.agent_url(options, &self.config.mediator_url);
        self.build_url(base, None, Subject::Params)
    }

    /// Register a payment application. Resolves with the agent's result.
    pub async fn register_app(
        &self,
        manifest: Value,
        options: &AgentOptions,
    ) -> PaymentResult<Value> {
        if is_falsy(&manifest) {
            return Err(PaymentError::InvalidArgument(
                "Could not register payment application; manifest not provided.".to_string(),
            ));
        }
        let url = self.register_url(options)?;
        self.flow()
            .start(&url, Operation::RegisterApp, manifest)
            .await
    }

    /// Request a payment. Resolves with the payment app's result as relayed
    /// by the mediator.
    pub async fn request(
        &self,
        payment_request: Value,
        options: &AgentOptions,
    ) -> PaymentResult<Value> {
        if is_falsy(&payment_request) {
            return Err(PaymentError::InvalidArgument(
                "Could not request payment; no payment request provided.".to_string(),
            ));
        }
        let url = self.request_url(options)?;
        self.flow()
            .start(
                &url,
                Operation::Request,
                json!({ "paymentRequest": payment_request }),
            )
            .await
    }

    /// Hand a payment result to the mediator and navigate the current
    /// context back to it. Called by the payment app.
    pub async fn acknowledge(
        &self,
        acknowledgement: Value,
        options: &AgentOptions,
    ) -> PaymentResult<()> {
        let url = self.acknowledge_url(options)?;
        self.flow()
            .end(&url, Operation::Request, acknowledgement)
            .await
    }

    /// Fetch the payment request currently being mediated. Called by the
    /// payment app.
    pub async fn get_pending_request(&self, options: &AgentOptions) -> PaymentResult<Value> {
        let url = self.pending_request_url(options)?;
        let message = self.flow().resume(&url).await?;
        Ok(message.data)
    }
}

/// Whether a payload counts as "not provided".
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
