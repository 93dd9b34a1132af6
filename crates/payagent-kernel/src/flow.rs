//! Flow orchestrator: the relying-party side of every payment operation.
//!
//! Full choreography of `payment.request` across the three parties:
//!
//! ```text
//!  relying party                 agent popup                  payment app
//!  -------------                 -----------                  -----------
//!  open popup(mediator) ------>  probe request.params
//!  serve request.params  <------
//!                                cache params, navigate popup to the app --->
//!                                                              getPendingRequest:
//!                                                                frame(mediator) pushes request.params
//!                                                              acknowledge:
//!                                                                frame(mediator) probes request.result,
//!                                                                caches it, sends navigate
//!                                <--- popup navigates back to the mediator
//!  receive request.result <----  send cached request.result
//!  close popup, resolve
//! ```
//!
//! `registerApp` is the single-hop version: serve the manifest, receive the
//! result. Each flow owns exactly one surface at a time and closes it exactly
//! once before settling, whatever the outcome.

use payagent_types::config::AgentConfig;
use payagent_types::{Message, MessageType, Operation, PaymentResult};
use payagent_wire::{Channel, Host, PopupFeatures, Surface, SurfaceMode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Terminal outcome of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    Resolved,
    Rejected,
}

/// Where a flow is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Created, no surface yet.
    Idle,
    /// Surface open, channel bound.
    SurfaceOpen,
    /// Waiting for the agent's readiness probe for the parameters.
    AwaitingParamsEcho,
    /// Parameters handed to the agent.
    ParamsCached,
    /// Waiting for the agent to push the pending parameters.
    AwaitingParams,
    /// Waiting for the agent's probe for the result.
    AwaitingResultEcho,
    /// Waiting for the agent's navigate signal.
    AwaitingNavigate,
    /// Waiting for the operation's result.
    AwaitingResult,
    /// Surface closed, caller settled.
    Closed(FlowOutcome),
}

/// One logical operation spanning a chain of surfaces.
pub struct Flow {
    id: Uuid,
    host: Arc<dyn Host>,
    popup: PopupFeatures,
    timeout: Option<Duration>,
    state: FlowState,
    transitions: Vec<FlowState>,
}

impl Flow {
    /// Create an idle flow running in `host`.
    pub fn new(host: Arc<dyn Host>, config: &AgentConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            host,
            popup: config.popup.into(),
            timeout: config.receive_timeout(),
            state: FlowState::Idle,
            transitions: vec![FlowState::Idle],
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Every state this flow has been in, oldest first.
    pub fn transitions(&self) -> &[FlowState] {
        &self.transitions
    }

    fn transition(&mut self, next: FlowState) {
        debug!(flow_id = %self.id, from = ?self.state, to = ?next, "Flow transition");
        self.state = next;
        self.transitions.push(next);
    }

    fn open(&mut self, url: &str, mode: SurfaceMode) -> PaymentResult<(Surface, Channel)> {
        let surface = Surface::open(Arc::clone(&self.host), url, mode)?;
        let channel = Channel::new(&surface).with_timeout(self.timeout);
        self.transition(FlowState::SurfaceOpen);
        Ok((surface, channel))
    }

    /// Close the surface, then settle. The surface is always released before
    /// the caller observes the outcome.
    fn settle<T>(&mut self, mut surface: Surface, outcome: PaymentResult<T>) -> PaymentResult<T> {
        surface.close();
        self.finish(outcome)
    }

    fn finish<T>(&mut self, outcome: PaymentResult<T>) -> PaymentResult<T> {
        match &outcome {
            Ok(_) => {
                self.transition(FlowState::Closed(FlowOutcome::Resolved));
                info!(flow_id = %self.id, "Flow resolved");
            }
            Err(e) => {
                self.transition(FlowState::Closed(FlowOutcome::Rejected));
                warn!(flow_id = %self.id, error = %e, "Flow rejected");
            }
        }
        outcome
    }

    /// Start a flow in a new visible surface: hand `params` to the agent,
    /// then wait for the operation's result payload.
    pub async fn start(&mut self, url: &str, op: Operation, params: Value) -> PaymentResult<Value> {
        info!(flow_id = %self.id, %op, url, "Starting flow");
        let (surface, channel) = match self.open(url, SurfaceMode::Visible(self.popup)) {
            Ok(opened) => opened,
            Err(e) => return self.finish(Err(e)),
        };
        let outcome = self.exchange_start(&channel, op, params).await;
        self.settle(surface, outcome)
    }

    async fn exchange_start(
        &mut self,
        channel: &Channel,
        op: Operation,
        params: Value,
    ) -> PaymentResult<Value> {
        // Listening before the params leave. A result the agent posts ahead
        // of its params probe is therefore accepted, not dropped.
        let result = channel.receive([MessageType::result(op)]);
        self.transition(FlowState::AwaitingParamsEcho);
        channel.serve(MessageType::params(op), params).await?;
        self.transition(FlowState::ParamsCached);

        self.transition(FlowState::AwaitingResult);
        let message = result.recv().await?;
        Ok(message.data)
    }

    /// Resume an in-flight flow from an invisible surface: wait for the agent
    /// to push the pending request parameters.
    pub async fn resume(&mut self, url: &str) -> PaymentResult<Message> {
        info!(flow_id = %self.id, url, "Resuming flow");
        let (surface, channel) = match self.open(url, SurfaceMode::Invisible) {
            Ok(opened) => opened,
            Err(e) => return self.finish(Err(e)),
        };
        self.transition(FlowState::AwaitingParams);
        let outcome = channel
            .receive([MessageType::params(Operation::Request)])
            .recv()
            .await;
        self.settle(surface, outcome)
    }

    /// End a flow from an invisible surface: hand `result` to the agent, wait
    /// for its navigate signal, then navigate the current context to `url`.
    pub async fn end(&mut self, url: &str, op: Operation, result: Value) -> PaymentResult<()> {
        info!(flow_id = %self.id, %op, url, "Ending flow");
        let (mut surface, channel) = match self.open(url, SurfaceMode::Invisible) {
            Ok(opened) => opened,
            Err(e) => return self.finish(Err(e)),
        };
        let outcome = self.exchange_end(&channel, op, result).await;
        surface.close();
        let outcome = outcome.and_then(|()| {
            debug!(flow_id = %self.id, url, "Navigating to agent");
            self.host.navigate(url)
        });
        self.finish(outcome)
    }

    async fn exchange_end(
        &mut self,
        channel: &Channel,
        op: Operation,
        result: Value,
    ) -> PaymentResult<()> {
        let navigate = channel.receive([MessageType::Navigate]);
        self.transition(FlowState::AwaitingResultEcho);
        channel.serve(MessageType::result(op), result).await?;
        self.transition(FlowState::AwaitingNavigate);
        navigate.recv().await?;
        Ok(())
    }
}
