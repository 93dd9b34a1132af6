//! Scripted end-to-end runs against the simulated browser.
//!
//! The shop side uses the real [`PaymentAgent`]; the Payment Agent pages and
//! the payment app are small scripts built on [`Router`] and [`PaymentAgent`]
//! exactly as their real counterparts would use them.

use payagent_kernel::{AgentOptions, PaymentAgent};
use payagent_types::config::AgentConfig;
use payagent_types::{Operation, PaymentError, PaymentResult};
use payagent_wire::{
    BrowserEvent, BrowserEventKind, ContextKind, Host, Router, SimulatedBrowser,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinError;
use tracing::info;

/// Page of the relying party.
pub const SHOP_URL: &str = "https://shop.example/checkout";
/// Page of the payment app the mediator hands over to.
pub const APP_URL: &str = "https://wallet.example/pay";

/// Outcome of a simulation.
#[derive(Debug, Serialize)]
pub struct Report {
    pub operation: &'static str,
    pub result: Value,
    pub history: Vec<BrowserEvent>,
}

fn script_failed(e: JoinError) -> PaymentError {
    PaymentError::Host(format!("simulation script failed: {e}"))
}

/// Register a payment app named `name` through a scripted agent.
pub async fn register(config: AgentConfig, name: &str) -> PaymentResult<Report> {
    let browser = SimulatedBrowser::new();
    let shop = PaymentAgent::new(Arc::new(browser.open_tab(SHOP_URL)?), config);
    let script = tokio::spawn(registration_agent(
        browser.clone(),
        browser.subscribe_activity(),
    ));

    let manifest = json!({"name": name, "paymentMethods": ["basic-card"]});
    let options = AgentOptions::default();
    let (result, ()) = tokio::try_join!(
        shop.register_app(manifest, &options),
        async { script.await.map_err(script_failed)? },
    )?;
    info!("Registration simulation finished");

    Ok(Report {
        operation: "registerApp",
        result,
        history: browser.history(),
    })
}

/// Pay for one line item through a scripted mediator and payment app.
pub async fn pay(config: AgentConfig, label: &str, amount: &str) -> PaymentResult<Report> {
    let browser = SimulatedBrowser::new();
    let app_config = config.clone();
    let shop = PaymentAgent::new(Arc::new(browser.open_tab(SHOP_URL)?), config);
    let mediator_script = tokio::spawn(mediator(browser.clone(), browser.subscribe_activity()));
    let app_script = tokio::spawn(payment_app(
        browser.clone(),
        browser.subscribe_activity(),
        app_config,
    ));

    let request = json!({"items": [{"label": label, "amount": amount}]});
    let options = AgentOptions::default();
    let (result, (), ()) = tokio::try_join!(
        shop.request(request, &options),
        async { mediator_script.await.map_err(script_failed)? },
        async { app_script.await.map_err(script_failed)? },
    )?;
    info!("Payment simulation finished");

    Ok(Report {
        operation: "request",
        result,
        history: browser.history(),
    })
}

async fn registration_agent(
    browser: SimulatedBrowser,
    mut activity: broadcast::Receiver<BrowserEvent>,
) -> PaymentResult<()> {
    let popup = browser.next_opened(&mut activity, ContextKind::Popup).await?;
    let location = popup.url().unwrap_or_default();
    let host: Arc<dyn Host> = Arc::new(popup);

    let params = Router::from_location(Arc::clone(&host), &location)?;
    let manifest = params.request(Operation::RegisterApp).await?;
    info!(manifest = %manifest.data, "Agent received manifest");

    Router::new(host, "result", params.origin())?
        .send(Operation::RegisterApp, json!({"status": "registered"}))
}

async fn mediator(
    browser: SimulatedBrowser,
    mut activity: broadcast::Receiver<BrowserEvent>,
) -> PaymentResult<()> {
    let popup = browser.next_opened(&mut activity, ContextKind::Popup).await?;
    let popup_handle = popup.handle();
    let popup_host: Arc<dyn Host> = Arc::new(popup.clone());
    let params =
        Router::from_location(Arc::clone(&popup_host), &popup.url().unwrap_or_default())?;
    let shop_origin = params.origin().to_string();
    let request = params.request(Operation::Request).await?;
    info!("Mediator cached payment request, handing over to the app");
    popup.navigate(APP_URL)?;

    let frame = browser.next_opened(&mut activity, ContextKind::Frame).await?;
    let url = frame.url().unwrap_or_default();
    Router::from_location(Arc::new(frame), &url)?.send(Operation::Request, request.data)?;

    let frame = browser.next_opened(&mut activity, ContextKind::Frame).await?;
    let url = frame.url().unwrap_or_default();
    let results = Router::from_location(Arc::new(frame), &url)?;
    let result = results.request(Operation::Request).await?;
    info!("Mediator cached payment result");
    results.navigate()?;

    browser.next_navigation(&mut activity, popup_handle).await?;
    Router::new(popup_host, "result", &shop_origin)?.send(Operation::Request, result.data)
}

async fn payment_app(
    browser: SimulatedBrowser,
    mut activity: broadcast::Receiver<BrowserEvent>,
    config: AgentConfig,
) -> PaymentResult<()> {
    let popup = browser.next_opened(&mut activity, ContextKind::Popup).await?;
    browser.next_navigation(&mut activity, popup.handle()).await?;

    let app = PaymentAgent::new(Arc::new(popup), config);
    let pending = app.get_pending_request(&AgentOptions::default()).await?;
    info!(request = %pending, "Payment app received request");
    let amount = pending["paymentRequest"]["items"][0]["amount"].clone();
    app.acknowledge(
        json!({"status": "paid", "amount": amount, "method": "wallet"}),
        &AgentOptions::default(),
    )
    .await
}

/// One line per browser event.
pub fn describe(event: &BrowserEvent) -> String {
    match &event.kind {
        BrowserEventKind::Opened { handle, kind, url } => {
            format!("open      {handle} ({kind:?}) {url}")
        }
        BrowserEventKind::Closed { handle } => format!("close     {handle}"),
        BrowserEventKind::Navigated { handle, url } => format!("navigate  {handle} -> {url}"),
        BrowserEventKind::Delivered {
            source,
            target,
            message_type,
        } => format!(
            "deliver   {source} -> {target} {}",
            message_type.as_deref().unwrap_or("<untyped>")
        ),
        BrowserEventKind::Dropped {
            source,
            target,
            reason,
        } => format!("drop      {source} -> {target} ({reason})"),
    }
}
