//! Integration tests for the Payment Agent flows.
//!
//! Each test runs a relying party, a scripted Payment Agent and (for the pay
//! flow) a scripted payment app as separate tasks inside one
//! `SimulatedBrowser`, talking only through the real Surface / Channel /
//! Router stack. Nothing leaves the process.

use payagent_kernel::{AgentOptions, PaymentAgent};
use payagent_types::config::AgentConfig;
use payagent_types::{Operation, PaymentError};
use payagent_wire::{
    BrowserEventKind, ContextKind, Host, MessageEvent, Router, SimulatedBrowser, WindowHandle,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const SHOP_URL: &str = "https://shop.example/checkout";
const SHOP_ORIGIN: &str = "https://shop.example";
const APP_URL: &str = "https://wallet.example/pay";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Shop {
    browser: SimulatedBrowser,
    handle: WindowHandle,
    agent: PaymentAgent,
}

fn shop() -> Shop {
    let browser = SimulatedBrowser::new();
    let tab = browser.open_tab(SHOP_URL).unwrap();
    let handle = tab.handle();
    let agent = PaymentAgent::new(Arc::new(tab), AgentConfig::default());
    Shop {
        browser,
        handle,
        agent,
    }
}

fn opened(browser: &SimulatedBrowser, kind: ContextKind) -> Vec<WindowHandle> {
    browser
        .history()
        .into_iter()
        .filter_map(|e| match e.kind {
            BrowserEventKind::Opened { handle, kind: k, .. } if k == kind => Some(handle),
            _ => None,
        })
        .collect()
}

/// Scripted registration agent: pulls the manifest, answers with `result`.
async fn registration_agent(
    browser: SimulatedBrowser,
    mut activity: tokio::sync::broadcast::Receiver<payagent_wire::BrowserEvent>,
    result: Value,
) -> (String, Value) {
    let popup = browser
        .next_opened(&mut activity, ContextKind::Popup)
        .await
        .unwrap();
    let location = popup.url().unwrap();
    let host: Arc<dyn Host> = Arc::new(popup);

    let params = Router::from_location(Arc::clone(&host), &location).unwrap();
    let manifest = params.request(Operation::RegisterApp).await.unwrap();

    let results = Router::new(host, "result", params.origin()).unwrap();
    results.send(Operation::RegisterApp, result).unwrap();
    (location, manifest.data)
}

// ---------------------------------------------------------------------------
// registerApp
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_register_app_resolves_and_closes_popup() {
    let shop = shop();
    let activity = shop.browser.subscribe_activity();
    let agent = tokio::spawn(registration_agent(
        shop.browser.clone(),
        activity,
        json!({"status": "registered"}),
    ));

    let result = shop
        .agent
        .register_app(json!({"name": "Acme"}), &AgentOptions::default())
        .await
        .unwrap();
    let (location, manifest) = agent.await.unwrap();

    assert_eq!(result, json!({"status": "registered"}));
    assert_eq!(manifest, json!({"name": "Acme"}));
    assert!(location.starts_with("https://web-payments.io/register?op=registerApp&route=params"));

    let popups = opened(&shop.browser, ContextKind::Popup);
    assert_eq!(popups.len(), 1);
    assert!(!shop.browser.is_open(popups[0]));
    assert_eq!(shop.browser.close_count(popups[0]), 1);
    assert!(shop.browser.is_open(shop.handle));
}

#[tokio::test]
async fn test_register_app_with_custom_agent_url() {
    let shop = shop();
    let activity = shop.browser.subscribe_activity();
    let agent = tokio::spawn(registration_agent(
        shop.browser.clone(),
        activity,
        json!({"status": "registered", "id": 7}),
    ));

    let options = AgentOptions::with_agent_url("https://agent.example:9443/register");
    let result = shop
        .agent
        .register_app(json!({"name": "Acme"}), &options)
        .await
        .unwrap();
    let (location, _) = agent.await.unwrap();

    assert_eq!(result["id"], 7);
    assert!(location.starts_with("https://agent.example:9443/register?"));
}

#[tokio::test]
async fn test_forged_origin_does_not_settle_registration() {
    let shop = shop();
    let mut activity = shop.browser.subscribe_activity();
    let browser = shop.browser.clone();
    let shop_handle = shop.handle;

    let agent = tokio::spawn(async move {
        let popup = browser
            .next_opened(&mut activity, ContextKind::Popup)
            .await
            .unwrap();
        let popup_handle = popup.handle();
        let host: Arc<dyn Host> = Arc::new(popup);

        let params = Router::new(Arc::clone(&host), "params", SHOP_ORIGIN).unwrap();
        params.request(Operation::RegisterApp).await.unwrap();

        // Right handle, wrong origin.
        browser.dispatch(
            shop_handle,
            MessageEvent {
                source: popup_handle,
                origin: "https://evil.example".to_string(),
                data: json!({"type": "registerApp.result", "data": {"status": "forged"}}),
            },
        );
        // Right origin, wrong handle.
        browser.dispatch(
            shop_handle,
            MessageEvent {
                source: WindowHandle::new(9_999),
                origin: "https://web-payments.io".to_string(),
                data: json!({"type": "registerApp.result", "data": {"status": "forged"}}),
            },
        );
        tokio::task::yield_now().await;

        Router::new(host, "result", SHOP_ORIGIN)
            .unwrap()
            .send(Operation::RegisterApp, json!({"status": "registered"}))
            .unwrap();
    });

    let result = shop
        .agent
        .register_app(json!({"name": "Acme"}), &AgentOptions::default())
        .await
        .unwrap();
    agent.await.unwrap();
    assert_eq!(result, json!({"status": "registered"}));
}

#[tokio::test]
async fn test_malformed_result_rejects_and_closes_popup() {
    let shop = shop();
    let mut activity = shop.browser.subscribe_activity();
    let browser = shop.browser.clone();

    let agent = tokio::spawn(async move {
        let popup = browser
            .next_opened(&mut activity, ContextKind::Popup)
            .await
            .unwrap();
        let host: Arc<dyn Host> = Arc::new(popup.clone());
        Router::new(host, "params", SHOP_ORIGIN)
            .unwrap()
            .request(Operation::RegisterApp)
            .await
            .unwrap();
        let opener = popup.opener().unwrap();
        popup
            .post_message(opener, json!({"type": "registerApp.result"}), SHOP_ORIGIN)
            .unwrap();
        popup.handle()
    });

    let err = shop
        .agent
        .register_app(json!({"name": "Acme"}), &AgentOptions::default())
        .await
        .unwrap_err();
    let popup = agent.await.unwrap();

    assert!(matches!(err, PaymentError::Protocol(_)), "got {err:?}");
    assert!(!shop.browser.is_open(popup));
    assert_eq!(shop.browser.close_count(popup), 1);
}

// ---------------------------------------------------------------------------
// request (pay)
// ---------------------------------------------------------------------------

/// Scripted mediator: runs in the popup and in the frames the payment app
/// embeds, relaying the request to the app and the result back to the shop.
async fn mediator(
    browser: SimulatedBrowser,
    mut activity: tokio::sync::broadcast::Receiver<payagent_wire::BrowserEvent>,
) -> Value {
    // Popup: pull the request from the shop.
    let popup = browser
        .next_opened(&mut activity, ContextKind::Popup)
        .await
        .unwrap();
    let popup_handle = popup.handle();
    let popup_host: Arc<dyn Host> = Arc::new(popup.clone());
    let params_router =
        Router::from_location(Arc::clone(&popup_host), &popup.url().unwrap()).unwrap();
    let shop_origin = params_router.origin().to_string();
    let request = params_router.request(Operation::Request).await.unwrap();

    // Hand the popup over to the payment app.
    popup.navigate(APP_URL).unwrap();

    // Frame for getPendingRequest: push the cached request.
    let frame = browser
        .next_opened(&mut activity, ContextKind::Frame)
        .await
        .unwrap();
    let frame_url = frame.url().unwrap();
    Router::from_location(Arc::new(frame), &frame_url)
        .unwrap()
        .send(Operation::Request, request.data)
        .unwrap();

    // Frame for acknowledge: pull the result, then release the app.
    let frame = browser
        .next_opened(&mut activity, ContextKind::Frame)
        .await
        .unwrap();
    let frame_url = frame.url().unwrap();
    let result_router = Router::from_location(Arc::new(frame), &frame_url).unwrap();
    let result = result_router.request(Operation::Request).await.unwrap();
    result_router.navigate().unwrap();

    // Popup is back on the mediator: settle with the shop.
    let landed = browser
        .next_navigation(&mut activity, popup_handle)
        .await
        .unwrap();
    assert!(landed.starts_with("https://web-payments.io/mediator?"));
    Router::new(popup_host, "result", &shop_origin)
        .unwrap()
        .send(Operation::Request, result.data.clone())
        .unwrap();
    result.data
}

/// Scripted payment app: waits to be loaded in the popup, fetches the
/// pending request and acknowledges it.
async fn payment_app(
    browser: SimulatedBrowser,
    mut activity: tokio::sync::broadcast::Receiver<payagent_wire::BrowserEvent>,
) -> Value {
    let popup = browser
        .next_opened(&mut activity, ContextKind::Popup)
        .await
        .unwrap();
    let url = browser
        .next_navigation(&mut activity, popup.handle())
        .await
        .unwrap();
    assert_eq!(url, APP_URL);

    let app = PaymentAgent::new(Arc::new(popup), AgentConfig::default());
    let pending = app
        .get_pending_request(&AgentOptions::default())
        .await
        .unwrap();
    let amount = pending["paymentRequest"]["items"][0]["amount"].clone();
    app.acknowledge(
        json!({"status": "paid", "amount": amount, "method": "wallet"}),
        &AgentOptions::default(),
    )
    .await
    .unwrap();
    pending
}

#[tokio::test]
async fn test_full_pay_flow_across_surfaces() {
    let shop = shop();
    let mediator_task = tokio::spawn(mediator(
        shop.browser.clone(),
        shop.browser.subscribe_activity(),
    ));
    let app_task = tokio::spawn(payment_app(
        shop.browser.clone(),
        shop.browser.subscribe_activity(),
    ));

    let payment_request = json!({"items": [{"label": "Book", "amount": "9.99"}]});
    let result = shop
        .agent
        .request(payment_request.clone(), &AgentOptions::default())
        .await
        .unwrap();
    let relayed = mediator_task.await.unwrap();
    let pending = app_task.await.unwrap();

    assert_eq!(pending, json!({"paymentRequest": payment_request}));
    assert_eq!(result, json!({"status": "paid", "amount": "9.99", "method": "wallet"}));
    assert_eq!(relayed, result);

    // One popup and two frames, each closed exactly once.
    let popups = opened(&shop.browser, ContextKind::Popup);
    let frames = opened(&shop.browser, ContextKind::Frame);
    assert_eq!(popups.len(), 1);
    assert_eq!(frames.len(), 2);
    for handle in popups.iter().chain(frames.iter()) {
        assert!(!shop.browser.is_open(*handle));
        assert_eq!(shop.browser.close_count(*handle), 1, "{handle}");
    }
    assert_eq!(shop.browser.open_count(), 1);
}

#[tokio::test]
async fn test_silent_mediator_leaves_request_pending() {
    let shop = shop();
    let payment_request = json!({"items": [{"label": "Book", "amount": "9.99"}]});
    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        shop.agent.request(payment_request, &AgentOptions::default()),
    )
    .await;
    assert!(outcome.is_err(), "request settled without a mediator");
    // The timed-out call was dropped, which released its popup.
    assert_eq!(shop.browser.open_count(), 1);
}

#[tokio::test]
async fn test_configured_timeout_rejects_request() {
    let browser = SimulatedBrowser::new();
    let tab = browser.open_tab(SHOP_URL).unwrap();
    let config = AgentConfig {
        receive_timeout_secs: Some(0),
        ..AgentConfig::default()
    };
    let agent = PaymentAgent::new(Arc::new(tab), config);

    let err = agent
        .request(json!({"items": []}), &AgentOptions::default())
        .await
        .unwrap_err();
    match err {
        PaymentError::Timeout { awaited, .. } => assert_eq!(awaited, "request.params"),
        other => panic!("Expected Timeout, got {other:?}"),
    }
    let popups = opened(&browser, ContextKind::Popup);
    assert_eq!(browser.close_count(popups[0]), 1);
}

// ---------------------------------------------------------------------------
// Payment-app side calls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_get_pending_request_uses_invisible_frame() {
    let browser = SimulatedBrowser::new();
    let app_tab = browser.open_tab(APP_URL).unwrap();
    let app = PaymentAgent::new(Arc::new(app_tab), AgentConfig::default());
    let mut activity = browser.subscribe_activity();

    let agent = {
        let browser = browser.clone();
        tokio::spawn(async move {
            let frame = browser
                .next_opened(&mut activity, ContextKind::Frame)
                .await
                .unwrap();
            let url = frame.url().unwrap();
            let handle = frame.handle();
            let router = Router::from_location(Arc::new(frame), &url).unwrap();
            assert_eq!(router.origin(), "https://wallet.example");
            router
                .send(Operation::Request, json!({"paymentRequest": {"total": "5.00"}}))
                .unwrap();
            (handle, url)
        })
    };

    let pending = app
        .get_pending_request(&AgentOptions::default())
        .await
        .unwrap();
    let (frame, url) = agent.await.unwrap();

    assert_eq!(pending, json!({"paymentRequest": {"total": "5.00"}}));
    assert!(url.contains("route=params"));
    assert!(!url.contains("op="));
    assert!(!browser.is_open(frame));
    assert_eq!(browser.close_count(frame), 1);
    assert!(opened(&browser, ContextKind::Popup).is_empty());
}

#[tokio::test]
async fn test_acknowledge_navigates_after_signal() {
    let browser = SimulatedBrowser::new();
    let app_tab = browser.open_tab(APP_URL).unwrap();
    let app_handle = app_tab.handle();
    let app = PaymentAgent::new(Arc::new(app_tab), AgentConfig::default());
    let mut activity = browser.subscribe_activity();

    let agent = {
        let browser = browser.clone();
        tokio::spawn(async move {
            let frame = browser
                .next_opened(&mut activity, ContextKind::Frame)
                .await
                .unwrap();
            let url = frame.url().unwrap();
            let router = Router::from_location(Arc::new(frame), &url).unwrap();
            let ack = router.request(Operation::Request).await.unwrap();
            assert!(browser.url_of(app_handle).unwrap().starts_with(APP_URL));
            router.navigate().unwrap();
            ack.data
        })
    };

    app.acknowledge(json!({"status": "paid"}), &AgentOptions::default())
        .await
        .unwrap();
    let ack = agent.await.unwrap();

    assert_eq!(ack, json!({"status": "paid"}));
    let landed = browser.url_of(app_handle).unwrap();
    assert!(landed.starts_with("https://web-payments.io/mediator?op=request&route=result"));
    assert_eq!(browser.origin_of(app_handle).as_deref(), Some("https://web-payments.io"));
    let frames = opened(&browser, ContextKind::Frame);
    assert_eq!(frames.len(), 1);
    assert_eq!(browser.close_count(frames[0]), 1);
}

#[tokio::test]
async fn test_acknowledge_without_navigate_signal_does_not_navigate() {
    let browser = SimulatedBrowser::new();
    let app_tab = browser.open_tab(APP_URL).unwrap();
    let app_handle = app_tab.handle();
    let config = AgentConfig {
        receive_timeout_secs: Some(0),
        ..AgentConfig::default()
    };
    let app = PaymentAgent::new(Arc::new(app_tab), config);

    let err = app
        .acknowledge(json!({"status": "paid"}), &AgentOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Timeout { .. }));
    assert_eq!(browser.url_of(app_handle).as_deref(), Some(APP_URL));
    let frames = opened(&browser, ContextKind::Frame);
    assert_eq!(browser.close_count(frames[0]), 1);
}
