//! Driver-level round trips through the WebSocket double: the full path
//! from interaction call, through script evaluation, to interpreted
//! result. The double plays the page's side of `Runtime.evaluate`.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use pagepilot_browser::PageDriver;

/// Accept one connection and answer every evaluate with the given value,
/// wrapped in the nested result shape the protocol uses.
async fn spawn_page_double(evaluated: Value) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws: WebSocketStream<TcpStream> =
            tokio_tungstenite::accept_async(stream).await.expect("handshake");
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let cmd: Value = serde_json::from_str(&text).expect("command json");
            assert_eq!(cmd["method"], "Runtime.evaluate");
            let reply = json!({
                "id": cmd["id"],
                "result": {
                    "result": { "type": "object", "value": evaluated.clone() }
                }
            });
            if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                return;
            }
        }
    });
    format!("ws://{addr}")
}

#[tokio::test]
async fn inspect_interprets_a_found_element() {
    let url = spawn_page_double(json!({
        "found": true,
        "tagName": "BUTTON",
        "id": "send-btn",
        "className": "primary",
        "innerHTML": "<span>Send</span>",
        "outerHTML": "<button id=\"send-btn\"><span>Send</span></button>",
        "isVisible": true,
        "isContentEditable": false,
        "isConnected": true,
        "isDisabled": false,
        "isButton": true
    }))
    .await;

    let driver = PageDriver::connect(&url)
        .await
        .expect("connect")
        .with_timeout(Duration::from_secs(5));

    let descriptor = driver.inspect("#send-btn").await.unwrap();
    assert!(descriptor.found);
    assert_eq!(descriptor.tag_name.as_deref(), Some("BUTTON"));
    assert!(descriptor.is_button);
    assert!(!descriptor.is_disabled);

    driver.close().await;
}

#[tokio::test]
async fn inspect_reports_not_found_without_an_error() {
    let url = spawn_page_double(json!({ "found": false })).await;

    let driver = PageDriver::connect(&url)
        .await
        .expect("connect")
        .with_timeout(Duration::from_secs(5));

    let descriptor = driver.inspect("#no-such-element").await.unwrap();
    assert!(!descriptor.found);
    assert!(descriptor.error.is_none());

    driver.close().await;
}

#[tokio::test]
async fn set_text_rejection_is_a_semantic_failure_not_an_error() {
    let url = spawn_page_double(json!({
        "success": false,
        "error": "element not editable"
    }))
    .await;

    let driver = PageDriver::connect(&url)
        .await
        .expect("connect")
        .with_timeout(Duration::from_secs(5));

    let outcome = driver.set_text("#readonly-label", "hello").await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("element not editable"));

    driver.close().await;
}

#[tokio::test]
async fn click_success_carries_element_and_parent_info() {
    let url = spawn_page_double(json!({
        "success": true,
        "elementInfo": {
            "tagName": "SPAN",
            "id": "",
            "className": "label",
            "parentTag": "BUTTON",
            "parentId": "send-btn"
        }
    }))
    .await;

    let driver = PageDriver::connect(&url)
        .await
        .expect("connect")
        .with_timeout(Duration::from_secs(5));

    let outcome = driver.click("#send-btn > span").await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.detail["elementInfo"]["parentTag"], "BUTTON");
    assert_eq!(outcome.detail["elementInfo"]["parentId"], "send-btn");

    driver.close().await;
}
