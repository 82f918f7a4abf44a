//! Integration tests against a live FreeSWITCH instance.
//!
//! These tests require FreeSWITCH ESL on 127.0.0.1:8021 with password ClueCon.
//! Run with: cargo test --test live_freeswitch -- --ignored

use fsswitch::{HandlerMap, InboundConfig, InboundSocket};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const ESL_ADDRESS: &str = "127.0.0.1:8021";
const ESL_PASSWORD: &str = "ClueCon";

#[tokio::test]
#[ignore]
async fn live_connect_and_status() {
    let session = InboundSocket::connect(
        InboundConfig::new(ESL_ADDRESS, ESL_PASSWORD),
        HandlerMap::new(),
    )
    .await
    .expect("failed to connect to FreeSWITCH");
    assert!(session.connected());

    let response = session
        .api("status")
        .await
        .unwrap();
    let body = response.body();
    assert!(body.contains("UP"), "expected UP in status: {}", body);
}

#[tokio::test]
#[ignore]
async fn live_subscribe_and_recv_heartbeat() {
    let (tx, mut rx) = mpsc::channel::<String>(4);
    let handlers = HandlerMap::new().on("HEARTBEAT", move |event| {
        let tx = tx.clone();
        async move {
            let _ = tx
                .send(
                    event
                        .get("Core-UUID", "")
                        .to_string(),
                )
                .await;
        }
    });

    let mut session =
        InboundSocket::connect(InboundConfig::new(ESL_ADDRESS, ESL_PASSWORD), handlers)
            .await
            .expect("failed to connect to FreeSWITCH");
    tokio::spawn(async move {
        session
            .start()
            .await;
    });

    // The default heartbeat interval is 20 seconds.
    let core_uuid = timeout(Duration::from_secs(25), rx.recv())
        .await
        .expect("timeout waiting for heartbeat")
        .expect("handler channel closed");
    assert!(!core_uuid.is_empty());
}

#[tokio::test]
#[ignore]
async fn live_bgapi_returns_job_uuid() {
    let session = InboundSocket::connect(
        InboundConfig::new(ESL_ADDRESS, ESL_PASSWORD),
        HandlerMap::new(),
    )
    .await
    .expect("failed to connect to FreeSWITCH");

    let response = session
        .bgapi("status")
        .await
        .unwrap();
    assert!(response.is_success());
    assert!(!response
        .get("Job-UUID", "")
        .is_empty());
}
