// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single test call behavior.

use std::time::Duration;

use ringpost_core::{DialerError, PortStatus};
use ringpost_test_utils::{CallScript, MockGateway, OWNER, TestHarness};

#[tokio::test]
async fn test_call_holds_a_port_until_the_ceiling() {
    let harness = TestHarness::builder()
        .with_ports(1)
        .with_gateway(MockGateway::with_default(CallScript::hangs()))
        .build()
        .await
        .unwrap();
    harness.seed_campaign("camp-1", OWNER, &[]).await.unwrap();

    let call = harness
        .orchestrator
        .make_test_call(OWNER, "camp-1", "+15551234")
        .await
        .unwrap();
    assert_eq!(call.port_number, 1);
    assert_eq!(harness.busy_ports().await.unwrap(), 1);

    let request = harness
        .gateway
        .request_for(&call.gateway_call_id)
        .await
        .unwrap();
    assert!(request.is_test);
    assert_eq!(request.campaign_id, "camp-1");

    // A second test call finds no free port.
    let err = harness
        .orchestrator
        .make_test_call(OWNER, "camp-1", "+15559999")
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::InsufficientCapacity { .. }));

    // Ceiling is 1s in the harness config.
    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(harness.busy_ports().await.unwrap(), 0);
    assert_eq!(
        harness.gateway.cancelled_legs().await,
        vec![call.gateway_call_id.clone()]
    );
}

#[tokio::test]
async fn failed_test_call_releases_the_port_immediately() {
    let gateway = MockGateway::new();
    gateway.script("+1666", CallScript::rejected()).await;
    let harness = TestHarness::builder()
        .with_ports(1)
        .with_gateway(gateway)
        .build()
        .await
        .unwrap();
    harness.seed_campaign("camp-1", OWNER, &[]).await.unwrap();

    let err = harness
        .orchestrator
        .make_test_call(OWNER, "camp-1", "+1666")
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::InvalidEndpoint { .. }));

    let ports = harness.registry().list_ports(OWNER).await.unwrap();
    assert_eq!(ports[0].status, PortStatus::Available);
    assert!(ports[0].current_call_id.is_none());
}

#[tokio::test]
async fn test_call_requires_ownership() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.seed_campaign("camp-1", "owner-2", &[]).await.unwrap();
    let err = harness
        .orchestrator
        .make_test_call(OWNER, "camp-1", "+1555")
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::NotOwner { .. }));
    assert_eq!(harness.gateway.originate_count().await, 0);
}
