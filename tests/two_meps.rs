use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cfm_erps::core::{CcmInterval, Config, MacAddress};
use cfm_erps::engine::{Engine, MepState};
use cfm_erps::network::MemoryTransport;
use cfm_erps::protocol::raps::match_raps;
use cfm_erps::protocol::{Frame, RapsRequest};

fn mac(last: u8) -> MacAddress {
    MacAddress([0x02, 0, 0, 0, 0, last])
}

fn config(mep_id: u16, remote: Option<MacAddress>) -> Config {
    Config {
        interface: "mem0".to_string(),
        md_level: 3,
        vlan: 0,
        ring_id: 4,
        mep_id: Some(mep_id),
        remote_mac: remote,
        ccm_interval: CcmInterval::Ms100,
        ..Default::default()
    }
}

fn signal_fails(transport: &MemoryTransport) -> usize {
    transport
        .sent()
        .iter()
        .filter_map(|bytes| Frame::from_bytes(bytes).ok())
        .filter_map(|frame| match_raps(&frame).ok())
        .filter(|pdu| pdu.request() == Some(RapsRequest::SignalFail))
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_continuity_loss_raises_signal_fail() {
    let (a, b) = MemoryTransport::pair(mac(1), mac(2));
    let (a, b) = (Arc::new(a), Arc::new(b));

    let engine_a = Engine::new(config(1, Some(mac(2))), a.clone()).unwrap();
    let engine_b = Engine::new(config(2, None), b.clone()).unwrap();
    let handle_a = engine_a.handle();
    let handle_b = engine_b.handle();

    let cancel_a = CancellationToken::new();
    let cancel_b = CancellationToken::new();
    let task_a = tokio::spawn(engine_a.run(cancel_a.clone()));
    let task_b = tokio::spawn(engine_b.run(cancel_b.clone()));

    tokio::time::sleep(Duration::from_millis(600)).await;

    let seen_by_a = handle_a.remote_mep(2).unwrap();
    assert_eq!(seen_by_a.state(), MepState::Healthy);
    assert_eq!(seen_by_a.mac, mac(2));
    assert_eq!(handle_b.remote_mep(1).unwrap().state(), MepState::Healthy);
    assert_eq!(handle_a.remote_meps().len(), 1);
    assert!(handle_a.loopback_replies() > 0);
    assert_eq!(signal_fails(&a), 0);

    // linktrace toward B is answered by B
    let id = handle_a.linktrace(mac(2), None).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let result = handle_a.linktrace_result().unwrap();
    assert_eq!(result.transaction_id, id);
    assert!(result.replies.iter().any(|reply| reply.hit_target));

    // B goes silent
    cancel_b.cancel();
    task_b.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;

    assert_eq!(handle_a.remote_mep(2).unwrap().state(), MepState::Defect);
    assert_eq!(signal_fails(&a), 1);

    let raps = a
        .sent()
        .iter()
        .filter_map(|bytes| Frame::from_bytes(bytes).ok())
        .find(|frame| match_raps(frame).is_ok())
        .unwrap();
    assert_eq!(raps.dst_mac().unwrap(), MacAddress([0x01, 0x19, 0xA7, 0, 0, 4]));

    cancel_a.cancel();
    task_a.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mismatched_domain_not_tracked() {
    let (a, b) = MemoryTransport::pair(mac(1), mac(2));
    let (a, b) = (Arc::new(a), Arc::new(b));

    let engine_a = Engine::new(config(1, None), a.clone()).unwrap();
    let other_level = Config { md_level: 5, ..config(2, None) };
    let engine_b = Engine::new(other_level, b.clone()).unwrap();
    let handle_a = engine_a.handle();

    let cancel = CancellationToken::new();
    let task_a = tokio::spawn(engine_a.run(cancel.clone()));
    let task_b = tokio::spawn(engine_b.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(500)).await;

    let entry = handle_a.remote_mep(2).unwrap();
    assert!(!entry.active);
    assert!(!entry.ccm_received_equal);
    assert!(handle_a.remote_meps().is_empty());
    assert_eq!(signal_fails(&a), 0);

    cancel.cancel();
    task_a.await.unwrap().unwrap();
    task_b.await.unwrap().unwrap();
}
