use super::*;
use crate::config::DispatchConfig;
use crate::transport::{MemoryTransport, SentPacket};
use futures::future::join_all;
use ramses_shared::{CommandDefinition, Priority, Verb};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const INTERVAL: Duration = Duration::from_millis(500);
const IDLE: Duration = Duration::from_secs(5);

fn test_config() -> DispatchConfig {
    DispatchConfig {
        min_interval: INTERVAL,
        idle_timeout: IDLE,
        default_timeout: Duration::from_secs(3),
        ..Default::default()
    }
}

fn setup() -> (Arc<MemoryTransport>, DeviceCommandManager) {
    let transport = Arc::new(MemoryTransport::new());
    let manager = DeviceCommandManager::new(transport.clone(), test_config());
    (transport, manager)
}

fn fan(payload: &str) -> CommandDefinition {
    CommandDefinition::new("22F1", Verb::Info, payload)
}

fn assert_spaced(sent: &[SentPacket]) {
    for pair in sent.windows(2) {
        let gap = pair[1].at.duration_since(pair[0].at);
        assert!(gap >= INTERVAL, "sends only {gap:?} apart");
    }
}

#[tokio::test(start_paused = true)]
async fn test_second_command_is_queued_and_spaced() {
    let (transport, manager) = setup();

    let first = manager
        .send_command_to_device("32:153289", fan("000307"), Priority::Normal, Duration::ZERO)
        .await;
    sleep(Duration::from_millis(50)).await;
    let second = manager
        .send_command_to_device("32:153289", fan("000307"), Priority::Normal, Duration::ZERO)
        .await;

    assert!(first.success && !first.queued);
    assert!(second.success && second.queued);

    manager.wait_drained().await;
    let sent = transport.sent_to("32:153289").await;
    assert_eq!(sent.len(), 2);
    assert_spaced(&sent);
}

#[tokio::test(start_paused = true)]
async fn test_burst_preserves_submission_order() {
    let (transport, manager) = setup();
    let payloads: Vec<String> = (0..8).map(|i| format!("00{i:02X}07")).collect();

    for payload in &payloads {
        manager
            .send_command_to_device("32:153289", fan(payload), Priority::Normal, Duration::ZERO)
            .await;
    }
    assert_eq!(manager.queue_depth("32:153289").await, 7);

    manager.wait_drained().await;
    let sent = transport.sent_to("32:153289").await;
    let order: Vec<&str> = sent.iter().map(|p| p.payload.as_str()).collect();
    assert_eq!(order, payloads.iter().map(String::as_str).collect::<Vec<_>>());
    assert_spaced(&sent);
}

#[tokio::test(start_paused = true)]
async fn test_priority_does_not_reorder() {
    let (transport, manager) = setup();

    manager
        .send_command_to_device("32:153289", fan("000107"), Priority::Low, Duration::ZERO)
        .await;
    manager
        .send_command_to_device("32:153289", fan("000207"), Priority::Low, Duration::ZERO)
        .await;
    manager
        .send_command_to_device("32:153289", fan("000307"), Priority::High, Duration::ZERO)
        .await;

    manager.wait_drained().await;
    let payloads: Vec<String> = transport.sent().await.into_iter().map(|p| p.payload).collect();
    assert_eq!(payloads, vec!["000107", "000207", "000307"]);
}

#[tokio::test(start_paused = true)]
async fn test_backlog_does_not_delay_other_device() {
    let (transport, manager) = setup();
    let start = Instant::now();

    for _ in 0..100 {
        manager
            .send_command_to_device("32:000001", fan("000307"), Priority::Normal, Duration::ZERO)
            .await;
    }
    let other = manager
        .send_command_to_device("32:000002", fan("000107"), Priority::Normal, Duration::ZERO)
        .await;

    assert!(!other.queued);
    let sent = transport.sent_to("32:000002").await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].at.duration_since(start) < INTERVAL);
    assert_eq!(manager.queue_depth("32:000001").await, 99);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_devices_drain_in_parallel() {
    let (transport, manager) = setup();
    let start = Instant::now();

    for device in ["32:000001", "32:000002", "32:000003"] {
        for _ in 0..4 {
            manager
                .send_command_to_device(device, fan("000307"), Priority::Normal, Duration::ZERO)
                .await;
        }
    }
    manager.wait_drained().await;

    // Three sequential intervals per device, not nine
    assert!(start.elapsed() < INTERVAL * 4);
    for device in ["32:000001", "32:000002", "32:000003"] {
        let sent = transport.sent_to(device).await;
        assert_eq!(sent.len(), 4);
        assert_spaced(&sent);
    }
}

#[tokio::test(start_paused = true)]
async fn test_immediate_failure_is_reported() {
    let (transport, manager) = setup();
    transport.fail_device("32:153289").await;

    let result = manager
        .send_command_to_device("32:153289", fan("000307"), Priority::Normal, Duration::ZERO)
        .await;

    assert!(!result.success);
    assert!(!result.queued);
    assert!(result.error_message.unwrap().contains("no acknowledgement"));

    let stats = manager.get_queue_statistics().await.command_statistics;
    assert_eq!(stats.failed_commands, 1);
    assert_eq!(stats.total_commands, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_item_does_not_stop_worker() {
    let (transport, manager) = setup();
    transport.fail_code("10D0").await;

    manager
        .send_command_to_device("32:153289", fan("000107"), Priority::Normal, Duration::ZERO)
        .await;
    let queued_failure = manager
        .send_command_to_device(
            "32:153289",
            CommandDefinition::new("10D0", Verb::Write, "00FF"),
            Priority::Normal,
            Duration::ZERO,
        )
        .await;
    manager
        .send_command_to_device("32:153289", fan("000307"), Priority::Normal, Duration::ZERO)
        .await;

    // Accepted into the queue; the failure only shows up in the counters
    assert!(queued_failure.success && queued_failure.queued);

    manager.wait_drained().await;
    let sent = transport.sent_to("32:153289").await;
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[2].payload, "000307");

    let stats = manager.get_queue_statistics().await.command_statistics;
    assert_eq!(stats.successful_commands, 2);
    assert_eq!(stats.failed_commands, 1);
    assert_eq!(
        stats.total_commands,
        stats.successful_commands + stats.failed_commands
    );
    assert_eq!(stats.queued_commands, 2);
}

#[tokio::test(start_paused = true)]
async fn test_queued_timeout_counts_as_failure() {
    let (transport, manager) = setup();
    transport.set_delay(Duration::from_secs(2)).await;

    manager
        .send_command_to_device("32:153289", fan("000107"), Priority::Normal, Duration::from_secs(5))
        .await;
    manager
        .send_command_to_device("32:153289", fan("000307"), Priority::Normal, Duration::from_secs(1))
        .await;
    manager.wait_drained().await;

    let stats = manager.get_queue_statistics().await.command_statistics;
    assert_eq!(stats.successful_commands, 1);
    assert_eq!(stats.failed_commands, 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_immediate_send_blocks_next_send() {
    let (transport, manager) = setup();
    transport.set_delay(Duration::from_secs(2)).await;
    let manager = Arc::new(manager);

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .send_command_to_device("32:153289", fan("000107"), Priority::Normal, Duration::ZERO)
                .await
        })
    };
    // Past the interval, but the first send is still in flight
    sleep(Duration::from_millis(600)).await;
    let second = manager
        .send_command_to_device("32:153289", fan("000307"), Priority::Normal, Duration::ZERO)
        .await;
    assert!(second.queued);

    assert!(first.await.unwrap().success);
    manager.wait_drained().await;

    let sent = transport.sent_to("32:153289").await;
    assert_eq!(sent.len(), 2);
    // Measured from completion of the first send
    assert!(sent[1].at.duration_since(sent[0].at) >= Duration::from_secs(2) + INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_submissions_share_one_worker() {
    let (transport, manager) = setup();

    let submissions = (0..20).map(|_| {
        manager.send_command_to_device("32:153289", fan("000307"), Priority::Normal, Duration::ZERO)
    });
    let results = join_all(submissions).await;

    assert_eq!(results.iter().filter(|r| !r.queued).count(), 1);
    assert_eq!(manager.active_queues().await, 1);

    manager.wait_drained().await;
    let sent = transport.sent_to("32:153289").await;
    assert_eq!(sent.len(), 20);
    assert_spaced(&sent);
}

#[tokio::test(start_paused = true)]
async fn test_idle_worker_retires() {
    let (transport, manager) = setup();

    for _ in 0..3 {
        manager
            .send_command_to_device("32:153289", fan("000307"), Priority::Normal, Duration::ZERO)
            .await;
    }
    let status = manager.get_queue_statistics().await.queue_status;
    assert_eq!(status.active_queues, 1);
    assert_eq!(status.device_queue_depths.get("32:153289"), Some(&2));

    manager.wait_drained().await;
    sleep(IDLE * 2).await;

    let status = manager.get_queue_statistics().await.queue_status;
    assert_eq!(status.active_queues, 0);
    assert!(status.device_queue_depths.is_empty());

    // A retired device starts over cleanly
    let again = manager
        .send_command_to_device("32:153289", fan("000107"), Priority::Normal, Duration::ZERO)
        .await;
    assert!(!again.queued);
    assert_spaced(&transport.sent_to("32:153289").await);
}

#[tokio::test(start_paused = true)]
async fn test_statistics_after_drain() {
    let (_transport, manager) = setup();

    for device in ["32:000001", "32:000002"] {
        for _ in 0..3 {
            manager
                .send_command_to_device(device, fan("000307"), Priority::Normal, Duration::ZERO)
                .await;
        }
    }
    let queued_before = manager.get_queue_statistics().await.command_statistics.queued_commands;
    manager.wait_drained().await;

    let stats = manager.get_queue_statistics().await.command_statistics;
    assert_eq!(stats.total_commands, 6);
    assert_eq!(stats.successful_commands, 6);
    assert_eq!(stats.queued_commands, 4);
    assert!(stats.queued_commands >= queued_before);
    assert_eq!(stats.success_rate_percent, 100.0);

    manager.reset_statistics();
    assert_eq!(manager.statistics().snapshot().total_commands, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_workers() {
    let (transport, manager) = setup();

    for _ in 0..5 {
        manager
            .send_command_to_device("32:153289", fan("000307"), Priority::Normal, Duration::ZERO)
            .await;
    }
    manager.shutdown().await;
    sleep(INTERVAL * 10).await;

    assert_eq!(transport.sent().await.len(), 1);
    assert_eq!(manager.active_queues().await, 0);
    assert_eq!(manager.queue_depth("32:153289").await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_quiet_immediate_device_is_pruned() {
    let (_transport, manager) = setup();

    let first = manager
        .send_command_to_device("32:000001", fan("000307"), Priority::Normal, Duration::ZERO)
        .await;
    assert!(!first.queued);
    assert_eq!(manager.shared.devices.lock().await.states.len(), 1);

    sleep(IDLE + INTERVAL).await;
    manager
        .send_command_to_device("32:000002", fan("000307"), Priority::Normal, Duration::ZERO)
        .await;

    let devices = manager.shared.devices.lock().await;
    assert!(!devices.states.contains_key("32:000001"));
    assert!(devices.states.contains_key("32:000002"));
}

#[tokio::test(start_paused = true)]
async fn test_prune_keeps_spacing_with_short_idle_timeout() {
    let transport = Arc::new(MemoryTransport::new());
    let manager = DeviceCommandManager::new(
        transport.clone(),
        DispatchConfig {
            min_interval: INTERVAL,
            idle_timeout: Duration::from_millis(100),
            ..test_config()
        },
    );

    manager
        .send_command_to_device("32:000001", fan("000107"), Priority::Normal, Duration::ZERO)
        .await;
    sleep(Duration::from_millis(200)).await;
    // Past the idle timeout, so this submission sweeps idle devices
    manager
        .send_command_to_device("32:000002", fan("000107"), Priority::Normal, Duration::ZERO)
        .await;
    sleep(Duration::from_millis(50)).await;

    let again = manager
        .send_command_to_device("32:000001", fan("000307"), Priority::Normal, Duration::ZERO)
        .await;
    assert!(again.queued);

    manager.wait_drained().await;
    let sent = transport.sent_to("32:000001").await;
    assert_eq!(sent.len(), 2);
    assert_spaced(&sent);
}

#[tokio::test(start_paused = true)]
async fn test_reply_verb_is_rejected() {
    let (transport, manager) = setup();

    let result = manager
        .send_command_to_device(
            "32:153289",
            CommandDefinition::new("31DA", Verb::Reply, "00"),
            Priority::Normal,
            Duration::ZERO,
        )
        .await;

    assert!(!result.success);
    assert!(result.error_message.unwrap().contains("invalid command"));
    assert!(transport.sent().await.is_empty());
    assert_eq!(manager.queue_depth("32:153289").await, 0);
    assert_eq!(manager.get_queue_statistics().await.command_statistics.total_commands, 0);
}
