// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::mocks::{collecting_sink, RecordingTransport};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_telegram::batch_sender::{BatchConfig, BatchSender};
use tracing_telegram::error::{default_error_sink, SendError};
use tracing_telegram::sender::Sender;
use tracing_telegram::transport::Transport;

const SEP: &str = "\n---\n";

fn batch_sender(transport: &Arc<RecordingTransport>, config: BatchConfig) -> BatchSender {
    BatchSender::new(
        Arc::clone(transport) as Arc<dyn Transport>,
        config,
        default_error_sink(),
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn count_trigger_then_tick() {
    let transport = RecordingTransport::new();
    let sender = batch_sender(&transport, BatchConfig::new(2, Duration::from_millis(10)));

    sender.send("msg1".to_string()).unwrap();
    sender.send("msg2".to_string()).unwrap();
    sleep(Duration::from_millis(1)).await;

    assert_eq!(transport.sent(), vec!["msg1\n---\nmsg2\n---\n"]);

    sender.send("msg3".to_string()).unwrap();
    sleep(Duration::from_millis(20)).await;

    assert_eq!(
        transport.sent(),
        vec!["msg1\n---\nmsg2\n---\n", "msg3\n---\n"]
    );

    sender.close().await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn zero_batch_size_flushes_every_payload() {
    let transport = RecordingTransport::new();
    let sender = batch_sender(&transport, BatchConfig::new(0, Duration::from_secs(60)));

    sender.send("a".to_string()).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.sent(), vec![format!("a{SEP}")]);

    sender.send("b".to_string()).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.sent(), vec![format!("a{SEP}"), format!("b{SEP}")]);
}

#[tokio::test(start_paused = true)]
async fn nothing_is_sent_below_threshold_before_tick() {
    let transport = RecordingTransport::new();
    let sender = batch_sender(&transport, BatchConfig::new(10, Duration::from_secs(1)));

    for i in 0..3 {
        sender.send(format!("msg{i}")).unwrap();
    }
    sleep(Duration::from_millis(500)).await;
    assert_eq!(transport.calls(), 0);

    sleep(Duration::from_millis(600)).await;
    assert_eq!(transport.sent(), vec!["msg0\n---\nmsg1\n---\nmsg2\n---\n"]);
}

#[tokio::test(start_paused = true)]
async fn close_drains_buffer_before_closing_transport() {
    let transport = RecordingTransport::new();
    let sender = batch_sender(&transport, BatchConfig::new(10, Duration::from_secs(60)));

    sender.send("a".to_string()).unwrap();
    sender.send("b".to_string()).unwrap();
    sender.close().await.unwrap();

    assert_eq!(transport.sent(), vec![format!("a{SEP}b{SEP}")]);
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn close_is_idempotent() {
    let transport = RecordingTransport::new();
    let sender = batch_sender(&transport, BatchConfig::new(10, Duration::ZERO));

    sender.send("once".to_string()).unwrap();
    sender.close().await.unwrap();
    sender.close().await.unwrap();

    assert_eq!(transport.sent(), vec![format!("once{SEP}")]);
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_close_waits_for_drain() {
    let transport = RecordingTransport::slow(Duration::from_millis(300));
    let sender = Arc::new(batch_sender(
        &transport,
        BatchConfig::new(10, Duration::from_secs(60)),
    ));

    sender.send("a".to_string()).unwrap();
    let first = {
        let sender = Arc::clone(&sender);
        tokio::spawn(async move { sender.close().await })
    };
    sleep(Duration::from_millis(20)).await;

    sender.close().await.unwrap();
    assert_eq!(transport.sent(), vec![format!("a{SEP}")]);
    assert_eq!(transport.close_count(), 1);

    first.await.unwrap().unwrap();
}

#[tokio::test]
async fn send_after_close_is_rejected() {
    let transport = RecordingTransport::new();
    let sender = batch_sender(&transport, BatchConfig::new(10, Duration::ZERO));

    sender.close().await.unwrap();

    assert_eq!(sender.send("late".to_string()), Err(SendError::Closed));
    assert_eq!(sender.flush().await, Err(SendError::Closed));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn explicit_flush_waits_for_delivery() {
    let transport = RecordingTransport::new();
    let sender = batch_sender(&transport, BatchConfig::new(10, Duration::ZERO));

    sender.send("first".to_string()).unwrap();
    sender.flush().await.unwrap();
    assert_eq!(transport.sent(), vec![format!("first{SEP}")]);

    // Empty buffer: no call.
    sender.flush().await.unwrap();
    assert_eq!(transport.calls(), 1);

    sender.send("second".to_string()).unwrap();
    sender.close().await.unwrap();
    assert_eq!(
        transport.sent(),
        vec![format!("first{SEP}"), format!("second{SEP}")]
    );
}

#[tokio::test]
async fn failed_chunk_abandons_rest_of_flush() {
    let transport = RecordingTransport::failing_on(1);
    let (sink, errors) = collecting_sink();
    let config = BatchConfig {
        max_chunk_size: 5,
        separator: "\n".to_string(),
        ..BatchConfig::new(10, Duration::ZERO)
    };
    let sender =
        BatchSender::new(Arc::clone(&transport) as Arc<dyn Transport>, config, sink).unwrap();

    for payload in ["aaaa", "bbbb", "cccc"] {
        sender.send(payload.to_string()).unwrap();
    }
    sender.close().await.unwrap();

    assert_eq!(transport.sent(), vec!["aaaa\n"]);
    assert_eq!(transport.calls(), 2);
    assert_eq!(
        *errors.lock().unwrap(),
        vec!["flush aborted after 1 of 3 chunks: 500: Internal Server Error"]
    );
}

#[tokio::test(start_paused = true)]
async fn slow_transport_never_sees_overlapping_flushes() {
    let transport = RecordingTransport::slow(Duration::from_millis(50));
    let sender = batch_sender(&transport, BatchConfig::new(1, Duration::from_millis(10)));

    for i in 1..=3 {
        sender.send(i.to_string()).unwrap();
    }
    sleep(Duration::from_millis(200)).await;
    sender.close().await.unwrap();

    assert_eq!(
        transport.sent(),
        vec![format!("1{SEP}"), format!("2{SEP}"), format!("3{SEP}")]
    );
    assert!(!transport.overlapped());
}

#[tokio::test(start_paused = true)]
async fn dropped_sender_still_drains() {
    let transport = RecordingTransport::new();
    let sender = batch_sender(&transport, BatchConfig::new(10, Duration::from_secs(60)));

    sender.send("orphan".to_string()).unwrap();
    drop(sender);
    sleep(Duration::from_millis(1)).await;

    assert_eq!(transport.sent(), vec![format!("orphan{SEP}")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sends_are_delivered_once_in_order() {
    const TASKS: usize = 10;
    const PER_TASK: usize = 100;

    let transport = RecordingTransport::new();
    let sender = Arc::new(batch_sender(
        &transport,
        BatchConfig::new(7, Duration::from_millis(5)),
    ));

    let mut handles = Vec::new();
    for t in 0..TASKS {
        let sender = Arc::clone(&sender);
        handles.push(tokio::spawn(async move {
            for i in 0..PER_TASK {
                sender.send(format!("t{t}-{i}")).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    sender.close().await.unwrap();

    let joined = transport.sent().concat();
    let delivered: Vec<&str> = joined.split(SEP).filter(|p| !p.is_empty()).collect();

    assert_eq!(delivered.len(), TASKS * PER_TASK);
    let unique: HashSet<&str> = delivered.iter().copied().collect();
    assert_eq!(unique.len(), TASKS * PER_TASK);

    // Sends from one task keep their order.
    for t in 0..TASKS {
        let prefix = format!("t{t}-");
        let order: Vec<usize> = delivered
            .iter()
            .filter_map(|p| p.strip_prefix(prefix.as_str()))
            .map(|i| i.parse().unwrap())
            .collect();
        assert_eq!(order, (0..PER_TASK).collect::<Vec<_>>());
    }
    assert!(!transport.overlapped());
}
