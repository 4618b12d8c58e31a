// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock transport and error sink shared by the integration tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_telegram::error::{DeliveryError, ErrorSink, TransportError};
use tracing_telegram::transport::Transport;

/// Transport that records every chunk it accepts.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
    delay: Option<Duration>,
    in_flight: AtomicBool,
    overlapped: AtomicBool,
    closed: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Rejects the `call`-th send (0-based) with a 500.
    pub fn failing_on(call: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_on_call: Some(call),
            ..Default::default()
        })
    }

    /// Every send takes `delay` to complete.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// True when two sends were ever in progress at the same time.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_on_call == Some(call) {
            Err(TransportError::Api {
                status: 500,
                description: "Internal Server Error".to_string(),
            })
        } else {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        };

        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Error sink that keeps the rendered errors.
#[allow(dead_code)]
pub fn collecting_sink() -> (ErrorSink, Arc<Mutex<Vec<String>>>) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink_errors = Arc::clone(&errors);
    let sink: ErrorSink = Arc::new(move |err: &DeliveryError| {
        sink_errors.lock().unwrap().push(err.to_string());
    });
    (sink, errors)
}
