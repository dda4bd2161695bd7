//! Optional newline-delimited JSON uplink for violation records.
//!
//! The hot path only ever does a non-blocking enqueue; a single worker
//! task owns the connection, reconnecting with a delay when the collector
//! goes away. Overflow and send failures drop records and count them.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use thiserror::Error;
use tokio::{io::AsyncWriteExt, net::TcpStream, sync::mpsc};
use tracing::{Instrument, info, trace_span, warn};

use crate::{aggregate::Violation, config};

/// Bounded queue between the ingest path and the worker.
const QUEUE_CAPACITY: usize = 1000;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("analytics queue full")]
    QueueFull,
    #[error("analytics worker already stopped")]
    Closed,
}

pub struct AnalyticsUplink {
    tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
    runtime: tokio::runtime::Runtime,
    worker: tokio::task::JoinHandle<()>,
    /// Wall-clock anchor so monotonic violation timestamps can be reported
    /// as unix milliseconds.
    unix_anchor_ms: i64,
    nano_anchor: i64,
}

impl AnalyticsUplink {
    /// Starts the worker. `now_nanos` is the engine clock's current
    /// reading, anchoring record timestamps to wall time.
    pub fn spawn(config: &config::Analytics, now_nanos: i64) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));
        let endpoint = config.endpoint.clone();
        let reconnect_delay = Duration::from_millis(config.reconnect_delay_ms);

        let worker = runtime.spawn(
            run_worker(endpoint, reconnect_delay, rx, Arc::clone(&dropped))
                .instrument(trace_span!("analytics_worker")),
        );

        let unix_anchor_ms = i64::try_from(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
        )
        .unwrap_or(0);

        Ok(Self {
            tx,
            dropped,
            runtime,
            worker,
            unix_anchor_ms,
            nano_anchor: now_nanos,
        })
    }

    /// Non-blocking enqueue; a full or closed queue drops the record,
    /// counts it, and reports why.
    pub fn offer(&self, violation: &Violation) -> Result<(), AnalyticsError> {
        let line = self.format_line(violation);
        match self.tx.try_send(line) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(AnalyticsError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(AnalyticsError::Closed)
            }
        }
    }

    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Closes the queue, lets the worker drain, and joins it with a
    /// five-second timeout.
    pub fn shutdown(self) {
        let Self {
            tx,
            runtime,
            worker,
            ..
        } = self;
        drop(tx);
        let joined = runtime.block_on(async { tokio::time::timeout(SHUTDOWN_TIMEOUT, worker).await });
        if joined.is_err() {
            warn!("analytics worker did not drain within the shutdown timeout");
        }
        runtime.shutdown_background();
    }

    fn format_line(&self, violation: &Violation) -> String {
        let unix_ms =
            self.unix_anchor_ms + (violation.nano_time - self.nano_anchor) / 1_000_000;
        // Name and category go through the JSON serializer for escaping;
        // the scores are fixed to six decimal places.
        let raw_name: &str = &violation.name;
        let name = serde_json::to_string(raw_name).unwrap_or_else(|_| "\"?\"".to_owned());
        let category =
            serde_json::to_string(&violation.category).unwrap_or_else(|_| "\"?\"".to_owned());
        format!(
            "{{\"type\":\"violation\",\"player_uuid\":\"{}\",\"player_name\":{name},\
             \"category\":{category},\"confidence\":{:.6},\"severity\":{:.6},\
             \"timestamp\":{unix_ms}}}\n",
            violation.player, violation.confidence, violation.severity,
        )
    }
}

async fn run_worker(
    endpoint: String,
    reconnect_delay: Duration,
    mut rx: mpsc::Receiver<String>,
    dropped: Arc<AtomicU64>,
) {
    'reconnect: loop {
        let mut stream = loop {
            match TcpStream::connect(&endpoint).await {
                Ok(stream) => break stream,
                Err(e) => {
                    if rx.is_closed() {
                        // Shutting down with no collector; the backlog is
                        // undeliverable.
                        dropped.fetch_add(rx.len() as u64, Ordering::Relaxed);
                        return;
                    }
                    warn!("analytics collector unreachable at {endpoint}: {e}");
                    tokio::time::sleep(reconnect_delay).await;
                }
            }
        };
        info!("analytics uplink connected to {endpoint}");

        while let Some(line) = rx.recv().await {
            if let Err(e) = stream.write_all(line.as_bytes()).await {
                warn!("analytics connection lost: {e}");
                dropped.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(reconnect_delay).await;
                continue 'reconnect;
            }
        }
        // Channel closed and drained.
        return;
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    use uuid::Uuid;

    use super::*;
    use crate::check::Explanation;

    fn violation(nano_time: i64) -> Violation {
        Violation {
            player: Uuid::from_u128(0xdead_beef),
            name: "steve \"the\" miner".into(),
            category: "combat_reach".to_owned(),
            confidence: 0.998_5,
            severity: 0.75,
            nano_time,
            ping_ms: 20,
            results: Vec::new(),
            explanation: Explanation::new(),
        }
    }

    #[test]
    fn wire_format_is_one_json_object_per_line() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let config = config::Analytics {
            enabled: true,
            endpoint,
            reconnect_delay_ms: 50,
        };
        let uplink = AnalyticsUplink::spawn(&config, 0).unwrap();
        uplink.offer(&violation(2_000_000_000)).unwrap();

        let (socket, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(socket);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["type"], "violation");
        assert_eq!(parsed["player_name"], "steve \"the\" miner");
        assert_eq!(parsed["category"], "combat_reach");
        assert!((parsed["confidence"].as_f64().unwrap() - 0.9985).abs() < 1e-9);
        assert!(parsed["timestamp"].as_i64().unwrap() >= 2_000);

        assert!(line.contains("\"confidence\":0.998500"));
        assert_eq!(uplink.dropped_count(), 0);
        uplink.shutdown();
    }

    #[test]
    fn overflow_is_dropped_and_counted() {
        // Nothing listens here; the queue backs up and overflows.
        let config = config::Analytics {
            enabled: true,
            endpoint: "127.0.0.1:1".to_owned(),
            reconnect_delay_ms: 100,
        };
        let uplink = AnalyticsUplink::spawn(&config, 0).unwrap();

        let rejected = (0..1100)
            .filter(|i| uplink.offer(&violation(*i)).is_err())
            .count();
        assert!(rejected >= 100);
        assert!(uplink.dropped_count() >= 100);
        uplink.shutdown();
    }
}
