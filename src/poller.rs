//! # Device Poller
//!
//! Fetches voltage readings from the device on a fixed interval and hands
//! each batch to the foreground over a channel.
//!
//! ## Key Components
//! - `ReadingSource`: Where batches come from (HTTP device, or a fake in tests)
//! - `DevicePoller`: The polling loop, run on its own thread and Tokio runtime
//! - `PollerHandle`: Stop flag and join handle owned by the foreground
//!
//! ## Failure Model
//! A failed fetch is logged and skipped; the next attempt happens one
//! interval later. There is no backoff. Cancellation is checked between
//! fetches, so shutdown waits at most one request timeout.

use crate::error::PollError;
use crate::reading::ReadingBatch;
use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Runtime;

const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn fetch(&self) -> Result<ReadingBatch, PollError>;
}

/// The voltage box's HTTP endpoint
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PollError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PollError::ClientBuild)?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ReadingSource for HttpSource {
    async fn fetch(&self) -> Result<ReadingBatch, PollError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(PollError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(PollError::Request)?;
        ReadingBatch::parse(&body)
    }
}

/// Polling loop state, moved onto the poller thread
pub struct DevicePoller<S> {
    source: S,
    interval: Duration,
    sender: Sender<ReadingBatch>,
    should_stop: Arc<AtomicBool>,
}

/// Foreground side of a running poller.
///
/// Dropping the handle stops the poller and waits for its thread.
pub struct PollerHandle {
    should_stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PollerHandle {
    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::Relaxed);
    }

    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("Device poller thread panicked");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

impl<S: ReadingSource + 'static> DevicePoller<S> {
    /// Creates a poller and the receiving end of its batch channel.
    ///
    /// The receiver has a single consumer: the controller's event loop.
    pub fn new(source: S, interval: Duration) -> (Self, Receiver<ReadingBatch>) {
        let (sender, receiver) = unbounded();
        let poller = DevicePoller {
            source,
            interval,
            sender,
            should_stop: Arc::new(AtomicBool::new(false)),
        };
        (poller, receiver)
    }

    /// Start polling on a dedicated thread
    pub fn spawn(self) -> PollerHandle {
        let should_stop = self.should_stop.clone();
        let thread = thread::spawn(move || self.run());

        PollerHandle {
            should_stop,
            thread: Some(thread),
        }
    }

    /// Runs the polling loop until stopped or the receiver is dropped.
    ///
    /// The fetch is async, so the thread owns a Tokio runtime instead of
    /// borrowing the foreground's.
    pub fn run(self) {
        let rt = match Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!("{}", PollError::Runtime(e));
                return;
            }
        };

        log::info!("Device poller: started ({:?} interval)", self.interval);
        rt.block_on(self.poll_loop());
        log::info!("Device poller: stopped");
    }

    async fn poll_loop(&self) {
        while !self.stopped() {
            match self.source.fetch().await {
                Ok(batch) => {
                    if self.sender.send(batch).is_err() {
                        log::info!("Device poller: receiver closed, shutting down");
                        break;
                    }
                }
                Err(e) => log::warn!("Device poll failed: {}", e),
            }
            self.wait_interval().await;
        }
    }

    fn stopped(&self) -> bool {
        self.should_stop.load(Ordering::Relaxed)
    }

    /// Sleep for one interval, waking early if a stop is requested
    async fn wait_interval(&self) {
        let mut remaining = self.interval;
        while !remaining.is_zero() && !self.stopped() {
            let step = remaining.min(STOP_CHECK_INTERVAL);
            tokio::time::sleep(step).await;
            remaining -= step;
        }
    }
}
