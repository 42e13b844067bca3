use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::buffer::BatchBuffer;
use crate::config::{ConfigError, TailConfig};
use crate::interval::PollInterval;
use crate::provider::{LogProvider, ProviderError};
use runscope_types::{CloudProviderOptions, LogEntry, TimeWindow};

/// Offset added to the watermark when asking for newer records. Provider
/// filters compare inclusively at nanosecond resolution.
const WATERMARK_EPSILON: chrono::Duration = chrono::Duration::nanoseconds(1);

/// Turns a page-based log provider into a continuous stream of entries
pub struct LogTailer<P> {
    provider: Arc<P>,
    opts: CloudProviderOptions,
    config: TailConfig,
}

impl<P: LogProvider + 'static> LogTailer<P> {
    /// Create a tailer for the source named in `opts`
    pub fn new(
        provider: Arc<P>,
        opts: CloudProviderOptions,
        config: TailConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            provider,
            opts,
            config,
        })
    }

    pub fn options(&self) -> &CloudProviderOptions {
        &self.opts
    }

    pub fn config(&self) -> &TailConfig {
        &self.config
    }

    /// Start a fresh session that runs until `cancel` fires or the
    /// consumer drops its end of the stream.
    ///
    /// Every call begins with a new backfill search; nothing carries over
    /// from earlier sessions.
    pub fn start(&self, cancel: CancellationToken) -> LogTail {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let session = TailSession::new(
            Arc::clone(&self.provider),
            &self.opts,
            self.config.clone(),
            tx,
            cancel,
        );
        let task = tokio::spawn(session.run());

        LogTail { receiver: rx, task }
    }
}

/// Consumer end of a tail session
pub struct LogTail {
    receiver: mpsc::Receiver<LogEntry>,
    task: JoinHandle<TailSummary>,
}

impl LogTail {
    /// Next entry, or None once the session has ended
    pub async fn recv(&mut self) -> Option<LogEntry> {
        self.receiver.recv().await
    }

    /// Consume the tail as a stream of entries
    pub fn into_stream(self) -> impl Stream<Item = LogEntry> + Send + 'static {
        futures::stream::unfold(self.receiver, |mut rx| async move {
            rx.recv().await.map(|entry| (entry, rx))
        })
    }

    /// Stop consuming and wait for the session to finish.
    /// Dropping the receiver ends a session that has not been cancelled.
    pub async fn join(self) -> Result<TailSummary, JoinError> {
        drop(self.receiver);
        self.task.await
    }
}

/// Counters reported when a session ends
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TailSummary {
    /// Poll ticks handled
    pub polls: u64,

    /// Backfill searches started
    pub search_cycles: u64,

    /// Provider fetches that failed
    pub fetch_errors: u64,

    /// Entries handed to the consumer, status entries included
    pub delivered: u64,

    /// Non-empty flushes
    pub flushes: u64,

    /// Whether initial history was found
    pub initialized: bool,

    /// Timestamp of the newest log record delivered
    pub watermark: Option<DateTime<Utc>>,
}

/// Why a session stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Halt {
    Cancelled,
    ConsumerGone,
}

type Step = Result<(), Halt>;

/// State of one running session. Lives entirely inside its task.
struct TailSession<P> {
    provider: Arc<P>,
    config: TailConfig,
    source_id: String,
    base_filter: String,
    tx: mpsc::Sender<LogEntry>,
    cancel: CancellationToken,

    buffer: BatchBuffer,
    watermark: Option<DateTime<Utc>>,
    initialized: bool,
    interval: PollInterval,
    summary: TailSummary,
}

impl<P: LogProvider> TailSession<P> {
    fn new(
        provider: Arc<P>,
        opts: &CloudProviderOptions,
        config: TailConfig,
        tx: mpsc::Sender<LogEntry>,
        cancel: CancellationToken,
    ) -> Self {
        let base_filter = provider.base_filter(&opts.source_id);
        Self {
            buffer: BatchBuffer::new(config.batch_size),
            interval: PollInterval::from_config(&config),
            provider,
            config,
            source_id: opts.source_id.clone(),
            base_filter,
            tx,
            cancel,
            watermark: None,
            initialized: false,
            summary: TailSummary::default(),
        }
    }

    async fn run(mut self) -> TailSummary {
        info!(source = %self.source_id, "starting log tail");

        let cancel = self.cancel.clone();
        let flush_every = self.config.flush_interval;
        let mut flush_ticker = time::interval_at(Instant::now() + flush_every, flush_every);
        flush_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let next_poll = time::sleep(self.interval.current());
        tokio::pin!(next_poll);

        let halt = loop {
            let step = tokio::select! {
                biased;

                _ = cancel.cancelled() => Err(Halt::Cancelled),

                _ = flush_ticker.tick() => self.flush().await,

                _ = &mut next_poll => {
                    let step = self.poll().await;
                    next_poll.as_mut().reset(Instant::now() + self.interval.current());
                    step
                }
            };

            if let Err(halt) = step {
                break halt;
            }
        };

        if halt == Halt::Cancelled {
            self.final_flush().await;
        }

        self.summary.initialized = self.initialized;
        self.summary.watermark = self.watermark;
        info!(
            source = %self.source_id,
            reason = ?halt,
            delivered = self.summary.delivered,
            "log tail stopped"
        );
        // Dropping the session drops the sender, which closes the stream
        self.summary
    }

    async fn poll(&mut self) -> Step {
        self.summary.polls += 1;
        if self.initialized {
            self.poll_new_entries().await
        } else {
            self.search_history().await
        }
    }

    /// Try each backfill window in turn, widest last, until one has records
    async fn search_history(&mut self) -> Step {
        self.summary.search_cycles += 1;
        let windows = self.config.time_windows.clone();

        for window in &windows {
            self.push(LogEntry::info(format!(
                "Initial load: searching for logs from {}...",
                window.description
            )))
            .await?;

            let filter = self.window_filter(window);
            debug!(window = %window.description, %filter, "searching backfill window");

            let mut entries = match self.fetch(&filter).await? {
                Ok(entries) => entries,
                Err(err) => {
                    self.summary.fetch_errors += 1;
                    debug!(window = %window.description, error = %err, "backfill fetch failed");
                    continue;
                }
            };
            if entries.is_empty() {
                continue;
            }

            // No watermark yet, so the whole page is delivered
            sort_by_timestamp(&mut entries);
            let latest = entries.last().map(|e| e.timestamp);
            let count = entries.len();
            for entry in entries {
                self.push(entry).await?;
            }

            self.watermark = latest;
            self.initialized = true;
            self.interval.reset();
            info!(
                source = %self.source_id,
                window = %window.description,
                count,
                "initial history loaded"
            );
            return self.flush().await;
        }

        debug!(source = %self.source_id, "no history in any backfill window");
        self.push(LogEntry::warning("No logs found for this service"))
            .await?;
        self.flush().await
    }

    /// Fetch records strictly newer than the watermark
    async fn poll_new_entries(&mut self) -> Step {
        let cutoff = self.watermark.map(|ts| ts + WATERMARK_EPSILON);
        let filter = self.provider.build_filter(&self.base_filter, cutoff);

        let found_new = match self.fetch(&filter).await? {
            Ok(mut entries) => {
                sort_by_timestamp(&mut entries);
                if let Some(watermark) = self.watermark {
                    entries.retain(|e| e.timestamp > watermark);
                }

                let latest = entries.last().map(|e| e.timestamp);
                let count = entries.len();
                for entry in entries {
                    self.push(entry).await?;
                }
                if latest.is_some() {
                    self.watermark = latest;
                }
                trace!(count, "polled new entries");
                count > 0
            }
            Err(err) => {
                self.summary.fetch_errors += 1;
                warn!(source = %self.source_id, error = %err, "log fetch failed");
                self.push(LogEntry::error(format!("Error fetching logs: {}", err)))
                    .await?;
                false
            }
        };

        self.flush().await?;
        let next = self.interval.record(found_new);
        debug!(found_new, next_poll = ?next, "adjusted poll interval");
        Ok(())
    }

    fn window_filter(&self, window: &TimeWindow) -> String {
        let start = window.start_from(Utc::now());
        self.provider.build_filter(&self.base_filter, start)
    }

    /// One provider call, abandoned if the session is cancelled meanwhile
    async fn fetch(&self, filter: &str) -> Result<Result<Vec<LogEntry>, ProviderError>, Halt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Halt::Cancelled),
            result = self.provider.fetch_logs(filter, self.config.page_size) => Ok(result),
        }
    }

    async fn push(&mut self, entry: LogEntry) -> Step {
        if self.buffer.push(entry) {
            self.flush().await
        } else {
            Ok(())
        }
    }

    /// Hand every buffered entry to the consumer in order.
    /// On cancellation the undelivered remainder is dropped.
    async fn flush(&mut self) -> Step {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = self.buffer.take();
        self.summary.flushes += 1;
        trace!(count = batch.len(), "flushing buffered entries");

        for entry in batch {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Halt::Cancelled),
                sent = self.tx.send(entry) => sent.map_err(|_| Halt::ConsumerGone)?,
            }
            self.summary.delivered += 1;
        }
        Ok(())
    }

    /// Last delivery attempt after cancellation, bounded in time so a
    /// consumer that stopped draining cannot hold the session open
    async fn final_flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let batch = self.buffer.take();
        self.summary.flushes += 1;

        let tx = &self.tx;
        let delivered = &mut self.summary.delivered;
        let drained = time::timeout(self.config.final_flush_timeout, async move {
            for entry in batch {
                if tx.send(entry).await.is_err() {
                    break;
                }
                *delivered += 1;
            }
        })
        .await;

        if drained.is_err() {
            debug!(source = %self.source_id, "final flush timed out");
        }
    }
}

/// Stable sort, so records sharing a timestamp keep provider order
fn sort_by_timestamp(entries: &mut [LogEntry]) {
    entries.sort_by_key(|e| e.timestamp);
}
