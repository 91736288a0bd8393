//! Consume-transform-write loop shared by both workers.
//!
//! The loop pulls one message at a time, hands it to a [`MessageHandler`],
//! logs every failed stage of the returned [`MessageReport`], commits the
//! offset and moves on. It stops when the source is exhausted or a shutdown
//! signal arrives, then closes the source and the handler exactly once.

mod ingestion;
mod ledger;

pub use ingestion::SalesIngestor;
pub use ledger::LedgerPoster;

use crate::config::{Config, Worker};
use crate::kafka::{KafkaConsumerBuilder, KafkaMessage, PollResult, SmartKafkaConsumer};
use crate::metrics::{MetricsSnapshot, WorkerMetrics};
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Processing stage of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Payload decoding and typed field extraction
    Extract,
    /// Ledger credit and debit
    LedgerPair,
    Customer,
    Vendor,
    Category,
    Product,
    Sale,
    /// Invoice notification
    Publish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::LedgerPair => "ledger",
            Stage::Customer => "customer",
            Stage::Vendor => "vendor",
            Stage::Category => "category",
            Stage::Product => "product",
            Stage::Sale => "sales",
            Stage::Publish => "publish",
        }
    }

    /// Rows this stage writes when it succeeds.
    pub fn rows_written(&self) -> u64 {
        match self {
            Stage::Extract | Stage::Publish => 0,
            Stage::LedgerPair => 2,
            Stage::Customer | Stage::Vendor | Stage::Category | Stage::Product | Stage::Sale => 1,
        }
    }
}

/// Result of one attempted stage.
#[derive(Debug)]
pub struct StageOutcome {
    pub stage: Stage,
    pub result: Result<()>,
}

/// Every stage attempted for one message, in order.
#[derive(Debug, Default)]
pub struct MessageReport {
    outcomes: Vec<StageOutcome>,
}

impl MessageReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report for a message that failed extraction; nothing was written.
    pub fn rejected(error: Error) -> Self {
        let mut report = Self::new();
        report.record(Stage::Extract, Err(error));
        report
    }

    /// Append a stage outcome.
    pub fn record(&mut self, stage: Stage, result: Result<()>) {
        self.outcomes.push(StageOutcome { stage, result });
    }

    pub fn outcomes(&self) -> &[StageOutcome] {
        &self.outcomes
    }

    /// Stages that failed.
    pub fn failures(&self) -> impl Iterator<Item = (Stage, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.stage, e)))
    }

    /// Outcome of a given stage, if it was attempted.
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }

    /// Whether the stage was attempted and succeeded.
    pub fn succeeded(&self, stage: Stage) -> bool {
        self.outcome(stage).is_some_and(|o| o.result.is_ok())
    }

    /// No stage failed.
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Extraction failed, so no write was attempted.
    pub fn is_rejected(&self) -> bool {
        self.outcome(Stage::Extract).is_some_and(|o| o.result.is_err())
    }
}

/// What the source produced on one pull.
#[derive(Debug)]
pub enum Delivery {
    /// A message to process
    Message(KafkaMessage),
    /// Nothing arrived within the poll timeout
    Idle,
    /// The source failed; wait this long before pulling again
    Backoff(Duration),
    /// The stream has ended
    Closed,
}

/// Where messages come from.
#[async_trait]
pub trait MessageSource: Send {
    /// Pull the next delivery.
    async fn next_delivery(&mut self) -> Delivery;

    /// Mark a message as handled so it is not redelivered.
    async fn acknowledge(&mut self, message: &KafkaMessage) -> Result<()>;

    /// Release the source.
    async fn close(&mut self) {}
}

#[async_trait]
impl MessageSource for SmartKafkaConsumer {
    async fn next_delivery(&mut self) -> Delivery {
        match self.poll_with_backoff().await {
            PollResult::Message(message) => Delivery::Message(message),
            PollResult::Timeout => Delivery::Idle,
            PollResult::Error { backoff, .. } => Delivery::Backoff(backoff),
        }
    }

    async fn acknowledge(&mut self, message: &KafkaMessage) -> Result<()> {
        self.commit_offset(&message.topic, message.partition, message.offset)
            .await
    }

    async fn close(&mut self) {
        SmartKafkaConsumer::close(self);
    }
}

/// Per-message processing for one worker.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Which worker this handler implements.
    fn worker(&self) -> Worker;

    /// Process one message value. Never fails; failures are in the report.
    async fn handle(&self, payload: Option<&[u8]>) -> MessageReport;

    /// Release database and producer handles.
    async fn close(&self) {}
}

/// Sequential consume loop.
pub struct MessageLoop<S, H> {
    source: S,
    handler: H,
    metrics: WorkerMetrics,
    shutdown_rx: broadcast::Receiver<()>,
}

impl<S: MessageSource, H: MessageHandler> MessageLoop<S, H> {
    pub fn new(source: S, handler: H, shutdown_rx: broadcast::Receiver<()>) -> Self {
        Self {
            source,
            handler,
            metrics: WorkerMetrics::new(),
            shutdown_rx,
        }
    }

    /// Run until the source closes or shutdown is signalled.
    pub async fn run(mut self) -> MetricsSnapshot {
        let worker = self.handler.worker();
        info!(worker = worker.name(), "Worker started");

        loop {
            let delivery = tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!(worker = worker.name(), "Shutdown signal received");
                    break;
                }
                delivery = self.source.next_delivery() => delivery,
            };

            match delivery {
                Delivery::Message(message) => self.process(worker, &message).await,
                Delivery::Idle => {}
                Delivery::Backoff(delay) => {
                    tokio::select! {
                        _ = self.shutdown_rx.recv() => {
                            info!(worker = worker.name(), "Shutdown during backoff");
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Delivery::Closed => {
                    info!(worker = worker.name(), "Input stream exhausted");
                    break;
                }
            }
        }

        self.source.close().await;
        self.handler.close().await;

        let summary = self.metrics.snapshot();
        info!(
            worker = worker.name(),
            messages = summary.messages_total,
            rejected = summary.messages_rejected,
            failed = summary.messages_failed,
            rows_written = summary.rows_written,
            notifications = summary.notifications_published,
            "Worker stopped"
        );
        summary
    }

    async fn process(&mut self, worker: Worker, message: &KafkaMessage) {
        let report = self.handler.handle(message.value.as_deref()).await;

        for (stage, err) in report.failures() {
            error!(
                worker = worker.name(),
                stage = stage.as_str(),
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %err,
                "Error processing message"
            );
        }
        self.metrics.record_report(&report);

        if let Err(e) = self.source.acknowledge(message).await {
            self.metrics.record_commit_failure();
            warn!(
                worker = worker.name(),
                offset = message.offset,
                error = %e,
                "Failed to commit offset"
            );
        }
    }
}

/// Connect everything a worker needs and run it until shutdown.
///
/// Startup failures are returned; once the loop is running, per-message
/// failures are only logged.
pub async fn run_worker(
    config: &Config,
    worker: Worker,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<MetricsSnapshot> {
    config.validate_for(worker)?;

    let topic = worker.input_topic(&config.topics).to_string();
    let group = worker.consumer_group(&config.kafka);

    info!(
        worker = worker.name(),
        topic = %topic,
        group = %group,
        "Starting worker"
    );

    match worker {
        Worker::Ledger => {
            let handler = LedgerPoster::connect(config).await?;
            let consumer = KafkaConsumerBuilder::new(config.kafka.clone(), topic, group).build()?;
            Ok(MessageLoop::new(consumer, handler, shutdown_rx).run().await)
        }
        Worker::Ingest => {
            let handler = SalesIngestor::connect(config).await?;
            let consumer = KafkaConsumerBuilder::new(config.kafka.clone(), topic, group).build()?;
            Ok(MessageLoop::new(consumer, handler, shutdown_rx).run().await)
        }
    }
}
