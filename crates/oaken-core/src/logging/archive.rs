//! Error-record archive on object storage.
//!
//! ERROR events are formatted to one line each and appended to a per-day
//! object `<prefix>/<file_prefix>.<YYYY-MM-DD>.log`, the day being the one
//! the event was logged on. Uploads run on a background task fed by a bounded
//! queue so logging never blocks on the network; everything queued while an
//! upload runs goes out in the next single upload. Upload failures and queue
//! overflow go to stderr; they are never logged through tracing, which would
//! feed back into this layer.

use crate::config::ArchiveConfig;
use crate::{Error, Result};
use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::fmt::{self, Write as _};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Targets whose events are never archived (the upload path itself).
const IGNORED_TARGETS: &[&str] = &["object_store", "reqwest", "hyper", "h2", "rustls"];

/// Where archived records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveTarget {
    /// S3 bucket and key prefix (may be empty)
    S3 { bucket: String, prefix: String },
    /// Local directory
    Local(PathBuf),
}

impl ArchiveTarget {
    /// Parse `s3://bucket/prefix`, `file:///dir`, a filesystem path, or a bare
    /// bucket name.
    pub fn parse(target: &str) -> Result<Self> {
        let target = target.trim();
        if target.is_empty() {
            return Err(Error::Config("archive target is empty".into()));
        }

        if let Some(rest) = target.strip_prefix("s3://") {
            return Self::s3(rest);
        }
        if let Some(path) = target.strip_prefix("file://") {
            return Ok(ArchiveTarget::Local(PathBuf::from(path)));
        }
        if target.starts_with('/') || target.starts_with('.') {
            return Ok(ArchiveTarget::Local(PathBuf::from(target)));
        }
        Self::s3(target)
    }

    fn s3(rest: &str) -> Result<Self> {
        let (bucket, prefix) = match rest.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(Error::Config(format!("invalid S3 archive target: s3://{rest}")));
        }
        Ok(ArchiveTarget::S3 {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        })
    }

    /// Key prefix inside the store.
    pub fn prefix(&self) -> &str {
        match self {
            ArchiveTarget::S3 { prefix, .. } => prefix,
            ArchiveTarget::Local(_) => "",
        }
    }
}

/// Build the object store for an archive target.
pub fn create_object_store(
    target: &ArchiveTarget,
    config: &ArchiveConfig,
) -> Result<Arc<dyn ObjectStore>> {
    match target {
        ArchiveTarget::S3 { bucket, .. } => create_s3_store(bucket, config),
        ArchiveTarget::Local(path) => create_local_store(path),
    }
}

fn create_s3_store(bucket: &str, config: &ArchiveConfig) -> Result<Arc<dyn ObjectStore>> {
    use object_store::aws::AmazonS3Builder;

    let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

    if let Some(ref region) = config.aws_region {
        builder = builder.with_region(region);
    }
    if let Some(ref access_key) = config.aws_access_key_id {
        builder = builder.with_access_key_id(access_key);
    }
    if let Some(ref secret_key) = config.aws_secret_access_key {
        builder = builder.with_secret_access_key(secret_key);
    }
    if let Some(ref endpoint) = config.s3_endpoint {
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(endpoint.starts_with("http://"));
    }

    let store = builder
        .build()
        .map_err(|e| Error::Storage(format!("Failed to create S3 store: {e}")))?;
    Ok(Arc::new(store))
}

fn create_local_store(path: &std::path::Path) -> Result<Arc<dyn ObjectStore>> {
    use object_store::local::LocalFileSystem;

    std::fs::create_dir_all(path).map_err(|e| {
        Error::Storage(format!(
            "Failed to create archive directory {}: {e}",
            path.display()
        ))
    })?;

    let store = LocalFileSystem::new_with_prefix(path)
        .map_err(|e| Error::Storage(format!("Failed to open local archive: {e}")))?;
    Ok(Arc::new(store))
}

/// Records buffered between the logging threads and the upload task.
const QUEUE_CAPACITY: usize = 4096;

/// One archived line and the UTC day it was logged on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    pub day: NaiveDate,
    pub line: String,
}

impl ArchiveRecord {
    pub fn new(day: NaiveDate, line: impl Into<String>) -> Self {
        Self {
            day,
            line: line.into(),
        }
    }
}

/// Accumulates one day of records and re-uploads the day object per batch.
pub struct ArchiveSink {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    file_prefix: String,
    day: Option<NaiveDate>,
    buffer: Vec<u8>,
    pending: bool,
}

impl ArchiveSink {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        prefix: impl Into<String>,
        file_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            file_prefix: file_prefix.into(),
            day: None,
            buffer: Vec::new(),
            pending: false,
        }
    }

    /// Object holding the records of `day`.
    pub fn object_path(&self, day: NaiveDate) -> ObjectPath {
        let name = format!("{}.{}.log", self.file_prefix, day.format("%Y-%m-%d"));
        if self.prefix.is_empty() {
            ObjectPath::from(name)
        } else {
            ObjectPath::from(format!("{}/{}", self.prefix, name))
        }
    }

    /// Append records in logging order and upload each day object they touch
    /// once. Returns the number of uploads.
    ///
    /// On the first write of a day the existing object, if any, is loaded so
    /// earlier records survive a restart. A failed upload keeps the lines in
    /// the buffer; the next upload carries them.
    pub async fn append_batch<I>(&mut self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = ArchiveRecord>,
    {
        let mut uploads = 0;
        for record in records {
            if self.day != Some(record.day) {
                if self.pending {
                    self.upload().await?;
                    uploads += 1;
                }
                self.buffer = self.load(record.day).await?;
                self.day = Some(record.day);
            }

            self.buffer.extend_from_slice(record.line.as_bytes());
            if !record.line.ends_with('\n') {
                self.buffer.push(b'\n');
            }
            self.pending = true;
        }

        if self.pending {
            self.upload().await?;
            uploads += 1;
        }
        Ok(uploads)
    }

    async fn upload(&mut self) -> Result<()> {
        let Some(day) = self.day else {
            return Ok(());
        };
        let path = self.object_path(day);
        let payload = PutPayload::from_bytes(Bytes::copy_from_slice(&self.buffer));
        self.store
            .put(&path, payload)
            .await
            .map_err(|e| Error::Storage(format!("Failed to upload {path}: {e}")))?;
        self.pending = false;
        Ok(())
    }

    async fn load(&self, day: NaiveDate) -> Result<Vec<u8>> {
        let path = self.object_path(day);
        match self.store.get(&path).await {
            Ok(existing) => Ok(existing.bytes().await?.to_vec()),
            Err(object_store::Error::NotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

enum ArchiveCommand {
    Record(ArchiveRecord),
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct ArchiveStats {
    uploads: AtomicU64,
    dropped: AtomicU64,
}

/// Handle to the background upload task.
#[derive(Clone)]
pub struct ArchiveHandle {
    tx: mpsc::Sender<ArchiveCommand>,
    stats: Arc<ArchiveStats>,
}

impl ArchiveHandle {
    /// Start the upload task on the current runtime.
    pub fn spawn(sink: ArchiveSink) -> (Self, JoinHandle<()>) {
        Self::spawn_with_capacity(sink, QUEUE_CAPACITY)
    }

    /// Start the upload task with room for `capacity` queued records.
    ///
    /// Records logged while the queue is full are dropped and counted.
    pub fn spawn_with_capacity(sink: ArchiveSink, capacity: usize) -> (Self, JoinHandle<()>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let stats = Arc::new(ArchiveStats::default());
        let task = tokio::spawn(run_uploads(sink, rx, capacity, Arc::clone(&stats)));
        (Self { tx, stats }, task)
    }

    /// Tracing layer feeding this archive.
    pub fn layer(&self, worker: &'static str) -> ArchiveLayer {
        ArchiveLayer {
            tx: self.tx.clone(),
            stats: Arc::clone(&self.stats),
            worker,
        }
    }

    /// Wait until every record queued so far has been uploaded (or failed).
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(ArchiveCommand::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Successful object uploads.
    pub fn uploads(&self) -> u64 {
        self.stats.uploads.load(Ordering::Relaxed)
    }

    /// Records dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}

/// Drain whatever is queued, upload it as one batch, then release flushers.
async fn run_uploads(
    mut sink: ArchiveSink,
    mut rx: mpsc::Receiver<ArchiveCommand>,
    max_batch: usize,
    stats: Arc<ArchiveStats>,
) {
    let mut reported_drops = 0;

    while let Some(first) = rx.recv().await {
        let mut batch = Vec::new();
        let mut waiters = Vec::new();
        let mut next = Some(first);
        while let Some(command) = next {
            match command {
                ArchiveCommand::Record(record) => batch.push(record),
                ArchiveCommand::Flush(done) => waiters.push(done),
            }
            next = if batch.len() < max_batch {
                rx.try_recv().ok()
            } else {
                None
            };
        }

        if !batch.is_empty() {
            match sink.append_batch(batch).await {
                Ok(uploads) => {
                    stats.uploads.fetch_add(uploads as u64, Ordering::Relaxed);
                }
                Err(e) => eprintln!("log archive upload failed: {e}"),
            }
        }

        let dropped = stats.dropped.load(Ordering::Relaxed);
        if dropped > reported_drops {
            eprintln!("log archive queue full, dropped {} records", dropped - reported_drops);
            reported_drops = dropped;
        }

        for done in waiters {
            let _ = done.send(());
        }
    }
}

/// Forwards ERROR events to the archive task.
pub struct ArchiveLayer {
    tx: mpsc::Sender<ArchiveCommand>,
    stats: Arc<ArchiveStats>,
    worker: &'static str,
}

impl<S: Subscriber> Layer<S> for ArchiveLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() != Level::ERROR {
            return;
        }
        if IGNORED_TARGETS
            .iter()
            .any(|target| meta.target().starts_with(target))
        {
            return;
        }

        let now = Utc::now();
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = format!(
            "{} - {} - {} - {}",
            now.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.worker,
            meta.level(),
            visitor.finish()
        );

        let record = ArchiveRecord::new(now.date_naive(), line);
        match self.tx.try_send(ArchiveCommand::Record(record)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            // Receiver gone means shutdown is under way
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}
