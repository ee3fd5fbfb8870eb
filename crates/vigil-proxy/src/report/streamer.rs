//! Single-writer report streamer.
//!
//! Violation batches arrive on an unbounded channel and are appended to the
//! report file by one consumer task, which also owns rotation. The on-disk
//! content is a well-formed JSON array at every batch boundary.

use anyhow::Context;
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::pattern::{parse_report_naming, ReportNaming};
use crate::validation::ValidationError;

/// Cloneable handle writers use to submit violation batches. Empty batches
/// are ignored; submissions after the consumer has terminated are dropped
/// with a logged error.
#[derive(Clone)]
pub struct ViolationSink {
    tx: mpsc::UnboundedSender<Vec<ValidationError>>,
}

impl ViolationSink {
    pub fn submit(&self, batch: Vec<ValidationError>) {
        if batch.is_empty() {
            return;
        }
        if self.tx.send(batch).is_err() {
            error!("cannot stream violations: report streamer has terminated");
        }
    }
}

/// Owns the report file through a background consumer and keeps the
/// in-memory violation log for snapshot queries.
pub struct ReportStreamer {
    sink: ViolationSink,
    violations: Arc<RwLock<Vec<ValidationError>>>,
    consumer: JoinHandle<()>,
}

impl ReportStreamer {
    /// Parse the configured path, open the first report file, and start the
    /// consumer. Fails when the placeholder carries no time token or the
    /// first open fails.
    pub fn start(configured_path: &str) -> Result<Self, anyhow::Error> {
        let naming = parse_report_naming(configured_path)?;
        let writer = ReportWriter::open(&naming)?;
        debug!("streaming violations to {}", writer.path.display());

        let (tx, rx) = mpsc::unbounded_channel();
        let violations = Arc::new(RwLock::new(Vec::new()));
        let consumer = tokio::spawn(consume(rx, naming, writer, Arc::clone(&violations)));

        Ok(Self {
            sink: ViolationSink { tx },
            violations,
            consumer,
        })
    }

    pub fn sink(&self) -> ViolationSink {
        self.sink.clone()
    }

    /// Consistent snapshot of every violation observed since start,
    /// regardless of file rotation.
    pub fn snapshot(&self) -> Vec<ValidationError> {
        self.violations.read().clone()
    }

    /// Drop this handle's sender and wait for the consumer to drain and
    /// close the file. Outstanding sink clones keep the channel open.
    pub async fn shutdown(self) {
        let Self { sink, consumer, .. } = self;
        drop(sink);
        let _ = consumer.await;
    }
}

struct ReportWriter {
    file: File,
    path: PathBuf,
    rollover_at: Option<DateTime<Local>>,
}

impl ReportWriter {
    fn open(naming: &ReportNaming) -> Result<Self, anyhow::Error> {
        let (path, truncate, rollover_at) = match naming {
            ReportNaming::Static(path) => (path.clone(), true, None),
            ReportNaming::Rotating(pattern) => {
                let now = Local::now();
                (
                    pattern.filename_at(now),
                    false,
                    Some(pattern.next_rollover(now)),
                )
            }
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(truncate)
            .open(&path)
            .with_context(|| format!("cannot open report file {}", path.display()))?;

        let mut writer = Self {
            file,
            path,
            rollover_at,
        };
        if writer.file.metadata()?.len() == 0 {
            writer.file.write_all(b"[]")?;
        }
        Ok(writer)
    }

    /// Extend the on-disk array in place: drop the trailing `]`, separate
    /// from the previous element if one exists, write the batch, close the
    /// array again.
    fn append(&mut self, batch: &[ValidationError]) -> Result<(), anyhow::Error> {
        let size = self.file.metadata()?.len();
        self.file.set_len(size.saturating_sub(1))?;
        self.file.seek(SeekFrom::End(0))?;
        if size > 2 {
            self.file.write_all(b",\n")?;
        }
        for (index, violation) in batch.iter().enumerate() {
            let encoded = serde_json::to_vec(violation)?;
            self.file.write_all(&encoded)?;
            if index < batch.len() - 1 {
                self.file.write_all(b",\n")?;
            }
        }
        self.file.write_all(b"]")?;
        Ok(())
    }
}

async fn consume(
    mut rx: mpsc::UnboundedReceiver<Vec<ValidationError>>,
    naming: ReportNaming,
    mut writer: ReportWriter,
    violations: Arc<RwLock<Vec<ValidationError>>>,
) {
    loop {
        let deadline = writer
            .rollover_at
            .map(instant_for)
            .unwrap_or_else(far_future);

        tokio::select! {
            maybe_batch = rx.recv() => match maybe_batch {
                Some(batch) => {
                    // The lock spans the file write so snapshot readers see
                    // a prefix consistent with the file.
                    let mut log = violations.write();
                    log.extend(batch.iter().cloned());
                    if let Err(err) = writer.append(&batch) {
                        error!("cannot write violation to stream: {err:#}");
                    }
                }
                None => break,
            },
            _ = tokio::time::sleep_until(deadline) => {
                match ReportWriter::open(&naming) {
                    Ok(next) => {
                        debug!("report rotated to {}", next.path.display());
                        writer = next;
                    }
                    Err(err) => {
                        error!("error rotating report file: {err:#}");
                        return;
                    }
                }
            }
        }
    }
}

fn instant_for(target: DateTime<Local>) -> tokio::time::Instant {
    let delta = (target - Local::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::Instant::now() + delta
}

fn far_future() -> tokio::time::Instant {
    tokio::time::Instant::now() + Duration::from_secs(86_400 * 365)
}
