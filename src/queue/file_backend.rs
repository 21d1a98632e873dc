//! Durable queue backend on the local file system.
//!
//! Each queue lives in its own directory under the configured root:
//!
//! ```text
//! <root>/<queue>/messages              one record per line, see `codec`
//! <root>/<queue>/.lock                 marker held during every operation
//! <root>/<queue>/messages.<id>.tmp     rewrite in progress
//! ```
//!
//! `pull` and `delete` never modify `messages` in place. They stream it
//! into a temp file in the same directory, fsync it and rename it over the
//! original. The rename is the single commit point. A crash at any earlier
//! moment leaves the previous version intact, and no reader ever sees a
//! half-written file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{
    AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, BufWriter,
};
use uuid::Uuid;

use crate::metrics::QueueMetrics;

use super::backend::{QueueBackendError, QueueService};
use super::clock::{Clock, SystemClock};
use super::codec::RecordCodec;
use super::lock::{DirLock, LockGuard};
use super::locator::queue_name_from_locator;
use super::message::{Message, StoredMessage};
use super::models::QueueConfig;

const BACKEND_TYPE: &str = "file";
const MESSAGES_FILE: &str = "messages";
const LOCK_MARKER: &str = ".lock";

/// Resolved on-disk locations of one queue.
#[derive(Debug)]
struct QueuePaths {
    name: String,
    dir: PathBuf,
    messages: PathBuf,
    lock: PathBuf,
}

impl QueuePaths {
    fn temp_file(&self) -> PathBuf {
        self.dir
            .join(format!("{}.{}.tmp", MESSAGES_FILE, Uuid::new_v4().simple()))
    }
}

/// What a rewrite does with one line of the record file.
enum LineEdit {
    Keep,
    Replace(String),
    Omit,
}

/// File-backed FIFO queue backend.
///
/// Operations on one queue are serialized by that queue's [`DirLock`],
/// across tasks and across processes sharing the directory. Different
/// queues never contend.
#[derive(Debug, Clone)]
pub struct FileQueueBackend {
    config: QueueConfig,
    codec: RecordCodec,
    clock: Arc<dyn Clock>,
}

impl FileQueueBackend {
    /// Create a backend using the system clock.
    pub fn new(config: QueueConfig) -> Result<Self, QueueBackendError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a backend with an explicit time source.
    ///
    /// # Errors
    ///
    /// Returns `QueueBackendError::InvalidDelimiter` if the configured field
    /// delimiter cannot be used by the record codec.
    pub fn with_clock(config: QueueConfig, clock: Arc<dyn Clock>) -> Result<Self, QueueBackendError> {
        let codec = RecordCodec::new(config.field_delimiter.clone())?;
        Ok(Self {
            config,
            codec,
            clock,
        })
    }

    /// Root directory holding all queues.
    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// Remove every message from a queue, leaving an empty record file.
    pub async fn purge(&self, queue_locator: &str) -> Result<(), QueueBackendError> {
        let paths = self.paths(queue_locator)?;
        let guard = self.lock_queue(&paths).await?;

        match fs::remove_file(&paths.messages).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        File::create(&paths.messages).await?.sync_all().await?;

        guard.release()?;

        tracing::info!(queue = %paths.name, "Queue purged");
        Ok(())
    }

    fn paths(&self, queue_locator: &str) -> Result<QueuePaths, QueueBackendError> {
        let name = queue_name_from_locator(queue_locator)?;
        let dir = self.config.directory.join(name);
        Ok(QueuePaths {
            name: name.to_string(),
            messages: dir.join(MESSAGES_FILE),
            lock: dir.join(LOCK_MARKER),
            dir,
        })
    }

    async fn lock_queue(&self, paths: &QueuePaths) -> Result<LockGuard, QueueBackendError> {
        fs::create_dir_all(&paths.dir).await?;
        let lock = DirLock::new(&paths.lock, self.config.lock_retry_interval());
        Ok(lock.acquire().await?)
    }

    /// Lock an existing queue. `None` when the queue has never been pushed to.
    async fn lock_existing(&self, paths: &QueuePaths) -> Result<Option<LockGuard>, QueueBackendError> {
        if !fs::try_exists(&paths.dir).await? {
            return Ok(None);
        }
        let guard = self.lock_queue(paths).await?;
        if !fs::try_exists(&paths.messages).await? {
            return Ok(None);
        }
        Ok(Some(guard))
    }

    /// Rewrite the record file line by line, committing only on change.
    ///
    /// Returns whether the file was replaced. Any leftover temp file is
    /// removed on the way out.
    async fn rewrite<F>(&self, paths: &QueuePaths, edit: F) -> Result<bool, QueueBackendError>
    where
        F: FnMut(&str) -> LineEdit + Send,
    {
        let temp = paths.temp_file();

        let outcome = match copy_with_edit(&paths.messages, &temp, edit).await {
            Ok(true) => fs::rename(&temp, &paths.messages).await.map(|_| true),
            other => other,
        };

        if !matches!(outcome, Ok(true)) {
            if let Err(e) = fs::remove_file(&temp).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        temp = %temp.display(),
                        error = %e,
                        "Failed to remove temporary record file"
                    );
                }
            }
        }

        outcome.map_err(QueueBackendError::from)
    }
}

/// Stream `src` into a new file at `dst`, applying `edit` to each line.
///
/// Returns whether any line was replaced or omitted. Lines that are not
/// valid UTF-8 never reach `edit` and are copied byte for byte. The
/// destination is fsynced before returning so a following rename publishes
/// complete data.
async fn copy_with_edit<F>(src: &Path, dst: &Path, mut edit: F) -> std::io::Result<bool>
where
    F: FnMut(&str) -> LineEdit + Send,
{
    let mut reader = BufReader::new(File::open(src).await?);
    let out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dst)
        .await?;
    let mut writer = BufWriter::new(out);

    let mut buf = Vec::new();
    let mut changed = false;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = strip_line_ending(&buf);

        let Ok(text) = std::str::from_utf8(line) else {
            tracing::warn!(file = %src.display(), "Keeping record that is not valid UTF-8");
            writer.write_all(line).await?;
            writer.write_all(b"\n").await?;
            continue;
        };

        match edit(text) {
            LineEdit::Keep => {
                writer.write_all(line).await?;
                writer.write_all(b"\n").await?;
            }
            LineEdit::Replace(replacement) => {
                changed = true;
                writer.write_all(replacement.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            LineEdit::Omit => changed = true,
        }
    }

    writer.flush().await?;
    writer.into_inner().sync_all().await?;
    Ok(changed)
}

/// Drop a trailing `\n` or `\r\n`.
fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Whether a non-empty file ends in something other than `\n`, as left by
/// an append cut short.
async fn ends_mid_line(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

#[async_trait]
impl QueueService for FileQueueBackend {
    fn backend_type(&self) -> &'static str {
        BACKEND_TYPE
    }

    async fn push(&self, queue_locator: &str, body: &str) -> Result<(), QueueBackendError> {
        if body.contains(['\n', '\r']) {
            return Err(QueueBackendError::InvalidBody(
                "line breaks cannot be stored in a record".to_string(),
            ));
        }

        let paths = self.paths(queue_locator)?;
        let record = self.codec.encode(&StoredMessage::new(body));

        let guard = self.lock_queue(&paths).await?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&paths.messages)
            .await?;
        if ends_mid_line(&mut file).await? {
            tracing::warn!(queue = %paths.name, "Terminating truncated last record");
            file.write_all(b"\n").await?;
        }
        file.write_all(format!("{record}\n").as_bytes()).await?;
        file.sync_data().await?;

        guard.release()?;

        QueueMetrics::record_pushed(BACKEND_TYPE);
        tracing::debug!(queue = %paths.name, "Message appended to queue file");

        Ok(())
    }

    async fn pull(&self, queue_locator: &str) -> Result<Option<Message>, QueueBackendError> {
        let paths = self.paths(queue_locator)?;
        let Some(guard) = self.lock_existing(&paths).await? else {
            return Ok(None);
        };

        let now = self.clock.now_millis();
        let timeout = self.config.visibility_timeout();
        let mut delivered: Option<(Message, u32)> = None;

        let replaced = self
            .rewrite(&paths, |line| {
                if delivered.is_some() {
                    return LineEdit::Keep;
                }
                match self.codec.decode(line) {
                    Ok(mut stored) if stored.is_visible_at(now) => {
                        let message = stored.deliver(now, timeout);
                        delivered = Some((message, stored.attempts));
                        LineEdit::Replace(self.codec.encode(&stored))
                    }
                    Ok(_) => LineEdit::Keep,
                    Err(e) => {
                        tracing::warn!(
                            queue = %paths.name,
                            error = %e,
                            "Skipping malformed record"
                        );
                        LineEdit::Keep
                    }
                }
            })
            .await?;

        guard.release()?;

        let message = match delivered {
            Some((message, attempts)) if replaced => {
                QueueMetrics::record_delivered(BACKEND_TYPE, attempts);
                tracing::debug!(
                    queue = %paths.name,
                    receipt_id = %message.receipt_id(),
                    attempts = attempts,
                    "Message delivered"
                );
                Some(message)
            }
            _ => None,
        };

        Ok(message)
    }

    async fn delete(&self, queue_locator: &str, receipt_id: &str) -> Result<(), QueueBackendError> {
        let paths = self.paths(queue_locator)?;
        let Some(guard) = self.lock_existing(&paths).await? else {
            QueueMetrics::record_delete_miss(BACKEND_TYPE);
            return Ok(());
        };

        let now = self.clock.now_millis();
        let mut found = false;

        let removed = self
            .rewrite(&paths, |line| {
                if found {
                    return LineEdit::Keep;
                }
                match self.codec.decode(line) {
                    Ok(stored) if stored.is_deletable_with(receipt_id, now) => {
                        found = true;
                        LineEdit::Omit
                    }
                    _ => LineEdit::Keep,
                }
            })
            .await?;

        guard.release()?;

        if removed {
            QueueMetrics::record_deleted(BACKEND_TYPE);
            tracing::debug!(queue = %paths.name, receipt_id = %receipt_id, "Message deleted");
        } else {
            QueueMetrics::record_delete_miss(BACKEND_TYPE);
            tracing::debug!(
                queue = %paths.name,
                receipt_id = %receipt_id,
                "Delete ignored: receipt unknown or expired"
            );
        }

        Ok(())
    }
}
