//! Funding-aware uploads, single shot or chunked.
//!
//! Before any upload the node's price for the payload is compared with the
//! caller's loaded balance; when the balance does not exceed the price the
//! node is funded once with the price. Chunked uploads stream their source
//! in `chunk_size` pieces, keep at most `batch_size` chunks in flight and
//! report progress on an event channel.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, ToolkitError};
use crate::merkle::{chunk_hash, ChunkTree, Hash};
use crate::node::{SessionManifest, StorageNode};
use crate::receipt::{TxReceipt, UploadReceipt};
use crate::tags::Tag;

pub const DEFAULT_CHUNK_SIZE: u64 = 25 * 1024 * 1024;
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Number of chunks an upload of `total_size` bytes is split into.
///
/// Payloads smaller than one chunk, including empty ones, occupy one chunk.
pub fn total_chunks(total_size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 || total_size < chunk_size {
        1
    } else {
        total_size.div_ceil(chunk_size)
    }
}

/// Uploads through one node, funding it first when needed.
#[derive(Clone)]
pub struct Uploader {
    node: Arc<dyn StorageNode>,
}

impl Uploader {
    pub fn new(node: Arc<dyn StorageNode>) -> Self {
        Self { node }
    }

    pub fn node(&self) -> &Arc<dyn StorageNode> {
        &self.node
    }

    /// Fund the node with the price of `size_bytes` if the loaded balance
    /// does not exceed it. Returns the funding receipt when a transfer ran.
    pub async fn ensure_funded(&self, size_bytes: u64) -> Result<Option<TxReceipt>> {
        let price = self.node.price(size_bytes).await?;
        let balance = self.node.loaded_balance().await?;
        if price.is_zero() || price < balance {
            tracing::debug!(size_bytes, price = %price, balance = %balance, "loaded balance covers upload");
            return Ok(None);
        }
        tracing::info!(
            node = %self.node.url(),
            currency = %self.node.currency(),
            size_bytes,
            price = %price,
            balance = %balance,
            "funding node before upload"
        );
        Ok(Some(self.node.fund(price).await?))
    }

    pub async fn upload_funded(&self, data: &[u8], tags: &[Tag]) -> Result<UploadReceipt> {
        self.ensure_funded(data.len() as u64).await?;
        let receipt = self.node.upload(data, tags).await?;
        tracing::info!(id = %receipt.id, size = receipt.size, "upload complete");
        Ok(receipt)
    }

    pub fn chunked(&self, config: ChunkConfig) -> ChunkedUploader {
        ChunkedUploader::new(Arc::clone(&self.node), config)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: u64,
    /// Maximum number of chunks in flight.
    pub batch_size: usize,
    /// Retries per chunk after its first failed attempt.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ToolkitError::validation("chunk size must be greater than 0"));
        }
        if self.batch_size == 0 {
            return Err(ToolkitError::validation("batch size must be greater than 0"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadEvent {
    /// A chunk was acknowledged by the node.
    Progress {
        chunk_index: u64,
        bytes_uploaded: u64,
        chunks_acknowledged: u64,
        total_chunks: u64,
    },
    /// One attempt at a chunk failed; it may still be retried.
    ChunkError {
        chunk_index: u64,
        attempt: u32,
        message: String,
    },
    Done(UploadReceipt),
}

impl UploadEvent {
    /// Whole percent of acknowledged chunks, for progress events.
    pub fn percent(&self) -> Option<u8> {
        match self {
            UploadEvent::Progress {
                chunks_acknowledged,
                total_chunks,
                ..
            } if *total_chunks > 0 => Some((chunks_acknowledged * 100 / total_chunks) as u8),
            _ => None,
        }
    }
}

pub struct ChunkedUploader {
    node: Arc<dyn StorageNode>,
    config: ChunkConfig,
}

impl ChunkedUploader {
    pub fn new(node: Arc<dyn StorageNode>, config: ChunkConfig) -> Self {
        Self { node, config }
    }

    /// Spawn the upload of `total_size` bytes read from `reader`.
    pub fn start<R>(&self, reader: R, total_size: u64, tags: Vec<Tag>) -> ChunkedUpload
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (events_tx, events) = mpsc::unbounded_channel();
        let node = Arc::clone(&self.node);
        let config = self.config.clone();
        let handle = tokio::spawn(async move {
            drive(node, config, reader, total_size, tags, events_tx).await
        });
        ChunkedUpload { events, handle }
    }

    pub fn start_bytes(&self, data: Vec<u8>, tags: Vec<Tag>) -> ChunkedUpload {
        let total_size = data.len() as u64;
        self.start(std::io::Cursor::new(data), total_size, tags)
    }
}

/// A running chunked upload.
pub struct ChunkedUpload {
    events: mpsc::UnboundedReceiver<UploadEvent>,
    handle: JoinHandle<Result<UploadReceipt>>,
}

impl ChunkedUpload {
    /// Next event, or `None` once the upload task has finished.
    pub async fn next_event(&mut self) -> Option<UploadEvent> {
        self.events.recv().await
    }

    /// Wait for the final outcome. Events not yet read are discarded.
    pub async fn finish(self) -> Result<UploadReceipt> {
        self.handle
            .await
            .map_err(|e| ToolkitError::Upload(format!("upload task failed: {e}")))?
    }

    /// Drain every event, then return them with the outcome.
    pub async fn collect(mut self) -> (Vec<UploadEvent>, Result<UploadReceipt>) {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        let outcome = self.finish().await;
        (events, outcome)
    }
}

async fn drive<R>(
    node: Arc<dyn StorageNode>,
    config: ChunkConfig,
    mut reader: R,
    total_size: u64,
    tags: Vec<Tag>,
    events: mpsc::UnboundedSender<UploadEvent>,
) -> Result<UploadReceipt>
where
    R: AsyncRead + Unpin + Send,
{
    config.validate()?;
    Uploader::new(Arc::clone(&node))
        .ensure_funded(total_size)
        .await?;

    let manifest = SessionManifest {
        total_size,
        chunk_size: config.chunk_size,
        total_chunks: total_chunks(total_size, config.chunk_size),
        tags,
    };
    let session = node.create_session(&manifest).await?;
    tracing::info!(
        session = %session,
        total_size,
        total_chunks = manifest.total_chunks,
        batch_size = config.batch_size,
        "chunked upload started"
    );

    match send_all(node.as_ref(), &session, &manifest, &config, &mut reader, &events).await {
        Ok(receipt) => Ok(receipt),
        Err(err) => {
            if let Err(abort) = node.abort_session(&session).await {
                tracing::warn!(session = %session, error = %abort, "could not abort chunk session");
            }
            Err(err)
        }
    }
}

async fn send_all<R>(
    node: &dyn StorageNode,
    session: &str,
    manifest: &SessionManifest,
    config: &ChunkConfig,
    reader: &mut R,
    events: &mpsc::UnboundedSender<UploadEvent>,
) -> Result<UploadReceipt>
where
    R: AsyncRead + Unpin + Send,
{
    let mut tree = ChunkTree::new();
    let mut in_flight = FuturesUnordered::new();
    let mut acknowledged = 0u64;
    let mut bytes_uploaded = 0u64;
    let mut next_index = 0u64;

    while next_index < manifest.total_chunks || !in_flight.is_empty() {
        if next_index < manifest.total_chunks && in_flight.len() < config.batch_size {
            let len = manifest.expected_len(next_index).unwrap_or(0) as usize;
            let mut chunk = vec![0u8; len];
            reader.read_exact(&mut chunk).await.map_err(|e| {
                ToolkitError::Upload(format!(
                    "source ended before chunk {next_index} was read: {e}"
                ))
            })?;
            let hash = chunk_hash(&chunk);
            tree.push(hash);
            in_flight.push(send_chunk(
                node, session, next_index, chunk, hash, config, events,
            ));
            next_index += 1;
            continue;
        }

        let Some(done) = in_flight.next().await else {
            break;
        };
        let (chunk_index, len) = done?;
        acknowledged += 1;
        bytes_uploaded += len;
        tracing::debug!(chunk_index, acknowledged, total = manifest.total_chunks, "chunk acknowledged");
        let _ = events.send(UploadEvent::Progress {
            chunk_index,
            bytes_uploaded,
            chunks_acknowledged: acknowledged,
            total_chunks: manifest.total_chunks,
        });
    }
    drop(in_flight);

    let receipt = node.finish_session(session, &tree.root()).await?;
    tracing::info!(id = %receipt.id, size = receipt.size, "chunked upload complete");
    let _ = events.send(UploadEvent::Done(receipt.clone()));
    Ok(receipt)
}

async fn send_chunk(
    node: &dyn StorageNode,
    session: &str,
    index: u64,
    chunk: Vec<u8>,
    hash: Hash,
    config: &ChunkConfig,
    events: &mpsc::UnboundedSender<UploadEvent>,
) -> Result<(u64, u64)> {
    let attempts = config.max_retries + 1;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match node.put_chunk(session, index, &chunk, &hash).await {
            Ok(()) => return Ok((index, chunk.len() as u64)),
            Err(err) => {
                tracing::warn!(chunk_index = index, attempt, error = %err, "chunk upload failed");
                let _ = events.send(UploadEvent::ChunkError {
                    chunk_index: index,
                    attempt,
                    message: err.to_string(),
                });
                if attempt >= attempts {
                    return Err(ToolkitError::Upload(format!(
                        "chunk {index} failed after {attempt} attempts: {err}"
                    )));
                }
                tokio::time::sleep(config.retry_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::{Amount, Currency};
    use crate::node::{LocalStore, Pricing};
    use proptest::prelude::*;

    #[test]
    fn small_and_empty_payloads_take_one_chunk() {
        assert_eq!(total_chunks(0, 10), 1);
        assert_eq!(total_chunks(9, 10), 1);
        assert_eq!(total_chunks(10, 10), 1);
        assert_eq!(total_chunks(11, 10), 2);
        assert_eq!(total_chunks(100, 10), 10);
    }

    proptest! {
        #[test]
        fn chunks_cover_payload_exactly(size in 0u64..1_000_000, chunk in 1u64..50_000) {
            let n = total_chunks(size, chunk);
            prop_assert!(n >= 1);
            prop_assert!(n * chunk >= size);
            if size > 0 {
                prop_assert!((n - 1) * chunk < size);
            }
        }
    }

    #[test]
    fn percent_is_floor_of_acknowledged_share() {
        let event = |acked| UploadEvent::Progress {
            chunk_index: 0,
            bytes_uploaded: 0,
            chunks_acknowledged: acked,
            total_chunks: 3,
        };
        assert_eq!(event(2).percent(), Some(66));
        assert_eq!(event(3).percent(), Some(100));
        assert_eq!(
            UploadEvent::ChunkError {
                chunk_index: 0,
                attempt: 1,
                message: String::new()
            }
            .percent(),
            None
        );
    }

    #[test]
    fn zero_sized_windows_are_rejected() {
        let config = ChunkConfig {
            batch_size: 0,
            ..ChunkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn chunked_upload_round_trips_through_local_node() {
        let eth = Currency::lookup("ethereum").unwrap();
        let store = LocalStore::in_memory(Pricing::default());
        store
            .deposit(eth, "0xfeed", Amount::new(1_000_000))
            .await
            .unwrap();
        let node: Arc<dyn StorageNode> = Arc::new(store.node(eth, "0xfeed"));
        let config = ChunkConfig {
            chunk_size: 1024,
            batch_size: 2,
            max_retries: 0,
            retry_delay: Duration::ZERO,
        };

        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let upload = ChunkedUploader::new(node, config).start_bytes(data.clone(), vec![]);
        let (events, outcome) = upload.collect().await;
        let receipt = outcome.unwrap();

        assert_eq!(events.last(), Some(&UploadEvent::Done(receipt.clone())));
        let progress = events.iter().filter(|e| e.percent().is_some()).count();
        assert_eq!(progress, 5);
        use crate::gateway::Gateway;
        assert_eq!(store.fetch(&receipt.id).await.unwrap().bytes, data);
    }
}
