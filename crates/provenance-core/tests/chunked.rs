mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{eth, store_with_wallet, InstrumentedNode};
use provenance_core::gateway::Gateway;
use provenance_core::tags::Tag;
use provenance_core::uploader::{ChunkConfig, ChunkedUploader, UploadEvent};
use provenance_core::ToolkitError;

const OWNER: &str = "0xc0ffee";

fn config(chunk_size: u64, batch_size: usize, max_retries: u32) -> ChunkConfig {
    ChunkConfig {
        chunk_size,
        batch_size,
        max_retries,
        retry_delay: Duration::from_millis(1),
    }
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

fn progress(events: &[UploadEvent]) -> Vec<(u64, u64)> {
    events
        .iter()
        .filter_map(|e| match e {
            UploadEvent::Progress {
                bytes_uploaded,
                chunks_acknowledged,
                ..
            } => Some((*bytes_uploaded, *chunks_acknowledged)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn progress_is_monotonic_and_done_comes_last() {
    let store = store_with_wallet(OWNER, 10_000_000).await;
    let node = Arc::new(InstrumentedNode::new(store.node(eth(), OWNER)));
    let data = payload(10_000);

    let upload = ChunkedUploader::new(node.clone(), config(1_000, 3, 0))
        .start_bytes(data.clone(), vec![Tag::new("Content-Type", "image/png")]);
    let (events, outcome) = upload.collect().await;
    let receipt = outcome.unwrap();

    let steps = progress(&events);
    assert_eq!(steps.len(), 10);
    assert!(steps.windows(2).all(|w| w[0].0 <= w[1].0 && w[0].1 < w[1].1));
    assert_eq!(steps.last(), Some(&(10_000, 10)));

    let percents: Vec<u8> = events.iter().filter_map(UploadEvent::percent).collect();
    assert_eq!(percents.iter().filter(|p| **p == 100).count(), 1);
    assert_eq!(percents.last(), Some(&100));
    assert_eq!(events.last(), Some(&UploadEvent::Done(receipt.clone())));

    assert!(node.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert_eq!(node.funds(), 1);

    let blob = store.fetch(&receipt.id).await.unwrap();
    assert_eq!(blob.bytes, data);
    assert_eq!(blob.content_type.as_deref(), Some("image/png"));
}

#[tokio::test]
async fn failed_attempts_are_reported_then_retried() {
    let store = store_with_wallet(OWNER, 10_000_000).await;
    let node = Arc::new(InstrumentedNode::new(store.node(eth(), OWNER)));
    node.fail_chunk(2, 2);

    let upload = ChunkedUploader::new(node.clone(), config(100, 2, 3)).start_bytes(payload(450), vec![]);
    let (events, outcome) = upload.collect().await;
    outcome.unwrap();

    let errors: Vec<(u64, u32)> = events
        .iter()
        .filter_map(|e| match e {
            UploadEvent::ChunkError {
                chunk_index,
                attempt,
                ..
            } => Some((*chunk_index, *attempt)),
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec![(2, 1), (2, 2)]);
    assert_eq!(progress(&events).len(), 5);
    assert!(matches!(events.last(), Some(UploadEvent::Done(_))));
}

#[tokio::test]
async fn exhausted_retries_fail_without_done() {
    let store = store_with_wallet(OWNER, 10_000_000).await;
    let node = Arc::new(InstrumentedNode::new(store.node(eth(), OWNER)));
    node.fail_chunk(1, 10);

    let upload = ChunkedUploader::new(node.clone(), config(100, 1, 2)).start_bytes(payload(300), vec![]);
    let (events, outcome) = upload.collect().await;

    assert!(matches!(outcome, Err(ToolkitError::Upload(_))));
    assert!(!events.iter().any(|e| matches!(e, UploadEvent::Done(_))));
    let attempts = events
        .iter()
        .filter(|e| matches!(e, UploadEvent::ChunkError { chunk_index: 1, .. }))
        .count();
    assert_eq!(attempts, 3);
    assert!(!events.iter().any(|e| e.percent() == Some(100)));

    // the node no longer holds the partial upload
    assert_eq!(node.abort_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.open_sessions().await, 0);
}

#[tokio::test]
async fn empty_payload_is_one_chunk() {
    let store = store_with_wallet(OWNER, 10_000_000).await;
    let node = Arc::new(InstrumentedNode::new(store.node(eth(), OWNER)));
    let (events, outcome) = ChunkedUploader::new(node, config(64, 4, 0))
        .start_bytes(Vec::new(), vec![])
        .collect()
        .await;
    assert_eq!(outcome.unwrap().size, 0);
    assert_eq!(progress(&events), vec![(0, 1)]);
}

#[tokio::test]
async fn streams_from_a_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("video.bin");
    let data = payload(5_000);
    tokio::fs::write(&path, &data).await.unwrap();

    let store = store_with_wallet(OWNER, 10_000_000).await;
    let node = Arc::new(InstrumentedNode::new(store.node(eth(), OWNER)));
    let file = tokio::fs::File::open(&path).await.unwrap();
    let upload = ChunkedUploader::new(node, config(1_024, 2, 0)).start(file, data.len() as u64, vec![]);
    let receipt = upload.finish().await.unwrap();
    assert_eq!(store.fetch(&receipt.id).await.unwrap().bytes, data);
}

#[tokio::test]
async fn short_source_fails_the_upload() {
    let store = store_with_wallet(OWNER, 10_000_000).await;
    let node = Arc::new(InstrumentedNode::new(store.node(eth(), OWNER)));
    let source = std::io::Cursor::new(payload(100));
    let err = ChunkedUploader::new(node, config(64, 2, 0))
        .start(source, 200, vec![])
        .finish()
        .await
        .unwrap_err();
    assert!(matches!(err, ToolkitError::Upload(_)));
    assert_eq!(store.open_sessions().await, 0);
}

#[tokio::test]
async fn successful_upload_closes_its_session() {
    let store = store_with_wallet(OWNER, 10_000_000).await;
    let node = Arc::new(InstrumentedNode::new(store.node(eth(), OWNER)));
    ChunkedUploader::new(node.clone(), config(100, 2, 0))
        .start_bytes(payload(250), vec![])
        .finish()
        .await
        .unwrap();
    assert_eq!(store.open_sessions().await, 0);
    assert_eq!(node.abort_calls.load(Ordering::SeqCst), 0);
}
