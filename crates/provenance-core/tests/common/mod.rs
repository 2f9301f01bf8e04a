#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use provenance_core::currency::{Amount, Currency};
use provenance_core::node::{LocalNode, LocalStore, Pricing, SessionManifest, StorageNode};
use provenance_core::receipt::{TxReceipt, UploadReceipt};
use provenance_core::tags::Tag;
use provenance_core::{Result, ToolkitError};

pub fn eth() -> Currency {
    Currency::lookup("ethereum").unwrap()
}

pub fn matic() -> Currency {
    Currency::lookup("matic").unwrap()
}

/// In-memory store where `address` holds `wallet` atomic ethereum units.
pub async fn store_with_wallet(address: &str, wallet: u128) -> Arc<LocalStore> {
    let store = LocalStore::in_memory(Pricing::default());
    store
        .deposit(eth(), address, Amount::new(wallet))
        .await
        .unwrap();
    store
}

/// Wraps a local node, counting calls and injecting chunk failures.
pub struct InstrumentedNode {
    inner: LocalNode,
    pub fund_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub abort_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// Remaining injected failures per chunk index.
    failures: Mutex<HashMap<u64, u32>>,
}

impl InstrumentedNode {
    pub fn new(inner: LocalNode) -> Self {
        Self {
            inner,
            fund_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            abort_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail_chunk(&self, index: u64, times: u32) {
        self.failures.lock().unwrap().insert(index, times);
    }

    pub fn funds(&self) -> usize {
        self.fund_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self, index: u64) -> bool {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&index) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl StorageNode for InstrumentedNode {
    fn url(&self) -> &str {
        self.inner.url()
    }

    fn currency(&self) -> Currency {
        self.inner.currency()
    }

    fn address(&self) -> &str {
        self.inner.address()
    }

    async fn price(&self, size_bytes: u64) -> Result<Amount> {
        self.inner.price(size_bytes).await
    }

    async fn loaded_balance(&self) -> Result<Amount> {
        self.inner.loaded_balance().await
    }

    async fn fund(&self, amount: Amount) -> Result<TxReceipt> {
        self.fund_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fund(amount).await
    }

    async fn withdraw(&self, amount: Amount) -> Result<TxReceipt> {
        self.inner.withdraw(amount).await
    }

    async fn upload(&self, data: &[u8], tags: &[Tag]) -> Result<UploadReceipt> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.upload(data, tags).await
    }

    async fn create_session(&self, manifest: &SessionManifest) -> Result<String> {
        self.inner.create_session(manifest).await
    }

    async fn put_chunk(&self, session: &str, index: u64, data: &[u8], hash: &[u8; 32]) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        let result = if self.take_failure(index) {
            Err(ToolkitError::Network(format!("injected failure on chunk {index}")))
        } else {
            self.inner.put_chunk(session, index, data, hash).await
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn finish_session(&self, session: &str, data_root: &[u8; 32]) -> Result<UploadReceipt> {
        self.inner.finish_session(session, data_root).await
    }

    async fn abort_session(&self, session: &str) -> Result<()> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.abort_session(session).await
    }

    async fn receipt(&self, id: &str) -> Result<UploadReceipt> {
        self.inner.receipt(id).await
    }
}
