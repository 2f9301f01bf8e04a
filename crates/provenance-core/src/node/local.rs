//! A self-contained storage node.
//!
//! `LocalStore` keeps the ledger, upload index and blobs either in memory or
//! under a directory (`ledger.json`, `index.json`, `data/<id>`, `node.key`).
//! It also serves as the gateway, the transaction index and the chain-state
//! reader for the same data, which makes it a complete offline stand-in for
//! a bundler plus gateway.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::access::{ChainReader, ETH_GET_BALANCE};
use crate::currency::{Amount, Currency};
use crate::error::{Result, ToolkitError};
use crate::gateway::{Blob, Gateway};
use crate::ledger::{account_id, LedgerError, LedgerSnapshot, NodeLedger};
use crate::merkle::{chunk_hash, data_root, ChunkTree, Hash};
use crate::node::{SessionManifest, StorageNode};
use crate::query::{filter_results, QueryFilter, QueryResult, TransactionQuery};
use crate::receipt::{content_id, TxKind, TxReceipt, UploadReceipt};
use crate::tags::{self, Tag};
use crate::unix_millis;
use crate::uploader::total_chunks;

/// Chunk size used to compute the data root of single-shot uploads.
pub const DATA_CHUNK_SIZE: usize = 256 * 1024;

const LEDGER_FILE: &str = "ledger.json";
const INDEX_FILE: &str = "index.json";
const KEY_FILE: &str = "node.key";
const DATA_DIR: &str = "data";

/// Linear price schedule in atomic units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub base_fee: Amount,
    pub per_kib: Amount,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            base_fee: Amount::new(1_000),
            per_kib: Amount::new(100),
        }
    }
}

impl Pricing {
    pub fn quote(&self, size_bytes: u64) -> Amount {
        let kib = size_bytes.div_ceil(1024) as u128;
        Amount::new(
            self.base_fee
                .atomic()
                .saturating_add(self.per_kib.atomic().saturating_mul(kib)),
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredTx {
    receipt: UploadReceipt,
    owner: String,
    token: String,
    tags: Vec<Tag>,
}

impl StoredTx {
    fn as_query_result(&self) -> QueryResult {
        QueryResult {
            id: self.receipt.id.clone(),
            timestamp: self.receipt.timestamp,
            token: self.token.clone(),
            tags: self.tags.clone(),
        }
    }
}

struct Session {
    address: String,
    token: String,
    manifest: SessionManifest,
    chunks: BTreeMap<u64, Vec<u8>>,
}

#[derive(Default)]
struct StoreState {
    ledger: NodeLedger,
    txs: BTreeMap<String, StoredTx>,
    blobs: HashMap<String, Vec<u8>>,
    sessions: HashMap<String, Session>,
    sequence: u64,
}

pub struct LocalStore {
    url: String,
    node_key: SigningKey,
    pricing: Pricing,
    dir: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl LocalStore {
    pub fn in_memory(pricing: Pricing) -> Arc<Self> {
        Arc::new(Self {
            url: "local:memory".to_string(),
            node_key: SigningKey::generate(&mut OsRng),
            pricing,
            dir: None,
            state: Mutex::new(StoreState::default()),
        })
    }

    /// Open (or initialise) a node persisted under `dir`.
    pub async fn open(dir: impl AsRef<Path>, pricing: Pricing) -> Result<Arc<Self>> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(dir.join(DATA_DIR)).await?;

        let key_path = dir.join(KEY_FILE);
        let node_key = if tokio::fs::try_exists(&key_path).await? {
            let hex_key = tokio::fs::read_to_string(&key_path).await?;
            let raw: [u8; 32] = hex::decode(hex_key.trim())
                .ok()
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| ToolkitError::Malformed(format!("{}", key_path.display())))?;
            SigningKey::from_bytes(&raw)
        } else {
            let key = SigningKey::generate(&mut OsRng);
            tokio::fs::write(&key_path, hex::encode(key.to_bytes())).await?;
            key
        };

        let mut state = StoreState::default();
        let ledger_path = dir.join(LEDGER_FILE);
        if tokio::fs::try_exists(&ledger_path).await? {
            let snapshot: LedgerSnapshot =
                serde_json::from_slice(&tokio::fs::read(&ledger_path).await?)?;
            state.ledger = NodeLedger::from_snapshot(snapshot);
        }
        let index_path = dir.join(INDEX_FILE);
        if tokio::fs::try_exists(&index_path).await? {
            state.txs = serde_json::from_slice(&tokio::fs::read(&index_path).await?)?;
        }
        state.sequence = state.txs.len() as u64;

        tracing::debug!(dir = %dir.display(), uploads = state.txs.len(), "opened local node");
        Ok(Arc::new(Self {
            url: format!("local:{}", dir.display()),
            node_key,
            pricing,
            dir: Some(dir),
            state: Mutex::new(state),
        }))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pricing(&self) -> Pricing {
        self.pricing
    }

    /// Handle acting for `address`, paying in `currency`.
    pub fn node(self: &Arc<Self>, currency: Currency, address: impl Into<String>) -> LocalNode {
        LocalNode {
            store: Arc::clone(self),
            currency,
            address: address.into(),
        }
    }

    /// Credit wallet funds for `address`, the local equivalent of a faucet.
    pub async fn deposit(&self, currency: Currency, address: &str, amount: Amount) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .ledger
            .deposit(&account_id(currency.name(), address), amount)?;
        self.persist(&state).await
    }

    pub async fn wallet_balance(&self, currency: Currency, address: &str) -> Amount {
        let state = self.state.lock().await;
        state
            .ledger
            .balance(&account_id(currency.name(), address))
            .wallet
    }

    /// Chunk sessions opened but neither finished nor aborted.
    pub async fn open_sessions(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    pub async fn ledger_snapshot(&self) -> LedgerSnapshot {
        self.state.lock().await.ledger.snapshot()
    }

    async fn persist(&self, state: &StoreState) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let ledger = serde_json::to_vec_pretty(&state.ledger.snapshot())?;
        tokio::fs::write(dir.join(LEDGER_FILE), ledger).await?;
        let index = serde_json::to_vec_pretty(&state.txs)?;
        tokio::fs::write(dir.join(INDEX_FILE), index).await?;
        Ok(())
    }

    async fn accept_upload(
        &self,
        state: &mut StoreState,
        address: &str,
        currency: Currency,
        tags: &[Tag],
        data: Vec<u8>,
        root: Hash,
    ) -> Result<UploadReceipt> {
        let size = data.len() as u64;
        let price = self.pricing.quote(size);
        let sequence = state.sequence + 1;
        let id = content_id(address, &root, tags, sequence);

        // Charge a copy so nothing is debited unless the blob is stored and indexed.
        let mut ledger = state.ledger.clone();
        ledger
            .charge(id.clone(), &account_id(currency.name(), address), price, size)
            .map_err(|e| match e {
                LedgerError::InsufficientLoadedBalance { loaded, .. } => ToolkitError::Upload(
                    format!("not enough balance for transaction: price {price}, loaded {loaded}"),
                ),
                other => ToolkitError::Upload(other.to_string()),
            })?;

        let receipt = UploadReceipt::unsigned(id.clone(), unix_millis(), size, &root)
            .sign(&self.node_key);
        let blob_path = self.dir.as_ref().map(|dir| dir.join(DATA_DIR).join(&id));
        match &blob_path {
            Some(path) => tokio::fs::write(path, &data).await?,
            None => {
                state.blobs.insert(id.clone(), data);
            }
        }

        let previous = std::mem::replace(&mut state.ledger, ledger);
        state.sequence = sequence;
        state.txs.insert(
            id.clone(),
            StoredTx {
                receipt: receipt.clone(),
                owner: address.to_string(),
                token: currency.name().to_string(),
                tags: tags.to_vec(),
            },
        );
        if let Err(err) = self.persist(state).await {
            state.ledger = previous;
            state.sequence = sequence - 1;
            state.txs.remove(&id);
            state.blobs.remove(&id);
            if let Some(path) = &blob_path {
                let _ = tokio::fs::remove_file(path).await;
            }
            tracing::warn!(id = %id, error = %err, "upload rolled back");
            return Err(err);
        }

        tracing::info!(id = %id, size, price = %price, owner = %address, "upload accepted");
        Ok(receipt)
    }

    async fn move_balance(
        &self,
        kind: TxKind,
        currency: Currency,
        address: &str,
        amount: Amount,
    ) -> Result<TxReceipt> {
        let mut state = self.state.lock().await;
        let account = account_id(currency.name(), address);
        let tx_id = random_id();
        match kind {
            TxKind::Fund => state.ledger.fund(tx_id.clone(), &account, amount)?,
            TxKind::Withdraw => state.ledger.withdraw(tx_id.clone(), &account, amount)?,
        }
        self.persist(&state).await?;
        tracing::info!(tx = %tx_id, ?kind, amount = %amount, account = %account, "balance moved");
        Ok(TxReceipt {
            tx_id,
            kind,
            currency: currency.name().to_string(),
            amount,
        })
    }
}

fn random_id() -> String {
    let mut raw = [0u8; 16];
    OsRng.fill_bytes(&mut raw);
    hex::encode(raw)
}

/// Maps access-control chain names onto the currency whose wallet balances
/// the store tracks.
fn chain_currency(chain: &str) -> &str {
    match chain {
        "polygon" | "mumbai" | "amoy" => "matic",
        "sepolia" | "goerli" => "ethereum",
        other => other,
    }
}

#[async_trait]
impl Gateway for LocalStore {
    async fn fetch(&self, content_id: &str) -> Result<Blob> {
        let state = self.state.lock().await;
        let tx = state
            .txs
            .get(content_id)
            .ok_or_else(|| ToolkitError::NotFound(content_id.to_string()))?;
        let content_type = tags::find(&tx.tags, tags::CONTENT_TYPE).map(str::to_string);
        let bytes = match &self.dir {
            Some(dir) => tokio::fs::read(dir.join(DATA_DIR).join(content_id)).await?,
            None => state
                .blobs
                .get(content_id)
                .cloned()
                .ok_or_else(|| ToolkitError::NotFound(content_id.to_string()))?,
        };
        Ok(Blob {
            bytes,
            content_type,
        })
    }
}

#[async_trait]
impl TransactionQuery for LocalStore {
    async fn search(&self, filter: &QueryFilter) -> Result<Vec<QueryResult>> {
        let state = self.state.lock().await;
        Ok(filter_results(
            state.txs.values().map(StoredTx::as_query_result),
            filter,
        ))
    }
}

#[async_trait]
impl ChainReader for LocalStore {
    async fn call(&self, chain: &str, method: &str, params: &[String]) -> Result<u128> {
        if method != ETH_GET_BALANCE {
            return Err(ToolkitError::Malformed(format!(
                "unsupported chain method `{method}`"
            )));
        }
        let address = params
            .first()
            .ok_or_else(|| ToolkitError::Malformed("eth_getBalance needs an address".into()))?;
        let state = self.state.lock().await;
        Ok(state
            .ledger
            .balance(&account_id(chain_currency(chain), address))
            .wallet
            .atomic())
    }
}

/// Handle on a [`LocalStore`] for one identity and currency.
#[derive(Clone)]
pub struct LocalNode {
    store: Arc<LocalStore>,
    currency: Currency,
    address: String,
}

impl LocalNode {
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }
}

#[async_trait]
impl StorageNode for LocalNode {
    fn url(&self) -> &str {
        self.store.url()
    }

    fn currency(&self) -> Currency {
        self.currency
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn price(&self, size_bytes: u64) -> Result<Amount> {
        Ok(self.store.pricing.quote(size_bytes))
    }

    async fn loaded_balance(&self) -> Result<Amount> {
        let state = self.store.state.lock().await;
        Ok(state
            .ledger
            .balance(&account_id(self.currency.name(), &self.address))
            .loaded)
    }

    async fn fund(&self, amount: Amount) -> Result<TxReceipt> {
        self.store
            .move_balance(TxKind::Fund, self.currency, &self.address, amount)
            .await
    }

    async fn withdraw(&self, amount: Amount) -> Result<TxReceipt> {
        self.store
            .move_balance(TxKind::Withdraw, self.currency, &self.address, amount)
            .await
    }

    async fn upload(&self, data: &[u8], tags: &[Tag]) -> Result<UploadReceipt> {
        let root = data_root(data, DATA_CHUNK_SIZE);
        let mut state = self.store.state.lock().await;
        self.store
            .accept_upload(
                &mut state,
                &self.address,
                self.currency,
                tags,
                data.to_vec(),
                root,
            )
            .await
    }

    async fn create_session(&self, manifest: &SessionManifest) -> Result<String> {
        if manifest.chunk_size == 0 {
            return Err(ToolkitError::Upload("chunk size must be positive".into()));
        }
        let expected = total_chunks(manifest.total_size, manifest.chunk_size);
        if manifest.total_chunks != expected {
            return Err(ToolkitError::Upload(format!(
                "declared {} chunks, expected {expected}",
                manifest.total_chunks
            )));
        }
        let id = random_id();
        let mut state = self.store.state.lock().await;
        state.sessions.insert(
            id.clone(),
            Session {
                address: self.address.clone(),
                token: self.currency.name().to_string(),
                manifest: manifest.clone(),
                chunks: BTreeMap::new(),
            },
        );
        tracing::debug!(session = %id, total_chunks = expected, "chunk session opened");
        Ok(id)
    }

    async fn put_chunk(
        &self,
        session: &str,
        index: u64,
        data: &[u8],
        hash: &[u8; 32],
    ) -> Result<()> {
        let mut state = self.store.state.lock().await;
        let entry = state
            .sessions
            .get_mut(session)
            .ok_or_else(|| ToolkitError::NotFound(format!("upload session {session}")))?;
        if entry.address != self.address {
            return Err(ToolkitError::Upload("session belongs to another owner".into()));
        }
        let expected = entry.manifest.expected_len(index).ok_or_else(|| {
            ToolkitError::Upload(format!(
                "chunk {index} out of range ({} chunks)",
                entry.manifest.total_chunks
            ))
        })?;
        if data.len() as u64 != expected {
            return Err(ToolkitError::Upload(format!(
                "chunk {index} has {} bytes, expected {expected}",
                data.len()
            )));
        }
        if &chunk_hash(data) != hash {
            return Err(ToolkitError::Upload(format!("chunk {index} hash mismatch")));
        }
        entry.chunks.insert(index, data.to_vec());
        Ok(())
    }

    async fn finish_session(&self, session: &str, root: &[u8; 32]) -> Result<UploadReceipt> {
        let mut state = self.store.state.lock().await;
        let entry = state
            .sessions
            .get(session)
            .ok_or_else(|| ToolkitError::NotFound(format!("upload session {session}")))?;
        let missing: Vec<u64> = (0..entry.manifest.total_chunks)
            .filter(|i| !entry.chunks.contains_key(i))
            .collect();
        if !missing.is_empty() {
            return Err(ToolkitError::Upload(format!(
                "cannot finalize, missing chunks {missing:?}"
            )));
        }
        let tree = ChunkTree::from_chunks(&entry.chunks.values().collect::<Vec<_>>());
        if &tree.root() != root {
            return Err(ToolkitError::Upload("data root mismatch".into()));
        }

        let Some(entry) = state.sessions.remove(session) else {
            return Err(ToolkitError::NotFound(format!("upload session {session}")));
        };
        let currency = Currency::lookup(&entry.token).unwrap_or(self.currency);
        let data: Vec<u8> = entry.chunks.into_values().flatten().collect();
        self.store
            .accept_upload(
                &mut state,
                &entry.address,
                currency,
                &entry.manifest.tags,
                data,
                *root,
            )
            .await
    }

    async fn abort_session(&self, session: &str) -> Result<()> {
        let mut state = self.store.state.lock().await;
        let owned = state
            .sessions
            .get(session)
            .map(|entry| entry.address == self.address);
        match owned {
            Some(false) => Err(ToolkitError::Upload("session belongs to another owner".into())),
            Some(true) => {
                state.sessions.remove(session);
                tracing::debug!(session = %session, "chunk session aborted");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn receipt(&self, id: &str) -> Result<UploadReceipt> {
        let state = self.store.state.lock().await;
        state
            .txs
            .get(id)
            .map(|tx| tx.receipt.clone())
            .ok_or_else(|| ToolkitError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth() -> Currency {
        Currency::lookup("ethereum").unwrap()
    }

    async fn funded_node(loaded: u128) -> LocalNode {
        let store = LocalStore::in_memory(Pricing::default());
        let node = store.node(eth(), "0xa11ce");
        store
            .deposit(eth(), "0xa11ce", Amount::new(1_000_000))
            .await
            .unwrap();
        if loaded > 0 {
            node.fund(Amount::new(loaded)).await.unwrap();
        }
        node
    }

    #[test]
    fn pricing_rounds_up_to_whole_kib() {
        let pricing = Pricing::default();
        assert_eq!(pricing.quote(0), Amount::new(1_000));
        assert_eq!(pricing.quote(1), Amount::new(1_100));
        assert_eq!(pricing.quote(1024), Amount::new(1_100));
        assert_eq!(pricing.quote(1025), Amount::new(1_200));
    }

    #[tokio::test]
    async fn fund_then_withdraw_is_a_round_trip() {
        let node = funded_node(0).await;
        let before = node.loaded_balance().await.unwrap();
        node.fund(Amount::new(5_000)).await.unwrap();
        node.withdraw(Amount::new(5_000)).await.unwrap();
        assert_eq!(node.loaded_balance().await.unwrap(), before);
        assert_eq!(
            node.store().wallet_balance(eth(), "0xa11ce").await,
            Amount::new(1_000_000)
        );
    }

    #[tokio::test]
    async fn withdraw_more_than_loaded_fails() {
        let node = funded_node(100).await;
        let err = node.withdraw(Amount::new(101)).await.unwrap_err();
        assert!(matches!(err, ToolkitError::InsufficientBalance { .. }));
        let err = node.fund(Amount::new(10_000_000)).await.unwrap_err();
        assert!(matches!(err, ToolkitError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn upload_charges_price_and_is_fetchable() {
        let node = funded_node(10_000).await;
        let tags = vec![Tag::new("Content-Type", "text/plain")];
        let receipt = node.upload(b"hello", &tags).await.unwrap();
        receipt.verify().unwrap();
        assert_eq!(
            node.loaded_balance().await.unwrap(),
            Amount::new(10_000 - 1_100)
        );

        let blob = node.store().fetch(&receipt.id).await.unwrap();
        assert_eq!(blob.bytes, b"hello");
        assert_eq!(blob.content_type.as_deref(), Some("text/plain"));
        assert_eq!(node.receipt(&receipt.id).await.unwrap(), receipt);
        assert!(matches!(
            node.store().fetch("missing").await,
            Err(ToolkitError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn underfunded_upload_is_rejected() {
        let node = funded_node(10).await;
        let err = node.upload(b"hello", &[]).await.unwrap_err();
        assert!(matches!(err, ToolkitError::Upload(_)));
        assert_eq!(node.loaded_balance().await.unwrap(), Amount::new(10));
    }

    #[tokio::test]
    async fn chunk_session_validates_and_assembles() {
        let node = funded_node(10_000).await;
        let data = b"0123456789".to_vec();
        let manifest = SessionManifest {
            total_size: 10,
            chunk_size: 4,
            total_chunks: 3,
            tags: vec![],
        };
        let session = node.create_session(&manifest).await.unwrap();
        let chunks: Vec<&[u8]> = data.chunks(4).collect();

        assert!(node
            .put_chunk(&session, 0, b"xxxx", &chunk_hash(chunks[0]))
            .await
            .is_err());
        assert!(node
            .put_chunk(&session, 2, b"89x", &chunk_hash(b"89x"))
            .await
            .is_err());

        for (i, chunk) in chunks.iter().enumerate().rev() {
            node.put_chunk(&session, i as u64, chunk, &chunk_hash(chunk))
                .await
                .unwrap();
        }
        let root = ChunkTree::from_chunks(&chunks).root();
        assert!(node.finish_session(&session, &[0u8; 32]).await.is_err());
        let receipt = node.finish_session(&session, &root).await.unwrap();
        assert_eq!(receipt.size, 10);
        assert_eq!(node.store().fetch(&receipt.id).await.unwrap().bytes, data);
    }

    #[tokio::test]
    async fn finishing_with_missing_chunks_fails() {
        let node = funded_node(10_000).await;
        let manifest = SessionManifest {
            total_size: 8,
            chunk_size: 4,
            total_chunks: 2,
            tags: vec![],
        };
        let session = node.create_session(&manifest).await.unwrap();
        node.put_chunk(&session, 0, b"abcd", &chunk_hash(b"abcd"))
            .await
            .unwrap();
        let err = node.finish_session(&session, &[0u8; 32]).await.unwrap_err();
        assert!(err.to_string().contains("missing chunks [1]"));

        let bad = SessionManifest {
            total_chunks: 5,
            ..manifest
        };
        assert!(node.create_session(&bad).await.is_err());
    }

    #[tokio::test]
    async fn failed_blob_write_leaves_balance_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), Pricing::default()).await.unwrap();
        store
            .deposit(eth(), "0xa11ce", Amount::new(1_000_000))
            .await
            .unwrap();
        let node = store.node(eth(), "0xa11ce");
        node.fund(Amount::new(10_000)).await.unwrap();
        let height = store.ledger_snapshot().await.height;

        // a plain file where the blob directory should be makes the write fail
        tokio::fs::remove_dir_all(dir.path().join(DATA_DIR)).await.unwrap();
        tokio::fs::write(dir.path().join(DATA_DIR), b"not a dir").await.unwrap();

        let err = node.upload(b"hello", &[]).await.unwrap_err();
        assert!(matches!(err, ToolkitError::Io(_)));
        assert_eq!(node.loaded_balance().await.unwrap(), Amount::new(10_000));
        assert_eq!(store.ledger_snapshot().await.height, height);
        assert!(store.search(&QueryFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn abort_drops_only_the_owners_session() {
        let node = funded_node(10_000).await;
        let manifest = SessionManifest {
            total_size: 4,
            chunk_size: 4,
            total_chunks: 1,
            tags: vec![],
        };
        let session = node.create_session(&manifest).await.unwrap();
        node.put_chunk(&session, 0, b"abcd", &chunk_hash(b"abcd"))
            .await
            .unwrap();
        assert_eq!(node.store().open_sessions().await, 1);

        let stranger = node.store().node(eth(), "0xb0b");
        assert!(stranger.abort_session(&session).await.is_err());
        assert_eq!(node.store().open_sessions().await, 1);

        node.abort_session(&session).await.unwrap();
        node.abort_session(&session).await.unwrap();
        assert_eq!(node.store().open_sessions().await, 0);
        assert!(matches!(
            node.put_chunk(&session, 0, b"abcd", &chunk_hash(b"abcd")).await,
            Err(ToolkitError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn chain_reader_exposes_wallet_balances() {
        let store = LocalStore::in_memory(Pricing::default());
        let matic = Currency::lookup("matic").unwrap();
        store.deposit(matic, "0xB0B", Amount::new(9)).await.unwrap();
        let params = vec!["0xb0b".to_string(), "latest".to_string()];
        assert_eq!(
            store.call("polygon", ETH_GET_BALANCE, &params).await.unwrap(),
            9
        );
        assert_eq!(
            store.call("ethereum", ETH_GET_BALANCE, &params).await.unwrap(),
            0
        );
    }
}
