//! Builds the handles a command needs (node, gateway, query, key network)
//! from the resolved configuration.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use provenance_core::access::{ChainReader, StaticChainState};
use provenance_core::actions::NodeConnector;
use provenance_core::config::ToolkitConfig;
use provenance_core::crypto::ContentKey;
use provenance_core::currency::Currency;
use provenance_core::encryption::{provider_for, EncryptionProvider, LocalKeyNetwork, ProviderKind};
use provenance_core::gateway::{Gateway, HttpGateway};
use provenance_core::node::{HttpNode, LocalStore, NodeEndpoint, Pricing, StorageNode};
use provenance_core::query::TransactionQuery;
use provenance_core::wallet::Wallet;

const KEY_HOLDERS: usize = 5;
const KEY_THRESHOLD: usize = 3;

pub struct Session {
    pub config: ToolkitConfig,
    pub wallet: Arc<Wallet>,
    pub node: Arc<dyn StorageNode>,
    pub gateway: Arc<dyn Gateway>,
    pub query: Arc<dyn TransactionQuery>,
    pub chain: Arc<dyn ChainReader>,
    /// Set when the node is a `local:` store.
    pub local: Option<Arc<LocalStore>>,
}

impl Session {
    pub async fn open(config: ToolkitConfig, currency: Currency, wallet: Arc<Wallet>) -> Result<Self> {
        let endpoint = NodeEndpoint::parse(&config.node)?;
        let session = match endpoint {
            NodeEndpoint::Local(dir) => {
                let store = open_store(&dir).await?;
                Self {
                    node: Arc::new(store.node(currency, wallet.address())),
                    gateway: store.clone(),
                    query: store.clone(),
                    chain: store.clone(),
                    local: Some(store),
                    config,
                    wallet,
                }
            }
            NodeEndpoint::Http(url) => {
                let http = Arc::new(HttpNode::new(url, currency, wallet.clone())?);
                let gateway = Arc::new(HttpGateway::new(&config.gateway)?);
                Self {
                    node: http.clone(),
                    gateway,
                    query: http,
                    chain: Arc::new(StaticChainState::new()),
                    local: None,
                    config,
                    wallet,
                }
            }
        };
        tracing::debug!(node = %session.node.url(), currency = %currency, address = %session.wallet.address(), "session opened");
        Ok(session)
    }

    /// Encryption provider backed by the key network persisted at `keynet`.
    pub async fn provider(&self, kind: ProviderKind, keynet: &Path) -> Result<Arc<dyn EncryptionProvider>> {
        let master = load_or_create_master(keynet).await?;
        let network = LocalKeyNetwork::with_master_key(master, KEY_HOLDERS, KEY_THRESHOLD, self.chain.clone())?;
        Ok(provider_for(
            kind,
            &self.config.providers,
            Arc::new(network),
            self.wallet.clone(),
        ))
    }
}

async fn open_store(dir: &Path) -> Result<Arc<LocalStore>> {
    LocalStore::open(dir, Pricing::default())
        .await
        .with_context(|| format!("opening local node at {}", dir.display()))
}

async fn load_or_create_master(path: &Path) -> Result<ContentKey> {
    if tokio::fs::try_exists(path).await? {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let bytes = hex::decode(raw.trim()).with_context(|| format!("{} is not hex", path.display()))?;
        return Ok(ContentKey::from_slice(&bytes)?);
    }
    let key = ContentKey::generate();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, hex::encode(key.as_bytes()))
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "created key network master key");
    Ok(key)
}

pub async fn load_wallet(path: &Path) -> Result<Arc<Wallet>> {
    let secret = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading key {} (run `provenance keygen` first)", path.display()))?;
    Ok(Arc::new(Wallet::from_secret_hex(&secret)?))
}

/// Resolve the currency from a flag or the configuration.
pub fn require_currency(config: &ToolkitConfig) -> Result<Currency> {
    config
        .currency()?
        .ok_or_else(|| anyhow!("no currency selected; pass --currency or set PROVENANCE_CURRENCY"))
}

/// Connects fund/withdraw requests to `local:` stores or HTTP nodes.
pub struct CliConnector {
    pub wallet: Arc<Wallet>,
}

#[async_trait]
impl NodeConnector for CliConnector {
    async fn connect(
        &self,
        url: &str,
        currency: Currency,
    ) -> provenance_core::Result<Arc<dyn StorageNode>> {
        match NodeEndpoint::parse(url)? {
            NodeEndpoint::Local(dir) => {
                let store = LocalStore::open(&dir, Pricing::default()).await?;
                Ok(Arc::new(store.node(currency, self.wallet.address())))
            }
            NodeEndpoint::Http(url) => Ok(Arc::new(HttpNode::new(url, currency, self.wallet.clone())?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn master_key_is_created_once_then_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys/keynet.key");
        let first = load_or_create_master(&path).await.unwrap();
        let second = load_or_create_master(&path).await.unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[tokio::test]
    async fn local_connector_funds_a_store_on_disk() {
        use provenance_core::currency::Amount;

        let dir = tempfile::tempdir().unwrap();
        let wallet = Arc::new(Wallet::generate());
        let eth = Currency::lookup("ethereum").unwrap();
        let url = format!("local:{}", dir.path().display());

        let store = LocalStore::open(dir.path(), Pricing::default()).await.unwrap();
        store.deposit(eth, &wallet.address(), Amount::new(500)).await.unwrap();
        drop(store);

        let connector = CliConnector { wallet };
        let node = connector.connect(&url, eth).await.unwrap();
        node.fund(Amount::new(200)).await.unwrap();
        assert_eq!(node.loaded_balance().await.unwrap(), Amount::new(200));
    }
}
