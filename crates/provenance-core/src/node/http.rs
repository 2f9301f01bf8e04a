//! Bundler node reached over HTTP.
//!
//! Mutating requests carry a JSON envelope signed by the caller's wallet:
//! `{ "payload": ..., "address", "publicKey", "signature" }`, where the
//! signature covers the serialized payload. Amounts travel as decimal
//! strings of atomic units.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::currency::{Amount, Currency};
use crate::error::{Result, ToolkitError};
use crate::node::{SessionManifest, StorageNode};
use crate::query::{QueryFilter, QueryResult, TransactionQuery};
use crate::receipt::{TxKind, TxReceipt, UploadReceipt};
use crate::tags::Tag;
use crate::wallet::Wallet;

pub const CHUNK_HASH_HEADER: &str = "x-chunk-hash";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HttpNode {
    client: Client,
    url: String,
    currency: Currency,
    wallet: Arc<Wallet>,
    address: String,
}

#[derive(Deserialize)]
struct BalanceResponse {
    balance: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxResponse {
    #[serde(alias = "id")]
    tx_id: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
}

/// JSON body a node sends with a non-success status. Balance failures carry
/// their amounts as decimal strings of atomic units so callers get the same
/// typed errors a local node raises.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded: Option<String>,
}

pub const INSUFFICIENT_FUNDS: &str = "insufficient_funds";
pub const INSUFFICIENT_BALANCE: &str = "insufficient_balance";

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: Some(message.into()),
            requested: None,
            available: None,
            loaded: None,
        }
    }

    /// The balance error this body describes, if it is one.
    fn balance_error(&self) -> Option<ToolkitError> {
        let amount = |raw: &Option<String>| raw.as_deref().and_then(|r| parse_amount(r).ok());
        match self.error.as_str() {
            INSUFFICIENT_FUNDS => Some(ToolkitError::InsufficientFunds {
                requested: amount(&self.requested)?,
                available: amount(&self.available)?,
            }),
            INSUFFICIENT_BALANCE => Some(ToolkitError::InsufficientBalance {
                requested: amount(&self.requested)?,
                loaded: amount(&self.loaded)?,
            }),
            _ => None,
        }
    }
}

impl From<&ToolkitError> for ErrorBody {
    fn from(err: &ToolkitError) -> Self {
        match err {
            ToolkitError::InsufficientFunds { requested, available } => Self {
                requested: Some(requested.atomic().to_string()),
                available: Some(available.atomic().to_string()),
                ..Self::new(INSUFFICIENT_FUNDS, err.to_string())
            },
            ToolkitError::InsufficientBalance { requested, loaded } => Self {
                requested: Some(requested.atomic().to_string()),
                loaded: Some(loaded.atomic().to_string()),
                ..Self::new(INSUFFICIENT_BALANCE, err.to_string())
            },
            ToolkitError::NotFound(_) => Self::new("not_found", err.to_string()),
            ToolkitError::Validation(_) => Self::new("invalid_request", err.to_string()),
            _ => Self::new("rejected", err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct UploadPayload<'a> {
    tags: &'a [Tag],
    data: String,
}

impl HttpNode {
    pub fn new(url: impl Into<String>, currency: Currency, wallet: Arc<Wallet>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let address = wallet.address();
        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            currency,
            wallet,
            address,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }

    fn signed<T: Serialize>(&self, payload: &T) -> Result<Value> {
        let payload = serde_json::to_value(payload)?;
        let signature = self.wallet.sign(serde_json::to_string(&payload)?.as_bytes());
        Ok(json!({
            "payload": payload,
            "address": self.address,
            "publicKey": hex::encode(self.wallet.public_key().as_bytes()),
            "signature": hex::encode(signature.to_bytes()),
        }))
    }

    async fn post_signed<T: Serialize>(&self, path: &str, payload: &T) -> Result<Response> {
        let body = self.signed(payload)?;
        let response = self
            .client
            .post(self.endpoint(path))
            .json(&body)
            .send()
            .await?;
        check(response).await
    }

    async fn move_balance(&self, kind: TxKind, amount: Amount) -> Result<TxReceipt> {
        let route = match kind {
            TxKind::Fund => "fund",
            TxKind::Withdraw => "withdraw",
        };
        let path = format!("account/{route}/{}", self.currency.name());
        let response = self
            .post_signed(&path, &json!({ "amount": amount.atomic().to_string() }))
            .await?;
        let tx: TxResponse = response.json().await?;
        tracing::info!(node = %self.url, tx = %tx.tx_id, ?kind, amount = %amount, "balance transaction submitted");
        Ok(TxReceipt {
            tx_id: tx.tx_id,
            kind,
            currency: self.currency.name().to_string(),
            amount,
        })
    }
}

/// Map non-success statuses onto toolkit errors.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    if let Some(err) = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.balance_error())
    {
        return Err(err);
    }
    let detail = if body.is_empty() {
        format!("{status} from {url}")
    } else {
        format!("{status} from {url}: {body}")
    };
    Err(match status {
        StatusCode::NOT_FOUND => ToolkitError::NotFound(detail),
        StatusCode::PAYMENT_REQUIRED => ToolkitError::Upload(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ToolkitError::Validation(detail),
        s if s.is_server_error() => ToolkitError::Network(detail),
        _ => ToolkitError::Malformed(detail),
    })
}

fn parse_amount(raw: &str) -> Result<Amount> {
    raw.trim()
        .parse::<u128>()
        .map(Amount::new)
        .map_err(|_| ToolkitError::Malformed(format!("`{raw}` is not an atomic amount")))
}

#[async_trait]
impl StorageNode for HttpNode {
    fn url(&self) -> &str {
        &self.url
    }

    fn currency(&self) -> Currency {
        self.currency
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn price(&self, size_bytes: u64) -> Result<Amount> {
        let path = format!("price/{}/{size_bytes}", self.currency.name());
        let response = check(self.client.get(self.endpoint(&path)).send().await?).await?;
        parse_amount(&response.text().await?)
    }

    async fn loaded_balance(&self) -> Result<Amount> {
        let path = format!("account/balance/{}", self.currency.name());
        let response = self
            .client
            .get(self.endpoint(&path))
            .query(&[("address", self.address.as_str())])
            .send()
            .await?;
        let body: BalanceResponse = check(response).await?.json().await?;
        parse_amount(&body.balance)
    }

    async fn fund(&self, amount: Amount) -> Result<TxReceipt> {
        self.move_balance(TxKind::Fund, amount).await
    }

    async fn withdraw(&self, amount: Amount) -> Result<TxReceipt> {
        self.move_balance(TxKind::Withdraw, amount).await
    }

    async fn upload(&self, data: &[u8], tags: &[Tag]) -> Result<UploadReceipt> {
        let payload = UploadPayload {
            tags,
            data: STANDARD.encode(data),
        };
        let path = format!("tx/{}", self.currency.name());
        let receipt: UploadReceipt = self.post_signed(&path, &payload).await?.json().await?;
        tracing::debug!(node = %self.url, id = %receipt.id, size = data.len(), "upload acknowledged");
        Ok(receipt)
    }

    async fn create_session(&self, manifest: &SessionManifest) -> Result<String> {
        let path = format!("chunks/{}", self.currency.name());
        let session: SessionResponse = self.post_signed(&path, manifest).await?.json().await?;
        Ok(session.id)
    }

    async fn put_chunk(
        &self,
        session: &str,
        index: u64,
        data: &[u8],
        hash: &[u8; 32],
    ) -> Result<()> {
        let path = format!("chunks/{}/{session}/{index}", self.currency.name());
        let response = self
            .client
            .post(self.endpoint(&path))
            .header(CHUNK_HASH_HEADER, hex::encode(hash))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data.to_vec())
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn finish_session(&self, session: &str, data_root: &[u8; 32]) -> Result<UploadReceipt> {
        let path = format!("chunks/{}/{session}/finish", self.currency.name());
        let payload = json!({ "dataRoot": hex::encode(data_root) });
        Ok(self.post_signed(&path, &payload).await?.json().await?)
    }

    async fn abort_session(&self, session: &str) -> Result<()> {
        let path = format!("chunks/{}/{session}/abort", self.currency.name());
        self.post_signed(&path, &json!({})).await?;
        Ok(())
    }

    async fn receipt(&self, id: &str) -> Result<UploadReceipt> {
        let response = self
            .client
            .get(self.endpoint(&format!("tx/{id}/receipt")))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

#[async_trait]
impl TransactionQuery for HttpNode {
    async fn search(&self, filter: &QueryFilter) -> Result<Vec<QueryResult>> {
        let response = self
            .client
            .post(self.endpoint("graphql"))
            .json(&filter.to_graphql())
            .send()
            .await?;
        let body: Value = check(response).await?.json().await?;
        if let Some(errors) = body.get("errors") {
            return Err(ToolkitError::Malformed(format!("graphql errors: {errors}")));
        }
        let edges = body["data"]["transactions"]["edges"]
            .as_array()
            .ok_or_else(|| ToolkitError::Malformed("graphql response has no edges".into()))?;
        edges
            .iter()
            .map(|edge| Ok(serde_json::from_value(edge["node"].clone())?))
            .collect()
    }
}
