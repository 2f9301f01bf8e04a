//! User-facing operations that report outcomes as messages.

use std::sync::Arc;

use async_trait::async_trait;

use crate::currency::Currency;
use crate::error::Result;
use crate::node::StorageNode;
use crate::receipt::TxReceipt;

pub const MSG_SELECT_NODE: &str = "Please select a node to fund";
pub const MSG_SELECT_CURRENCY: &str = "Please select a currency to use when funding";
pub const MSG_POSITIVE_AMOUNT: &str = "Please enter an amount greater than 0";
pub const MSG_FUNDED: &str = "Funding successful";
pub const MSG_WITHDRAWN: &str = "Withdraw successful";
pub const FUND_ERROR_PREFIX: &str = "Error while funding: ";
pub const WITHDRAW_ERROR_PREFIX: &str = "Error while withdrawing: ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FundMode {
    Fund,
    Withdraw,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FundWithdrawRequest {
    pub node: Option<String>,
    pub currency: Option<String>,
    /// Decimal amount in whole units of the currency, e.g. `"0.5"`.
    pub amount: String,
}

/// Opens a node handle for a URL and currency.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    async fn connect(&self, url: &str, currency: Currency) -> Result<Arc<dyn StorageNode>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionReport {
    pub success: bool,
    pub message: String,
    pub receipt: Option<TxReceipt>,
}

impl ActionReport {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            receipt: None,
        }
    }
}

/// Validate the request, then fund or withdraw once.
pub async fn fund_withdraw(
    connector: &dyn NodeConnector,
    request: &FundWithdrawRequest,
    mode: FundMode,
) -> ActionReport {
    let Some(url) = request.node.as_deref().filter(|n| !n.trim().is_empty()) else {
        return ActionReport::failed(MSG_SELECT_NODE);
    };
    let Some(currency) = request.currency.as_deref().and_then(Currency::lookup) else {
        return ActionReport::failed(MSG_SELECT_CURRENCY);
    };
    let amount = match currency.to_atomic(&request.amount) {
        Ok(amount) if !amount.is_zero() => amount,
        _ => return ActionReport::failed(MSG_POSITIVE_AMOUNT),
    };

    let (success_message, error_prefix) = match mode {
        FundMode::Fund => (MSG_FUNDED, FUND_ERROR_PREFIX),
        FundMode::Withdraw => (MSG_WITHDRAWN, WITHDRAW_ERROR_PREFIX),
    };
    let outcome = async {
        let node = connector.connect(url, currency).await?;
        match mode {
            FundMode::Fund => node.fund(amount).await,
            FundMode::Withdraw => node.withdraw(amount).await,
        }
    }
    .await;

    match outcome {
        Ok(receipt) => {
            tracing::info!(node = url, currency = %currency, amount = %amount, ?mode, tx = %receipt.tx_id, "balance updated");
            ActionReport {
                success: true,
                message: success_message.to_string(),
                receipt: Some(receipt),
            }
        }
        Err(err) => {
            tracing::warn!(node = url, ?mode, error = %err, "balance update failed");
            ActionReport::failed(format!("{error_prefix}{err}"))
        }
    }
}
