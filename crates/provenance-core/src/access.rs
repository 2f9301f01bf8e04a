//! Access-control conditions bound to encrypted content.
//!
//! A policy is a conjunction of conditions. Each condition calls a chain
//! method (usually `eth_getBalance`) with the requester's address substituted
//! for [`USER_ADDRESS`] and compares the result against a threshold.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolkitError};
use crate::wallet::USER_ADDRESS;

pub const ETH_GET_BALANCE: &str = "eth_getBalance";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparator {
    pub fn holds(self, actual: u128, expected: u128) -> bool {
        match self {
            Comparator::Gt => actual > expected,
            Comparator::Gte => actual >= expected,
            Comparator::Lt => actual < expected,
            Comparator::Lte => actual <= expected,
            Comparator::Eq => actual == expected,
            Comparator::Ne => actual != expected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparator {
    type Err = ToolkitError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            ">" => Comparator::Gt,
            ">=" => Comparator::Gte,
            "<" => Comparator::Lt,
            "<=" => Comparator::Lte,
            "=" | "==" => Comparator::Eq,
            "!=" => Comparator::Ne,
            other => {
                return Err(ToolkitError::validation(format!(
                    "unknown comparator `{other}`"
                )))
            }
        })
    }
}

/// One predicate evaluated by the key network at decrypt time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlCondition {
    pub chain: String,
    pub method: String,
    pub parameters: Vec<String>,
    pub comparator: Comparator,
    /// Threshold in the chain's atomic units, as a decimal string.
    pub value: String,
}

impl AccessControlCondition {
    pub fn balance_at_least(chain: impl Into<String>, minimum: u128) -> Self {
        Self {
            chain: chain.into(),
            method: ETH_GET_BALANCE.to_string(),
            parameters: vec![USER_ADDRESS.to_string(), "latest".to_string()],
            comparator: Comparator::Gte,
            value: minimum.to_string(),
        }
    }

    pub fn positive_balance(chain: impl Into<String>) -> Self {
        Self {
            comparator: Comparator::Gt,
            value: "0".to_string(),
            ..Self::balance_at_least(chain, 0)
        }
    }

    fn threshold(&self) -> Result<u128> {
        self.value.trim().parse().map_err(|_| {
            ToolkitError::Malformed(format!("condition value `{}` is not an integer", self.value))
        })
    }

    fn bound_parameters(&self, requester: &str) -> Vec<String> {
        self.parameters
            .iter()
            .map(|p| {
                if p == USER_ADDRESS {
                    requester.to_string()
                } else {
                    p.clone()
                }
            })
            .collect()
    }
}

/// Conjunction of conditions; immutable once bound to a container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub conditions: Vec<AccessControlCondition>,
}

impl AccessPolicy {
    pub fn new(conditions: Vec<AccessControlCondition>) -> Result<Self> {
        if conditions.is_empty() {
            return Err(ToolkitError::validation(
                "an access policy needs at least one condition",
            ));
        }
        Ok(Self { conditions })
    }

    pub fn single(condition: AccessControlCondition) -> Self {
        Self {
            conditions: vec![condition],
        }
    }

    /// Evaluate every condition for `requester`.
    ///
    /// Returns `Ok(false)` on an unmet condition; reader failures propagate.
    pub async fn evaluate(&self, reader: &dyn ChainReader, requester: &str) -> Result<bool> {
        for condition in &self.conditions {
            let expected = condition.threshold()?;
            let params = condition.bound_parameters(requester);
            let actual = reader
                .call(&condition.chain, &condition.method, &params)
                .await?;
            if !condition.comparator.holds(actual, expected) {
                tracing::debug!(
                    chain = %condition.chain,
                    method = %condition.method,
                    comparator = %condition.comparator,
                    expected,
                    actual,
                    "access condition not met"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Read-only view of chain state used to evaluate conditions.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn call(&self, chain: &str, method: &str, params: &[String]) -> Result<u128>;
}

/// In-memory chain state keyed by `(chain, address)`.
#[derive(Debug, Default)]
pub struct StaticChainState {
    balances: RwLock<HashMap<(String, String), u128>>,
}

impl StaticChainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, chain: &str, address: &str, balance: u128) {
        let mut balances = self
            .balances
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        balances.insert((chain.to_string(), address.to_ascii_lowercase()), balance);
    }
}

#[async_trait]
impl ChainReader for StaticChainState {
    async fn call(&self, chain: &str, method: &str, params: &[String]) -> Result<u128> {
        if method != ETH_GET_BALANCE {
            return Err(ToolkitError::Malformed(format!(
                "unsupported chain method `{method}`"
            )));
        }
        let address = params
            .first()
            .ok_or_else(|| ToolkitError::Malformed("eth_getBalance needs an address".into()))?;
        let balances = self
            .balances
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(balances
            .get(&(chain.to_string(), address.to_ascii_lowercase()))
            .copied()
            .unwrap_or(0))
    }
}
