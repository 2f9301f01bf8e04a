//! Currencies accepted by storage nodes and conversion between human decimal
//! strings ("0.5") and atomic units.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolkitError};

/// Value in the smallest unit of a currency (wei, lamports, winston, ...).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn new(atomic: u128) -> Self {
        Self(atomic)
    }

    pub const fn atomic(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A currency a node can be funded with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Currency {
    name: &'static str,
    label: &'static str,
    decimals: u32,
}

const CURRENCIES: &[Currency] = &[
    Currency { name: "aptos", label: "Aptos", decimals: 8 },
    Currency { name: "algorand", label: "Algorand", decimals: 6 },
    Currency { name: "arbitrum", label: "Arbitrum", decimals: 18 },
    Currency { name: "arweave", label: "Arweave", decimals: 12 },
    Currency { name: "avalanche", label: "Avalanche", decimals: 18 },
    Currency { name: "boba", label: "Boba", decimals: 18 },
    Currency { name: "boba-eth", label: "Boba-ETH", decimals: 18 },
    Currency { name: "chainlink", label: "Chainlink", decimals: 18 },
    Currency { name: "ethereum", label: "Ethereum", decimals: 18 },
    Currency { name: "fantom", label: "Fantom", decimals: 18 },
    Currency { name: "near", label: "Near", decimals: 24 },
    Currency { name: "matic", label: "Matic", decimals: 18 },
    Currency { name: "solana", label: "Solana", decimals: 9 },
];

impl Currency {
    /// Every currency the toolkit knows how to denominate.
    pub fn all() -> &'static [Currency] {
        CURRENCIES
    }

    pub fn lookup(name: &str) -> Option<Currency> {
        let name = name.trim().to_ascii_lowercase();
        CURRENCIES.iter().copied().find(|c| c.name == name)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Convert a decimal string such as `"0.5"` into atomic units.
    ///
    /// Rejects negative values, more fractional digits than the currency
    /// supports, and values that overflow `u128`.
    pub fn to_atomic(&self, value: &str) -> Result<Amount> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ToolkitError::validation("amount is empty"));
        }
        let (whole, frac) = match value.split_once('.') {
            Some((w, f)) => (w, f),
            None => (value, ""),
        };
        let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if !digits_only(whole) || !digits_only(frac) || (whole.is_empty() && frac.is_empty()) {
            return Err(ToolkitError::validation(format!("invalid amount `{value}`")));
        }
        let frac = frac.trim_end_matches('0');
        if frac.len() > self.decimals as usize {
            return Err(ToolkitError::validation(format!(
                "amount `{value}` has more than {} decimal places for {}",
                self.decimals, self.name
            )));
        }

        let scale = 10u128.pow(self.decimals);
        let overflow = || ToolkitError::validation(format!("amount `{value}` is too large"));
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut frac_atomic: u128 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| overflow())?
        };
        frac_atomic *= 10u128.pow(self.decimals - frac.len() as u32);

        whole
            .checked_mul(scale)
            .and_then(|w| w.checked_add(frac_atomic))
            .map(Amount)
            .ok_or_else(overflow)
    }

    /// Render atomic units as a decimal string without trailing zeros.
    pub fn from_atomic(&self, amount: Amount) -> String {
        let scale = 10u128.pow(self.decimals);
        let whole = amount.0 / scale;
        let frac = amount.0 % scale;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{:0width$}", frac, width = self.decimals as usize);
        format!("{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl FromStr for Currency {
    type Err = ToolkitError;

    fn from_str(s: &str) -> Result<Self> {
        Currency::lookup(s)
            .ok_or_else(|| ToolkitError::validation(format!("unsupported currency `{s}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eth() -> Currency {
        Currency::lookup("ethereum").expect("ethereum")
    }

    #[test]
    fn half_an_ether_in_wei() {
        let amount = eth().to_atomic("0.5").expect("parse");
        assert_eq!(amount, Amount::new(500_000_000_000_000_000));
        assert_eq!(eth().from_atomic(amount), "0.5");
    }

    #[test]
    fn rejects_malformed_and_overprecise_amounts() {
        assert!(eth().to_atomic("-1").is_err());
        assert!(eth().to_atomic("1.2.3").is_err());
        assert!(eth().to_atomic(".").is_err());
        let algo = Currency::lookup("algorand").expect("algorand");
        assert!(algo.to_atomic("0.0000001").is_err());
        assert_eq!(algo.to_atomic("0.000001").expect("ok"), Amount::new(1));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(Currency::lookup("Solana").map(|c| c.decimals()), Some(9));
        assert!("dogecoin".parse::<Currency>().is_err());
    }

    proptest! {
        #[test]
        fn atomic_rendering_parses_back(raw in 0u128..10u128.pow(30)) {
            for currency in Currency::all() {
                let amount = Amount::new(raw);
                let text = currency.from_atomic(amount);
                prop_assert_eq!(currency.to_atomic(&text).unwrap(), amount);
            }
        }
    }
}
