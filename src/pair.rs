//! Trading pair identifiers.
//!
//! An [`AssetPair`] is the unit of sharding for the matcher: exactly one
//! [`crate::core::BookCore`] exists per pair, addressed by its canonical
//! string form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An asset identifier: either the chain's native-coin sentinel or a
/// 32-byte issued-asset id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetId {
    /// The native coin of the chain (e.g. the fee/gas asset).
    Native,
    /// A 32-byte issued asset id.
    Issued([u8; 32]),
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Native => write!(f, "NATIVE"),
            AssetId::Issued(bytes) => {
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// An ordered pair `(amount_asset, price_asset)`. Canonical string form
/// (`"{amount}-{price}"`) doubles as the actor and journal id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    pub amount_asset: AssetId,
    pub price_asset: AssetId,
}

impl AssetPair {
    pub fn new(amount_asset: AssetId, price_asset: AssetId) -> Self {
        Self {
            amount_asset,
            price_asset,
        }
    }

    /// Canonical actor/journal id, e.g. `"abcd...-NATIVE"`.
    pub fn canonical(&self) -> String {
        format!("{}-{}", self.amount_asset, self.price_asset)
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_is_stable() {
        let pair = AssetPair::new(AssetId::Issued([1u8; 32]), AssetId::Native);
        let expected = format!("{}-NATIVE", "01".repeat(32));
        assert_eq!(pair.canonical(), expected);
    }

    #[test]
    fn native_pair_renders() {
        let pair = AssetPair::new(AssetId::Native, AssetId::Native);
        assert_eq!(pair.canonical(), "NATIVE-NATIVE");
    }
}
