//! Utility helpers for the hex-encoded quantities EVM nodes use on the wire,
//! plus the serde adapters that render them back as plain numbers.

use anyhow::{bail, Context, Result};

/// Encodes a height (or any unsigned quantity) as a JSON-RPC quantity.
///
/// Quantities are `0x`-prefixed and carry no leading zeros, so `0` encodes as `0x0`.
pub fn to_quantity(value: u64) -> String {
    format!("{value:#x}")
}

/// Parses a JSON-RPC quantity such as `0x1b4` into a `u64`.
pub fn parse_quantity(raw: &str) -> Result<u64> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .with_context(|| format!("quantity {trimmed:?} is missing the 0x prefix"))?;
    if digits.is_empty() {
        bail!("quantity {trimmed:?} has no digits");
    }
    u64::from_str_radix(digits, 16).with_context(|| format!("invalid quantity {trimmed:?}"))
}

/// Reads hex quantities, writes them as JSON numbers.
pub(crate) mod quantity {
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*value)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_quantity(&raw).map_err(serde::de::Error::custom)
    }

    pub(crate) mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub(crate) fn serialize<S: Serializer>(
            value: &Option<u64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_some(value),
                None => serializer.serialize_none(),
            }
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u64>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| super::super::parse_quantity(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// Reads 256-bit hex amounts, writes them as decimal strings so wei values keep
/// full precision.
pub(crate) mod amount {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        U256::deserialize(deserializer)
    }

    pub(crate) mod option {
        use alloy_primitives::U256;
        use serde::{Deserialize, Deserializer, Serializer};

        pub(crate) fn serialize<S: Serializer>(
            value: &Option<U256>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.collect_str(value),
                None => serializer.serialize_none(),
            }
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<U256>, D::Error> {
            Option::<U256>::deserialize(deserializer)
        }
    }
}
