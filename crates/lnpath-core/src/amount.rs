//! Exact-precision millitoken arithmetic.
//!
//! Amounts on the wire are decimal strings because they routinely exceed the
//! 53-bit range of JSON numbers. Internally every amount is a `u128`.

use crate::error::CoreError;

/// Millitokens: 1/1000 of a token.
pub type Mtokens = u128;

/// Millitokens in one token.
pub const MTOKENS_PER_TOKEN: Mtokens = 1_000;

/// Fee rates are expressed in parts per million.
pub const FEE_RATE_DENOMINATOR: Mtokens = 1_000_000;

/// Fee a forwarding node charges to send `forward_mtokens` onward.
///
/// `base + forward * rate / 1_000_000`, rounded down. `None` on overflow.
pub fn fee_for_forward(
    base_fee_mtokens: Mtokens,
    fee_rate: u64,
    forward_mtokens: Mtokens,
) -> Option<Mtokens> {
    let proportional = forward_mtokens.checked_mul(Mtokens::from(fee_rate))? / FEE_RATE_DENOMINATOR;
    base_fee_mtokens.checked_add(proportional)
}

/// Whole tokens contained in `mtokens` (floor). `None` past `u64::MAX`.
pub fn tokens_from_mtokens(mtokens: Mtokens) -> Option<u64> {
    u64::try_from(mtokens / MTOKENS_PER_TOKEN).ok()
}

/// Millitokens for a whole number of tokens.
pub fn mtokens_from_tokens(tokens: u64) -> Mtokens {
    Mtokens::from(tokens) * MTOKENS_PER_TOKEN
}

/// Parse a decimal millitokens string.
pub fn parse_mtokens(value: &str) -> Result<Mtokens, CoreError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::InvalidAmount(format!(
            "expected decimal digits, got {:?}",
            value
        )));
    }
    value
        .parse::<Mtokens>()
        .map_err(|e| CoreError::InvalidAmount(format!("{}: {}", value, e)))
}

/// Serde helper to serialize/deserialize millitokens as decimal strings.
pub mod mtokens_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::{parse_mtokens, Mtokens};

    pub fn serialize<S>(mtokens: &Mtokens, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&mtokens.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Mtokens, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_mtokens(&s).map_err(D::Error::custom)
    }
}

/// Like [`mtokens_string`] for optional fields.
pub mod option_mtokens_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::{parse_mtokens, Mtokens};

    pub fn serialize<S>(mtokens: &Option<Mtokens>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match mtokens {
            Some(m) => serializer.serialize_some(&m.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Mtokens>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| parse_mtokens(&s).map_err(D::Error::custom))
            .transpose()
    }
}
