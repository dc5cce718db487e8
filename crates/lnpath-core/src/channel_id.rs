use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Largest block height that fits in the packed form (3 bytes).
pub const MAX_BLOCK: u64 = 0x00ff_ffff;
/// Largest transaction index that fits in the packed form (3 bytes).
pub const MAX_TX_INDEX: u64 = 0x00ff_ffff;
/// Largest output index that fits in the packed form (2 bytes).
pub const MAX_OUTPUT_INDEX: u64 = 0xffff;

/// A channel id in its canonical `BLOCKxINDEXxOUTPUT` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId {
    block_height: u32,
    block_index: u32,
    output_index: u16,
}

impl ChannelId {
    pub fn new(block_height: u32, block_index: u32, output_index: u16) -> Result<Self, CoreError> {
        if u64::from(block_height) > MAX_BLOCK {
            return Err(CoreError::InvalidChannelId(format!(
                "block height {} out of range",
                block_height
            )));
        }
        if u64::from(block_index) > MAX_TX_INDEX {
            return Err(CoreError::InvalidChannelId(format!(
                "block index {} out of range",
                block_index
            )));
        }
        Ok(Self {
            block_height,
            block_index,
            output_index,
        })
    }

    pub fn block_height(&self) -> u32 {
        self.block_height
    }

    pub fn block_index(&self) -> u32 {
        self.block_index
    }

    pub fn output_index(&self) -> u16 {
        self.output_index
    }

    /// Unpack the 64-bit numeric form.
    pub fn from_number(number: u64) -> Self {
        Self {
            block_height: (number >> 40) as u32,
            block_index: ((number >> 16) & MAX_TX_INDEX) as u32,
            output_index: (number & MAX_OUTPUT_INDEX) as u16,
        }
    }

    /// Pack into the 64-bit numeric form.
    pub fn to_number(&self) -> u64 {
        (u64::from(self.block_height) << 40)
            | (u64::from(self.block_index) << 16)
            | u64::from(self.output_index)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{}",
            self.block_height, self.block_index, self.output_index
        )
    }
}

impl FromStr for ChannelId {
    type Err = CoreError;

    /// Accepts the canonical `BLOCKxINDEXxOUTPUT` form or the packed number
    /// written in decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            let number = s
                .parse::<u64>()
                .map_err(|_| CoreError::InvalidChannelId(format!("number out of range: {:?}", s)))?;
            return Ok(Self::from_number(number));
        }

        let parts: Vec<&str> = s.split('x').collect();
        let [block, index, output] = parts.as_slice() else {
            return Err(CoreError::InvalidChannelId(format!(
                "expected BLOCKxINDEXxOUTPUT, got {:?}",
                s
            )));
        };

        let parse = |part: &str, max: u64| -> Result<u64, CoreError> {
            let value = part
                .parse::<u64>()
                .map_err(|_| CoreError::InvalidChannelId(format!("bad component in {:?}", s)))?;
            if value > max {
                return Err(CoreError::InvalidChannelId(format!(
                    "component {} out of range in {:?}",
                    value, s
                )));
            }
            Ok(value)
        };

        Ok(Self {
            block_height: parse(block, MAX_BLOCK)? as u32,
            block_index: parse(index, MAX_TX_INDEX)? as u32,
            output_index: parse(output, MAX_OUTPUT_INDEX)? as u16,
        })
    }
}

impl Serialize for ChannelId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
