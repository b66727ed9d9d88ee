//! Wire types for the eth JSON-RPC namespace.

use serde::{Deserialize, Serialize};

use provenet_core::{Address, Hash32};

use crate::ChainError;

/// A raw contract log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Log {
    #[serde(with = "hex_address")]
    pub address: Address,
    #[serde(with = "hex_topics")]
    pub topics: Vec<Hash32>,
    #[serde(with = "hex_data")]
    pub data: Vec<u8>,
    #[serde(rename = "blockNumber", with = "hex_u64")]
    pub block_number: u64,
    #[serde(rename = "transactionIndex", with = "hex_u64", default)]
    pub tx_index: u64,
}

/// Filter parameters for `eth_getLogs`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub address: Vec<String>,
    /// Position 0 is an OR-list over event topic hashes
    pub topics: Vec<Vec<String>>,
    pub from_block: String,
    pub to_block: String,
}

impl LogFilter {
    pub fn new(addresses: &[Address], event_topics: &[Hash32], from: u64, to: u64) -> Self {
        Self {
            address: addresses.iter().map(|a| format_address(a)).collect(),
            topics: vec![event_topics.iter().map(|t| format!("0x{}", hex::encode(t))).collect()],
            from_block: format_quantity(from),
            to_block: format_quantity(to),
        }
    }
}

/// Parse a 0x-hex account address.
pub fn parse_address(s: &str) -> Result<Address, ChainError> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|_| ChainError::InvalidAddress(s.to_string()))?;
    let mut address = [0u8; 20];
    if bytes.len() != address.len() {
        return Err(ChainError::InvalidAddress(s.to_string()));
    }
    address.copy_from_slice(&bytes);
    Ok(address)
}

/// Format an account address as 0x-hex.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Format a block number or other quantity as 0x-hex.
pub fn format_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

pub(crate) fn parse_quantity(s: &str) -> Result<u64, ChainError> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|_| ChainError::InvalidResponse(format!("bad quantity: {}", s)))
}

mod hex_u64 {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
    }
}

mod hex_address {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<super::Address, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_address(&s).map_err(serde::de::Error::custom)
    }
}

mod hex_data {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

mod hex_topics {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<super::Hash32>, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| {
                let bytes =
                    hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
                let mut topic = [0u8; 32];
                if bytes.len() != topic.len() {
                    return Err(serde::de::Error::custom(format!("bad topic: {}", s)));
                }
                topic.copy_from_slice(&bytes);
                Ok(topic)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log() {
        let json = r#"{
            "address": "0x02febe78f3a740b3e9a1cafaa1b23a2ac0793d26",
            "topics": [
                "0x0d7e9fc1c3cb7cb8d4aa1defb3ea10d1b3d7988aca1b83a06e25fbe3e7e26388",
                "0x0000000000000000000000000000000000000000000000000000000000000005"
            ],
            "data": "0x",
            "blockNumber": "0xc8",
            "transactionIndex": "0x1"
        }"#;
        let log: Log = serde_json::from_str(json).unwrap();
        assert_eq!(log.block_number, 200);
        assert_eq!(log.tx_index, 1);
        assert_eq!(log.topics.len(), 2);
        assert_eq!(log.topics[1][31], 5);
        assert!(log.data.is_empty());
    }

    #[test]
    fn test_parse_address_rejects_bad_input() {
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("not hex").is_err());
        let address = parse_address("0x02feBE78F3A740b3e9a1CaFAA1b23a2ac0793D26");
        assert!(address.is_ok());
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(0), "0x0");
        assert_eq!(format_quantity(200), "0xc8");
    }

    #[test]
    fn test_filter_serialization() {
        let filter = LogFilter::new(&[[0x11; 20]], &[[0x22; 32]], 10, 12);
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["fromBlock"], "0xa");
        assert_eq!(json["toBlock"], "0xc");
        assert_eq!(json["address"][0], format!("0x{}", "11".repeat(20)));
        assert_eq!(json["topics"][0][0], format!("0x{}", "22".repeat(32)));
    }
}
