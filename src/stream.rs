//! Data streams and response data extraction
//!
//! A data stream entry is the finalized, extracted value for one
//! (bridge, request) pair. Entries are write-once: execution writes exactly
//! one, and nothing ever overwrites it. Absence means "not yet executed".

use std::collections::HashMap;

use alloy_primitives::U256;
use tracing::info;

use crate::error::{BridgeError, Result};
use crate::types::{BridgeId, RequestCid, ResponseDataType, BLOCK_HASH_STRING_LEN};

/// Write-once store of extracted query results.
#[derive(Debug, Default)]
pub struct DataStreamStore {
    entries: HashMap<(BridgeId, RequestCid), Vec<u8>>,
}

impl DataStreamStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Store the extracted `value` for `(bridge_id, request_cid)`.
    pub fn write(&mut self, bridge_id: BridgeId, request_cid: RequestCid, value: Vec<u8>) -> Result<()> {
        if self.entries.contains_key(&(bridge_id, request_cid)) {
            return Err(BridgeError::State(format!(
                "data stream entry for bridge {} request {} already written",
                bridge_id, request_cid
            )));
        }
        info!(
            "Data stream write: bridge={} request={} ({} bytes)",
            bridge_id,
            request_cid,
            value.len()
        );
        self.entries.insert((bridge_id, request_cid), value);
        Ok(())
    }

    /// Pure lookup, safe to call any number of times.
    pub fn read(&self, bridge_id: BridgeId, request_cid: RequestCid) -> Option<&[u8]> {
        self.entries
            .get(&(bridge_id, request_cid))
            .map(|value| value.as_slice())
    }
}

/// Decode the result bytes at `offset` inside a raw response payload.
pub fn extract_response_data(
    response: &str,
    offset: u16,
    data_type: ResponseDataType,
) -> Result<Vec<u8>> {
    let offset = offset as usize;
    if offset >= response.len() {
        return Err(BridgeError::Validation(format!(
            "response data offset {} beyond response length {}",
            offset,
            response.len()
        )));
    }
    let tail = &response.as_bytes()[offset..];

    match data_type {
        ResponseDataType::Hash => {
            let literal = response
                .get(offset..offset + BLOCK_HASH_STRING_LEN)
                .ok_or_else(|| {
                    BridgeError::Validation(
                        "response too short for a hash literal at offset".to_string(),
                    )
                })?;
            if !literal.starts_with("0x") {
                return Err(BridgeError::Validation(
                    "hash literal must be 0x-prefixed".to_string(),
                ));
            }
            Ok(hex::decode(&literal[2..])?)
        }
        ResponseDataType::Uint => {
            let digits = tail
                .iter()
                .take_while(|byte| byte.is_ascii_digit())
                .count();
            if digits == 0 {
                return Err(BridgeError::Validation(format!(
                    "no decimal digits at response offset {}",
                    offset
                )));
            }
            let mut value = U256::ZERO;
            for byte in &tail[..digits] {
                value = value
                    .checked_mul(U256::from(10u8))
                    .and_then(|v| v.checked_add(U256::from(byte - b'0')))
                    .ok_or_else(|| {
                        BridgeError::Validation("decimal value overflows 256 bits".to_string())
                    })?;
            }
            Ok(value.to_be_bytes::<32>().to_vec())
        }
        ResponseDataType::String => {
            let end = tail.iter().position(|&byte| byte == b'"').ok_or_else(|| {
                BridgeError::Validation("unterminated string field at response offset".to_string())
            })?;
            Ok(tail[..end].to_vec())
        }
    }
}
