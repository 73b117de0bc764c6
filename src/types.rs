//! Core protocol types for the query bridge

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::{BridgeError, Result};

/// Content hash identifying a registered bridge configuration.
pub type BridgeId = B256;

/// Content hash of a reconstructed query string.
pub type RequestCid = B256;

/// Content hash of a query response payload.
pub type ResponseCid = B256;

/// Length of a `0x`-prefixed block hash string spliced into a query.
pub const BLOCK_HASH_STRING_LEN: usize = 66;

/// Wire size of an attestation: three 32-byte CIDs, r, s, and v.
pub const ATTESTATION_BYTE_LEN: usize = 161;

pub(crate) fn keccak(data: &[u8]) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    B256::from_slice(&hasher.finalize())
}

/// Keccak256 content hash of a query string.
pub fn request_cid(query: &str) -> RequestCid {
    keccak(query.as_bytes())
}

/// Keccak256 content hash of a raw response payload.
pub fn response_cid(response: &str) -> ResponseCid {
    keccak(response.as_bytes())
}

/// How extracted response data is decoded before it is written to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ResponseDataType {
    /// A `0x`-prefixed 32-byte hash literal.
    Hash = 0,
    /// A run of ASCII decimal digits, stored big-endian in 32 bytes.
    Uint = 1,
    /// Bytes up to the closing `"` of a quoted field.
    String = 2,
}

impl TryFrom<u8> for ResponseDataType {
    type Error = BridgeError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(ResponseDataType::Hash),
            1 => Ok(ResponseDataType::Uint),
            2 => Ok(ResponseDataType::String),
            other => Err(BridgeError::Validation(format!(
                "unknown response data type tag: {}",
                other
            ))),
        }
    }
}

/// Splice descriptor for one query variable: where it goes in the template
/// and the exact byte length of the value when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSplice {
    pub offset: u16,
    pub length: u16,
}

/// Where the block hash (and optional variables) are spliced into the
/// query template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SpliceMode {
    /// Single block hash insertion at a fixed template offset.
    FixedSplice { offset: u16 },
    /// Block hash insertion followed by up to two variable insertions.
    /// The second variable is only reachable when the first is present.
    MultiVariable {
        offset: u16,
        variables: [VariableSplice; 2],
    },
}

impl SpliceMode {
    /// Template byte offset where the block hash is inserted.
    pub fn block_hash_offset(&self) -> u16 {
        match self {
            SpliceMode::FixedSplice { offset } => *offset,
            SpliceMode::MultiVariable { offset, .. } => *offset,
        }
    }
}

/// Immutable description of one query bridge.
///
/// Registered once, identified forever after by the content hash of its
/// fields ([`BridgeConfig::bridge_id`]). All block-denominated parameters
/// count ledger blocks, never wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Query template the block hash and variables are spliced into.
    pub query_template: String,

    /// Deployment whose gateway attestations secure this bridge.
    pub subgraph_deployment_id: B256,

    /// Block hash / variable splice layout.
    pub splice: SpliceMode,

    /// Byte offset into the response where extraction starts.
    pub response_data_offset: u16,

    /// How the extracted bytes are decoded.
    pub response_data_type: ResponseDataType,

    /// Blocks a proposal stays frozen after pinning before it can be
    /// submitted or executed.
    pub proposal_freeze_period: u64,

    /// Minimum slashable stake an attestation signer must hold.
    pub minimum_slashable_stake: u128,

    /// Minimum external stake a disputer must post. Zero disables disputes.
    pub minimum_external_stake: u128,

    /// Blocks after submission during which a dispute may be opened.
    /// Zero disables disputes.
    pub dispute_resolution_window: u64,

    /// Percent of total contested slashable stake a side needs to win.
    pub resolution_threshold_slashable: u8,

    /// Percent of total contested external stake a side needs to win.
    pub resolution_threshold_external: u8,

    /// Token external dispute stake is denominated in.
    pub staking_token: Address,
}

impl BridgeConfig {
    /// Identity hash of the query template.
    pub fn template_hash(&self) -> B256 {
        keccak(self.query_template.as_bytes())
    }

    /// Content hash identifying this configuration.
    ///
    /// Every field is encoded fixed-width, in declaration order, with the
    /// splice variant disambiguated by a leading tag byte. Any field change
    /// yields a different ID.
    pub fn bridge_id(&self) -> BridgeId {
        let mut buf = Vec::with_capacity(160);
        buf.extend_from_slice(self.template_hash().as_slice());
        buf.extend_from_slice(self.subgraph_deployment_id.as_slice());
        match &self.splice {
            SpliceMode::FixedSplice { offset } => {
                buf.push(0u8);
                buf.extend_from_slice(&offset.to_be_bytes());
            }
            SpliceMode::MultiVariable { offset, variables } => {
                buf.push(1u8);
                buf.extend_from_slice(&offset.to_be_bytes());
                for variable in variables {
                    buf.extend_from_slice(&variable.offset.to_be_bytes());
                    buf.extend_from_slice(&variable.length.to_be_bytes());
                }
            }
        }
        buf.extend_from_slice(&self.response_data_offset.to_be_bytes());
        buf.push(self.response_data_type as u8);
        buf.extend_from_slice(&self.proposal_freeze_period.to_be_bytes());
        buf.extend_from_slice(&self.minimum_slashable_stake.to_be_bytes());
        buf.extend_from_slice(&self.minimum_external_stake.to_be_bytes());
        buf.extend_from_slice(&self.dispute_resolution_window.to_be_bytes());
        buf.push(self.resolution_threshold_slashable);
        buf.push(self.resolution_threshold_external);
        buf.extend_from_slice(self.staking_token.as_slice());
        keccak(&buf)
    }

    /// True when this bridge accepts disputes at all.
    pub fn disputes_enabled(&self) -> bool {
        self.minimum_external_stake > 0 && self.dispute_resolution_window > 0
    }
}

/// Signed binding of a request CID to a response CID for one deployment,
/// produced off-chain by the gateway.
///
/// The JSON form matches the gateway's `graph-attestation` response header;
/// the byte form is the fixed 161-byte concatenation used on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    #[serde(rename = "requestCID")]
    pub request_cid: RequestCid,

    #[serde(rename = "responseCID")]
    pub response_cid: ResponseCid,

    #[serde(rename = "subgraphDeploymentID")]
    pub subgraph_deployment_id: B256,

    pub r: B256,
    pub s: B256,
    pub v: u8,
}

impl Attestation {
    /// Parse the fixed 161-byte wire encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ATTESTATION_BYTE_LEN {
            return Err(BridgeError::Validation(format!(
                "attestation must be {} bytes, got {}",
                ATTESTATION_BYTE_LEN,
                bytes.len()
            )));
        }
        Ok(Self {
            request_cid: B256::from_slice(&bytes[0..32]),
            response_cid: B256::from_slice(&bytes[32..64]),
            subgraph_deployment_id: B256::from_slice(&bytes[64..96]),
            r: B256::from_slice(&bytes[96..128]),
            s: B256::from_slice(&bytes[128..160]),
            v: bytes[160],
        })
    }

    /// Fixed 161-byte wire encoding.
    pub fn to_bytes(&self) -> [u8; ATTESTATION_BYTE_LEN] {
        let mut bytes = [0u8; ATTESTATION_BYTE_LEN];
        bytes[0..32].copy_from_slice(self.request_cid.as_slice());
        bytes[32..64].copy_from_slice(self.response_cid.as_slice());
        bytes[64..96].copy_from_slice(self.subgraph_deployment_id.as_slice());
        bytes[96..128].copy_from_slice(self.r.as_slice());
        bytes[128..160].copy_from_slice(self.s.as_slice());
        bytes[160] = self.v;
        bytes
    }
}
