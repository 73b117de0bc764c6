//! Optimistic query bridge core
//!
//! Lets an on-chain system trust the result of an off-chain, parameterized
//! subgraph query: the exact query string is reconstructed from a registered
//! template and a recent block hash, a gateway attestation binds the request
//! to its response under a staked signer, and the pair runs through a
//! freeze/submit/dispute/execute lifecycle before the extracted result lands
//! in a write-once data stream.
//!
//! The host chain is abstracted behind [`host::BlockOracle`] and
//! [`host::StakingLedger`]; the host's transaction ordering serializes all
//! state transitions.

pub mod attestation;
pub mod config;
pub mod error;
pub mod gateway;
pub mod host;
pub mod proposal;
pub mod query;
pub mod registry;
pub mod stream;
pub mod types;

pub use error::{BridgeError, Result};
pub use proposal::{Dispute, DisputeOutcome, Proposal, ProposalState, SubgraphBridge};
pub use registry::BridgeRegistry;
pub use types::{
    request_cid, response_cid, Attestation, BridgeConfig, BridgeId, RequestCid, ResponseCid,
    ResponseDataType, SpliceMode, VariableSplice,
};
