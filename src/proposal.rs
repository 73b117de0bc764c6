//! Proposal lifecycle manager
//!
//! Drives a (query, response) pair from pinning through optional dispute to
//! execution. Every transition re-validates its preconditions at entry and
//! either completes fully or aborts with no mutation; the host ledger's
//! transaction ordering serializes concurrent calls. All windows are counted
//! in ledger blocks.

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use tracing::{debug, info};

use crate::attestation::verify_attestation;
use crate::error::{BridgeError, Result};
use crate::host::{BlockOracle, StakingLedger, BLOCK_HASH_WINDOW};
use crate::query::split_query;
use crate::registry::BridgeRegistry;
use crate::stream::{extract_response_data, DataStreamStore};
use crate::types::{
    request_cid, response_cid, Attestation, BridgeConfig, BridgeId, RequestCid, ResponseCid,
};

/// Lifecycle of a proposal. `Executed` is terminal; no state is revisited.
/// The freeze after pinning is implicit: a `Pinned` proposal only becomes
/// submittable once the freeze period has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalState {
    Pinned,
    Submitted,
    Disputed,
    Resolved,
    Executed,
}

/// Which side a dispute settled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeOutcome {
    ProposerWins,
    DisputerWins,
}

/// An open or settled dispute against a submitted proposal.
#[derive(Debug, Clone)]
pub struct Dispute {
    pub disputer: Address,
    /// External stake posted by the disputer, in the bridge's staking token.
    pub stake: u128,
    pub counter_response: String,
    pub opened_block: u64,
    pub outcome: Option<DisputeOutcome>,
}

/// A staged (query, response) pair keyed by (bridge, request CID).
#[derive(Debug, Clone)]
pub struct Proposal {
    pub bridge_id: BridgeId,
    pub request_cid: RequestCid,
    pub response_cid: ResponseCid,
    pub query: String,
    pub response: String,
    /// Block whose hash is spliced into the query.
    pub pinned_block: u64,
    pub submitted_block: Option<u64>,
    pub state: ProposalState,
    /// Attestation signers backing this proposal and their posted stake.
    pub attestors: Vec<(Address, u128)>,
    pub dispute: Option<Dispute>,
}

impl Proposal {
    /// Total slashable stake backing the proposer side.
    pub fn slashable_stake(&self) -> u128 {
        self.attestors.iter().map(|(_, stake)| stake).sum()
    }

    fn is_terminal(&self) -> bool {
        self.state == ProposalState::Executed
    }
}

/// Per-side stake totals used for dispute resolution.
#[derive(Debug, Clone, Copy, Default)]
struct SideStake {
    slashable: u128,
    external: u128,
}

/// The bridge core: registry, proposal lifecycle, and data streams, wired to
/// the host's block oracle and staking ledger.
pub struct SubgraphBridge<O: BlockOracle, L: StakingLedger> {
    registry: BridgeRegistry,
    proposals: HashMap<(BridgeId, RequestCid), Proposal>,
    streams: DataStreamStore,
    oracle: O,
    ledger: L,
}

impl<O: BlockOracle, L: StakingLedger> SubgraphBridge<O, L> {
    pub fn new(oracle: O, ledger: L) -> Self {
        Self {
            registry: BridgeRegistry::new(),
            proposals: HashMap::new(),
            streams: DataStreamStore::new(),
            oracle,
            ledger,
        }
    }

    /// Register a new bridge configuration.
    pub fn create_bridge(&mut self, config: BridgeConfig) -> Result<BridgeId> {
        self.registry.create_bridge(config)
    }

    /// Immutable configuration for `bridge_id`.
    pub fn bridge(&self, bridge_id: BridgeId) -> Result<&BridgeConfig> {
        self.registry.get_bridge(bridge_id)
    }

    pub fn proposal(&self, bridge_id: BridgeId, request_cid: RequestCid) -> Option<&Proposal> {
        self.proposals.get(&(bridge_id, request_cid))
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Pin a query/response pair to a recent block, opening a new proposal.
    ///
    /// The query must reconstruct byte-exactly from the bridge template and
    /// the hash of `block_number`, and the attestation must bind it to the
    /// response under a sufficiently staked signer.
    pub fn pin_proposal(
        &mut self,
        bridge_id: BridgeId,
        block_number: u64,
        query: &str,
        response: &str,
        attestation_bytes: &[u8],
    ) -> Result<RequestCid> {
        let config = self.registry.get_bridge(bridge_id)?.clone();
        let current = self.oracle.block_number();

        let age = current.checked_sub(block_number).ok_or_else(|| {
            BridgeError::Validation(format!(
                "pinned block {} is ahead of current block {}",
                block_number, current
            ))
        })?;
        if age > BLOCK_HASH_WINDOW {
            return Err(BridgeError::Validation(format!(
                "pinned block {} is {} blocks old, hash window is {}",
                block_number, age, BLOCK_HASH_WINDOW
            )));
        }
        let block_hash = self.oracle.block_hash(block_number).ok_or_else(|| {
            BridgeError::Validation(format!("hash of block {} is not retrievable", block_number))
        })?;

        let split = split_query(&config.query_template, &config.splice, query)?;
        let expected_hash = block_hash.to_string();
        if !split.block_hash.eq_ignore_ascii_case(&expected_hash) {
            return Err(BridgeError::Consistency(format!(
                "query embeds block hash {}, block {} has {}",
                split.block_hash, block_number, expected_hash
            )));
        }

        let cid = request_cid(query);
        let rescid = response_cid(response);
        let attestation = Attestation::from_bytes(attestation_bytes)?;
        let signer = verify_attestation(
            &attestation,
            cid,
            rescid,
            config.subgraph_deployment_id,
            config.minimum_slashable_stake,
            &self.ledger,
        )?;

        if let Some(existing) = self.proposals.get(&(bridge_id, cid)) {
            if !existing.is_terminal() {
                return Err(BridgeError::State(format!(
                    "a live proposal already exists for bridge {} request {}",
                    bridge_id, cid
                )));
            }
        }

        info!(
            "Pinned proposal: bridge={} request={} block={} signer={}",
            bridge_id, cid, block_number, signer
        );
        self.proposals.insert(
            (bridge_id, cid),
            Proposal {
                bridge_id,
                request_cid: cid,
                response_cid: rescid,
                query: query.to_string(),
                response: response.to_string(),
                pinned_block: block_number,
                submitted_block: None,
                state: ProposalState::Pinned,
                attestors: vec![(signer, config.minimum_slashable_stake)],
                dispute: None,
            },
        );
        Ok(cid)
    }

    /// Submit a pinned proposal once its freeze period has elapsed.
    ///
    /// Re-validates like pin; a fresh attestation from a new signer adds that
    /// signer's stake to the proposer side.
    pub fn submit_proposal(
        &mut self,
        bridge_id: BridgeId,
        query: &str,
        response: &str,
        attestation_bytes: &[u8],
    ) -> Result<()> {
        let config = self.registry.get_bridge(bridge_id)?.clone();
        let current = self.oracle.block_number();

        let cid = request_cid(query);
        let rescid = response_cid(response);
        let attestation = Attestation::from_bytes(attestation_bytes)?;
        let signer = verify_attestation(
            &attestation,
            cid,
            rescid,
            config.subgraph_deployment_id,
            config.minimum_slashable_stake,
            &self.ledger,
        )?;

        let proposal = self
            .proposals
            .get_mut(&(bridge_id, cid))
            .ok_or_else(|| no_proposal(bridge_id, cid))?;
        if proposal.state != ProposalState::Pinned {
            return Err(BridgeError::State(format!(
                "cannot submit a proposal in state {:?}",
                proposal.state
            )));
        }
        let frozen_for = current.saturating_sub(proposal.pinned_block);
        if frozen_for < config.proposal_freeze_period {
            return Err(BridgeError::State(format!(
                "freeze period not elapsed: {} of {} blocks",
                frozen_for, config.proposal_freeze_period
            )));
        }
        if rescid != proposal.response_cid {
            return Err(BridgeError::Consistency(
                "submitted response differs from the pinned response".to_string(),
            ));
        }

        proposal.state = ProposalState::Submitted;
        proposal.submitted_block = Some(current);
        if !proposal.attestors.iter().any(|(a, _)| *a == signer) {
            proposal
                .attestors
                .push((signer, config.minimum_slashable_stake));
        }
        info!(
            "Submitted proposal: bridge={} request={} signer={}",
            bridge_id, cid, signer
        );
        Ok(())
    }

    /// Open a dispute against a submitted proposal by posting conflicting
    /// external stake within the dispute window.
    pub fn dispute_proposal(
        &mut self,
        bridge_id: BridgeId,
        request_cid: RequestCid,
        disputer: Address,
        counter_response: &str,
        stake: u128,
    ) -> Result<()> {
        let config = self.registry.get_bridge(bridge_id)?.clone();
        if !config.disputes_enabled() {
            return Err(BridgeError::State(format!(
                "disputes are not enabled for bridge {}",
                bridge_id
            )));
        }
        let current = self.oracle.block_number();

        if stake < config.minimum_external_stake {
            return Err(BridgeError::Validation(format!(
                "dispute stake {} below bridge minimum {}",
                stake, config.minimum_external_stake
            )));
        }
        let available = self.ledger.external_stake(disputer, config.staking_token);
        if available < stake {
            return Err(BridgeError::Authorization(format!(
                "disputer {} holds {} external stake, {} required",
                disputer, available, stake
            )));
        }

        let counter_cid = response_cid(counter_response);
        let proposal = self
            .proposals
            .get_mut(&(bridge_id, request_cid))
            .ok_or_else(|| no_proposal(bridge_id, request_cid))?;
        if proposal.state != ProposalState::Submitted {
            return Err(BridgeError::State(format!(
                "cannot dispute a proposal in state {:?}",
                proposal.state
            )));
        }
        let Some(submitted) = proposal.submitted_block else {
            return Err(BridgeError::State(
                "submitted proposal has no submission block".to_string(),
            ));
        };
        if current.saturating_sub(submitted) > config.dispute_resolution_window {
            return Err(BridgeError::State(format!(
                "dispute window of {} blocks has closed",
                config.dispute_resolution_window
            )));
        }
        if counter_cid == proposal.response_cid {
            return Err(BridgeError::Validation(
                "counter response is identical to the proposed response".to_string(),
            ));
        }

        proposal.state = ProposalState::Disputed;
        proposal.dispute = Some(Dispute {
            disputer,
            stake,
            counter_response: counter_response.to_string(),
            opened_block: current,
            outcome: None,
        });
        info!(
            "Disputed proposal: bridge={} request={} disputer={} stake={}",
            bridge_id, request_cid, disputer, stake
        );
        Ok(())
    }

    /// Settle a dispute by comparing each side's stake against the bridge's
    /// resolution thresholds. The losing side is slashed through the staking
    /// collaborator and the winning side rewarded pro-rata.
    pub fn resolve_proposal(
        &mut self,
        bridge_id: BridgeId,
        request_cid: RequestCid,
    ) -> Result<DisputeOutcome> {
        let config = self.registry.get_bridge(bridge_id)?.clone();
        let current = self.oracle.block_number();

        let proposal = self
            .proposals
            .get(&(bridge_id, request_cid))
            .ok_or_else(|| no_proposal(bridge_id, request_cid))?;
        if proposal.state != ProposalState::Disputed {
            return Err(BridgeError::State(format!(
                "cannot resolve a proposal in state {:?}",
                proposal.state
            )));
        }
        let Some(dispute) = proposal.dispute.as_ref() else {
            return Err(BridgeError::State(
                "disputed proposal has no dispute record".to_string(),
            ));
        };

        let proposer_side = SideStake {
            slashable: proposal.slashable_stake(),
            external: 0,
        };
        let disputer_side = SideStake {
            slashable: 0,
            external: dispute.stake,
        };
        let Some(outcome) = decide_outcome(&proposer_side, &disputer_side, &config) else {
            let window_closed = proposal
                .submitted_block
                .map(|submitted| current.saturating_sub(submitted) > config.dispute_resolution_window)
                .unwrap_or(false);
            if window_closed {
                return Err(BridgeError::State(
                    "dispute unresolvable: no side meets the resolution thresholds".to_string(),
                ));
            }
            return Err(BridgeError::State(
                "resolution thresholds not met and dispute window still open".to_string(),
            ));
        };

        let (losers, winners): (Vec<(Address, u128)>, Vec<(Address, u128)>) = match outcome {
            DisputeOutcome::ProposerWins => (
                vec![(dispute.disputer, dispute.stake)],
                proposal.attestors.clone(),
            ),
            DisputeOutcome::DisputerWins => (
                proposal.attestors.clone(),
                vec![(dispute.disputer, dispute.stake)],
            ),
        };

        let mut slashed_total: u128 = 0;
        for (loser, amount) in &losers {
            self.ledger.slash(*loser, *amount)?;
            slashed_total += amount;
        }
        let winner_total: u128 = winners.iter().map(|(_, stake)| stake).sum();
        if winner_total > 0 {
            for (winner, stake) in &winners {
                let share = (U256::from(slashed_total) * U256::from(*stake)
                    / U256::from(winner_total))
                .to::<u128>();
                if share > 0 {
                    self.ledger.reward(*winner, share)?;
                }
            }
        }

        let proposal = self
            .proposals
            .get_mut(&(bridge_id, request_cid))
            .ok_or_else(|| no_proposal(bridge_id, request_cid))?;
        if outcome == DisputeOutcome::DisputerWins {
            // The counter response becomes canonical; execution extracts
            // from the winning payload.
            if let Some(dispute) = proposal.dispute.as_ref() {
                let counter = dispute.counter_response.clone();
                proposal.response_cid = response_cid(&counter);
                proposal.response = counter;
            }
        }
        if let Some(dispute) = proposal.dispute.as_mut() {
            dispute.outcome = Some(outcome);
        }
        proposal.state = ProposalState::Resolved;
        info!(
            "Resolved proposal: bridge={} request={} outcome={:?} slashed={}",
            bridge_id, request_cid, outcome, slashed_total
        );
        Ok(outcome)
    }

    /// Extract the result from a finalized proposal and write its data
    /// stream entry. Terminal: the proposal cannot be touched afterwards.
    pub fn execute_proposal(
        &mut self,
        bridge_id: BridgeId,
        request_cid_key: RequestCid,
        query: &str,
        response: &str,
    ) -> Result<()> {
        let config = self.registry.get_bridge(bridge_id)?.clone();
        let current = self.oracle.block_number();

        let proposal = self
            .proposals
            .get_mut(&(bridge_id, request_cid_key))
            .ok_or_else(|| no_proposal(bridge_id, request_cid_key))?;
        match proposal.state {
            ProposalState::Submitted => {
                if config.dispute_resolution_window > 0 {
                    let Some(submitted) = proposal.submitted_block else {
                        return Err(BridgeError::State(
                            "submitted proposal has no submission block".to_string(),
                        ));
                    };
                    if current.saturating_sub(submitted) <= config.dispute_resolution_window {
                        return Err(BridgeError::State(format!(
                            "dispute window of {} blocks still open",
                            config.dispute_resolution_window
                        )));
                    }
                }
            }
            ProposalState::Resolved => {}
            other => {
                return Err(BridgeError::State(format!(
                    "cannot execute a proposal in state {:?}",
                    other
                )));
            }
        }

        if request_cid(query) != request_cid_key {
            return Err(BridgeError::Consistency(
                "query does not hash to the proposal's request CID".to_string(),
            ));
        }
        if response_cid(response) != proposal.response_cid {
            return Err(BridgeError::Consistency(
                "response does not hash to the attested response CID".to_string(),
            ));
        }

        let value =
            extract_response_data(response, config.response_data_offset, config.response_data_type)?;
        debug!(
            "Executing proposal: bridge={} request={} extracted {} bytes",
            bridge_id,
            request_cid_key,
            value.len()
        );
        self.streams.write(bridge_id, request_cid_key, value)?;
        proposal.state = ProposalState::Executed;
        info!(
            "Executed proposal: bridge={} request={}",
            bridge_id, request_cid_key
        );
        Ok(())
    }

    /// Read the finalized value for `(bridge_id, request_cid)`, if executed.
    pub fn read_data_stream(
        &self,
        bridge_id: BridgeId,
        request_cid: RequestCid,
    ) -> Option<&[u8]> {
        self.streams.read(bridge_id, request_cid)
    }
}

fn no_proposal(bridge_id: BridgeId, request_cid: RequestCid) -> BridgeError {
    BridgeError::State(format!(
        "no proposal for bridge {} request {}",
        bridge_id, request_cid
    ))
}

/// Pick the winning side, proposer first. A side wins by meeting the
/// threshold in every stake class the bridge configures; `None` means
/// neither side qualifies yet.
fn decide_outcome(
    proposer: &SideStake,
    disputer: &SideStake,
    config: &BridgeConfig,
) -> Option<DisputeOutcome> {
    let totals = SideStake {
        slashable: proposer.slashable + disputer.slashable,
        external: proposer.external + disputer.external,
    };
    if side_meets(proposer, &totals, config) {
        Some(DisputeOutcome::ProposerWins)
    } else if side_meets(disputer, &totals, config) {
        Some(DisputeOutcome::DisputerWins)
    } else {
        None
    }
}

fn side_meets(side: &SideStake, totals: &SideStake, config: &BridgeConfig) -> bool {
    class_meets(
        side.slashable,
        totals.slashable,
        config.resolution_threshold_slashable,
    ) && class_meets(
        side.external,
        totals.external,
        config.resolution_threshold_external,
    )
}

fn class_meets(side: u128, total: u128, threshold_percent: u8) -> bool {
    if threshold_percent == 0 || total == 0 {
        return true;
    }
    U256::from(side) * U256::from(100u8) >= U256::from(total) * U256::from(threshold_percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::sign_test_attestation;
    use crate::query::build_query;
    use crate::types::{keccak, ResponseDataType, SpliceMode};
    use std::cell::Cell;

    const TEMPLATE: &str = r#"{t(block:{hash:""}){v}}"#;
    const HASH_OFFSET: u16 = 16;
    const RESPONSE: &str = r#"{"data":{"t":{"v":"42"}}}"#;
    const COUNTER_RESPONSE: &str = r#"{"data":{"t":{"v":"99"}}}"#;
    const VALUE_OFFSET: u16 = 19;

    struct TestOracle {
        number: Cell<u64>,
        genesis_salt: u8,
    }

    impl TestOracle {
        fn new(number: u64) -> Self {
            Self {
                number: Cell::new(number),
                genesis_salt: 7,
            }
        }

        fn advance_to(&self, number: u64) {
            self.number.set(number);
        }
    }

    impl BlockOracle for TestOracle {
        fn block_number(&self) -> u64 {
            self.number.get()
        }

        fn block_hash(&self, number: u64) -> Option<alloy_primitives::B256> {
            if number >= self.number.get() {
                return None;
            }
            let mut seed = number.to_be_bytes().to_vec();
            seed.push(self.genesis_salt);
            Some(keccak(&seed))
        }
    }

    #[derive(Default)]
    struct TestLedger {
        slashable: HashMap<Address, u128>,
        external: HashMap<Address, u128>,
        slashed: Vec<(Address, u128)>,
        rewarded: Vec<(Address, u128)>,
    }

    impl StakingLedger for TestLedger {
        fn slashable_stake(&self, signer: Address) -> u128 {
            self.slashable.get(&signer).copied().unwrap_or(0)
        }

        fn external_stake(&self, staker: Address, _token: Address) -> u128 {
            self.external.get(&staker).copied().unwrap_or(0)
        }

        fn slash(&mut self, identity: Address, amount: u128) -> Result<()> {
            self.slashed.push((identity, amount));
            Ok(())
        }

        fn reward(&mut self, identity: Address, amount: u128) -> Result<()> {
            self.rewarded.push((identity, amount));
            Ok(())
        }
    }

    const SIGNER_SEED: &[u8] = b"indexer-key";

    fn signer_address(seed: &[u8]) -> Address {
        sign_test_attestation(seed, keccak(b"x"), keccak(b"y"), keccak(b"z")).1
    }

    fn test_config(freeze: u64, window: u64, min_external: u128) -> BridgeConfig {
        BridgeConfig {
            query_template: TEMPLATE.to_string(),
            subgraph_deployment_id: keccak(b"deployment"),
            splice: SpliceMode::FixedSplice {
                offset: HASH_OFFSET,
            },
            response_data_offset: VALUE_OFFSET,
            response_data_type: ResponseDataType::String,
            proposal_freeze_period: freeze,
            minimum_slashable_stake: 10,
            minimum_external_stake: min_external,
            dispute_resolution_window: window,
            resolution_threshold_slashable: 50,
            resolution_threshold_external: 0,
            staking_token: Address::ZERO,
        }
    }

    fn setup(config: BridgeConfig) -> (SubgraphBridge<TestOracle, TestLedger>, BridgeId) {
        let oracle = TestOracle::new(100);
        let mut ledger = TestLedger::default();
        ledger.slashable.insert(signer_address(SIGNER_SEED), 100);
        ledger.external.insert(disputer(), 1_000);

        let mut bridge = SubgraphBridge::new(oracle, ledger);
        let bridge_id = bridge.create_bridge(config).unwrap();
        (bridge, bridge_id)
    }

    fn disputer() -> Address {
        Address::repeat_byte(0xd1)
    }

    /// Build a valid query for `block_number` plus a matching attestation.
    fn attested_query(
        bridge: &SubgraphBridge<TestOracle, TestLedger>,
        bridge_id: BridgeId,
        block_number: u64,
        response: &str,
    ) -> (String, Vec<u8>) {
        let config = bridge.bridge(bridge_id).unwrap();
        let hash = bridge.oracle().block_hash(block_number).unwrap().to_string();
        let query = build_query(&config.query_template, &config.splice, &hash, ["", ""]).unwrap();
        let (attestation, _) = sign_test_attestation(
            SIGNER_SEED,
            request_cid(&query),
            response_cid(response),
            config.subgraph_deployment_id,
        );
        (query, attestation.to_bytes().to_vec())
    }

    fn pin_and_submit(
        bridge: &mut SubgraphBridge<TestOracle, TestLedger>,
        bridge_id: BridgeId,
    ) -> (RequestCid, String) {
        let (query, attestation) = attested_query(bridge, bridge_id, 95, RESPONSE);
        let cid = bridge
            .pin_proposal(bridge_id, 95, &query, RESPONSE, &attestation)
            .unwrap();
        bridge
            .submit_proposal(bridge_id, &query, RESPONSE, &attestation)
            .unwrap();
        (cid, query)
    }

    #[test]
    fn full_lifecycle_writes_the_data_stream() {
        let (mut bridge, bridge_id) = setup(test_config(0, 0, 0));
        let (cid, query) = pin_and_submit(&mut bridge, bridge_id);

        bridge
            .execute_proposal(bridge_id, cid, &query, RESPONSE)
            .unwrap();

        assert_eq!(bridge.read_data_stream(bridge_id, cid), Some(&b"42"[..]));
        assert_eq!(
            bridge.proposal(bridge_id, cid).unwrap().state,
            ProposalState::Executed
        );
    }

    #[test]
    fn pin_records_request_cid_round_trip() {
        let (mut bridge, bridge_id) = setup(test_config(0, 0, 0));
        let (query, attestation) = attested_query(&bridge, bridge_id, 95, RESPONSE);
        let cid = bridge
            .pin_proposal(bridge_id, 95, &query, RESPONSE, &attestation)
            .unwrap();

        let proposal = bridge.proposal(bridge_id, cid).unwrap();
        // Recomputing the CID from the stored query reproduces the key.
        assert_eq!(request_cid(&proposal.query), proposal.request_cid);
        assert_eq!(proposal.state, ProposalState::Pinned);
    }

    #[test]
    fn pin_rejects_stale_block() {
        let (mut bridge, bridge_id) = setup(test_config(0, 0, 0));
        bridge.oracle().advance_to(500);
        let (query, attestation) = attested_query(&bridge, bridge_id, 95, RESPONSE);
        let err = bridge
            .pin_proposal(bridge_id, 95, &query, RESPONSE, &attestation)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
    }

    #[test]
    fn pin_rejects_future_block() {
        let (mut bridge, bridge_id) = setup(test_config(0, 0, 0));
        let (query, attestation) = attested_query(&bridge, bridge_id, 95, RESPONSE);
        let err = bridge
            .pin_proposal(bridge_id, 101, &query, RESPONSE, &attestation)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
    }

    #[test]
    fn pin_rejects_wrong_block_hash() {
        let (mut bridge, bridge_id) = setup(test_config(0, 0, 0));
        // Query built for block 94, pinned as block 95.
        let (query, attestation) = attested_query(&bridge, bridge_id, 94, RESPONSE);
        let err = bridge
            .pin_proposal(bridge_id, 95, &query, RESPONSE, &attestation)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Consistency(_)));
    }

    #[test]
    fn pin_rejects_duplicate_live_proposal() {
        let (mut bridge, bridge_id) = setup(test_config(0, 0, 0));
        let (query, attestation) = attested_query(&bridge, bridge_id, 95, RESPONSE);
        bridge
            .pin_proposal(bridge_id, 95, &query, RESPONSE, &attestation)
            .unwrap();
        let err = bridge
            .pin_proposal(bridge_id, 95, &query, RESPONSE, &attestation)
            .unwrap_err();
        assert!(matches!(err, BridgeError::State(_)));
    }

    #[test]
    fn freeze_gate_blocks_early_submission() {
        let (mut bridge, bridge_id) = setup(test_config(10, 0, 0));
        let (query, attestation) = attested_query(&bridge, bridge_id, 95, RESPONSE);
        bridge
            .pin_proposal(bridge_id, 95, &query, RESPONSE, &attestation)
            .unwrap();

        // current=100, pinned=95: 5 of 10 freeze blocks.
        let err = bridge
            .submit_proposal(bridge_id, &query, RESPONSE, &attestation)
            .unwrap_err();
        assert!(matches!(err, BridgeError::State(_)));

        // Exactly at the boundary the gate opens.
        bridge.oracle().advance_to(105);
        bridge
            .submit_proposal(bridge_id, &query, RESPONSE, &attestation)
            .unwrap();
    }

    #[test]
    fn submit_rejects_swapped_response() {
        let (mut bridge, bridge_id) = setup(test_config(0, 0, 0));
        let (query, attestation) = attested_query(&bridge, bridge_id, 95, RESPONSE);
        bridge
            .pin_proposal(bridge_id, 95, &query, RESPONSE, &attestation)
            .unwrap();

        let config = bridge.bridge(bridge_id).unwrap();
        let (other_attestation, _) = sign_test_attestation(
            SIGNER_SEED,
            request_cid(&query),
            response_cid(COUNTER_RESPONSE),
            config.subgraph_deployment_id,
        );
        let err = bridge
            .submit_proposal(
                bridge_id,
                &query,
                COUNTER_RESPONSE,
                &other_attestation.to_bytes(),
            )
            .unwrap_err();
        assert!(matches!(err, BridgeError::Consistency(_)));
    }

    #[test]
    fn execute_detects_tampered_response() {
        let (mut bridge, bridge_id) = setup(test_config(0, 0, 0));
        let (cid, query) = pin_and_submit(&mut bridge, bridge_id);

        let err = bridge
            .execute_proposal(bridge_id, cid, &query, COUNTER_RESPONSE)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Consistency(_)));
        assert_eq!(bridge.read_data_stream(bridge_id, cid), None);
    }

    #[test]
    fn execute_is_write_once() {
        let (mut bridge, bridge_id) = setup(test_config(0, 0, 0));
        let (cid, query) = pin_and_submit(&mut bridge, bridge_id);
        bridge
            .execute_proposal(bridge_id, cid, &query, RESPONSE)
            .unwrap();

        let err = bridge
            .execute_proposal(bridge_id, cid, &query, RESPONSE)
            .unwrap_err();
        assert!(matches!(err, BridgeError::State(_)));
        assert_eq!(bridge.read_data_stream(bridge_id, cid), Some(&b"42"[..]));
    }

    #[test]
    fn execute_waits_for_the_dispute_window() {
        let (mut bridge, bridge_id) = setup(test_config(0, 10, 5));
        let (cid, query) = pin_and_submit(&mut bridge, bridge_id);

        let err = bridge
            .execute_proposal(bridge_id, cid, &query, RESPONSE)
            .unwrap_err();
        assert!(matches!(err, BridgeError::State(_)));

        bridge.oracle().advance_to(111);
        bridge
            .execute_proposal(bridge_id, cid, &query, RESPONSE)
            .unwrap();
    }

    #[test]
    fn dispute_requires_enabled_bridge() {
        let (mut bridge, bridge_id) = setup(test_config(0, 0, 0));
        let (cid, _) = pin_and_submit(&mut bridge, bridge_id);

        let err = bridge
            .dispute_proposal(bridge_id, cid, disputer(), COUNTER_RESPONSE, 5)
            .unwrap_err();
        assert!(matches!(err, BridgeError::State(_)));
    }

    #[test]
    fn dispute_window_closes() {
        let (mut bridge, bridge_id) = setup(test_config(0, 10, 5));
        let (cid, _) = pin_and_submit(&mut bridge, bridge_id);

        bridge.oracle().advance_to(111);
        let err = bridge
            .dispute_proposal(bridge_id, cid, disputer(), COUNTER_RESPONSE, 5)
            .unwrap_err();
        assert!(matches!(err, BridgeError::State(_)));
    }

    #[test]
    fn dispute_stake_below_minimum_is_rejected() {
        let (mut bridge, bridge_id) = setup(test_config(0, 10, 5));
        let (cid, _) = pin_and_submit(&mut bridge, bridge_id);

        let err = bridge
            .dispute_proposal(bridge_id, cid, disputer(), COUNTER_RESPONSE, 4)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
    }

    #[test]
    fn underfunded_disputer_is_rejected() {
        let (mut bridge, bridge_id) = setup(test_config(0, 10, 5));
        let (cid, _) = pin_and_submit(&mut bridge, bridge_id);

        let poor = Address::repeat_byte(0x99);
        let err = bridge
            .dispute_proposal(bridge_id, cid, poor, COUNTER_RESPONSE, 5)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Authorization(_)));
    }

    #[test]
    fn proposer_wins_dispute_and_disputer_is_slashed() {
        // Slashable threshold 50%: the proposer side holds all slashable
        // stake, so the disputer's external stake never flips the outcome.
        let (mut bridge, bridge_id) = setup(test_config(0, 10, 5));
        let (cid, query) = pin_and_submit(&mut bridge, bridge_id);

        bridge
            .dispute_proposal(bridge_id, cid, disputer(), COUNTER_RESPONSE, 50)
            .unwrap();
        let outcome = bridge.resolve_proposal(bridge_id, cid).unwrap();
        assert_eq!(outcome, DisputeOutcome::ProposerWins);

        assert_eq!(bridge.ledger().slashed, vec![(disputer(), 50)]);
        assert_eq!(
            bridge.ledger().rewarded,
            vec![(signer_address(SIGNER_SEED), 50)]
        );

        // Resolved proposals execute with the original response.
        bridge
            .execute_proposal(bridge_id, cid, &query, RESPONSE)
            .unwrap();
        assert_eq!(bridge.read_data_stream(bridge_id, cid), Some(&b"42"[..]));
    }

    #[test]
    fn disputer_win_replaces_the_canonical_response() {
        let mut config = test_config(0, 10, 5);
        // Decide purely on external stake: the proposer side posts none.
        config.resolution_threshold_slashable = 0;
        config.resolution_threshold_external = 60;
        let (mut bridge, bridge_id) = setup(config);
        let (cid, query) = pin_and_submit(&mut bridge, bridge_id);

        bridge
            .dispute_proposal(bridge_id, cid, disputer(), COUNTER_RESPONSE, 50)
            .unwrap();
        let outcome = bridge.resolve_proposal(bridge_id, cid).unwrap();
        assert_eq!(outcome, DisputeOutcome::DisputerWins);

        // Attestor stake slashed, disputer rewarded.
        assert_eq!(
            bridge.ledger().slashed,
            vec![(signer_address(SIGNER_SEED), 10)]
        );
        assert_eq!(bridge.ledger().rewarded, vec![(disputer(), 10)]);

        let err = bridge
            .execute_proposal(bridge_id, cid, &query, RESPONSE)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Consistency(_)));

        bridge
            .execute_proposal(bridge_id, cid, &query, COUNTER_RESPONSE)
            .unwrap();
        assert_eq!(bridge.read_data_stream(bridge_id, cid), Some(&b"99"[..]));
    }

    #[test]
    fn unresolvable_dispute_surfaces_after_the_window() {
        let mut config = test_config(0, 10, 5);
        // Nobody can meet 60% of both classes with single-sided stakes.
        config.resolution_threshold_slashable = 60;
        config.resolution_threshold_external = 60;
        let (mut bridge, bridge_id) = setup(config);
        let (cid, _) = pin_and_submit(&mut bridge, bridge_id);

        bridge
            .dispute_proposal(bridge_id, cid, disputer(), COUNTER_RESPONSE, 50)
            .unwrap();

        let err = bridge.resolve_proposal(bridge_id, cid).unwrap_err();
        assert!(matches!(err, BridgeError::State(_)));

        bridge.oracle().advance_to(120);
        let err = bridge.resolve_proposal(bridge_id, cid).unwrap_err();
        assert!(matches!(err, BridgeError::State(_)));
        // Nothing was slashed either way.
        assert!(bridge.ledger().slashed.is_empty());
    }

    #[test]
    fn minority_disputer_never_wins_the_slashable_class() {
        let config = test_config(0, 10, 5);
        let proposer = SideStake {
            slashable: 51,
            external: 0,
        };
        let disputer_side = SideStake {
            slashable: 49,
            external: 0,
        };
        assert_eq!(
            decide_outcome(&proposer, &disputer_side, &config),
            Some(DisputeOutcome::ProposerWins)
        );

        // Even at exactly half, the proposer side is evaluated first.
        let even = SideStake {
            slashable: 50,
            external: 0,
        };
        assert_eq!(
            decide_outcome(&even, &even, &config),
            Some(DisputeOutcome::ProposerWins)
        );

        // A strict majority flips it.
        let minority = SideStake {
            slashable: 49,
            external: 0,
        };
        let majority = SideStake {
            slashable: 51,
            external: 0,
        };
        assert_eq!(
            decide_outcome(&minority, &majority, &config),
            Some(DisputeOutcome::DisputerWins)
        );
    }
}
