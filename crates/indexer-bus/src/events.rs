//! # Chain Events
//!
//! Defines all event types that flow through the indexer bus: chain data
//! events produced by the fetch pipelines (blocks, transactions, logs) and
//! consensus observation events produced by the validator-set watchers.
//!
//! Every payload is immutable after construction; the two exceptions are
//! fork resolution ([`ConsensusForkEvent::resolve`]) and error recovery
//! ([`ConsensusErrorEvent::set_recovery_time`]), which record state learned
//! after the event was first observed.

use chrono::{DateTime, Utc};
use indexer_types::decoded::DecodedFields;
use indexer_types::entities::{Block, BlockRef, Log, Receipt};
use indexer_types::primitives::{Address, Hash, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The type tag of an event. Doubles as the per-type channel suffix on the
/// remote backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A block was indexed.
    Block,
    /// A transaction was indexed.
    Transaction,
    /// A raw receipt log was indexed.
    Log,
    /// A chain configuration parameter changed.
    ChainConfig,
    /// The validator set changed.
    ValidatorSet,
    /// A system contract emitted a decoded event.
    SystemContract,
    /// A consensus round was observed for a block.
    ConsensusBlock,
    /// Competing chains were detected.
    ConsensusFork,
    /// Validators joined or left the active set.
    ConsensusValidatorChange,
    /// A consensus-level fault was observed.
    ConsensusError,
}

impl EventType {
    /// All known event types, in wire order.
    pub const ALL: [EventType; 10] = [
        EventType::Block,
        EventType::Transaction,
        EventType::Log,
        EventType::ChainConfig,
        EventType::ValidatorSet,
        EventType::SystemContract,
        EventType::ConsensusBlock,
        EventType::ConsensusFork,
        EventType::ConsensusValidatorChange,
        EventType::ConsensusError,
    ];

    /// The wire name of this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Transaction => "transaction",
            Self::Log => "log",
            Self::ChainConfig => "chain_config",
            Self::ValidatorSet => "validator_set",
            Self::SystemContract => "system_contract",
            Self::ConsensusBlock => "consensus_block",
            Self::ConsensusFork => "consensus_fork",
            Self::ConsensusValidatorChange => "consensus_validator_change",
            Self::ConsensusError => "consensus_error",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(Self::Block),
            "transaction" => Ok(Self::Transaction),
            "log" => Ok(Self::Log),
            "chain_config" => Ok(Self::ChainConfig),
            "validator_set" => Ok(Self::ValidatorSet),
            "system_contract" => Ok(Self::SystemContract),
            "consensus_block" => Ok(Self::ConsensusBlock),
            "consensus_fork" => Ok(Self::ConsensusFork),
            "consensus_validator_change" => Ok(Self::ConsensusValidatorChange),
            "consensus_error" => Ok(Self::ConsensusError),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

// =============================================================================
// CHAIN DATA EVENTS
// =============================================================================

/// A block was indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEvent {
    /// Block height.
    pub number: u64,
    /// Block hash.
    pub hash: Hash,
    /// Number of transactions in the block.
    pub tx_count: u32,
    /// Full block, when the publisher had it at hand. Not serialized;
    /// cross-node subscribers refetch by hash.
    #[serde(skip)]
    pub block: Option<Arc<Block>>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl BlockEvent {
    /// Create a block event.
    #[must_use]
    pub fn new(number: u64, hash: Hash, tx_count: u32) -> Self {
        Self {
            number,
            hash,
            tx_count,
            block: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the full block reference.
    #[must_use]
    pub fn with_block(mut self, block: Arc<Block>) -> Self {
        self.block = Some(block);
        self
    }
}

/// A transaction was indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEvent {
    /// Transaction hash.
    pub hash: Hash,
    /// Number of the containing block.
    pub block_number: u64,
    /// Hash of the containing block.
    pub block_hash: Hash,
    /// Index within the block.
    pub index: u32,
    /// Sender address.
    pub from: Address,
    /// Recipient address. `None` means contract creation.
    pub to: Option<Address>,
    /// Transferred value as a decimal string.
    pub value: String,
    /// Full receipt, when the publisher had it at hand. Not serialized.
    #[serde(skip)]
    pub receipt: Option<Arc<Receipt>>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl TransactionEvent {
    /// Create a transaction event.
    #[must_use]
    pub fn new(
        hash: Hash,
        block_number: u64,
        block_hash: Hash,
        index: u32,
        from: Address,
        to: Option<Address>,
        value: U256,
    ) -> Self {
        Self {
            hash,
            block_number,
            block_hash,
            index,
            from,
            to,
            value: value.to_string(),
            receipt: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the full receipt.
    #[must_use]
    pub fn with_receipt(mut self, receipt: Arc<Receipt>) -> Self {
        self.receipt = Some(receipt);
        self
    }

    /// The transferred value parsed back into an integer.
    #[must_use]
    pub fn value_u256(&self) -> Option<U256> {
        U256::from_dec_str(&self.value).ok()
    }

    /// Whether this transaction created a contract.
    #[must_use]
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

/// A raw receipt log was indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// The raw log record.
    pub log: Log,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    /// Create a log event.
    #[must_use]
    pub fn new(log: Log) -> Self {
        Self {
            log,
            timestamp: Utc::now(),
        }
    }
}

/// A chain configuration parameter changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfigEvent {
    /// Block at which the change took effect.
    pub block: BlockRef,
    /// Name of the changed parameter.
    pub parameter: String,
    /// Previous value, rendered as a string.
    pub old_value: String,
    /// New value, rendered as a string.
    pub new_value: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl ChainConfigEvent {
    /// Create a chain-config event.
    #[must_use]
    pub fn new(
        block: BlockRef,
        parameter: impl Into<String>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            block,
            parameter: parameter.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
            timestamp: Utc::now(),
        }
    }
}

/// How the validator set changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorChangeKind {
    /// A validator joined the set.
    Added,
    /// A validator left the set.
    Removed,
    /// A validator's attributes changed in place.
    Updated,
}

/// The validator set changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSetEvent {
    /// Block at which the change took effect.
    pub block: BlockRef,
    /// Kind of change.
    pub change: ValidatorChangeKind,
    /// The validator concerned.
    pub validator: Address,
    /// Opaque detail string supplied by the watcher.
    pub info: String,
    /// Size of the set after the change.
    pub new_set_size: u32,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl ValidatorSetEvent {
    /// Create a validator-set event.
    #[must_use]
    pub fn new(
        block: BlockRef,
        change: ValidatorChangeKind,
        validator: Address,
        info: impl Into<String>,
        new_set_size: u32,
    ) -> Self {
        Self {
            block,
            change,
            validator,
            info: info.into(),
            new_set_size,
            timestamp: Utc::now(),
        }
    }
}

/// Well-known system-contract event names, with a carrier for names the
/// indexer has no special handling for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SystemContractEventName {
    /// A validator was registered with the staking contract.
    ValidatorAdded,
    /// A validator was deregistered.
    ValidatorRemoved,
    /// Stake was deposited.
    StakeDeposited,
    /// Stake was withdrawn.
    StakeWithdrawn,
    /// A governance parameter changed.
    ParameterChanged,
    /// Contract ownership was transferred.
    OwnershipTransferred,
    /// Any other event name.
    Other(String),
}

impl SystemContractEventName {
    /// The event name string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ValidatorAdded => "ValidatorAdded",
            Self::ValidatorRemoved => "ValidatorRemoved",
            Self::StakeDeposited => "StakeDeposited",
            Self::StakeWithdrawn => "StakeWithdrawn",
            Self::ParameterChanged => "ParameterChanged",
            Self::OwnershipTransferred => "OwnershipTransferred",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for SystemContractEventName {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ValidatorAdded" => Self::ValidatorAdded,
            "ValidatorRemoved" => Self::ValidatorRemoved,
            "StakeDeposited" => Self::StakeDeposited,
            "StakeWithdrawn" => Self::StakeWithdrawn,
            "ParameterChanged" => Self::ParameterChanged,
            "OwnershipTransferred" => Self::OwnershipTransferred,
            _ => Self::Other(s),
        }
    }
}

impl From<SystemContractEventName> for String {
    fn from(name: SystemContractEventName) -> Self {
        name.as_str().to_string()
    }
}

impl fmt::Display for SystemContractEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A system contract emitted a decoded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemContractEvent {
    /// Address of the emitting contract.
    pub contract_address: Address,
    /// Decoded event name.
    pub event: SystemContractEventName,
    /// Block containing the log.
    pub block: BlockRef,
    /// Hash of the emitting transaction.
    pub tx_hash: Hash,
    /// Index of the log within the block.
    pub log_index: u32,
    /// Decoded fields by input name.
    pub fields: DecodedFields,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl SystemContractEvent {
    /// Create a system-contract event.
    #[must_use]
    pub fn new(
        contract_address: Address,
        event: SystemContractEventName,
        block: BlockRef,
        tx_hash: Hash,
        log_index: u32,
        fields: DecodedFields,
    ) -> Self {
        Self {
            contract_address,
            event,
            block,
            tx_hash,
            log_index,
            fields,
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// CONSENSUS OBSERVATION EVENTS
// =============================================================================

/// A consensus round was observed for a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusBlockEvent {
    /// The block the round produced.
    pub block: BlockRef,
    /// Round number that sealed the block.
    pub round: u64,
    /// Round number of the previous block.
    pub prev_round: u64,
    /// Derived at construction: the round advanced past the first attempt.
    pub round_changed: bool,
    /// Proposer of the block.
    pub proposer: Address,
    /// Size of the validator set for this round.
    pub validator_count: u32,
    /// Number of prepare votes observed.
    pub prepare_count: u32,
    /// Number of commit votes observed.
    pub commit_count: u32,
    /// Fraction of validators that participated.
    pub participation_rate: f64,
    /// Fraction of validators that missed the round.
    pub missed_rate: f64,
    /// Set when the block closes an epoch.
    pub epoch_boundary: bool,
    /// Epoch number, when the boundary flag is set.
    pub epoch: Option<u64>,
    /// The validator set for this round.
    pub validators: Vec<Address>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl ConsensusBlockEvent {
    /// Create a consensus-block event. Vote counts, rates, and epoch data
    /// start zeroed and are filled in by the watcher before publish.
    #[must_use]
    pub fn new(block: BlockRef, round: u64, prev_round: u64, proposer: Address) -> Self {
        Self {
            block,
            round,
            prev_round,
            round_changed: round > 0,
            proposer,
            validator_count: 0,
            prepare_count: 0,
            commit_count: 0,
            participation_rate: 0.0,
            missed_rate: 0.0,
            epoch_boundary: false,
            epoch: None,
            validators: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// One branch of a detected fork.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkBranch {
    /// Head hash of the branch.
    pub hash: Hash,
    /// Height of the branch head.
    pub height: u64,
    /// Cumulative weight of the branch.
    pub cumulative_weight: u64,
}

/// Competing chains were detected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusForkEvent {
    /// The competing branches.
    pub branches: Vec<ForkBranch>,
    /// Milliseconds between the fork occurring and its detection.
    pub detection_lag_ms: u64,
    /// Resolution state: 0 = unresolved, 1 or 2 = index of the winning
    /// branch. Set via [`resolve`](Self::resolve) once the fork settles.
    pub winning_chain: u8,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl ConsensusForkEvent {
    /// Create a fork event in the unresolved state.
    #[must_use]
    pub fn new(branches: Vec<ForkBranch>, detection_lag_ms: u64) -> Self {
        Self {
            branches,
            detection_lag_ms,
            winning_chain: 0,
            timestamp: Utc::now(),
        }
    }

    /// Record the winning chain. Values outside `{0, 1, 2}` are clamped to
    /// unresolved.
    pub fn resolve(&mut self, winning_chain: u8) {
        self.winning_chain = if winning_chain <= 2 { winning_chain } else { 0 };
    }
}

/// Validators joined or left the active set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusValidatorChangeEvent {
    /// Validators added to the set.
    pub added: Vec<Address>,
    /// Validators removed from the set.
    pub removed: Vec<Address>,
    /// Set size before the change.
    pub previous_count: u32,
    /// Set size after the change.
    pub new_count: u32,
    /// The full set after the change.
    pub new_set: Vec<Address>,
    /// JSON-encoded auxiliary detail from the watcher.
    pub aux_info: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl ConsensusValidatorChangeEvent {
    /// Create a validator-change event. `new_count` is derived from the
    /// supplied set.
    #[must_use]
    pub fn new(
        added: Vec<Address>,
        removed: Vec<Address>,
        previous_count: u32,
        new_set: Vec<Address>,
        aux_info: impl Into<String>,
    ) -> Self {
        let new_count = new_set.len() as u32;
        Self {
            added,
            removed,
            previous_count,
            new_count,
            new_set,
            aux_info: aux_info.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Severity of a consensus fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Operator attention required now.
    Critical,
    /// Degraded consensus, not yet stalled.
    High,
    /// Recoverable anomaly.
    Medium,
    /// Informational.
    Low,
}

/// A consensus-level fault was observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusErrorEvent {
    /// Fault classification from the watcher.
    pub error_type: String,
    /// Fault severity.
    pub severity: ErrorSeverity,
    /// Round in which the fault was observed.
    pub round: u64,
    /// Signers expected for the round.
    pub expected_signers: u32,
    /// Signers actually observed.
    pub actual_signers: u32,
    /// Validators that missed the round.
    pub missed_validators: Vec<Address>,
    /// Fraction of validators that participated.
    pub participation_rate: f64,
    /// Set when the fault impacted consensus progress.
    pub consensus_impacted: bool,
    /// When recovery completed. Set via
    /// [`set_recovery_time`](Self::set_recovery_time) after the fact.
    pub recovery_time: Option<DateTime<Utc>>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl ConsensusErrorEvent {
    /// Create a consensus-error event. Signer counts and rates start
    /// zeroed and are filled in by the watcher before publish.
    #[must_use]
    pub fn new(error_type: impl Into<String>, severity: ErrorSeverity, round: u64) -> Self {
        Self {
            error_type: error_type.into(),
            severity,
            round,
            expected_signers: 0,
            actual_signers: 0,
            missed_validators: Vec::new(),
            participation_rate: 0.0,
            consensus_impacted: false,
            recovery_time: None,
            timestamp: Utc::now(),
        }
    }

    /// Record when recovery completed.
    pub fn set_recovery_time(&mut self, at: DateTime<Utc>) {
        self.recovery_time = Some(at);
    }
}

// =============================================================================
// THE TAGGED EVENT
// =============================================================================

/// An event flowing through the bus.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// See [`BlockEvent`].
    Block(BlockEvent),
    /// See [`TransactionEvent`].
    Transaction(TransactionEvent),
    /// See [`LogEvent`].
    Log(LogEvent),
    /// See [`ChainConfigEvent`].
    ChainConfig(ChainConfigEvent),
    /// See [`ValidatorSetEvent`].
    ValidatorSet(ValidatorSetEvent),
    /// See [`SystemContractEvent`].
    SystemContract(SystemContractEvent),
    /// See [`ConsensusBlockEvent`].
    ConsensusBlock(ConsensusBlockEvent),
    /// See [`ConsensusForkEvent`].
    ConsensusFork(ConsensusForkEvent),
    /// See [`ConsensusValidatorChangeEvent`].
    ConsensusValidatorChange(ConsensusValidatorChangeEvent),
    /// See [`ConsensusErrorEvent`].
    ConsensusError(ConsensusErrorEvent),
}

impl ChainEvent {
    /// The type tag of this event.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Block(_) => EventType::Block,
            Self::Transaction(_) => EventType::Transaction,
            Self::Log(_) => EventType::Log,
            Self::ChainConfig(_) => EventType::ChainConfig,
            Self::ValidatorSet(_) => EventType::ValidatorSet,
            Self::SystemContract(_) => EventType::SystemContract,
            Self::ConsensusBlock(_) => EventType::ConsensusBlock,
            Self::ConsensusFork(_) => EventType::ConsensusFork,
            Self::ConsensusValidatorChange(_) => EventType::ConsensusValidatorChange,
            Self::ConsensusError(_) => EventType::ConsensusError,
        }
    }

    /// Creation time of this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Block(e) => e.timestamp,
            Self::Transaction(e) => e.timestamp,
            Self::Log(e) => e.timestamp,
            Self::ChainConfig(e) => e.timestamp,
            Self::ValidatorSet(e) => e.timestamp,
            Self::SystemContract(e) => e.timestamp,
            Self::ConsensusBlock(e) => e.timestamp,
            Self::ConsensusFork(e) => e.timestamp,
            Self::ConsensusValidatorChange(e) => e.timestamp,
            Self::ConsensusError(e) => e.timestamp,
        }
    }

    /// The block number this event is keyed to, where one exists.
    #[must_use]
    pub fn block_number(&self) -> Option<u64> {
        match self {
            Self::Block(e) => Some(e.number),
            Self::Transaction(e) => Some(e.block_number),
            Self::Log(e) => Some(e.log.block_number),
            Self::ChainConfig(e) => Some(e.block.number),
            Self::ValidatorSet(e) => Some(e.block.number),
            Self::SystemContract(e) => Some(e.block.number),
            Self::ConsensusBlock(e) => Some(e.block.number),
            Self::ConsensusFork(_) | Self::ConsensusValidatorChange(_) | Self::ConsensusError(_) => {
                None
            }
        }
    }

    /// The partitioned-log routing key for this event.
    ///
    /// Per-key write order is preserved by the log; the key is chosen so
    /// that records for the same chain object land on one partition.
    #[must_use]
    pub fn partition_key(&self) -> String {
        match self {
            Self::Block(e) => format!("block:{}", e.number),
            Self::Transaction(e) => format!("{:#x}", e.hash),
            Self::Log(e) => format!("log:{:#x}:{}", e.log.address, e.log.log_index),
            Self::SystemContract(e) => format!("syscontract:{:#x}", e.contract_address),
            other => other.event_type().as_str().to_string(),
        }
    }
}

impl From<BlockEvent> for ChainEvent {
    fn from(e: BlockEvent) -> Self {
        Self::Block(e)
    }
}

impl From<TransactionEvent> for ChainEvent {
    fn from(e: TransactionEvent) -> Self {
        Self::Transaction(e)
    }
}

impl From<LogEvent> for ChainEvent {
    fn from(e: LogEvent) -> Self {
        Self::Log(e)
    }
}

impl From<ChainConfigEvent> for ChainEvent {
    fn from(e: ChainConfigEvent) -> Self {
        Self::ChainConfig(e)
    }
}

impl From<ValidatorSetEvent> for ChainEvent {
    fn from(e: ValidatorSetEvent) -> Self {
        Self::ValidatorSet(e)
    }
}

impl From<SystemContractEvent> for ChainEvent {
    fn from(e: SystemContractEvent) -> Self {
        Self::SystemContract(e)
    }
}

impl From<ConsensusBlockEvent> for ChainEvent {
    fn from(e: ConsensusBlockEvent) -> Self {
        Self::ConsensusBlock(e)
    }
}

impl From<ConsensusForkEvent> for ChainEvent {
    fn from(e: ConsensusForkEvent) -> Self {
        Self::ConsensusFork(e)
    }
}

impl From<ConsensusValidatorChangeEvent> for ChainEvent {
    fn from(e: ConsensusValidatorChangeEvent) -> Self {
        Self::ConsensusValidatorChange(e)
    }
}

impl From<ConsensusErrorEvent> for ChainEvent {
    fn from(e: ConsensusErrorEvent) -> Self {
        Self::ConsensusError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names() {
        for ty in EventType::ALL {
            let parsed: EventType = ty.as_str().parse().unwrap();
            assert_eq!(parsed, ty);
        }
        assert!("not_a_type".parse::<EventType>().is_err());
    }

    #[test]
    fn test_block_event_dispatch() {
        let event: ChainEvent = BlockEvent::new(100, Hash::repeat_byte(1), 5).into();
        assert_eq!(event.event_type(), EventType::Block);
        assert_eq!(event.block_number(), Some(100));
        assert_eq!(event.partition_key(), "block:100");
    }

    #[test]
    fn test_transaction_event_value() {
        let tx = TransactionEvent::new(
            Hash::repeat_byte(2),
            100,
            Hash::repeat_byte(1),
            0,
            Address::repeat_byte(0xaa),
            None,
            U256::from(12_345u64),
        );
        assert_eq!(tx.value, "12345");
        assert_eq!(tx.value_u256(), Some(U256::from(12_345u64)));
        assert!(tx.is_contract_creation());
    }

    #[test]
    fn test_log_partition_key() {
        let mut log = Log::default();
        log.address = Address::repeat_byte(0x01);
        log.log_index = 3;
        let event: ChainEvent = LogEvent::new(log).into();
        let key = event.partition_key();
        assert!(key.starts_with("log:0x"));
        assert!(key.ends_with(":3"));
    }

    #[test]
    fn test_consensus_round_changed_derivation() {
        let first = ConsensusBlockEvent::new(BlockRef::default(), 0, 0, Address::zero());
        assert!(!first.round_changed);

        let retried = ConsensusBlockEvent::new(BlockRef::default(), 2, 0, Address::zero());
        assert!(retried.round_changed);
    }

    #[test]
    fn test_fork_resolution() {
        let mut fork = ConsensusForkEvent::new(
            vec![
                ForkBranch {
                    hash: Hash::repeat_byte(1),
                    height: 10,
                    cumulative_weight: 100,
                },
                ForkBranch {
                    hash: Hash::repeat_byte(2),
                    height: 10,
                    cumulative_weight: 90,
                },
            ],
            250,
        );
        assert_eq!(fork.winning_chain, 0);

        fork.resolve(1);
        assert_eq!(fork.winning_chain, 1);

        fork.resolve(7);
        assert_eq!(fork.winning_chain, 0);
    }

    #[test]
    fn test_consensus_fork_partition_key_falls_back_to_type() {
        let event: ChainEvent = ConsensusForkEvent::new(Vec::new(), 0).into();
        assert_eq!(event.partition_key(), "consensus_fork");
        assert_eq!(event.block_number(), None);
    }

    #[test]
    fn test_system_contract_event_name_carrier() {
        let known: SystemContractEventName = "ValidatorAdded".to_string().into();
        assert_eq!(known, SystemContractEventName::ValidatorAdded);

        let other: SystemContractEventName = "RewardPaid".to_string().into();
        assert_eq!(other.as_str(), "RewardPaid");

        let json = serde_json::to_string(&other).unwrap();
        assert_eq!(json, "\"RewardPaid\"");
    }

    #[test]
    fn test_recovery_time_mutation() {
        let mut err = ConsensusErrorEvent::new("missing_signatures", ErrorSeverity::High, 4);
        assert!(err.recovery_time.is_none());

        let at = Utc::now();
        err.set_recovery_time(at);
        assert_eq!(err.recovery_time, Some(at));
    }
}
