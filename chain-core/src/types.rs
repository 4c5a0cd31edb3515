//! Core types for the chain

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fuel token symbol (gas is paid in fuel)
pub const FUEL_SYMBOL: &str = "FLUX";

/// Staking token symbol (subject to periodic inflation)
pub const STAKING_SYMBOL: &str = "HALC";

/// Unique-instance reward token symbol, minted at inflation time
pub const REWARD_SYMBOL: &str = "CROWN";

/// Decimals of the staking token
pub const STAKING_DECIMALS: u32 = 8;

/// Organization of stake-masters eligible for inflation rewards
pub const MASTERS_ORG: &str = "masters";

/// Secondary treasury organization
pub const RESERVE_ORG: &str = "reserve";

/// Validator set organization
pub const VALIDATORS_ORG: &str = "validators";

/// Convert a whole-token amount to base units of the staking token
pub const fn to_base_units(whole: u128) -> u128 {
    whole * 10u128.pow(STAKING_DECIMALS)
}

/// Address class
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum AddressKind {
    /// Sentinel address ("use the chain's own address" in gas targets)
    Null,
    /// User-controlled account
    User,
    /// System account (contracts, organizations, the chain itself)
    System,
}

/// Ledger address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    kind: AddressKind,
    id: String,
}

impl Address {
    /// The null sentinel address
    pub fn null() -> Self {
        Self {
            kind: AddressKind::Null,
            id: String::new(),
        }
    }

    /// Create a user address
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            kind: AddressKind::User,
            id: id.into(),
        }
    }

    /// Create a system address
    pub fn system(id: impl Into<String>) -> Self {
        Self {
            kind: AddressKind::System,
            id: id.into(),
        }
    }

    /// Address of the gas contract (the engine's own escrow account)
    pub fn gas_contract() -> Self {
        Self::system("gas")
    }

    /// Canonical validator-reward address
    pub fn block_contract() -> Self {
        Self::system("block")
    }

    /// Cross-chain swap treasury address
    pub fn swap_contract() -> Self {
        Self::system("swap")
    }

    /// Contract address of the unique reward token
    pub fn crown_contract() -> Self {
        Self::system("crown")
    }

    /// Address of the staking contract
    pub fn stake_contract() -> Self {
        Self::system("stake")
    }

    /// True for user-class addresses
    pub fn is_user(&self) -> bool {
        self.kind == AddressKind::User
    }

    /// True for system-class addresses
    pub fn is_system(&self) -> bool {
        self.kind == AddressKind::System
    }

    /// True for the null sentinel
    pub fn is_null(&self) -> bool {
        self.kind == AddressKind::Null
    }

    /// Identifier part of the address
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            AddressKind::Null => write!(f, "null"),
            AddressKind::User => write!(f, "user:{}", self.id),
            AddressKind::System => write!(f, "system:{}", self.id),
        }
    }
}

/// Protocol time in whole seconds since the Unix epoch.
///
/// Consensus-visible time always comes from block headers, never from the
/// local clock, so every validator sees the same value.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The zero timestamp (uninitialized clocks)
    pub const ZERO: Timestamp = Timestamp(0);

    /// Whether this is the zero timestamp
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Seconds elapsed since `earlier`, saturating at zero
    pub fn seconds_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seconds in a day
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Kinds of events emitted by the ledger pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Gas escrowed by a payer before execution
    GasEscrow,
    /// Gas charged at settlement time
    GasPayment,
    /// Fees routed into the crown reward accumulator
    CrownRewards,
    /// Periodic token-supply inflation applied
    Inflation,
    /// Fungible tokens minted
    TokenMint,
    /// Fungible tokens burned
    TokenBurn,
    /// Tokens staked
    TokenStake,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::GasEscrow => "GasEscrow",
            EventKind::GasPayment => "GasPayment",
            EventKind::CrownRewards => "CrownRewards",
            EventKind::Inflation => "Inflation",
            EventKind::TokenMint => "TokenMint",
            EventKind::TokenBurn => "TokenBurn",
            EventKind::TokenStake => "TokenStake",
        };
        write!(f, "{}", name)
    }
}

/// Payload of a gas event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasEventData {
    /// Beneficiary of the fee (chain address when none was named)
    pub target: Address,
    /// Unit gas price
    pub price: u128,
    /// Quantity: the limit at escrow time, units actually spent at settlement
    pub amount: u128,
}

/// Payload of a token event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEventData {
    /// Token symbol
    pub symbol: String,
    /// Amount in base units
    pub value: u128,
    /// Chain the event happened on
    pub chain: String,
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventData {
    /// Gas escrow/payment data
    Gas(GasEventData),
    /// Token movement data
    Token(TokenEventData),
}

/// A structured event emitted during transaction execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind
    pub kind: EventKind,
    /// Address the event is attributed to
    pub address: Address,
    /// Contract that emitted the event
    pub contract: String,
    /// Structured payload
    pub data: EventData,
}

/// Transaction hash (sha256 over the bincode encoding)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Transaction payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxPayload {
    /// Move fungible tokens from the signer to another account
    Transfer {
        /// Token symbol
        token: String,
        /// Recipient
        to: Address,
        /// Amount in base units
        amount: u128,
    },
    /// Stake staking tokens from the signer
    Stake {
        /// Amount in base units
        amount: u128,
    },
    /// Privileged inflation application (system transaction)
    ApplyInflation,
    /// One-time chain bootstrap (system transaction)
    GenesisInit {
        /// Genesis time from the consensus engine
        time: Timestamp,
        /// Initial validator accounts
        validators: Vec<Address>,
        /// Fuel minted to each initial validator
        initial_fuel: u128,
        /// Staking tokens minted to each initial validator
        initial_stake: u128,
    },
}

impl TxPayload {
    /// System payloads are generated by the node, never user-submitted
    pub fn is_system(&self) -> bool {
        matches!(self, TxPayload::ApplyInflation | TxPayload::GenesisInit { .. })
    }
}

/// A ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Operation to execute
    pub payload: TxPayload,
    /// Account that signed the transaction
    pub signer: Address,
    /// Account paying for gas
    pub gas_payer: Address,
    /// Fee beneficiary; null means "the chain's own address"
    pub gas_target: Address,
    /// Unit gas price
    pub gas_price: u128,
    /// Maximum gas units purchasable
    pub gas_limit: u128,
    /// Replay/uniqueness discriminator
    pub nonce: u64,
}

impl Transaction {
    /// Deterministic transaction hash
    pub fn hash(&self) -> TxHash {
        let bytes = bincode::serialize(self).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        TxHash(digest.into())
    }

    /// Serialize for the wire
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from the wire
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Result code of transaction validation/execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum CodeType {
    /// Accepted / executed
    Ok = 0,
    /// Rejected / failed
    Error = 1,
}

/// Result of executing one transaction through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxResult {
    /// 0 on success, non-zero on failure
    pub code: u32,
    /// Result payload returned to the consensus engine
    pub data: Vec<u8>,
    /// Human-readable log line
    pub log: String,
    /// Error namespace (must not be empty-by-accident on the wire)
    pub codespace: String,
    /// Structured events emitted in execution order
    pub events: Vec<Event>,
    /// Hash of the executed transaction
    pub hash: TxHash,
}

/// Validator set change published at end of block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    /// Validator public key bytes (ed25519)
    pub pub_key: Vec<u8>,
    /// New voting power; zero removes the validator
    pub power: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_classes() {
        assert!(Address::user("alice").is_user());
        assert!(Address::gas_contract().is_system());
        assert!(Address::null().is_null());
        assert!(!Address::null().is_user());
        assert_eq!(Address::system("gas"), Address::gas_contract());
    }

    #[test]
    fn test_timestamp_elapsed() {
        let genesis = Timestamp(1_000);
        let later = Timestamp(1_000 + 90 * SECONDS_PER_DAY);
        assert_eq!(later.seconds_since(genesis), 90 * SECONDS_PER_DAY);
        assert_eq!(genesis.seconds_since(later), 0);
    }

    #[test]
    fn test_transaction_roundtrip_and_hash() {
        let tx = Transaction {
            payload: TxPayload::Transfer {
                token: FUEL_SYMBOL.to_string(),
                to: Address::user("bob"),
                amount: 500,
            },
            signer: Address::user("alice"),
            gas_payer: Address::user("alice"),
            gas_target: Address::null(),
            gas_price: 10,
            gas_limit: 1000,
            nonce: 7,
        };

        let bytes = tx.to_bytes().unwrap();
        let tx2 = Transaction::from_bytes(&bytes).unwrap();
        assert_eq!(tx, tx2);
        assert_eq!(tx.hash(), tx2.hash());

        // hash must be payload-sensitive
        let mut tx3 = tx.clone();
        tx3.nonce = 8;
        assert_ne!(tx.hash(), tx3.hash());
    }

    #[test]
    fn test_system_payloads() {
        assert!(TxPayload::ApplyInflation.is_system());
        assert!(!TxPayload::Stake { amount: 1 }.is_system());
    }

    #[test]
    fn test_base_units() {
        assert_eq!(to_base_units(2), 200_000_000);
    }
}
