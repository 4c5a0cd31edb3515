//! Collaborator surface consumed by the gas engine
//!
//! The engine never reaches into global registries: everything it needs from
//! the surrounding system — token movements, organization membership,
//! cross-contract staking calls, execution-context flags — comes through one
//! trait object passed into every call. Tests substitute a stub.

use crate::error::Result;
use crate::types::{Address, EventData, EventKind, Timestamp};
use serde::{Deserialize, Serialize};

/// Read-only view of an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgView {
    /// The organization's own address
    pub address: Address,
    /// Member addresses
    pub members: Vec<Address>,
}

impl OrgView {
    /// Number of members
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Everything the settlement/inflation engine is allowed to do to the
/// surrounding ledger, plus the execution context of the active transaction.
pub trait Runtime {
    // --- fungible tokens ---

    /// Balance of `addr` in `symbol`, zero if the account is unknown
    fn balance(&self, symbol: &str, addr: &Address) -> u128;

    /// Move tokens between accounts
    fn transfer(&mut self, symbol: &str, from: &Address, to: &Address, amount: u128)
        -> Result<()>;

    /// Create new supply credited to `to`
    fn mint(&mut self, symbol: &str, to: &Address, amount: u128) -> Result<()>;

    /// Destroy supply held by `from`
    fn burn(&mut self, symbol: &str, from: &Address, amount: u128) -> Result<()>;

    /// Current total supply of `symbol`
    fn token_supply(&self, symbol: &str) -> u128;

    // --- unique-instance tokens ---

    /// Mint a unique token instance to `to`, returning its id
    fn mint_instance(&mut self, symbol: &str, to: &Address, payload: Vec<u8>) -> Result<u64>;

    /// Lock `amount` of `infused_symbol` from `from` inside instance `id`
    fn infuse_instance(
        &mut self,
        symbol: &str,
        from: &Address,
        id: u64,
        infused_symbol: &str,
        amount: u128,
    ) -> Result<()>;

    /// Transfer ownership of instance `id`
    fn transfer_instance(&mut self, symbol: &str, from: &Address, to: &Address, id: u64)
        -> Result<()>;

    // --- organizations ---

    /// Look up an organization by well-known name
    fn organization(&self, name: &str) -> Option<OrgView>;

    // --- cross-contract staking calls ---

    /// When `addr` became a stake-master (error if it is not one)
    fn master_since(&self, addr: &Address) -> Result<Timestamp>;

    /// Invoke the staking operation on the sibling staking contract
    fn stake(&mut self, addr: &Address, amount: u128) -> Result<()>;

    // --- execution context ---

    /// Witness/authorization check for `addr` in the active transaction
    fn is_witness(&self, addr: &Address) -> bool;

    /// Current logical time (block header time)
    fn time(&self) -> Timestamp;

    /// Unit gas price of the active transaction
    fn gas_price(&self) -> u128;

    /// Gas limit of the active transaction
    fn gas_limit(&self) -> u128;

    /// Gas units consumed so far by the active execution
    fn used_gas(&self) -> u128;

    /// Simulation mode: no state may be mutated
    fn is_read_only(&self) -> bool;

    /// Whether the calling context is the outermost ("entry") context
    fn is_entry_context(&self) -> bool;

    /// Whether the call chain originates from a system context
    fn is_system_caller(&self) -> bool;

    /// Whether the active execution already failed (error-recovery path)
    fn is_error_path(&self) -> bool;

    /// Whether the chain has a genesis block
    fn has_genesis(&self) -> bool;

    /// Genesis timestamp (zero before genesis)
    fn genesis_time(&self) -> Timestamp;

    /// Whether this is the root chain holding global state
    fn is_root_chain(&self) -> bool;

    /// The chain's own address
    fn chain_address(&self) -> Address;

    /// The chain's name, recorded in token events
    fn chain_name(&self) -> String;

    // --- events ---

    /// Emit a structured event attributed to `address`
    fn notify(&mut self, kind: EventKind, address: Address, data: EventData);
}
