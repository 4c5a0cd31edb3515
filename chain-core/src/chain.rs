//! Ledger pipeline driven by the consensus adapter
//!
//! Every transaction flows escrow → payload execution → settlement; system
//! transactions (genesis bootstrap, inflation application) are generated
//! deterministically by `begin_block` on every node and bypass the gas loop.
//!
//! All mutation is strictly ordered behind a single writer lock per height;
//! `check_tx` only ever takes a read view.

use crate::error::{expect, Error, Result};
use crate::gas::GasEngine;
use crate::metrics::Metrics;
use crate::runtime::{OrgView, Runtime};
use crate::tokens::{OrgBook, StakeBook, TokenBook};
use crate::types::{
    Address, CodeType, Event, EventData, EventKind, Timestamp, Transaction, TxHash, TxPayload,
    TxResult, ValidatorUpdate, FUEL_SYMBOL, MASTERS_ORG, RESERVE_ORG, STAKING_SYMBOL,
    VALIDATORS_ORG,
};
use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Flat gas charge for accepting any transaction
const GAS_BASE: u128 = 10;

/// Gas cost of a fungible transfer
const GAS_TRANSFER: u128 = 200;

/// Gas cost of a staking operation
const GAS_STAKE: u128 = 500;

/// Voting power granted to each member of the validators organization
const VALIDATOR_POWER: i64 = 10;

/// Codespace reported on failed transactions (must not be empty on the wire)
const CODESPACE: &str = "chain";

/// The surface the consensus adapter drives.
pub trait Chain: Send + Sync {
    /// Produce the genesis system transactions, keyed by priority
    fn create_genesis(
        &self,
        genesis_time: Timestamp,
        validators: &[Address],
    ) -> Result<BTreeMap<u32, Transaction>>;

    /// Begin a height: advance logical time and deterministically regenerate
    /// the next round's system transactions from shared state
    fn begin_block(
        &self,
        height: u64,
        proposer: &str,
        time: Timestamp,
    ) -> Result<Vec<Transaction>>;

    /// Stateless mempool admission check; must not mutate state
    fn check_tx(&self, raw: &[u8]) -> (CodeType, String);

    /// Execute one transaction through the pipeline
    fn deliver_tx(&self, raw: &[u8]) -> TxResult;

    /// End-of-height bookkeeping: validator set diff
    fn end_block(&self, height: u64) -> Result<Vec<ValidatorUpdate>>;

    /// Commit the height and return the state digest
    fn commit(&self) -> Result<Vec<u8>>;

    /// Last committed height
    fn last_height(&self) -> u64;

    /// Whether the chain has seen its genesis transaction
    fn has_genesis(&self) -> bool;
}

/// Token, organization and staking books mutated by transaction execution
#[derive(Debug, Clone, Default, Serialize)]
struct Books {
    tokens: TokenBook,
    orgs: OrgBook,
    stakes: StakeBook,
}

#[derive(Debug)]
struct ChainState {
    books: Books,
    gas: GasEngine,
    has_genesis: bool,
    genesis_time: Timestamp,
    time: Timestamp,
    current_height: u64,
    last_committed: u64,
    published_validators: Vec<Address>,
}

/// Deterministic in-memory ledger chain.
pub struct LedgerChain {
    name: String,
    genesis_fuel: u128,
    genesis_stake: u128,
    state: RwLock<ChainState>,
    metrics: Metrics,
}

impl std::fmt::Debug for LedgerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerChain")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl LedgerChain {
    /// Create a fresh chain with default genesis allocations
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            genesis_fuel: crate::types::to_base_units(10_000),
            genesis_stake: crate::types::to_base_units(100_000),
            state: RwLock::new(ChainState {
                books: Books::default(),
                gas: GasEngine::new(),
                has_genesis: false,
                genesis_time: Timestamp::ZERO,
                time: Timestamp::ZERO,
                current_height: 0,
                last_committed: 0,
                published_validators: Vec::new(),
            }),
            metrics: Metrics::default(),
        }
    }

    /// The chain's own address, used as the default fee beneficiary
    pub fn address(&self) -> Address {
        Address::system("chain")
    }

    /// Chain name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Fuel balance of an account (read view, test/query convenience)
    pub fn fuel_balance(&self, addr: &Address) -> u128 {
        self.state.read().books.tokens.balance(FUEL_SYMBOL, addr)
    }

    /// Staking-token balance of an account
    pub fn staking_balance(&self, addr: &Address) -> u128 {
        self.state.read().books.tokens.balance(STAKING_SYMBOL, addr)
    }

    /// Whether the engine currently flags inflation as ready
    pub fn inflation_ready(&self) -> bool {
        self.state.read().gas.inflation_ready()
    }

    fn digest(state: &ChainState) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct Snapshot<'a> {
            books: &'a Books,
            gas: &'a GasEngine,
            height: u64,
            has_genesis: bool,
            genesis_time: Timestamp,
        }
        let bytes = bincode::serialize(&Snapshot {
            books: &state.books,
            gas: &state.gas,
            height: state.last_committed,
            has_genesis: state.has_genesis,
            genesis_time: state.genesis_time,
        })?;
        Ok(Sha256::digest(&bytes).to_vec())
    }

    fn execute_system_tx(&self, state: &mut ChainState, tx: &Transaction) -> Result<Vec<Event>> {
        expect(
            tx.signer.is_system(),
            "system payload requires a system signer",
        )?;
        match &tx.payload {
            TxPayload::GenesisInit {
                time,
                validators,
                initial_fuel,
                initial_stake,
            } => {
                expect(!state.has_genesis, "genesis already executed")?;
                expect(!validators.is_empty(), "genesis requires validators")?;

                state.books.orgs.create(
                    VALIDATORS_ORG,
                    Address::system("validators"),
                    validators.clone(),
                );
                state
                    .books
                    .orgs
                    .create(MASTERS_ORG, Address::system("masters"), vec![]);
                state.books.orgs.create(
                    RESERVE_ORG,
                    Address::system("reserve"),
                    vec![validators[0].clone()],
                );

                for v in validators {
                    state.books.tokens.mint(FUEL_SYMBOL, v, *initial_fuel)?;
                    state.books.tokens.mint(STAKING_SYMBOL, v, *initial_stake)?;
                }

                state.has_genesis = true;
                state.genesis_time = *time;
                info!(validators = validators.len(), "genesis executed");
                Ok(vec![])
            }
            TxPayload::ApplyInflation => {
                let meta = self.meta(state);
                let ChainState { books, gas, time, .. } = state;
                let mut ctx = TxCtx::system(&tx.signer, *time);
                let events = {
                    let mut rt = TxRuntime {
                        books,
                        ctx: &mut ctx,
                        meta: &meta,
                    };
                    gas.apply_inflation(&mut rt, &tx.signer)?;
                    std::mem::take(&mut rt.ctx.events)
                };
                self.metrics.inflation_runs.inc();
                Ok(events)
            }
            _ => Err(Error::Expect("not a system payload".to_string())),
        }
    }

    fn execute_user_tx(&self, state: &mut ChainState, tx: &Transaction) -> Result<Vec<Event>> {
        let meta = self.meta(state);
        let gas_backup = state.gas.clone();
        let books_backup = state.books.clone();

        let ChainState { books, gas, time, .. } = state;
        let mut ctx = TxCtx::user(tx, *time);

        // escrow the maximum purchasable fuel before anything executes
        let escrow = {
            let mut rt = TxRuntime {
                books,
                ctx: &mut ctx,
                meta: &meta,
            };
            gas.escrow_gas(&mut rt, &tx.gas_payer, &tx.gas_target, tx.gas_price, tx.gas_limit)
        };
        if let Err(e) = escrow {
            // rejected before execution: no trace may remain in state
            state.gas = gas_backup;
            state.books = books_backup;
            return Err(e);
        }

        // payload execution; failure reverts its effects but keeps the gas
        // consumed by the attempt
        let checkpoint = books.clone();
        let events_before = ctx.events.len();
        let exec = {
            let mut rt = TxRuntime {
                books,
                ctx: &mut ctx,
                meta: &meta,
            };
            execute_payload(&mut rt, tx)
        };
        if let Err(ref e) = exec {
            debug!(error = %e, "payload execution failed, reverting effects");
            *books = checkpoint;
            ctx.events.truncate(events_before);
            ctx.error_path = true;
        }

        let settle = {
            let mut rt = TxRuntime {
                books,
                ctx: &mut ctx,
                meta: &meta,
            };
            gas.settle_gas(&mut rt, &tx.gas_payer)
        };

        if let Err(e) = settle {
            // settlement itself failed: the transaction is rejected entirely
            // and no trace of it may remain in state
            state.gas = gas_backup;
            state.books = books_backup;
            return Err(e);
        }

        exec.map(|_| ctx.events)
    }

    fn meta(&self, state: &ChainState) -> ChainMeta {
        ChainMeta {
            name: self.name.clone(),
            address: self.address(),
            has_genesis: state.has_genesis,
            genesis_time: state.genesis_time,
        }
    }
}

impl Chain for LedgerChain {
    fn create_genesis(
        &self,
        genesis_time: Timestamp,
        validators: &[Address],
    ) -> Result<BTreeMap<u32, Transaction>> {
        expect(!validators.is_empty(), "genesis requires validators")?;
        let tx = Transaction {
            payload: TxPayload::GenesisInit {
                time: genesis_time,
                validators: validators.to_vec(),
                initial_fuel: self.genesis_fuel,
                initial_stake: self.genesis_stake,
            },
            signer: self.address(),
            gas_payer: self.address(),
            gas_target: Address::null(),
            gas_price: 0,
            gas_limit: 0,
            nonce: 0,
        };
        let mut txs = BTreeMap::new();
        txs.insert(0, tx);
        Ok(txs)
    }

    fn begin_block(
        &self,
        height: u64,
        proposer: &str,
        time: Timestamp,
    ) -> Result<Vec<Transaction>> {
        let mut state = self.state.write();
        state.current_height = height;
        state.time = time;
        debug!(height, proposer, "begin block");

        // the same system transactions are computed on every node; only the
        // proposer's relay submissions are network-visible. The nonce is
        // epoch-derived so regeneration across heights stays byte-identical.
        let mut system_txs = Vec::new();
        if state.has_genesis && state.gas.inflation_ready() {
            system_txs.push(Transaction {
                payload: TxPayload::ApplyInflation,
                signer: self.address(),
                gas_payer: self.address(),
                gas_target: Address::null(),
                gas_price: 0,
                gas_limit: 0,
                nonce: state.gas.last_inflation_date().0,
            });
        }
        Ok(system_txs)
    }

    fn check_tx(&self, raw: &[u8]) -> (CodeType, String) {
        let tx = match Transaction::from_bytes(raw) {
            Ok(tx) => tx,
            Err(e) => return (CodeType::Error, format!("invalid transaction: {}", e)),
        };

        if tx.payload.is_system() {
            if !tx.signer.is_system() {
                return (
                    CodeType::Error,
                    "system payload requires a system signer".to_string(),
                );
            }
            return (CodeType::Ok, String::new());
        }

        if tx.gas_price == 0 {
            return (CodeType::Error, "price must be positive amount".to_string());
        }
        if tx.gas_limit == 0 {
            return (CodeType::Error, "limit must be positive amount".to_string());
        }
        if !tx.gas_payer.is_user() {
            return (CodeType::Error, "must be a user address".to_string());
        }
        (CodeType::Ok, String::new())
    }

    fn deliver_tx(&self, raw: &[u8]) -> TxResult {
        let tx = match Transaction::from_bytes(raw) {
            Ok(tx) => tx,
            Err(e) => {
                warn!("failed to decode transaction: {}", e);
                self.metrics.txs_failed.inc();
                return TxResult {
                    code: CodeType::Error as u32,
                    data: vec![],
                    log: format!("invalid transaction: {}", e),
                    codespace: CODESPACE.to_string(),
                    events: vec![],
                    hash: TxHash(Sha256::digest(raw).into()),
                };
            }
        };
        let hash = tx.hash();

        let mut state = self.state.write();
        let result = if tx.payload.is_system() {
            self.execute_system_tx(&mut state, &tx)
        } else {
            self.execute_user_tx(&mut state, &tx)
        };

        match result {
            Ok(events) => {
                self.metrics.txs_delivered.inc();
                TxResult {
                    code: CodeType::Ok as u32,
                    data: vec![],
                    log: "executed".to_string(),
                    codespace: String::new(),
                    events,
                    hash,
                }
            }
            Err(e) => {
                warn!(%hash, "transaction failed: {}", e);
                self.metrics.txs_failed.inc();
                TxResult {
                    code: CodeType::Error as u32,
                    data: vec![],
                    log: e.to_string(),
                    codespace: CODESPACE.to_string(),
                    events: vec![],
                    hash,
                }
            }
        }
    }

    fn end_block(&self, height: u64) -> Result<Vec<ValidatorUpdate>> {
        let mut state = self.state.write();
        debug!(height, "end block");

        let current = state
            .books
            .orgs
            .get(VALIDATORS_ORG)
            .map(|org| org.members)
            .unwrap_or_default();

        let mut updates = Vec::new();
        for added in current.iter().filter(|m| !state.published_validators.contains(m)) {
            updates.push(ValidatorUpdate {
                pub_key: validator_key(added),
                power: VALIDATOR_POWER,
            });
        }
        for removed in state.published_validators.iter().filter(|m| !current.contains(m)) {
            updates.push(ValidatorUpdate {
                pub_key: validator_key(removed),
                power: 0,
            });
        }

        state.published_validators = current;
        Ok(updates)
    }

    fn commit(&self) -> Result<Vec<u8>> {
        let mut state = self.state.write();
        state.last_committed = state.current_height;
        self.metrics.blocks_total.inc();
        let digest = Self::digest(&state)?;
        debug!(
            height = state.last_committed,
            digest = %hex::encode(&digest),
            "committed"
        );
        Ok(digest)
    }

    fn last_height(&self) -> u64 {
        self.state.read().last_committed
    }

    fn has_genesis(&self) -> bool {
        self.state.read().has_genesis
    }
}

/// Deterministic placeholder key for a validator account
fn validator_key(addr: &Address) -> Vec<u8> {
    Sha256::digest(addr.to_string().as_bytes()).to_vec()
}

/// Chain-level facts that do not change during a transaction
struct ChainMeta {
    name: String,
    address: Address,
    has_genesis: bool,
    genesis_time: Timestamp,
}

/// Per-transaction execution context carried across pipeline phases
struct TxCtx {
    signer: Address,
    now: Timestamp,
    gas_price: u128,
    gas_limit: u128,
    used: u128,
    error_path: bool,
    system_caller: bool,
    events: Vec<Event>,
}

impl TxCtx {
    fn user(tx: &Transaction, now: Timestamp) -> Self {
        Self {
            signer: tx.signer.clone(),
            now,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            used: GAS_BASE,
            error_path: false,
            system_caller: false,
            events: Vec::new(),
        }
    }

    fn system(signer: &Address, now: Timestamp) -> Self {
        Self {
            signer: signer.clone(),
            now,
            gas_price: 0,
            gas_limit: 0,
            used: 0,
            error_path: false,
            system_caller: true,
            events: Vec::new(),
        }
    }
}

/// [`Runtime`] implementation over the chain books for one transaction
struct TxRuntime<'a> {
    books: &'a mut Books,
    ctx: &'a mut TxCtx,
    meta: &'a ChainMeta,
}

impl TxRuntime<'_> {
    fn consume_gas(&mut self, units: u128) -> Result<()> {
        self.ctx.used += units;
        expect(
            self.ctx.used <= self.ctx.gas_limit,
            format!("out of gas: {}/{}", self.ctx.used, self.ctx.gas_limit),
        )
    }
}

impl Runtime for TxRuntime<'_> {
    fn balance(&self, symbol: &str, addr: &Address) -> u128 {
        self.books.tokens.balance(symbol, addr)
    }
    fn transfer(&mut self, symbol: &str, from: &Address, to: &Address, amount: u128) -> Result<()> {
        self.books.tokens.transfer(symbol, from, to, amount)
    }
    fn mint(&mut self, symbol: &str, to: &Address, amount: u128) -> Result<()> {
        self.books.tokens.mint(symbol, to, amount)
    }
    fn burn(&mut self, symbol: &str, from: &Address, amount: u128) -> Result<()> {
        self.books.tokens.burn(symbol, from, amount)
    }
    fn token_supply(&self, symbol: &str) -> u128 {
        self.books.tokens.supply(symbol)
    }
    fn mint_instance(&mut self, symbol: &str, to: &Address, payload: Vec<u8>) -> Result<u64> {
        Ok(self.books.tokens.mint_instance(symbol, to, payload))
    }
    fn infuse_instance(
        &mut self,
        symbol: &str,
        from: &Address,
        id: u64,
        infused_symbol: &str,
        amount: u128,
    ) -> Result<()> {
        self.books.tokens.infuse(symbol, from, id, infused_symbol, amount)
    }
    fn transfer_instance(
        &mut self,
        symbol: &str,
        from: &Address,
        to: &Address,
        id: u64,
    ) -> Result<()> {
        self.books.tokens.transfer_instance(symbol, from, to, id)
    }
    fn organization(&self, name: &str) -> Option<OrgView> {
        self.books.orgs.get(name)
    }
    fn master_since(&self, addr: &Address) -> Result<Timestamp> {
        self.books
            .stakes
            .master_since(addr)
            .ok_or_else(|| Error::Expect(format!("{} is not a master", addr)))
    }
    fn stake(&mut self, addr: &Address, amount: u128) -> Result<()> {
        let now = self.ctx.now;
        let Books { tokens, orgs, stakes } = self.books;
        stakes.stake(tokens, orgs, addr, amount, now)
    }
    fn is_witness(&self, addr: &Address) -> bool {
        // signature checking happens below this crate; within the pipeline
        // the declared signer is the witness
        addr == &self.ctx.signer || self.ctx.system_caller
    }
    fn time(&self) -> Timestamp {
        self.ctx.now
    }
    fn gas_price(&self) -> u128 {
        self.ctx.gas_price
    }
    fn gas_limit(&self) -> u128 {
        self.ctx.gas_limit
    }
    fn used_gas(&self) -> u128 {
        self.ctx.used
    }
    fn is_read_only(&self) -> bool {
        false
    }
    fn is_entry_context(&self) -> bool {
        true
    }
    fn is_system_caller(&self) -> bool {
        self.ctx.system_caller
    }
    fn is_error_path(&self) -> bool {
        self.ctx.error_path
    }
    fn has_genesis(&self) -> bool {
        self.meta.has_genesis
    }
    fn genesis_time(&self) -> Timestamp {
        self.meta.genesis_time
    }
    fn is_root_chain(&self) -> bool {
        true
    }
    fn chain_address(&self) -> Address {
        self.meta.address.clone()
    }
    fn chain_name(&self) -> String {
        self.meta.name.clone()
    }
    fn notify(&mut self, kind: EventKind, address: Address, data: EventData) {
        self.ctx.events.push(Event {
            kind,
            address,
            contract: "gas".to_string(),
            data,
        });
    }
}

/// Execute a user payload, metering gas for the attempt.
fn execute_payload(rt: &mut TxRuntime<'_>, tx: &Transaction) -> Result<()> {
    match &tx.payload {
        TxPayload::Transfer { token, to, amount } => {
            rt.consume_gas(GAS_TRANSFER)?;
            expect(*amount > 0, "amount must be positive")?;
            expect(rt.is_witness(&tx.signer), "invalid witness")?;
            let signer = tx.signer.clone();
            rt.transfer(token, &signer, to, *amount)
        }
        TxPayload::Stake { amount } => {
            rt.consume_gas(GAS_STAKE)?;
            expect(rt.is_witness(&tx.signer), "invalid witness")?;
            let signer = tx.signer.clone();
            rt.stake(&signer, *amount)
        }
        TxPayload::ApplyInflation | TxPayload::GenesisInit { .. } => {
            Err(Error::Expect("system payload in user transaction".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::INFLATION_PERIOD_SECS;
    use crate::types::to_base_units;

    const T0: Timestamp = Timestamp(1_700_000_000);

    fn genesis_chain() -> (LedgerChain, Address) {
        let chain = LedgerChain::new("main");
        let validator = Address::user("val1");
        let txs = chain.create_genesis(T0, &[validator.clone()]).unwrap();
        chain.begin_block(1, "PROPOSER", T0).unwrap();
        for (_, tx) in txs {
            let result = chain.deliver_tx(&tx.to_bytes().unwrap());
            assert_eq!(result.code, 0, "{}", result.log);
        }
        chain.end_block(1).unwrap();
        chain.commit().unwrap();
        (chain, validator)
    }

    fn transfer_tx(from: &Address, to: &Address, amount: u128, nonce: u64) -> Transaction {
        Transaction {
            payload: TxPayload::Transfer {
                token: FUEL_SYMBOL.to_string(),
                to: to.clone(),
                amount,
            },
            signer: from.clone(),
            gas_payer: from.clone(),
            gas_target: Address::null(),
            gas_price: 10,
            gas_limit: 1_000,
            nonce,
        }
    }

    #[test]
    fn test_genesis_bootstraps_state() {
        let (chain, validator) = genesis_chain();

        assert!(chain.has_genesis());
        assert_eq!(chain.last_height(), 1);
        assert_eq!(chain.fuel_balance(&validator), to_base_units(10_000));
        assert_eq!(chain.staking_balance(&validator), to_base_units(100_000));

        // genesis may only run once
        let txs = chain.create_genesis(T0, &[validator]).unwrap();
        let result = chain.deliver_tx(&txs[&0].to_bytes().unwrap());
        assert_eq!(result.code, 1);
        assert!(result.log.contains("genesis already executed"));
    }

    #[test]
    fn test_end_block_publishes_initial_validators() {
        let chain = LedgerChain::new("main");
        let validator = Address::user("val1");
        let txs = chain.create_genesis(T0, &[validator.clone()]).unwrap();
        chain.begin_block(1, "PROPOSER", T0).unwrap();
        chain.deliver_tx(&txs[&0].to_bytes().unwrap());

        let updates = chain.end_block(1).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].power, VALIDATOR_POWER);

        // no diff, no updates
        let updates = chain.end_block(2).unwrap();
        assert!(updates.is_empty());
    }

    #[test]
    fn test_transfer_charges_gas_and_moves_tokens() {
        let (chain, validator) = genesis_chain();
        let bob = Address::user("bob");
        let before = chain.fuel_balance(&validator);

        chain.begin_block(2, "PROPOSER", Timestamp(T0.0 + 10)).unwrap();
        let tx = transfer_tx(&validator, &bob, 5_000, 1);
        let result = chain.deliver_tx(&tx.to_bytes().unwrap());
        assert_eq!(result.code, 0, "{}", result.log);

        assert_eq!(chain.fuel_balance(&bob), 5_000);
        // gas charged: (10 base + 200 transfer) * 10 = 2100 fuel
        assert_eq!(chain.fuel_balance(&validator), before - 5_000 - 2_100);

        // escrow + two gas payments among the events
        let kinds: Vec<EventKind> = result.events.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::GasEscrow));
        assert_eq!(
            kinds.iter().filter(|k| **k == EventKind::GasPayment).count(),
            2
        );
    }

    #[test]
    fn test_failed_execution_still_charges_gas() {
        let (chain, validator) = genesis_chain();
        let bob = Address::user("bob");
        let before = chain.fuel_balance(&validator);

        chain.begin_block(2, "PROPOSER", Timestamp(T0.0 + 10)).unwrap();
        // transferring more than the whole genesis allocation fails
        let tx = transfer_tx(&validator, &bob, before * 10, 1);
        let result = chain.deliver_tx(&tx.to_bytes().unwrap());
        assert_eq!(result.code, 1);

        // payload reverted, gas for the attempt still charged
        assert_eq!(chain.fuel_balance(&bob), 0);
        assert_eq!(chain.fuel_balance(&validator), before - 2_100);

        // the payer can escrow again: settlement was terminal
        let tx = transfer_tx(&validator, &bob, 100, 2);
        let result = chain.deliver_tx(&tx.to_bytes().unwrap());
        assert_eq!(result.code, 0, "{}", result.log);
    }

    #[test]
    fn test_rejected_escrow_leaves_no_trace() {
        let (chain, validator) = genesis_chain();
        let broke = Address::user("mallory");

        chain.begin_block(2, "PROPOSER", Timestamp(T0.0 + 10)).unwrap();
        let digest_before = LedgerChain::digest(&chain.state.read()).unwrap();

        // a payer with no fuel cannot escrow; the rejection must not seed
        // the inflation clock or move any balance
        let tx = transfer_tx(&broke, &validator, 1, 1);
        let result = chain.deliver_tx(&tx.to_bytes().unwrap());
        assert_eq!(result.code, 1);
        assert!(result.log.contains("insufficient"));

        assert_eq!(chain.state.read().gas.last_inflation_date(), Timestamp::ZERO);
        let digest_after = LedgerChain::digest(&chain.state.read()).unwrap();
        assert_eq!(digest_before, digest_after);

        // the first successful settlement later seeds the clock normally
        let tx = transfer_tx(&validator, &broke, 100, 1);
        let result = chain.deliver_tx(&tx.to_bytes().unwrap());
        assert_eq!(result.code, 0, "{}", result.log);
        assert!(!chain.state.read().gas.last_inflation_date().is_zero());
    }

    #[test]
    fn test_check_tx_is_stateless_validation() {
        let (chain, validator) = genesis_chain();

        let (code, _) = chain.check_tx(b"garbage");
        assert_eq!(code, CodeType::Error);

        let mut tx = transfer_tx(&validator, &Address::user("bob"), 1, 1);
        tx.gas_price = 0;
        let (code, msg) = chain.check_tx(&tx.to_bytes().unwrap());
        assert_eq!(code, CodeType::Error);
        assert!(msg.contains("price"));

        let tx = transfer_tx(&validator, &Address::user("bob"), 1, 1);
        let digest_before = LedgerChain::digest(&chain.state.read()).unwrap();
        let (code, _) = chain.check_tx(&tx.to_bytes().unwrap());
        assert_eq!(code, CodeType::Ok);
        // no consensus-relevant state was touched
        let digest_after = LedgerChain::digest(&chain.state.read()).unwrap();
        assert_eq!(digest_before, digest_after);
    }

    #[test]
    fn test_inflation_system_tx_generated_and_applied() {
        let (chain, validator) = genesis_chain();
        let bob = Address::user("bob");

        // first settlement seeds the inflation clock
        chain.begin_block(2, "PROPOSER", Timestamp(T0.0 + 10)).unwrap();
        let result =
            chain.deliver_tx(&transfer_tx(&validator, &bob, 100, 1).to_bytes().unwrap());
        assert_eq!(result.code, 0, "{}", result.log);
        assert!(!chain.inflation_ready());

        // a settlement past the epoch flips readiness
        let later = Timestamp(T0.0 + 10 + INFLATION_PERIOD_SECS);
        chain.begin_block(3, "PROPOSER", later).unwrap();
        let result =
            chain.deliver_tx(&transfer_tx(&validator, &bob, 100, 2).to_bytes().unwrap());
        assert_eq!(result.code, 0, "{}", result.log);
        assert!(chain.inflation_ready());

        // next begin-of-height regenerates the inflation system transaction
        let system_txs = chain.begin_block(4, "PROPOSER", later).unwrap();
        assert_eq!(system_txs.len(), 1);
        assert!(matches!(system_txs[0].payload, TxPayload::ApplyInflation));

        let result = chain.deliver_tx(&system_txs[0].to_bytes().unwrap());
        assert_eq!(result.code, 0, "{}", result.log);
        assert!(!chain.inflation_ready());
        assert!(chain
            .staking_balance(&Address::swap_contract()) > 0);

        // readiness was cleared, no system transaction next height
        let system_txs = chain.begin_block(5, "PROPOSER", later).unwrap();
        assert!(system_txs.is_empty());
    }

    #[test]
    fn test_two_chains_reach_identical_digests() {
        let run = || {
            let (chain, validator) = genesis_chain();
            let bob = Address::user("bob");
            chain.begin_block(2, "NODE-SPECIFIC-PROPOSER", Timestamp(T0.0 + 5)).unwrap();
            chain.deliver_tx(&transfer_tx(&validator, &bob, 777, 1).to_bytes().unwrap());
            chain.end_block(2).unwrap();
            chain.commit().unwrap()
        };
        let run2 = || {
            let (chain, validator) = genesis_chain();
            let bob = Address::user("bob");
            chain.begin_block(2, "ANOTHER-PROPOSER", Timestamp(T0.0 + 5)).unwrap();
            chain.deliver_tx(&transfer_tx(&validator, &bob, 777, 1).to_bytes().unwrap());
            chain.end_block(2).unwrap();
            chain.commit().unwrap()
        };
        // proposer identity must not leak into ledger state
        assert_eq!(run(), run2());
    }
}
