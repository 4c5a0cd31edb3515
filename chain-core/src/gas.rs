//! Gas/fee settlement and inflation-distribution engine
//!
//! Every transaction passes through here twice: [`GasEngine::escrow_gas`]
//! before execution reserves the maximum purchasable fuel, and
//! [`GasEngine::settle_gas`] after execution charges what was actually spent
//! and redistributes it across burn, beneficiary and validator buckets with
//! exact conservation. Every epoch boundary passes through
//! [`GasEngine::apply_inflation`].
//!
//! All state lives on the engine instance bound to one chain; collaborators
//! are reached only through the [`Runtime`] trait passed into each call.

use crate::error::{expect, Error, Result};
use crate::runtime::Runtime;
use crate::types::{
    to_base_units, Address, EventData, EventKind, GasEventData, Timestamp, TokenEventData,
    FUEL_SYMBOL, MASTERS_ORG, RESERVE_ORG, REWARD_SYMBOL, SECONDS_PER_DAY, STAKING_SYMBOL,
    VALIDATORS_ORG,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Supply divisor per inflation application (≈3%/year over 12 applications)
const INFLATION_DIVISOR: u128 = 133;

/// Share of the inflation amount distributed to stake-masters (divisor)
const MASTER_REWARD_DIVISOR: u128 = 10;

/// Share of the remainder funding the secondary treasury (divisor)
const RESERVE_DIVISOR: u128 = 10;

/// Share of the remainder refilling the cross-chain swap treasury (divisor)
const SWAP_REFILL_DIVISOR: u128 = 50;

/// Fixed epoch between inflation applications
pub const INFLATION_PERIOD_SECS: u64 = 90 * SECONDS_PER_DAY;

/// Supply is floored to this baseline before computing inflation
const MIN_STAKING_SUPPLY: u128 = to_base_units(100_000_000);

/// Fixed stake minted to the crown token contract at each inflation
const CROWN_SIDE_STAKE: u128 = to_base_units(2);

/// Name of the gas contract, recorded on emitted events
const CONTRACT_NAME: &str = "gas";

/// Data sealed into each crown reward instance at mint time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeReward {
    /// Master the reward was minted for
    pub owner: Address,
    /// Inflation time the reward belongs to
    pub date: Timestamp,
}

/// The gas/fee settlement and inflation engine for one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasEngine {
    /// Engine's own escrow account
    address: Address,
    /// Outstanding escrow per payer; at most one entry per payer
    escrow: BTreeMap<Address, u128>,
    /// Designated fee beneficiary per payer
    escrow_target: BTreeMap<Address, Address>,
    /// Fees routed to the chain's own address, pending crown distribution
    reward_accum: u128,
    /// Inflation clock: time of the last applied inflation
    last_inflation: Timestamp,
    /// Readiness flag, set once a full epoch has elapsed
    inflation_ready: bool,
}

impl Default for GasEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GasEngine {
    /// Fresh engine with an empty escrow book and a zeroed inflation clock
    pub fn new() -> Self {
        Self {
            address: Address::gas_contract(),
            escrow: BTreeMap::new(),
            escrow_target: BTreeMap::new(),
            reward_accum: 0,
            last_inflation: Timestamp::ZERO,
            inflation_ready: false,
        }
    }

    /// The engine's own address (holds escrowed fuel)
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Current escrowed amount for `payer`, zero if none
    pub fn allowed_gas(&self, payer: &Address) -> u128 {
        self.escrow.get(payer).copied().unwrap_or(0)
    }

    /// Pending crown reward accumulator
    pub fn reward_accum(&self) -> u128 {
        self.reward_accum
    }

    /// Time of the last applied inflation
    pub fn last_inflation_date(&self) -> Timestamp {
        self.last_inflation
    }

    /// Whether the next inflation is ready to be applied
    pub fn inflation_ready(&self) -> bool {
        self.inflation_ready
    }

    /// Seconds left until the readiness flag can flip, zero when due
    pub fn seconds_until_distribution(&self, rt: &dyn Runtime) -> u64 {
        let elapsed = rt.time().seconds_since(self.last_inflation);
        INFLATION_PERIOD_SECS.saturating_sub(elapsed)
    }

    /// Escrow the maximum purchasable fuel for a transaction.
    ///
    /// Debits `price * limit` of fuel from the payer into the engine's own
    /// account and records the designated beneficiary. Fails without touching
    /// state when any precondition is violated; an under-funded payer gets a
    /// distinguishable error carrying the exact shortfall.
    pub fn escrow_gas(
        &mut self,
        rt: &mut dyn Runtime,
        payer: &Address,
        target: &Address,
        price: u128,
        limit: u128,
    ) -> Result<()> {
        if rt.is_read_only() {
            return Ok(());
        }

        expect(payer.is_user(), "must be a user address")?;
        expect(price > 0, "price must be positive amount")?;
        expect(limit > 0, "limit must be positive amount")?;

        expect(
            rt.is_entry_context(),
            "gas escrow must run in the entry context",
        )?;
        expect(rt.is_witness(payer), format!("invalid witness -> {}", payer))?;

        let target = if target.is_null() {
            rt.chain_address()
        } else {
            expect(target.is_system(), "destination must be system address")?;
            target.clone()
        };

        expect(
            self.allowed_gas(payer) == 0,
            "unexpected pending allowance",
        )?;

        let max_amount = price
            .checked_mul(limit)
            .ok_or_else(|| Error::Expect("gas amount overflow".to_string()))?;

        let balance = rt.balance(FUEL_SYMBOL, payer);
        if balance < max_amount {
            return Err(Error::InsufficientBalance {
                token: FUEL_SYMBOL.to_string(),
                address: payer.clone(),
                shortfall: max_amount - balance,
            });
        }

        rt.transfer(FUEL_SYMBOL, payer, &self.address, max_amount)?;
        self.escrow.insert(payer.clone(), max_amount);
        self.escrow_target.insert(payer.clone(), target.clone());

        // the first successful escrow seeds the inflation clock; a rejected
        // transaction must leave it untouched
        if self.last_inflation.is_zero() {
            self.last_inflation = rt.time();
        }

        rt.notify(
            EventKind::GasEscrow,
            payer.clone(),
            EventData::Gas(GasEventData {
                target,
                price,
                amount: limit,
            }),
        );
        Ok(())
    }

    /// Settle a payer's escrow after execution.
    ///
    /// Charges `used_gas * price`, returns the leftover escrow, then splits
    /// the charge: half burned, half of the rest to the beneficiary (or the
    /// reward accumulator when the beneficiary is the chain itself), the
    /// remainder to the validator-reward address. The escrow is removed
    /// unconditionally; settlement is terminal.
    pub fn settle_gas(&mut self, rt: &mut dyn Runtime, payer: &Address) -> Result<()> {
        if rt.is_read_only() {
            return Ok(());
        }

        expect(
            rt.is_entry_context() || rt.is_system_caller(),
            "gas settlement must run in the entry context",
        )?;
        expect(rt.is_witness(payer), "invalid witness")?;
        expect(
            self.escrow.contains_key(payer),
            "no gas allowance found",
        )?;

        let available = self.escrow[payer];
        let price = rt.gas_price();
        let mut spent = rt.used_gas();
        let mut required = spent * price;

        let target = self
            .escrow_target
            .get(payer)
            .cloned()
            .unwrap_or_else(|| rt.chain_address());

        // Best-effort charge on failed execution: the payer is charged only
        // what was escrowed, and the settlement event is synthesized from the
        // stored escrow data instead of the fresh request data.
        let mut payment_event = GasEventData {
            target: target.clone(),
            price,
            amount: spent,
        };
        if rt.is_error_path() && available < required {
            required = available;
            spent = if price > 0 { available / price } else { 0 };
            payment_event = GasEventData {
                target: target.clone(),
                price,
                amount: rt.gas_limit(),
            };
        }

        expect(required > 0, format!("{} {} gas fee must exist", price, spent))?;
        expect(
            available >= required,
            format!("gas allowance is not enough {}/{}", available, required),
        )?;

        rt.notify(
            EventKind::GasPayment,
            payer.clone(),
            EventData::Gas(payment_event),
        );

        let leftover = available - required;
        if leftover > 0 {
            rt.transfer(FUEL_SYMBOL, &self.address, payer, leftover)?;
        }

        expect(spent > 1, "gas spent too low")?;

        let burn = spent / 2;
        if burn > 0 {
            rt.burn(FUEL_SYMBOL, &self.address, burn * price)?;
            spent -= burn;
        }

        let post_burn = spent;

        // 50% of the rest for dapps, or the crown accumulator when no dapp
        // was named.
        let dapp = spent / 2;
        if dapp > 0 {
            let dapp_payment = dapp * price;
            if target == rt.chain_address() {
                self.reward_accum += dapp_payment;
                rt.notify(
                    EventKind::CrownRewards,
                    payer.clone(),
                    EventData::Token(TokenEventData {
                        symbol: FUEL_SYMBOL.to_string(),
                        value: dapp_payment,
                        chain: rt.chain_name(),
                    }),
                );
            } else {
                rt.transfer(FUEL_SYMBOL, &self.address, &target, dapp_payment)?;
            }
            spent -= dapp;
        }

        if spent > 0 {
            let validator_payment = spent * price;
            rt.transfer(
                FUEL_SYMBOL,
                &self.address,
                &Address::block_contract(),
                validator_payment,
            )?;
        }

        rt.notify(
            EventKind::GasPayment,
            Address::null(),
            EventData::Gas(GasEventData {
                target,
                price,
                amount: post_burn,
            }),
        );

        self.escrow.remove(payer);
        self.escrow_target.remove(payer);

        self.check_inflation(rt);
        Ok(())
    }

    /// Evaluate inflation readiness; called at the end of every settlement.
    fn check_inflation(&mut self, rt: &dyn Runtime) {
        if !rt.has_genesis() {
            return;
        }

        if self.last_inflation.is_zero() {
            self.last_inflation = rt.genesis_time();
        } else if !self.inflation_ready {
            let elapsed = rt.time().seconds_since(self.last_inflation);
            if elapsed >= INFLATION_PERIOD_SECS {
                debug!(
                    last_inflation = %self.last_inflation,
                    "inflation epoch elapsed, flagging ready"
                );
                self.inflation_ready = true;
            }
        }
    }

    /// Apply periodic token-supply inflation.
    ///
    /// Mints `supply / 133` of the staking token and distributes it: crown
    /// rewards to stake-masters enrolled before this epoch began, a refill of
    /// the swap treasury, funding for the secondary treasury, and the rest to
    /// the validator organization. Advances the inflation clock and clears
    /// the readiness flag.
    pub fn apply_inflation(&mut self, rt: &mut dyn Runtime, from: &Address) -> Result<()> {
        expect(self.inflation_ready, "inflation not ready")?;
        expect(rt.is_root_chain(), "only on root chain")?;

        let mut supply = rt.token_supply(STAKING_SYMBOL);
        if supply < MIN_STAKING_SUPPLY {
            supply = MIN_STAKING_SUPPLY;
        }

        let mut inflation_amount = supply / INFLATION_DIVISOR;
        expect(inflation_amount > 0, "invalid inflation amount")?;
        let mut minted_amount: u128 = 0;

        // Masters enrolled at or before the last inflation; a last-minute
        // join does not earn this epoch's reward.
        let masters = rt
            .organization(MASTERS_ORG)
            .map(|org| org.members)
            .unwrap_or_default();
        let mut reward_list = Vec::new();
        for addr in masters {
            let master_date = rt.master_since(&addr)?;
            if master_date <= self.last_inflation {
                reward_list.push(addr);
            }
        }

        if !reward_list.is_empty() {
            let count = reward_list.len() as u128;

            let reward_stake = (inflation_amount / MASTER_REWARD_DIVISOR) / count;
            let reward_amount = count * reward_stake; // eliminate leftovers

            let reward_fuel = self.reward_accum / count;
            self.reward_accum = self
                .reward_accum
                .checked_sub(count * reward_fuel)
                .ok_or_else(|| Error::Expect("invalid reward leftover".to_string()))?;

            let engine_address = self.address.clone();
            rt.mint(STAKING_SYMBOL, &engine_address, reward_amount)?;
            minted_amount += reward_amount;

            let crown_address = Address::crown_contract();
            rt.mint(STAKING_SYMBOL, &crown_address, CROWN_SIDE_STAKE)?;
            rt.stake(&crown_address, CROWN_SIDE_STAKE)?;
            minted_amount += CROWN_SIDE_STAKE;

            for addr in &reward_list {
                let reward = StakeReward {
                    owner: addr.clone(),
                    date: rt.time(),
                };
                let rom = bincode::serialize(&reward)?;

                let token_id = rt.mint_instance(REWARD_SYMBOL, &engine_address, rom)?;
                rt.infuse_instance(
                    REWARD_SYMBOL,
                    &engine_address,
                    token_id,
                    FUEL_SYMBOL,
                    reward_fuel,
                )?;
                rt.infuse_instance(
                    REWARD_SYMBOL,
                    &engine_address,
                    token_id,
                    STAKING_SYMBOL,
                    reward_stake,
                )?;
                rt.transfer_instance(REWARD_SYMBOL, &engine_address, addr, token_id)?;
            }

            inflation_amount -= reward_amount;
            inflation_amount -= CROWN_SIDE_STAKE;
        }

        let refill_amount = inflation_amount / SWAP_REFILL_DIVISOR;
        rt.mint(STAKING_SYMBOL, &Address::swap_contract(), refill_amount)?;
        minted_amount += refill_amount;
        inflation_amount -= refill_amount;

        if let Some(reserve_org) = rt.organization(RESERVE_ORG) {
            let reserve_funding = inflation_amount / RESERVE_DIVISOR;
            rt.mint(STAKING_SYMBOL, &reserve_org.address, reserve_funding)?;
            minted_amount += reserve_funding;
            inflation_amount -= reserve_funding;

            // single-member orgs cannot distribute, staking is equivalent
            if reserve_org.size() == 1 {
                rt.stake(&reserve_org.address, reserve_funding)?;
            }
        }

        if let Some(validators_org) = rt.organization(VALIDATORS_ORG) {
            rt.mint(STAKING_SYMBOL, &validators_org.address, inflation_amount)?;
            minted_amount += inflation_amount;

            if validators_org.size() == 1 {
                rt.stake(&validators_org.address, inflation_amount)?;
            }
        }

        rt.notify(
            EventKind::Inflation,
            from.clone(),
            EventData::Token(TokenEventData {
                symbol: STAKING_SYMBOL.to_string(),
                value: minted_amount,
                chain: rt.chain_name(),
            }),
        );

        self.last_inflation = rt.time();
        self.inflation_ready = false;
        Ok(())
    }
}
