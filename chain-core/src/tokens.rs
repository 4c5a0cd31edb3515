//! In-memory token, organization and staking books
//!
//! The persistent key-value engine sits below this crate; the pipeline keeps
//! its working state in deterministic ordered maps so that serializing a
//! snapshot yields identical bytes on every validator.

use crate::error::{expect, Error, Result};
use crate::runtime::OrgView;
use crate::types::{to_base_units, Address, Timestamp, MASTERS_ORG, STAKING_SYMBOL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stake required before an account counts as a stake-master (base units)
pub const MASTER_THRESHOLD: u128 = to_base_units(50_000);

/// A unique token instance with infused fungible value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Token symbol the instance belongs to
    pub symbol: String,
    /// Current owner
    pub owner: Address,
    /// Opaque payload written at mint time
    pub payload: Vec<u8>,
    /// Fungible value locked inside the instance, per symbol
    pub infused: BTreeMap<String, u128>,
}

/// Fungible balances, supplies and unique instances
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenBook {
    balances: BTreeMap<String, BTreeMap<Address, u128>>,
    supplies: BTreeMap<String, u128>,
    instances: BTreeMap<u64, Instance>,
    next_instance_id: u64,
}

impl TokenBook {
    /// Empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `addr`, zero for unknown accounts
    pub fn balance(&self, symbol: &str, addr: &Address) -> u128 {
        self.balances
            .get(symbol)
            .and_then(|m| m.get(addr))
            .copied()
            .unwrap_or(0)
    }

    /// Total supply of `symbol`
    pub fn supply(&self, symbol: &str) -> u128 {
        self.supplies.get(symbol).copied().unwrap_or(0)
    }

    /// Move tokens between accounts
    pub fn transfer(
        &mut self,
        symbol: &str,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<()> {
        let available = self.balance(symbol, from);
        if available < amount {
            return Err(Error::InsufficientBalance {
                token: symbol.to_string(),
                address: from.clone(),
                shortfall: amount - available,
            });
        }
        self.debit(symbol, from, amount);
        self.credit(symbol, to, amount);
        Ok(())
    }

    /// Create new supply credited to `to`
    pub fn mint(&mut self, symbol: &str, to: &Address, amount: u128) -> Result<()> {
        let supply = self.supplies.entry(symbol.to_string()).or_insert(0);
        *supply = supply
            .checked_add(amount)
            .ok_or_else(|| Error::Expect(format!("{} supply overflow", symbol)))?;
        self.credit(symbol, to, amount);
        Ok(())
    }

    /// Destroy supply held by `from`
    pub fn burn(&mut self, symbol: &str, from: &Address, amount: u128) -> Result<()> {
        let available = self.balance(symbol, from);
        if available < amount {
            return Err(Error::InsufficientBalance {
                token: symbol.to_string(),
                address: from.clone(),
                shortfall: amount - available,
            });
        }
        self.debit(symbol, from, amount);
        let supply = self.supplies.entry(symbol.to_string()).or_insert(0);
        *supply = supply.saturating_sub(amount);
        Ok(())
    }

    /// Mint a unique token instance owned by `to`
    pub fn mint_instance(&mut self, symbol: &str, to: &Address, payload: Vec<u8>) -> u64 {
        let id = self.next_instance_id;
        self.next_instance_id += 1;
        self.instances.insert(
            id,
            Instance {
                symbol: symbol.to_string(),
                owner: to.clone(),
                payload,
                infused: BTreeMap::new(),
            },
        );
        id
    }

    /// Lock fungible value from `from` inside instance `id`
    pub fn infuse(
        &mut self,
        symbol: &str,
        from: &Address,
        id: u64,
        infused_symbol: &str,
        amount: u128,
    ) -> Result<()> {
        let available = self.balance(infused_symbol, from);
        if available < amount {
            return Err(Error::InsufficientBalance {
                token: infused_symbol.to_string(),
                address: from.clone(),
                shortfall: amount - available,
            });
        }
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or_else(|| Error::Expect(format!("unknown {} instance {}", symbol, id)))?;
        expect(instance.symbol == symbol, "instance symbol mismatch")?;

        // tokens leave circulation into the instance; supply is unchanged
        let balances = self
            .balances
            .get_mut(infused_symbol)
            .ok_or_else(|| Error::Expect(format!("unknown token {}", infused_symbol)))?;
        let entry = balances.entry(from.clone()).or_insert(0);
        *entry -= amount;
        *instance.infused.entry(infused_symbol.to_string()).or_insert(0) += amount;
        Ok(())
    }

    /// Transfer ownership of instance `id`
    pub fn transfer_instance(
        &mut self,
        symbol: &str,
        from: &Address,
        to: &Address,
        id: u64,
    ) -> Result<()> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or_else(|| Error::Expect(format!("unknown {} instance {}", symbol, id)))?;
        expect(instance.symbol == symbol, "instance symbol mismatch")?;
        expect(
            &instance.owner == from,
            format!("instance {} not owned by {}", id, from),
        )?;
        instance.owner = to.clone();
        Ok(())
    }

    /// Look up a unique instance
    pub fn instance(&self, id: u64) -> Option<&Instance> {
        self.instances.get(&id)
    }

    /// Instances currently owned by `owner`
    pub fn instances_of(&self, owner: &Address) -> Vec<u64> {
        self.instances
            .iter()
            .filter(|(_, inst)| &inst.owner == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    fn credit(&mut self, symbol: &str, addr: &Address, amount: u128) {
        *self
            .balances
            .entry(symbol.to_string())
            .or_default()
            .entry(addr.clone())
            .or_insert(0) += amount;
    }

    fn debit(&mut self, symbol: &str, addr: &Address, amount: u128) {
        if let Some(balances) = self.balances.get_mut(symbol) {
            if let Some(entry) = balances.get_mut(addr) {
                *entry -= amount;
            }
        }
    }
}

/// Organization registry (membership is owned externally; the engine only
/// reads it, the pipeline maintains it)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgBook {
    orgs: BTreeMap<String, OrgView>,
}

impl OrgBook {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace an organization
    pub fn create(&mut self, name: &str, address: Address, members: Vec<Address>) {
        self.orgs.insert(name.to_string(), OrgView { address, members });
    }

    /// Look up an organization by name
    pub fn get(&self, name: &str) -> Option<OrgView> {
        self.orgs.get(name).cloned()
    }

    /// Add a member if not already present
    pub fn add_member(&mut self, name: &str, member: Address) {
        if let Some(org) = self.orgs.get_mut(name) {
            if !org.members.contains(&member) {
                org.members.push(member);
            }
        }
    }
}

/// Staking contract bookkeeping: staked balances and master enrollment dates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StakeBook {
    stakes: BTreeMap<Address, u128>,
    master_since: BTreeMap<Address, Timestamp>,
}

impl StakeBook {
    /// Empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Staked balance of `addr`
    pub fn staked(&self, addr: &Address) -> u128 {
        self.stakes.get(addr).copied().unwrap_or(0)
    }

    /// When `addr` first crossed the master threshold
    pub fn master_since(&self, addr: &Address) -> Option<Timestamp> {
        self.master_since.get(addr).copied()
    }

    /// Stake `amount` of staking token from `addr`.
    ///
    /// Moves the tokens into the staking contract account and enrolls the
    /// staker as a master (recording `now`) the first time its total stake
    /// crosses the threshold.
    pub fn stake(
        &mut self,
        tokens: &mut TokenBook,
        orgs: &mut OrgBook,
        addr: &Address,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        expect(amount > 0, "stake amount must be positive")?;
        tokens.transfer(STAKING_SYMBOL, addr, &Address::stake_contract(), amount)?;
        let total = self.stakes.entry(addr.clone()).or_insert(0);
        *total += amount;
        if *total >= MASTER_THRESHOLD && !self.master_since.contains_key(addr) {
            self.master_since.insert(addr.clone(), now);
            orgs.add_member(MASTERS_ORG, addr.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FUEL_SYMBOL;

    #[test]
    fn test_mint_transfer_burn() {
        let mut book = TokenBook::new();
        let alice = Address::user("alice");
        let bob = Address::user("bob");

        book.mint(FUEL_SYMBOL, &alice, 1_000).unwrap();
        assert_eq!(book.supply(FUEL_SYMBOL), 1_000);

        book.transfer(FUEL_SYMBOL, &alice, &bob, 400).unwrap();
        assert_eq!(book.balance(FUEL_SYMBOL, &alice), 600);
        assert_eq!(book.balance(FUEL_SYMBOL, &bob), 400);

        book.burn(FUEL_SYMBOL, &bob, 100).unwrap();
        assert_eq!(book.supply(FUEL_SYMBOL), 900);
        assert_eq!(book.balance(FUEL_SYMBOL, &bob), 300);
    }

    #[test]
    fn test_transfer_shortfall_reported_exactly() {
        let mut book = TokenBook::new();
        let alice = Address::user("alice");
        book.mint(FUEL_SYMBOL, &alice, 100).unwrap();

        let err = book
            .transfer(FUEL_SYMBOL, &alice, &Address::user("bob"), 250)
            .unwrap_err();
        match err {
            Error::InsufficientBalance { shortfall, .. } => assert_eq!(shortfall, 150),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_instance_lifecycle() {
        let mut book = TokenBook::new();
        let engine = Address::gas_contract();
        let alice = Address::user("alice");

        book.mint(FUEL_SYMBOL, &engine, 500).unwrap();
        let id = book.mint_instance("CROWN", &engine, vec![1, 2, 3]);
        book.infuse("CROWN", &engine, id, FUEL_SYMBOL, 200).unwrap();
        book.transfer_instance("CROWN", &engine, &alice, id).unwrap();

        let inst = book.instance(id).unwrap();
        assert_eq!(inst.owner, alice);
        assert_eq!(inst.infused[FUEL_SYMBOL], 200);
        assert_eq!(book.balance(FUEL_SYMBOL, &engine), 300);
        // infusion keeps supply intact
        assert_eq!(book.supply(FUEL_SYMBOL), 500);
        assert_eq!(book.instances_of(&alice), vec![id]);
    }

    #[test]
    fn test_stake_enrolls_master_once() {
        let mut tokens = TokenBook::new();
        let mut orgs = OrgBook::new();
        let mut stakes = StakeBook::new();
        orgs.create(MASTERS_ORG, Address::system("masters"), vec![]);

        let alice = Address::user("alice");
        tokens
            .mint(STAKING_SYMBOL, &alice, MASTER_THRESHOLD * 2)
            .unwrap();

        stakes
            .stake(&mut tokens, &mut orgs, &alice, MASTER_THRESHOLD - 1, Timestamp(100))
            .unwrap();
        assert!(stakes.master_since(&alice).is_none());

        stakes
            .stake(&mut tokens, &mut orgs, &alice, 1, Timestamp(200))
            .unwrap();
        assert_eq!(stakes.master_since(&alice), Some(Timestamp(200)));
        assert_eq!(orgs.get(MASTERS_ORG).unwrap().members, vec![alice.clone()]);

        // enrollment date does not move on further staking
        stakes
            .stake(&mut tokens, &mut orgs, &alice, 100, Timestamp(300))
            .unwrap();
        assert_eq!(stakes.master_since(&alice), Some(Timestamp(200)));
        assert_eq!(orgs.get(MASTERS_ORG).unwrap().size(), 1);
    }
}
