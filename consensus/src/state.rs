//! Node-local consensus bookkeeping
//!
//! Tracks the system transactions every node regenerates each height and
//! which of them this node has already pushed to the mempool. The ledger
//! itself lives in `chain-core`; nothing here is consensus state.

use chain_core::{Transaction, TxHash};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Shared node state used by the ABCI application and the relay tasks
#[derive(Debug)]
pub struct NodeState {
    /// System transactions awaiting delivery, keyed by priority
    system_txs: Mutex<BTreeMap<u32, Transaction>>,

    /// Transactions this node has handed to the relay but not yet seen
    /// delivered in a block
    broadcasted: Mutex<Vec<Transaction>>,

    /// Height of the block currently being processed
    height: Mutex<u64>,

    /// Ledger digest from the last commit, kept for local inspection only
    app_hash: Mutex<Vec<u8>>,
}

impl NodeState {
    /// Create empty node state
    pub fn new() -> Self {
        Self {
            system_txs: Mutex::new(BTreeMap::new()),
            broadcasted: Mutex::new(Vec::new()),
            height: Mutex::new(0),
            app_hash: Mutex::new(Vec::new()),
        }
    }

    /// Queue system transactions for the next broadcast. Entries at the
    /// same slot are replaced.
    pub fn stage(&self, txs: BTreeMap<u32, Transaction>) {
        self.system_txs.lock().extend(txs);
    }

    /// Pending system transactions in priority order
    pub fn pending(&self) -> Vec<Transaction> {
        self.system_txs.lock().values().cloned().collect()
    }

    /// Take every queued transaction in ascending slot order, leaving the
    /// queue empty
    pub fn drain_queue(&self) -> Vec<Transaction> {
        std::mem::take(&mut *self.system_txs.lock())
            .into_values()
            .collect()
    }

    /// Drop the queue without broadcasting (non-proposer heights)
    pub fn clear_queue(&self) {
        self.system_txs.lock().clear();
    }

    /// Number of queued system transactions
    pub fn pending_len(&self) -> usize {
        self.system_txs.lock().len()
    }

    /// Remember that `tx` was handed to the relay. Returns false if it was
    /// already broadcast, so a transaction is never relayed twice per queue
    /// entry.
    pub fn record_broadcast(&self, tx: &Transaction) -> bool {
        let mut broadcasted = self.broadcasted.lock();
        let hash = tx.hash();
        if broadcasted.iter().any(|b| b.hash() == hash) {
            return false;
        }
        broadcasted.push(tx.clone());
        true
    }

    /// Whether `hash` was broadcast and is still awaiting delivery
    pub fn awaiting_delivery(&self, hash: &TxHash) -> bool {
        self.broadcasted.lock().iter().any(|b| &b.hash() == hash)
    }

    /// Forget a delivered transaction on every node, proposer or not.
    /// Returns true if it was queued here.
    pub fn mark_delivered(&self, hash: &TxHash) -> bool {
        let mut known = false;

        let mut system_txs = self.system_txs.lock();
        let before = system_txs.len();
        system_txs.retain(|_, tx| &tx.hash() != hash);
        known |= system_txs.len() != before;
        drop(system_txs);

        let mut broadcasted = self.broadcasted.lock();
        let before = broadcasted.len();
        broadcasted.retain(|tx| &tx.hash() != hash);
        known |= broadcasted.len() != before;

        known
    }

    /// Height of the block currently being processed
    pub fn height(&self) -> u64 {
        *self.height.lock()
    }

    /// Record the height announced by `begin_block`
    pub fn set_height(&self, height: u64) {
        *self.height.lock() = height;
    }

    /// App hash of the last committed block
    pub fn app_hash(&self) -> Vec<u8> {
        self.app_hash.lock().clone()
    }

    /// Record the app hash returned by commit
    pub fn set_app_hash(&self, hash: Vec<u8>) {
        *self.app_hash.lock() = hash;
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::{Address, Timestamp, TxPayload};

    fn system_tx(nonce: u64) -> Transaction {
        Transaction {
            payload: TxPayload::ApplyInflation,
            signer: Address::system("chain"),
            gas_payer: Address::system("chain"),
            gas_target: Address::null(),
            gas_price: 0,
            gas_limit: 0,
            nonce,
        }
    }

    #[test]
    fn test_stage_is_idempotent() {
        let state = NodeState::new();
        let mut txs = BTreeMap::new();
        txs.insert(0, system_tx(5));

        state.stage(txs.clone());
        state.stage(txs);
        assert_eq!(state.pending_len(), 1);
    }

    #[test]
    fn test_drain_and_clear() {
        let state = NodeState::new();
        let mut txs = BTreeMap::new();
        txs.insert(3, system_tx(3));
        txs.insert(1, system_tx(1));
        state.stage(txs);

        // ascending slot order, queue left empty
        let drained = state.drain_queue();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].nonce, 1);
        assert_eq!(drained[1].nonce, 3);
        assert_eq!(state.pending_len(), 0);

        let mut txs = BTreeMap::new();
        txs.insert(0, system_tx(7));
        state.stage(txs);
        state.clear_queue();
        assert_eq!(state.pending_len(), 0);
    }

    #[test]
    fn test_broadcast_dedup() {
        let state = NodeState::new();
        let tx = system_tx(1);

        assert!(state.record_broadcast(&tx));
        assert!(!state.record_broadcast(&tx));
        assert!(state.awaiting_delivery(&tx.hash()));
    }

    #[test]
    fn test_delivery_clears_queue_and_broadcast_list() {
        let state = NodeState::new();
        let tx = system_tx(1);

        let mut txs = BTreeMap::new();
        txs.insert(0, tx.clone());
        state.stage(txs);
        state.record_broadcast(&tx);

        assert!(state.mark_delivered(&tx.hash()));
        assert_eq!(state.pending_len(), 0);
        assert!(!state.awaiting_delivery(&tx.hash()));

        // second delivery of the same hash is a no-op
        assert!(!state.mark_delivered(&tx.hash()));
    }

    #[test]
    fn test_delivery_clears_queue_on_non_broadcasting_node() {
        let state = NodeState::new();
        let tx = system_tx(1);

        let mut txs = BTreeMap::new();
        txs.insert(0, tx.clone());
        state.stage(txs);

        // this node never broadcast, the proposer did
        assert!(state.mark_delivered(&tx.hash()));
        assert_eq!(state.pending_len(), 0);
    }
}
