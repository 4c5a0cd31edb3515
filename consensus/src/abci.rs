//! ABCI Application implementation
//!
//! Implements the Application BlockChain Interface for CometBFT. The
//! application is a thin adapter: ledger semantics live behind the
//! [`Chain`] trait, and the only node-local behavior added here is the
//! system-transaction queue with proposer-only relay.
//!
//! ABCI callbacks must never panic or return errors to the consensus
//! engine; failures are logged and mapped to safe defaults.

use crate::config::Config;
use crate::relay::{RetryBroadcaster, TxRelay};
use crate::state::NodeState;
use chain_core::{Address, Chain, Event, Timestamp};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tendermint_abci::Application;
use tendermint_proto::abci::{
    CheckTxType, Event as ProtoEvent, EventAttribute, RequestBeginBlock, RequestCheckTx,
    RequestDeliverTx, RequestEndBlock, RequestInfo, RequestInitChain, RequestQuery,
    ResponseBeginBlock, ResponseCheckTx, ResponseCommit, ResponseDeliverTx, ResponseEndBlock,
    ResponseInfo, ResponseInitChain, ResponseQuery, ValidatorUpdate as ProtoValidatorUpdate,
};
use tendermint_proto::crypto::{public_key::Sum, PublicKey};
use tokio::sync::watch;
use tracing::{info, warn};

/// Priority slot for system transactions regenerated at begin-block; the
/// genesis transactions staged by init-chain occupy the slots below it
const REGENERATED_TX_BASE: u32 = 100;

/// Chain ABCI application
#[derive(Clone)]
pub struct ChainApp {
    /// Ledger pipeline
    chain: Arc<dyn Chain>,

    /// Node-local queue and broadcast bookkeeping
    state: Arc<NodeState>,

    /// Retrying relay for system transactions
    broadcaster: Arc<RetryBroadcaster>,

    /// This node's validator address as it appears in block headers
    identity: String,

    /// Genesis validator accounts from configuration
    genesis_validators: Vec<Address>,

    /// Height notifications for relay tasks
    height_tx: Arc<watch::Sender<u64>>,
}

impl std::fmt::Debug for ChainApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainApp")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl ChainApp {
    /// Create the ABCI application. Must run inside a tokio runtime, which
    /// the relay tasks attach to.
    pub fn new(chain: Arc<dyn Chain>, relay: Arc<dyn TxRelay>, config: &Config) -> Self {
        let state = Arc::new(NodeState::new());
        let (height_tx, height_rx) = watch::channel(0u64);
        let broadcaster = Arc::new(RetryBroadcaster::new(
            relay,
            state.clone(),
            height_rx,
            Duration::from_millis(config.relay.initial_backoff_ms),
            Duration::from_millis(config.relay.max_backoff_ms),
        ));
        let genesis_validators = config
            .chain
            .genesis_validators
            .iter()
            .map(|id| Address::user(id))
            .collect();

        Self {
            chain,
            state,
            broadcaster,
            identity: config.validator_address.to_uppercase(),
            genesis_validators,
            height_tx: Arc::new(height_tx),
        }
    }

    /// Node-local state, exposed for inspection
    pub fn state(&self) -> Arc<NodeState> {
        self.state.clone()
    }

    /// Drain the queue and hand each transaction to the relay; anything
    /// already broadcast and still awaiting delivery is skipped
    fn broadcast_queue(&self) {
        for tx in self.state.drain_queue() {
            if !self.state.record_broadcast(&tx) {
                continue;
            }
            match tx.to_bytes() {
                Ok(raw) => {
                    info!(hash = %tx.hash(), "relaying system transaction");
                    self.broadcaster.submit(tx.hash(), raw);
                }
                Err(e) => {
                    warn!("failed to encode system transaction: {}", e);
                }
            }
        }
    }
}

impl Application for ChainApp {
    /// Info - report the last committed height for replay sync; the app
    /// hash stays decoupled from the ledger digest
    fn info(&self, _request: RequestInfo) -> ResponseInfo {
        let height = self.chain.last_height();

        info!(height, "info request");

        ResponseInfo {
            data: "Halcyon Chain".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            app_version: 1,
            last_block_height: height as i64,
            ..Default::default()
        }
    }

    /// InitChain - stage the genesis system transactions
    fn init_chain(&self, request: RequestInitChain) -> ResponseInitChain {
        info!(
            chain_id = %request.chain_id,
            validators = self.genesis_validators.len(),
            "init chain"
        );

        if !self.chain.has_genesis() {
            let time = request
                .time
                .as_ref()
                .map(|t| Timestamp(t.seconds.max(0) as u64))
                .unwrap_or(Timestamp::ZERO);

            match self.chain.create_genesis(time, &self.genesis_validators) {
                Ok(txs) => self.state.stage(txs),
                Err(e) => warn!("failed to create genesis transactions: {}", e),
            }
        }

        self.state.set_app_hash(vec![0u8; 32]);

        ResponseInitChain {
            consensus_params: request.consensus_params,
            validators: request.validators,
            app_hash: vec![0u8; 32].into(),
        }
    }

    /// CheckTx - stateless admission check, no ledger mutation
    fn check_tx(&self, request: RequestCheckTx) -> ResponseCheckTx {
        // rechecks of transactions already admitted are waved through
        if request.r#type != CheckTxType::New as i32 {
            return ResponseCheckTx::default();
        }
        let (code, log) = self.chain.check_tx(&request.tx);
        ResponseCheckTx {
            code: code as u32,
            log,
            ..Default::default()
        }
    }

    /// BeginBlock - advance logical time, regenerate system transactions
    /// and, on the proposer only, push them to the mempool
    fn begin_block(&self, request: RequestBeginBlock) -> ResponseBeginBlock {
        let header = match request.header {
            Some(header) => header,
            None => {
                warn!("begin block without header");
                return ResponseBeginBlock::default();
            }
        };

        let height = header.height.max(0) as u64;
        let time = header
            .time
            .as_ref()
            .map(|t| Timestamp(t.seconds.max(0) as u64))
            .unwrap_or(Timestamp::ZERO);
        let proposer = hex::encode_upper(&header.proposer_address);

        self.state.set_height(height);
        let _ = self.height_tx.send(height);

        // the proposer broadcasts what was staged for this height before
        // anything new is queued
        let is_proposer = !self.identity.is_empty() && proposer == self.identity;
        if is_proposer {
            self.broadcast_queue();
        }

        // every node regenerates the next round's system transactions; only
        // the proposer stages them for broadcast, everyone else drops them
        match self.chain.begin_block(height, &proposer, time) {
            Ok(system_txs) => {
                if is_proposer {
                    let mut staged = BTreeMap::new();
                    for (i, tx) in system_txs.into_iter().enumerate() {
                        staged.insert(REGENERATED_TX_BASE + i as u32, tx);
                    }
                    self.state.stage(staged);
                } else {
                    self.state.clear_queue();
                }
            }
            Err(e) => {
                warn!(height, "begin block failed: {}", e);
            }
        }

        ResponseBeginBlock::default()
    }

    /// DeliverTx - execute a transaction and clear queue bookkeeping
    fn deliver_tx(&self, request: RequestDeliverTx) -> ResponseDeliverTx {
        let result = self.chain.deliver_tx(&request.tx);

        if self.state.mark_delivered(&result.hash) {
            info!(hash = %result.hash, "queued system transaction delivered");
        }

        ResponseDeliverTx {
            code: result.code,
            data: result.data.into(),
            log: result.log,
            events: result.events.iter().map(event_to_proto).collect(),
            codespace: result.codespace,
            ..Default::default()
        }
    }

    /// EndBlock - report validator set changes
    fn end_block(&self, request: RequestEndBlock) -> ResponseEndBlock {
        let height = request.height.max(0) as u64;
        match self.chain.end_block(height) {
            Ok(updates) => ResponseEndBlock {
                validator_updates: updates
                    .into_iter()
                    .map(|u| ProtoValidatorUpdate {
                        pub_key: Some(PublicKey {
                            sum: Some(Sum::Ed25519(u.pub_key.into())),
                        }),
                        power: u.power,
                    })
                    .collect(),
                ..Default::default()
            },
            Err(e) => {
                warn!(height, "end block failed: {}", e);
                ResponseEndBlock::default()
            }
        }
    }

    /// Commit - finalize the height. The ledger digest is kept for local
    /// inspection but deliberately not exposed as the consensus app hash.
    fn commit(&self) -> ResponseCommit {
        match self.chain.commit() {
            Ok(digest) => {
                self.state.set_app_hash(digest);
            }
            Err(e) => {
                warn!("commit failed: {}", e);
            }
        }
        ResponseCommit::default()
    }

    /// Query - read-only node status
    fn query(&self, request: RequestQuery) -> ResponseQuery {
        match request.path.as_str() {
            "/status" => {
                let status = serde_json::json!({
                    "height": self.chain.last_height(),
                    "app_hash": hex::encode(self.state.app_hash()),
                    "pending_system_txs": self.state.pending_len(),
                });
                ResponseQuery {
                    code: 0,
                    value: status.to_string().into_bytes().into(),
                    ..Default::default()
                }
            }
            other => ResponseQuery {
                code: 1,
                log: format!("unknown query path: {}", other),
                ..Default::default()
            },
        }
    }
}

/// Map a ledger event onto the ABCI wire representation
fn event_to_proto(event: &Event) -> ProtoEvent {
    let data = serde_json::to_string(&event.data).unwrap_or_default();
    ProtoEvent {
        r#type: event.kind.to_string(),
        attributes: vec![
            EventAttribute {
                key: "address".to_string(),
                value: event.address.to_string(),
                index: true,
            },
            EventAttribute {
                key: "contract".to_string(),
                value: event.contract.clone(),
                index: false,
            },
            EventAttribute {
                key: "data".to_string(),
                value: data,
                index: false,
            },
        ],
    }
}
