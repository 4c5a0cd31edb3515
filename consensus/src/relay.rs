//! System transaction relay
//!
//! The proposer pushes regenerated system transactions back into the
//! CometBFT mempool over RPC. Submission is retried with exponential
//! backoff until it succeeds or the transaction is observed delivered in a
//! block, whichever comes first.

use crate::state::NodeState;
use crate::{Error, Result};
use async_trait::async_trait;
use chain_core::TxHash;
use std::sync::Arc;
use std::time::Duration;
use tendermint_rpc::{Client, HttpClient};
use tokio::sync::watch;
use tracing::{info, warn};

/// Transaction submission endpoint. Production uses the CometBFT RPC;
/// tests substitute a recorder.
#[async_trait]
pub trait TxRelay: Send + Sync {
    /// Submit raw transaction bytes to the mempool
    async fn broadcast(&self, raw: Vec<u8>) -> Result<()>;
}

/// Relay backed by the local CometBFT node's RPC endpoint
pub struct HttpRelay {
    client: HttpClient,
    endpoint: String,
}

impl std::fmt::Debug for HttpRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRelay")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl HttpRelay {
    /// Connect to the CometBFT RPC at `endpoint`
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = HttpClient::new(endpoint)
            .map_err(|e| Error::Relay(format!("invalid RPC endpoint {}: {}", endpoint, e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl TxRelay for HttpRelay {
    async fn broadcast(&self, raw: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .broadcast_tx_sync(raw)
            .await
            .map_err(|e| Error::Relay(format!("broadcast failed: {}", e)))?;

        if response.code.is_err() {
            return Err(Error::Relay(format!(
                "mempool rejected transaction: code={:?} log={}",
                response.code, response.log
            )));
        }
        Ok(())
    }
}

/// Supervised retry loop around a [`TxRelay`].
///
/// Each transaction gets its own task: attempts back off exponentially up
/// to a cap, and the task exits early when block delivery removes the
/// transaction from the node's broadcast list. A height change wakes
/// sleeping tasks so the delivery check runs at least once per block.
pub struct RetryBroadcaster {
    relay: Arc<dyn TxRelay>,
    state: Arc<NodeState>,
    height_rx: watch::Receiver<u64>,
    handle: tokio::runtime::Handle,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl std::fmt::Debug for RetryBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryBroadcaster")
            .field("initial_backoff", &self.initial_backoff)
            .field("max_backoff", &self.max_backoff)
            .finish_non_exhaustive()
    }
}

impl RetryBroadcaster {
    /// Create a broadcaster bound to the current tokio runtime
    pub fn new(
        relay: Arc<dyn TxRelay>,
        state: Arc<NodeState>,
        height_rx: watch::Receiver<u64>,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            relay,
            state,
            height_rx,
            handle: tokio::runtime::Handle::current(),
            initial_backoff,
            max_backoff,
        }
    }

    /// Spawn the retry task for one transaction
    pub fn submit(&self, hash: TxHash, raw: Vec<u8>) -> tokio::task::JoinHandle<()> {
        let relay = self.relay.clone();
        let state = self.state.clone();
        let mut height_rx = self.height_rx.clone();
        let initial = self.initial_backoff;
        let max = self.max_backoff;

        self.handle.spawn(async move {
            let mut backoff = initial;
            loop {
                if !state.awaiting_delivery(&hash) {
                    info!(%hash, "transaction delivered, stopping relay");
                    return;
                }

                match relay.broadcast(raw.clone()).await {
                    Ok(()) => {
                        info!(%hash, "system transaction accepted by mempool");
                        return;
                    }
                    Err(e) => {
                        warn!(%hash, backoff_ms = backoff.as_millis() as u64,
                            "relay attempt failed: {}", e);
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = height_rx.changed() => {}
                }
                backoff = (backoff * 2).min(max);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::{Address, Transaction, TxPayload};
    use parking_lot::Mutex;

    struct FlakyRelay {
        failures_left: Mutex<u32>,
        attempts: Mutex<u32>,
    }

    #[async_trait]
    impl TxRelay for FlakyRelay {
        async fn broadcast(&self, _raw: Vec<u8>) -> Result<()> {
            *self.attempts.lock() += 1;
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(Error::Relay("connection refused".to_string()));
            }
            Ok(())
        }
    }

    fn system_tx() -> Transaction {
        Transaction {
            payload: TxPayload::ApplyInflation,
            signer: Address::system("chain"),
            gas_payer: Address::system("chain"),
            gas_target: Address::null(),
            gas_price: 0,
            gas_limit: 0,
            nonce: 1,
        }
    }

    #[tokio::test]
    async fn test_retries_until_accepted() {
        let relay = Arc::new(FlakyRelay {
            failures_left: Mutex::new(2),
            attempts: Mutex::new(0),
        });
        let state = Arc::new(NodeState::new());
        let (_height_tx, height_rx) = watch::channel(0u64);

        let tx = system_tx();
        state.record_broadcast(&tx);

        let broadcaster = RetryBroadcaster::new(
            relay.clone(),
            state,
            height_rx,
            Duration::from_millis(1),
            Duration::from_millis(4),
        );
        broadcaster
            .submit(tx.hash(), tx.to_bytes().unwrap())
            .await
            .unwrap();

        assert_eq!(*relay.attempts.lock(), 3);
    }

    #[tokio::test]
    async fn test_delivery_cancels_retry() {
        let relay = Arc::new(FlakyRelay {
            failures_left: Mutex::new(u32::MAX),
            attempts: Mutex::new(0),
        });
        let state = Arc::new(NodeState::new());
        let (_height_tx, height_rx) = watch::channel(0u64);

        let tx = system_tx();
        state.record_broadcast(&tx);

        let broadcaster = RetryBroadcaster::new(
            relay.clone(),
            state.clone(),
            height_rx,
            Duration::from_millis(1),
            Duration::from_millis(4),
        );
        let task = broadcaster.submit(tx.hash(), tx.to_bytes().unwrap());

        // another node got the transaction into a block
        state.mark_delivered(&tx.hash());
        task.await.unwrap();
    }
}
