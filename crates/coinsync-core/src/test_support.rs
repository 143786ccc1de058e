//! In-process ledger for unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::ledger::{
    AddressFilter, BalanceChange, CheckpointRecord, Command, GasCost, LedgerClient, MoveCall, Owner,
    TransactionKind, TransactionPage, TransactionRecord, TxLocator,
};

pub(crate) const COIN: &str = "0xc0ffee::chirp::CHIRP";

/// A transaction moving the tracked coin: one balance change per
/// `(owner, amount)` pair, optionally calling `function`.
pub(crate) fn chirp_tx(
    digest: &str,
    sender: &str,
    changes: &[(&str, &str)],
    function: Option<&str>,
) -> TransactionRecord {
    let mut commands = vec![Command::Other("SplitCoins".into())];
    if let Some(f) = function {
        commands.push(Command::MoveCall(MoveCall {
            package: "0xc0ffee".into(),
            module: "airdrop".into(),
            function: f.into(),
        }));
    }
    TransactionRecord {
        digest: digest.into(),
        sender: sender.into(),
        kind: TransactionKind::Programmable { commands },
        success: true,
        gas: GasCost {
            computation: 1_000,
            storage: 500,
            rebate: 200,
        },
        events: vec![],
        balance_changes: changes
            .iter()
            .map(|(owner, amount)| BalanceChange {
                owner: Owner::Address(owner.to_string()),
                coin_type: COIN.into(),
                amount: amount.to_string(),
            })
            .collect(),
        timestamp_ms: None,
        checkpoint: None,
    }
}

#[derive(Default)]
struct State {
    latest: u64,
    checkpoints: BTreeMap<u64, CheckpointRecord>,
    transactions: HashMap<String, TransactionRecord>,
    pages: HashMap<(String, Option<String>), TransactionPage>,
    failing_checkpoints: HashSet<u64>,
    failing_transactions: HashSet<String>,
    malformed_transactions: HashSet<String>,
    delay: Option<Duration>,
    cancel_on: Option<(String, CancellationToken)>,
}

/// Scripted [`LedgerClient`] with call counters.
#[derive(Default)]
pub(crate) struct ScriptedLedger {
    state: Mutex<State>,
    tx_calls: AtomicUsize,
    checkpoint_calls: AtomicUsize,
    page_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Add a checkpoint holding `txs` and move the head up to it.
    pub(crate) fn push_checkpoint(&self, seq: u64, timestamp_ms: u64, txs: Vec<TransactionRecord>) {
        let mut st = self.state();
        st.checkpoints.insert(
            seq,
            CheckpointRecord {
                sequence_number: seq,
                timestamp_ms,
                transactions: txs.iter().map(|t| t.digest.clone()).collect(),
            },
        );
        for tx in txs {
            st.transactions.insert(tx.digest.clone(), tx);
        }
        st.latest = st.latest.max(seq);
    }

    /// Move the head without adding content (empty checkpoints).
    pub(crate) fn set_latest(&self, seq: u64) {
        self.state().latest = seq;
    }

    pub(crate) fn push_page(&self, filter: &AddressFilter, cursor: Option<&str>, page: TransactionPage) {
        self.state()
            .pages
            .insert((filter.to_string(), cursor.map(str::to_string)), page);
    }

    pub(crate) fn checkpoint_locators(&self, seq: u64) -> Vec<TxLocator> {
        let st = self.state();
        st.checkpoints
            .get(&seq)
            .map(|cp| {
                cp.transactions
                    .iter()
                    .map(|d| TxLocator {
                        digest: d.clone(),
                        checkpoint: Some(cp.sequence_number),
                        timestamp_ms: Some(cp.timestamp_ms),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn transaction(&self, digest: &str) -> Option<TransactionRecord> {
        self.state().transactions.get(digest).cloned()
    }

    pub(crate) fn fail_checkpoint(&self, seq: u64) {
        self.state().failing_checkpoints.insert(seq);
    }

    pub(crate) fn heal_checkpoint(&self, seq: u64) {
        self.state().failing_checkpoints.remove(&seq);
    }

    pub(crate) fn fail_transaction(&self, digest: &str) {
        self.state().failing_transactions.insert(digest.into());
    }

    pub(crate) fn malform_transaction(&self, digest: &str) {
        self.state().malformed_transactions.insert(digest.into());
    }

    /// Cancel `token` while the read of `digest` is in flight.
    pub(crate) fn cancel_during(&self, digest: &str, token: &CancellationToken) {
        self.state().cancel_on = Some((digest.into(), token.clone()));
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    pub(crate) fn transaction_calls(&self) -> usize {
        self.tx_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn checkpoint_calls(&self) -> usize {
        self.checkpoint_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn latest_checkpoint(&self) -> Result<u64, SyncError> {
        Ok(self.state().latest)
    }

    async fn get_checkpoint(&self, sequence: u64) -> Result<CheckpointRecord, SyncError> {
        self.checkpoint_calls.fetch_add(1, Ordering::SeqCst);
        let st = self.state();
        if st.failing_checkpoints.contains(&sequence) {
            return Err(SyncError::Ledger(format!("checkpoint {sequence} unavailable")));
        }
        Ok(st.checkpoints.get(&sequence).cloned().unwrap_or(CheckpointRecord {
            sequence_number: sequence,
            timestamp_ms: 1_700_000_000_000 + sequence,
            transactions: vec![],
        }))
    }

    async fn get_transaction(&self, digest: &str) -> Result<TransactionRecord, SyncError> {
        self.tx_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let (delay, cancel_on) = {
            let st = self.state();
            (st.delay, st.cancel_on.clone())
        };
        if let Some((target, token)) = cancel_on {
            if target == digest {
                token.cancel();
            }
        }
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let result = {
            let st = self.state();
            if st.failing_transactions.contains(digest) {
                Err(SyncError::Ledger("scripted failure".into()))
            } else if st.malformed_transactions.contains(digest) {
                Err(SyncError::Parse {
                    digest: digest.into(),
                    reason: "missing effects".into(),
                })
            } else {
                st.transactions
                    .get(digest)
                    .cloned()
                    .ok_or_else(|| SyncError::Ledger(format!("unknown digest {digest}")))
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn query_by_address(
        &self,
        filter: &AddressFilter,
        cursor: Option<String>,
        _limit: usize,
    ) -> Result<TransactionPage, SyncError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state()
            .pages
            .get(&(filter.to_string(), cursor))
            .cloned()
            .unwrap_or_default())
    }
}
