//! Chain-memo watcher — turns received shielded transactions into runs.
//!
//! Every cycle queries the chain for transactions received at each watched
//! address, decodes memos from hex, applies the trigger's memo/amount
//! filters, and dedups by txid in a per-trigger set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use clients::ChainRpc;
use queue::JobQueue;
use store::models::TriggerType;
use store::repository::{triggers, workflows};
use store::Store;

use crate::CHAIN_WATCH_INTERVAL;

pub struct ChainWatcher {
    store: Store,
    queue: JobQueue,
    chain: Arc<dyn ChainRpc>,
    /// Per-trigger set of txids already submitted.
    seen: HashMap<Uuid, HashSet<String>>,
}

/// Memos arrive hex-encoded and zero-padded; anything that is not valid
/// hex is passed through as-is.
fn decode_memo(raw: &str) -> String {
    match hex::decode(raw) {
        Ok(bytes) => String::from_utf8_lossy(&bytes)
            .trim_end_matches('\0')
            .to_owned(),
        Err(_) => raw.to_owned(),
    }
}

impl ChainWatcher {
    pub fn new(store: Store, queue: JobQueue, chain: Arc<dyn ChainRpc>) -> Self {
        Self {
            store,
            queue,
            chain,
            seen: HashMap::new(),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(CHAIN_WATCH_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => { self.tick().await; }
                _ = shutdown.changed() => if *shutdown.borrow() { return },
            }
        }
    }

    /// One watch cycle; returns the number of runs created.
    pub async fn tick(&mut self) -> usize {
        let active = match triggers::list_active(&self.store, TriggerType::ChainMemoWatch) {
            Ok(list) => list,
            Err(err) => {
                warn!("chain watch scan failed: {err}");
                return 0;
            }
        };

        let mut created = 0;
        for trigger in active {
            let Some(address) = trigger.config.get("address").and_then(Value::as_str) else {
                warn!(trigger_id = %trigger.id, "chain-memo-watch trigger has no address");
                continue;
            };
            let min_confirmations = trigger
                .config
                .get("minConfirmations")
                .and_then(Value::as_u64)
                .unwrap_or(1) as u32;
            let memo_pattern = trigger.config.get("memoPattern").and_then(Value::as_str);
            let min_amount = trigger.config.get("minAmount").and_then(Value::as_f64);

            let workflow = match workflows::find_published_for_trigger(&self.store, trigger.id) {
                Ok(Some(w)) => w,
                Ok(None) => continue,
                Err(err) => {
                    warn!("workflow lookup failed: {err}");
                    continue;
                }
            };

            let transactions = match self
                .chain
                .received_by_address(address, min_confirmations)
                .await
            {
                Ok(txs) => txs,
                Err(err) => {
                    warn!(trigger_id = %trigger.id, "chain query failed: {err}");
                    continue;
                }
            };

            let seen = self.seen.entry(trigger.id).or_default();
            for tx in transactions {
                if tx.confirmations < min_confirmations || seen.contains(&tx.txid) {
                    continue;
                }

                let memo = tx.memo.as_deref().map(decode_memo).unwrap_or_default();
                if let Some(pattern) = memo_pattern {
                    if !memo.contains(pattern) {
                        seen.insert(tx.txid.clone());
                        continue;
                    }
                }
                if let Some(min) = min_amount {
                    if tx.amount < min {
                        seen.insert(tx.txid.clone());
                        continue;
                    }
                }

                seen.insert(tx.txid.clone());
                let payload = json!({
                    "txid": tx.txid,
                    "amount": tx.amount,
                    "memo": memo,
                    "address": address,
                    "confirmations": tx.confirmations,
                    "blockheight": tx.blockheight,
                });
                match self.queue.create_run(workflow.id, Some(trigger.id), payload) {
                    Ok(run) => {
                        info!(run_id = %run.id, txid = %tx.txid, "chain memo matched");
                        created += 1;
                    }
                    Err(err) => warn!("chain run submission failed: {err}"),
                }
            }
        }
        created
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clients::{ClientError, OperationStatus, ReceivedTransaction, ShieldedSend};
    use queue::QueueConfig;
    use store::repository::runs;

    struct FixedChain {
        txs: Vec<ReceivedTransaction>,
    }

    #[async_trait]
    impl ChainRpc for FixedChain {
        async fn received_by_address(
            &self,
            _address: &str,
            _min_confirmations: u32,
        ) -> Result<Vec<ReceivedTransaction>, ClientError> {
            Ok(self.txs.clone())
        }

        async fn shielded_send(&self, _send: &ShieldedSend) -> Result<String, ClientError> {
            unimplemented!("watcher never sends")
        }

        async fn operation_status(
            &self,
            _operation_id: &str,
        ) -> Result<OperationStatus, ClientError> {
            unimplemented!("watcher never polls operations")
        }
    }

    fn tx(txid: &str, amount: f64, memo: &str, confirmations: u32) -> ReceivedTransaction {
        ReceivedTransaction {
            txid: txid.to_owned(),
            amount,
            memo: Some(hex::encode(memo.as_bytes())),
            confirmations,
            blockheight: Some(100),
        }
    }

    fn watch_setup(
        config: Value,
        txs: Vec<ReceivedTransaction>,
    ) -> (Store, ChainWatcher, Uuid, Uuid) {
        let store = Store::temporary().unwrap();
        let queue = JobQueue::new(store.clone(), QueueConfig::default());

        let trigger =
            triggers::create(&store, "t1", TriggerType::ChainMemoWatch, config, None).unwrap();
        let workflow =
            workflows::create(&store, "t1", "watch", json!({ "nodes": [] }), Some(trigger.id))
                .unwrap();
        workflows::publish(&store, workflow.id).unwrap();

        let watcher = ChainWatcher::new(store.clone(), queue, Arc::new(FixedChain { txs }));
        (store, watcher, workflow.id, trigger.id)
    }

    #[tokio::test]
    async fn duplicate_txids_produce_exactly_one_run() {
        let (store, mut watcher, workflow_id, _) = watch_setup(
            json!({ "address": "zs1watch" }),
            vec![tx("T", 1.0, "ORDER:42", 3)],
        );

        // Two poll cycles observe the same transaction.
        assert_eq!(watcher.tick().await, 1);
        assert_eq!(watcher.tick().await, 0);

        let created = runs::list_for_workflow(&store, workflow_id).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].payload["memo"], "ORDER:42");
        assert_eq!(created[0].payload["txid"], "T");
        assert_eq!(created[0].payload["amount"], 1.0);
    }

    #[tokio::test]
    async fn memo_pattern_and_min_amount_filter() {
        let (store, mut watcher, workflow_id, _) = watch_setup(
            json!({ "address": "zs1watch", "memoPattern": "ORDER", "minAmount": 0.5 }),
            vec![
                tx("T1", 1.0, "ORDER:1", 3),
                tx("T2", 1.0, "HELLO", 3),
                tx("T3", 0.1, "ORDER:2", 3),
            ],
        );

        assert_eq!(watcher.tick().await, 1);
        let created = runs::list_for_workflow(&store, workflow_id).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].payload["txid"], "T1");
    }

    #[tokio::test]
    async fn unconfirmed_transactions_are_ignored() {
        let (store, mut watcher, workflow_id, _) = watch_setup(
            json!({ "address": "zs1watch", "minConfirmations": 3 }),
            vec![tx("T", 1.0, "ORDER:1", 1)],
        );

        assert_eq!(watcher.tick().await, 0);
        assert!(runs::list_for_workflow(&store, workflow_id).unwrap().is_empty());
    }

    #[test]
    fn memo_decoding_trims_padding_and_passes_plain_text() {
        assert_eq!(decode_memo(&hex::encode(b"ORDER:42\0\0\0")), "ORDER:42");
        assert_eq!(decode_memo("not hex at all"), "not hex at all");
    }
}
