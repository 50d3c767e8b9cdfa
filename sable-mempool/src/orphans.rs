//! The orphan pool: transactions whose parents are not yet known.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tracing::trace;

use sable_chain::{transaction, transaction::Transaction};

use crate::policy::MAX_ORPHAN_TX;

/// Parked transactions, indexed both ways: by their own hash, and by the
/// missing parent hashes they are waiting on.
#[derive(Debug, Default)]
pub struct OrphanPool {
    orphans: HashMap<transaction::Hash, Arc<Transaction>>,
    waiting: HashMap<transaction::Hash, Vec<transaction::Hash>>,
}

impl OrphanPool {
    pub fn new() -> OrphanPool {
        OrphanPool::default()
    }

    pub fn has(&self, hash: &transaction::Hash) -> bool {
        self.orphans.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.orphans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty()
    }

    /// Park `tx` until the transactions in `missing` are known.
    ///
    /// When the pool is full a victim is chosen uniformly at random, and
    /// returned so the caller can report it.
    pub fn add(
        &mut self,
        tx: Arc<Transaction>,
        missing: Vec<transaction::Hash>,
    ) -> Option<transaction::Hash> {
        let hash = tx.hash();
        let mut evicted = None;
        if self.orphans.len() >= MAX_ORPHAN_TX && !self.orphans.contains_key(&hash) {
            evicted = self.evict_random();
        }

        trace!(%hash, waiting_on = missing.len(), "parked orphan transaction");
        for parent in missing {
            self.waiting.entry(parent).or_default().push(hash);
        }
        self.orphans.insert(hash, tx);
        evicted
    }

    /// The orphans that were waiting on `parent`, removed from the pool.
    ///
    /// Callers retry admission for each; an orphan still missing another
    /// parent simply parks again.
    pub fn resolve(&mut self, parent: &transaction::Hash) -> Vec<Arc<Transaction>> {
        let hashes = match self.waiting.remove(parent) {
            Some(hashes) => hashes,
            None => return Vec::new(),
        };
        hashes
            .into_iter()
            .filter_map(|hash| self.remove(&hash))
            .collect()
    }

    /// Remove an orphan and all its wait markers.
    pub fn remove(&mut self, hash: &transaction::Hash) -> Option<Arc<Transaction>> {
        let tx = self.orphans.remove(hash)?;
        for waiters in self.waiting.values_mut() {
            waiters.retain(|waiter| waiter != hash);
        }
        self.waiting.retain(|_, waiters| !waiters.is_empty());
        Some(tx)
    }

    fn evict_random(&mut self) -> Option<transaction::Hash> {
        let victim = {
            let index = rand::thread_rng().gen_range(0, self.orphans.len());
            *self.orphans.keys().nth(index)?
        };
        self.remove(&victim);
        trace!(hash = %victim, "evicted random orphan");
        Some(victim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use sable_chain::transaction::LockTime;
    use sable_chain::transparent::{Input, OutPoint, Output, Script, Witness, SEQUENCE_FINAL};
    use std::convert::TryInto;

    fn orphan(marker: u8) -> (Arc<Transaction>, transaction::Hash) {
        let parent = transaction::Hash([marker; 32]);
        let tx = Arc::new(Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: OutPoint {
                    hash: parent,
                    index: 0,
                },
                unlock_script: Script(Vec::new()),
                sequence: SEQUENCE_FINAL,
                witness: Witness::default(),
            }],
            vec![Output {
                value: 1.try_into().unwrap(),
                lock_script: Script(vec![0x51]),
            }],
            LockTime::unlocked(),
        ));
        (tx, parent)
    }

    #[test]
    fn park_and_resolve() {
        let mut pool = OrphanPool::new();
        let (tx, parent) = orphan(1);
        let hash = tx.hash();

        assert!(pool.add(tx, vec![parent]).is_none());
        assert!(pool.has(&hash));

        let resolved = pool.resolve(&parent);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].hash(), hash);
        assert!(!pool.has(&hash));
        assert!(pool.is_empty());
    }

    #[test]
    fn full_pool_evicts_a_random_victim() {
        let mut pool = OrphanPool::new();
        for marker in 0..MAX_ORPHAN_TX {
            let (tx, parent) = orphan(marker as u8);
            assert!(pool.add(tx, vec![parent]).is_none());
        }
        let (tx, parent) = orphan(0xfe);
        let evicted = pool.add(tx, vec![parent]);
        assert!(evicted.is_some());
        assert_eq!(pool.len(), MAX_ORPHAN_TX);
    }
}
