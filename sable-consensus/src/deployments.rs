//! BIP9 version-bits deployment tracking, and the older super-majority
//! version gates.
//!
//! Deployment parameters are data in the per-network registry
//! (`NetworkParams::deployments`); this module only implements the state
//! machine over them.

use std::collections::HashMap;
use std::sync::Arc;

use displaydoc::Display;

use sable_chain::{
    block::{self, Height},
    parameters::Deployment,
};
use sable_state::{ChainDb, ChainEntry, StateError};

use crate::script::VerifyFlags;

/// The BIP9 threshold states.
///
/// States advance only at retarget boundaries, in the fixed order
/// `Defined → Started → (LockedIn | Failed)`, with `LockedIn` always
/// becoming `Active` one window later.
#[derive(Copy, Clone, Debug, Display, Eq, PartialEq, Hash)]
pub enum ThresholdState {
    /// defined
    Defined,
    /// started
    Started,
    /// locked-in
    LockedIn,
    /// active
    Active,
    /// failed
    Failed,
}

/// The deployment state machine, with a per-(bit, boundary block) cache so
/// each window is evaluated once.
#[derive(Debug, Default)]
pub struct Deployments {
    cache: HashMap<(u8, block::Hash), ThresholdState>,
}

impl Deployments {
    pub fn new() -> Deployments {
        Deployments::default()
    }

    /// The state of `deployment` for a block built on top of `prev`.
    pub fn state(
        &mut self,
        db: &ChainDb,
        deployment: &Deployment,
        prev: &ChainEntry,
    ) -> Result<ThresholdState, StateError> {
        let params = db.network();
        let window = params.miner_window;

        // Walk back to the closing block of the most recent full window.
        let mut cursor = if prev.height.0 + 1 >= window {
            let boundary = Height(prev.height.0 - ((prev.height.0 + 1) % window));
            db.ancestor_at(prev, boundary)?
        } else {
            None
        };

        // Collect boundary blocks until we hit a cached state or walk back
        // before the deployment's start time.
        let mut state = ThresholdState::Defined;
        let mut to_compute = Vec::new();
        while let Some(entry) = cursor {
            if let Some(cached) = self.cache.get(&(deployment.bit, entry.hash)) {
                state = *cached;
                break;
            }
            if db.median_time_past(&entry)?.timestamp() < deployment.start_time {
                self.cache
                    .insert((deployment.bit, entry.hash), ThresholdState::Defined);
                break;
            }
            cursor = if entry.height.0 >= window {
                db.ancestor_at(&entry, Height(entry.height.0 - window))?
            } else {
                None
            };
            to_compute.push(entry);
        }

        // Replay the windows forward, applying at most one transition per
        // boundary.
        while let Some(entry) = to_compute.pop() {
            let median_time = db.median_time_past(&entry)?.timestamp();
            state = match state {
                ThresholdState::Defined => {
                    if median_time >= deployment.timeout {
                        ThresholdState::Failed
                    } else if median_time >= deployment.start_time {
                        ThresholdState::Started
                    } else {
                        ThresholdState::Defined
                    }
                }
                ThresholdState::Started => {
                    if median_time >= deployment.timeout {
                        ThresholdState::Failed
                    } else {
                        let ancestors = db.ancestors(&entry, window as usize)?;
                        let signalling = ancestors
                            .iter()
                            .filter(|ancestor| ancestor.has_bit(deployment.bit))
                            .count() as u32;
                        if signalling >= params.activation_threshold {
                            ThresholdState::LockedIn
                        } else {
                            ThresholdState::Started
                        }
                    }
                }
                ThresholdState::LockedIn => ThresholdState::Active,
                ThresholdState::Active => ThresholdState::Active,
                ThresholdState::Failed => ThresholdState::Failed,
            };
            self.cache.insert((deployment.bit, entry.hash), state);
        }

        Ok(state)
    }

    /// Whether the named deployment is active for a block built on `prev`.
    ///
    /// Unknown names are simply inactive, so callers can probe optional
    /// deployments without special cases.
    pub fn is_active(
        &mut self,
        db: &ChainDb,
        name: &str,
        prev: &ChainEntry,
    ) -> Result<bool, StateError> {
        match db.network().deployment(name) {
            Some(deployment) => Ok(self.state(db, deployment, prev)? == ThresholdState::Active),
            None => Ok(false),
        }
    }
}

/// Whether at least `required` of `ancestors` report a version of at least
/// `version`. Used for the BIP34/66/65-era upgrade gates.
pub fn is_super_majority(version: u32, required: u32, ancestors: &[Arc<ChainEntry>]) -> bool {
    let count = ancestors
        .iter()
        .filter(|entry| entry.header.version >= version)
        .count() as u32;
    count >= required
}

/// Assemble the script-verification flags for a block built on `prev`.
///
/// `ancestors` must cover the super-majority window ending at `prev`.
pub fn active_flags(
    db: &ChainDb,
    deployments: &mut Deployments,
    prev: &ChainEntry,
    ancestors: &[Arc<ChainEntry>],
) -> Result<VerifyFlags, StateError> {
    let params = db.network();
    // P2SH activated in 2012; every block this node will ever connect is
    // after it.
    let mut flags = VerifyFlags::P2SH;
    if is_super_majority(3, params.majority_enforce_upgrade, ancestors) {
        flags |= VerifyFlags::DERSIG;
    }
    if is_super_majority(4, params.majority_enforce_upgrade, ancestors) {
        flags |= VerifyFlags::CHECKLOCKTIMEVERIFY;
    }
    if deployments.is_active(db, "csv", prev)? {
        flags |= VerifyFlags::CHECKSEQUENCEVERIFY;
    }
    if deployments.is_active(db, "segwit", prev)? {
        flags |= VerifyFlags::WITNESS;
    }
    Ok(flags)
}
