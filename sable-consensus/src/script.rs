//! The seam between consensus and script execution.
//!
//! The script interpreter, signature checks, and hash primitives are
//! external collaborators; block connection and mempool admission consume
//! them as a per-input predicate behind the `Verifier` trait.

use bitflags::bitflags;
use thiserror::Error;

use sable_chain::{transaction::Transaction, transparent};

bitflags! {
    /// The script verification flags active for a given block or mempool
    /// admission, as decided by the deployment state machine.
    pub struct VerifyFlags: u32 {
        /// Evaluate pay-to-script-hash redeem scripts (BIP16).
        const P2SH = 1 << 0;
        /// Require strict DER signature encodings (BIP66).
        const DERSIG = 1 << 1;
        /// Enforce `OP_CHECKLOCKTIMEVERIFY` (BIP65).
        const CHECKLOCKTIMEVERIFY = 1 << 2;
        /// Enforce `OP_CHECKSEQUENCEVERIFY` (BIP112).
        const CHECKSEQUENCEVERIFY = 1 << 3;
        /// Evaluate witness programs (BIP141).
        const WITNESS = 1 << 4;
        /// Require low-S signatures (policy).
        const LOW_S = 1 << 5;
        /// Require the multisig dummy element to be null (policy until
        /// activated by a deployment).
        const NULLDUMMY = 1 << 6;
        /// Require minimal push encodings (policy).
        const MINIMALDATA = 1 << 7;
        /// Reject upgradable witness program versions (policy).
        const DISCOURAGE_UPGRADABLE_WITNESS = 1 << 8;
        /// Require an empty stack after execution (policy).
        const CLEANSTACK = 1 << 9;
    }
}

impl VerifyFlags {
    /// The flags every peer on the network enforces; failing these scores
    /// a ban.
    pub fn mandatory() -> VerifyFlags {
        VerifyFlags::P2SH
    }

    /// The flags enforced on mempool admission; failing only these is
    /// merely nonstandard.
    pub fn standard() -> VerifyFlags {
        VerifyFlags::all()
    }
}

/// A script execution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// Execution failed under the mandatory flag set.
    #[error("mandatory-script-verify-flag-failed ({0})")]
    Mandatory(&'static str),
    /// Execution failed only under the standard (policy) flag set.
    #[error("non-mandatory-script-verify-flag ({0})")]
    NonMandatory(&'static str),
}

impl ScriptError {
    pub fn score(&self) -> u32 {
        match self {
            ScriptError::Mandatory(_) => 100,
            ScriptError::NonMandatory(_) => 0,
        }
    }
}

/// Black-box script execution.
///
/// Implementations run the interpreter over one input's unlock script,
/// witness, and the coin's lock script, under the given flags. A block's
/// per-input verifications are independent and commutative, so callers may
/// fan inputs out across a worker pool and join before commit.
pub trait Verifier: Send + Sync {
    fn verify_input(
        &self,
        tx: &Transaction,
        index: usize,
        coin: &transparent::Output,
        flags: VerifyFlags,
    ) -> Result<(), ScriptError>;
}

/// A verifier that accepts every script.
///
/// Used by tests, and by header-trusting deployments that delegate script
/// checks elsewhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl Verifier for AcceptAll {
    fn verify_input(
        &self,
        _tx: &Transaction,
        _index: usize,
        _coin: &transparent::Output,
        _flags: VerifyFlags,
    ) -> Result<(), ScriptError> {
        Ok(())
    }
}
