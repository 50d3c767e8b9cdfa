use thiserror::Error;

use sable_consensus::TransactionError;
use sable_state::StateError;

/// A mempool admission rejection.
///
/// Each variant is one of the reject categories the peer layer reports;
/// `score()` carries the associated ban score.
#[derive(Error, Debug)]
pub enum MempoolError {
    /// alreadyknown
    #[error("alreadyknown: transaction is already in the mempool or the chain")]
    AlreadyKnown,

    /// coinbase
    #[error("coinbase transactions cannot enter the mempool")]
    Coinbase,

    /// nonstandard
    #[error("nonstandard: {0}")]
    NonStandard(&'static str),

    /// premature-version2-tx
    #[error("premature-version2-tx: version 2 requires the csv deployment")]
    PrematureVersion2,

    /// no-witness-yet
    #[error("no-witness-yet: witness transactions require the segwit deployment")]
    NoWitnessYet,

    /// duplicate
    #[error("duplicate: transaction double-spends a mempool transaction")]
    Duplicate,

    /// insufficientfee
    #[error("insufficientfee: fee {fee} is below the required {required}")]
    InsufficientFee { fee: i64, required: i64 },

    /// insufficientpriority
    #[error("insufficient priority for a free transaction")]
    InsufficientPriority,

    /// free-tx rate limit
    #[error("free transaction rate limit exceeded")]
    RateLimited,

    /// highfee
    #[error("highfee: absurdly high fee {fee}")]
    AbsurdFee { fee: i64 },

    /// too-long-mempool-chain
    #[error("too-long-mempool-chain: more than {0} unconfirmed ancestors")]
    AncestorLimit(usize),

    /// non-final
    #[error("non-final: transaction lock time has not passed")]
    NotFinal,

    /// non-BIP68-final
    #[error("non-BIP68-final: sequence locks are not satisfied")]
    SequenceLocksNotMet,

    /// invalid / bad-txns-*
    #[error(transparent)]
    Verification(#[from] TransactionError),

    /// store failure
    #[error("state error: {0}")]
    State(#[from] StateError),
}

impl MempoolError {
    /// The ban score attached to this rejection.
    pub fn score(&self) -> u32 {
        use MempoolError::*;
        match self {
            Coinbase => 100,
            Verification(error) => error.score(),
            NonStandard(_) => 0,
            PrematureVersion2 | NoWitnessYet => 0,
            AlreadyKnown | Duplicate => 0,
            InsufficientFee { .. } | InsufficientPriority | RateLimited | AbsurdFee { .. } => 0,
            AncestorLimit(_) => 0,
            NotFinal | SequenceLocksNotMet => 10,
            State(_) => 0,
        }
    }
}
