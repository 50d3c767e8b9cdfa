//! Consensus error types.
//!
//! Every consensus error carries a ban `score`: 0 for blocks and
//! transactions that are merely unwanted, up to 100 for ones that prove
//! their relayer is broken or hostile. The peer layer uses the score to
//! decide whether to demote, disconnect, or ban.

use thiserror::Error;

use sable_chain::{amount, block, transparent::OutPoint, work::difficulty::CompactDifficulty};
use sable_state::StateError;

use crate::script::ScriptError;

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("transaction has no inputs")]
    NoInputs,

    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("coinbase transaction found outside the first block position")]
    CoinbasePosition,

    #[error("coinbase input found in a non-coinbase transaction")]
    CoinbaseInputFound,

    #[error("coinbase data length is outside the 2..=100 byte range")]
    CoinbaseScriptSize,

    #[error("bad-txns-inputs-duplicate: duplicate spend of {0:?} inside one transaction")]
    DuplicateInput(OutPoint),

    #[error("bad-txns-inputs-missingorspent: {0:?} is missing or already spent")]
    InputsMissingOrSpent(OutPoint),

    #[error("bad-txns-premature-spend-of-coinbase: coinbase {0:?} is not yet mature")]
    ImmatureCoinbaseSpend(OutPoint),

    #[error("bad-txns-in-belowout: input value is below output value")]
    InputsBelowOutputs,

    #[error("non-final: transaction lock time has not passed")]
    NotFinal,

    #[error("non-BIP68-final: sequence locks are not satisfied")]
    SequenceLocksNotMet,

    #[error("bad-txn-sigops: signature-operation cost {0} exceeds the limit")]
    SigopCost(u64),

    #[error("amount error: {0}")]
    Amount(#[from] amount::Error),

    #[error(transparent)]
    Script(#[from] ScriptError),
}

impl TransactionError {
    /// The ban score attached to this rejection.
    pub fn score(&self) -> u32 {
        use TransactionError::*;
        match self {
            // Structurally hostile transactions.
            NoInputs | NoOutputs | CoinbasePosition | CoinbaseInputFound | DuplicateInput(_) => {
                100
            }
            Amount(_) | InputsBelowOutputs | SigopCost(_) => 100,
            Script(error) => error.score(),
            CoinbaseScriptSize => 100,
            // Often just a view mismatch (double spend, reorg race).
            InputsMissingOrSpent(_) | ImmatureCoinbaseSpend(_) => 0,
            NotFinal | SequenceLocksNotMet => 10,
        }
    }
}

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("block has no transactions")]
    NoTransactions,

    #[error("block {0:?} was already rejected as invalid")]
    KnownInvalid(block::Hash),

    #[error("bad-diffbits: invalid difficulty encoding in {0:?}")]
    InvalidDifficulty(block::Hash),

    #[error("bad-diffbits: difficulty is above the network limit in {0:?}")]
    TargetDifficultyLimit(block::Hash),

    #[error("high-hash: {0:?} does not satisfy its own difficulty target")]
    DifficultyFilter(block::Hash),

    #[error("bad-diffbits: block declares {found:?}, the chain requires {expected:?}")]
    IncorrectBits {
        found: CompactDifficulty,
        expected: CompactDifficulty,
    },

    #[error("time-too-old: block time is not later than the median time past")]
    TimeTooOld,

    #[error(transparent)]
    Time(#[from] block::BlockTimeError),

    #[error("bad-version: version {0} is rejected by a super-majority of recent blocks")]
    OutdatedVersion(u32),

    #[error("bad-txnmrklroot: merkle root does not commit to the block's transactions")]
    BadMerkleRoot {
        actual: block::merkle::Root,
        expected: block::merkle::Root,
    },

    #[error("bad-txns-duplicate: duplicate transaction in block")]
    DuplicateTransaction,

    #[error("checkpoint mismatch at height {0:?}")]
    CheckpointMismatch(block::Height),

    #[error("bad-blk-weight: block weight exceeds the limit")]
    ExcessiveWeight,

    #[error("bad-blk-sigops: block signature-operation cost exceeds the limit")]
    ExcessiveSigops,

    #[error("bad-cb-amount: coinbase claims more than subsidy plus fees")]
    BadCoinbaseAmount,

    #[error("reorganization would cross the prune horizon; staying on the current tip")]
    ReorgDepthExceeded,

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("state error: {0}")]
    State(#[from] StateError),
}

impl BlockError {
    /// The ban score attached to this rejection.
    pub fn score(&self) -> u32 {
        use BlockError::*;
        match self {
            NoTransactions | InvalidDifficulty(_) | TargetDifficultyLimit(_)
            | DifficultyFilter(_) | IncorrectBits { .. } | BadMerkleRoot { .. }
            | DuplicateTransaction | ExcessiveWeight | ExcessiveSigops | BadCoinbaseAmount => 100,
            CheckpointMismatch(_) => 100,
            KnownInvalid(_) => 100,
            TimeTooOld | OutdatedVersion(_) => 10,
            Time(_) => 0,
            ReorgDepthExceeded => 0,
            Transaction(error) => error.score(),
            State(_) => 0,
        }
    }
}
