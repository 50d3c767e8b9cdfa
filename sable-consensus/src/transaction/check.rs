//! Transaction checks.

use std::collections::HashSet;

use sable_chain::{
    coins::CoinView,
    transaction::Transaction,
    transparent::{Input, OutPoint},
};

use crate::error::TransactionError;

/// Checks that the transaction has at least one input and one output.
pub fn has_inputs_and_outputs(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        Err(TransactionError::NoInputs)
    } else if tx.outputs.is_empty() {
        Err(TransactionError::NoOutputs)
    } else {
        Ok(())
    }
}

/// Checks that no outpoint is spent twice inside one transaction.
pub fn no_duplicate_inputs(tx: &Transaction) -> Result<(), TransactionError> {
    let mut seen = HashSet::new();
    for input in tx.inputs.iter() {
        if let Some(outpoint) = input.outpoint() {
            if !seen.insert(outpoint) {
                return Err(TransactionError::DuplicateInput(outpoint));
            }
        }
    }
    Ok(())
}

/// Checks that a coinbase transaction's data field is within the 2..=100
/// byte range required since BIP34.
pub fn coinbase_script_size(tx: &Transaction) -> Result<(), TransactionError> {
    if let Some(Input::Coinbase { data, .. }) = tx.inputs.get(0) {
        let len = data.as_ref().len();
        if !(2..=100).contains(&len) {
            return Err(TransactionError::CoinbaseScriptSize);
        }
    }
    Ok(())
}

/// Checks that every non-coinbase input resolves to an unspent coin in
/// `view`, returning the first missing outpoint otherwise.
pub fn inputs_are_available(tx: &Transaction, view: &CoinView) -> Result<(), TransactionError> {
    for input in tx.inputs.iter() {
        if let Some(outpoint) = input.outpoint() {
            if !view.has(&outpoint) {
                return Err(TransactionError::InputsMissingOrSpent(outpoint));
            }
        }
    }
    Ok(())
}

/// The outpoints a transaction spends.
pub fn spent_outpoints(tx: &Transaction) -> impl Iterator<Item = OutPoint> + '_ {
    tx.inputs.iter().filter_map(Input::outpoint)
}
