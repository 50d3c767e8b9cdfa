//! Proof-of-work arithmetic: difficulty encodings and accumulated work.

pub mod difficulty;
