//! A single-node proof-of-work ledger simulator.
//!
//! Transactions collect in a pending pool until [`Blockchain::mine`] seals
//! them into a hash-linked block. Balances are computed by replaying the
//! chain.

pub mod blockchain;
pub mod config;

pub use blockchain::{Block, BlockHash, Blockchain, BlockchainError, Transaction};
pub use config::ChainConfig;
