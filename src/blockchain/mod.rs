// Blockchain module
//
// This module contains the core ledger implementation including:
// - Transaction structure
// - Block structure and hashing
// - Proof of work search
// - Blockchain structure (pending pool, mining, balances)

pub mod block;
pub mod chain;
pub mod pow;
pub mod transaction;

// Re-export main components for easier access
pub use block::{Block, BlockError, BlockHash};
pub use chain::{Blockchain, BlockchainError};
pub use pow::{ProofSearch, SearchError, SearchOutcome};
pub use transaction::{Transaction, TransactionError};
