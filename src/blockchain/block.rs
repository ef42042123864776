use std::fmt;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::transaction::Transaction;

/// Errors that can occur while hashing a block
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A 32-byte SHA-256 block digest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// Returns the hash as a lowercase hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Counts the leading `'0'` characters of the hexadecimal form
    pub fn leading_zero_digits(&self) -> usize {
        let mut count = 0;
        for byte in self.0 {
            if byte == 0 {
                count += 2;
                continue;
            }
            if byte >> 4 == 0 {
                count += 1;
            }
            break;
        }
        count
    }

    /// Checks if the hexadecimal form starts with `difficulty` zeros
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        self.leading_zero_digits() >= difficulty
    }
}

impl From<[u8; 32]> for BlockHash {
    fn from(bytes: [u8; 32]) -> Self {
        BlockHash(bytes)
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Borrowed view of the hashed fields, in hashing order
#[derive(Serialize)]
struct BlockContent<'a> {
    timestamp: i64,
    nonce: u64,
    previous_hash: &'a BlockHash,
    transactions: &'a [Transaction],
}

/// Hashes a block's fields without building the block
///
/// The proof-of-work search calls this once per nonce so it can borrow the
/// transaction list instead of cloning it into a candidate block.
pub(crate) fn digest(
    timestamp: i64,
    nonce: u64,
    previous_hash: &BlockHash,
    transactions: &[Transaction],
) -> Result<BlockHash, BlockError> {
    let content = BlockContent {
        timestamp,
        nonce,
        previous_hash,
        transactions,
    };

    let block_bytes = serde_json::to_vec(&content)?;

    let mut hasher = Sha256::new();
    hasher.update(&block_bytes);
    let digest = hasher.finalize();

    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    Ok(BlockHash(out))
}

/// Current time as Unix nanoseconds
pub(crate) fn now_nanos() -> i64 {
    // Out of range only after the year 2262
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Represents a sealed block in the chain
///
/// Fields are frozen at construction; the hash is recomputed from them on
/// demand rather than cached.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Block {
    /// Creation time in Unix nanoseconds
    timestamp: i64,

    /// Proof of work (nonce)
    nonce: u64,

    /// Hash of the previous block
    previous_hash: BlockHash,

    /// Transactions sealed by this block
    transactions: Vec<Transaction>,
}

impl Block {
    /// Creates a new block stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `nonce` - The proof of work (nonce)
    /// * `previous_hash` - The hash of the previous block
    /// * `transactions` - The list of transactions to include in the block
    ///
    /// # Returns
    ///
    /// A new Block instance
    pub fn new(nonce: u64, previous_hash: BlockHash, transactions: Vec<Transaction>) -> Self {
        Self::with_timestamp(now_nanos(), nonce, previous_hash, transactions)
    }

    /// Creates a block with an explicit timestamp
    ///
    /// Used when sealing a mined block, so the block carries the same
    /// timestamp the nonce was searched against.
    pub fn with_timestamp(
        timestamp: i64,
        nonce: u64,
        previous_hash: BlockHash,
        transactions: Vec<Transaction>,
    ) -> Self {
        Block {
            timestamp,
            nonce,
            previous_hash,
            transactions,
        }
    }

    /// The all-zero block whose hash seeds the genesis block
    pub fn zero() -> Self {
        Block::default()
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 digest of `{timestamp, nonce, previous_hash, transactions}`
    pub fn hash(&self) -> Result<BlockHash, BlockError> {
        digest(
            self.timestamp,
            self.nonce,
            &self.previous_hash,
            &self.transactions,
        )
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn previous_hash(&self) -> &BlockHash {
        &self.previous_hash
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "nonce: {}", self.nonce)?;
        writeln!(f, "previous Hash: {}", self.previous_hash)?;
        writeln!(f, "timestamp: {}", self.timestamp)?;

        let rule = "-".repeat(22);
        for (index, transaction) in self.transactions.iter().enumerate() {
            writeln!(f, "{} transaction {} {}", rule, index, rule)?;
            write!(f, "{}", transaction)?;
        }

        Ok(())
    }
}
