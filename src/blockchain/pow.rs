// Proof of work
//
// Nonces are scanned upward from zero. With more than one worker the space is
// cut into consecutive batches and each batch is searched with rayon's
// `find_first`, so the winning nonce is the same one a sequential scan finds.

use log::debug;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;

use super::block::{digest, BlockError, BlockHash};
use super::transaction::Transaction;

/// Nonces each worker checks per parallel batch
const BATCH_PER_WORKER: u64 = 4096;

/// Errors that can occur during a nonce search
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Block error: {0}")]
    Block(#[from] BlockError),

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Result of a nonce search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The lowest nonce satisfying the difficulty
    Found(u64),

    /// The iteration bound was reached without a valid nonce
    Exhausted { attempts: u64 },
}

/// Builds the worker pool for parallel searches
///
/// Returns `None` for a single worker, which means a plain sequential scan.
pub fn build_pool(workers: usize) -> Result<Option<ThreadPool>, SearchError> {
    if workers <= 1 {
        return Ok(None);
    }

    ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("pow-worker-{}", index))
        .build()
        .map(Some)
        .map_err(|e| SearchError::WorkerPool(e.to_string()))
}

/// Checks whether a candidate block's hash has `difficulty` leading zero hex digits
pub fn valid_proof(
    timestamp: i64,
    nonce: u64,
    previous_hash: &BlockHash,
    transactions: &[Transaction],
    difficulty: usize,
) -> Result<bool, BlockError> {
    let hash = digest(timestamp, nonce, previous_hash, transactions)?;
    Ok(hash.meets_difficulty(difficulty))
}

/// A nonce search over a frozen set of block fields
#[derive(Debug, Clone)]
pub struct ProofSearch<'a> {
    timestamp: i64,
    previous_hash: BlockHash,
    transactions: &'a [Transaction],
    difficulty: usize,
    max_iterations: Option<u64>,
    pool: Option<&'a ThreadPool>,
}

impl<'a> ProofSearch<'a> {
    /// Creates an unbounded, single-threaded search
    ///
    /// # Arguments
    ///
    /// * `timestamp` - The timestamp every candidate block is hashed with
    /// * `previous_hash` - The hash of the block being extended
    /// * `transactions` - The snapshot of transactions being sealed
    /// * `difficulty` - Required leading zero hex digits
    pub fn new(
        timestamp: i64,
        previous_hash: BlockHash,
        transactions: &'a [Transaction],
        difficulty: usize,
    ) -> Self {
        ProofSearch {
            timestamp,
            previous_hash,
            transactions,
            difficulty,
            max_iterations: None,
            pool: None,
        }
    }

    /// Bounds the number of nonces tried
    pub fn max_iterations(mut self, max_iterations: Option<u64>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Spreads the scan over a worker pool; sequential when `None`
    pub fn pool(mut self, pool: Option<&'a ThreadPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Tests a single nonce
    pub fn check(&self, nonce: u64) -> Result<bool, BlockError> {
        valid_proof(
            self.timestamp,
            nonce,
            &self.previous_hash,
            self.transactions,
            self.difficulty,
        )
    }

    /// Runs the search to completion
    ///
    /// # Returns
    ///
    /// `Found` with the lowest satisfying nonce, or `Exhausted` if the
    /// iteration bound was hit first
    pub fn run(&self) -> Result<SearchOutcome, SearchError> {
        debug!(
            "Searching nonce: difficulty={}, workers={}, max_iterations={:?}",
            self.difficulty,
            self.pool.map_or(1, |pool| pool.current_num_threads()),
            self.max_iterations
        );

        match self.pool {
            Some(pool) => Ok(self.run_parallel(pool)?),
            None => Ok(self.run_sequential()?),
        }
    }

    fn limit(&self) -> u64 {
        self.max_iterations.unwrap_or(u64::MAX)
    }

    fn run_sequential(&self) -> Result<SearchOutcome, BlockError> {
        let limit = self.limit();
        let mut nonce = 0;

        while nonce < limit {
            if self.check(nonce)? {
                debug!("Found nonce {} after {} attempts", nonce, nonce + 1);
                return Ok(SearchOutcome::Found(nonce));
            }
            nonce += 1;
        }

        Ok(SearchOutcome::Exhausted { attempts: limit })
    }

    fn run_parallel(&self, pool: &ThreadPool) -> Result<SearchOutcome, BlockError> {
        let limit = self.limit();
        let batch = BATCH_PER_WORKER.saturating_mul(pool.current_num_threads() as u64);
        let mut start = 0u64;

        while start < limit {
            let end = start.saturating_add(batch).min(limit);

            let hit = pool.install(|| {
                (start..end)
                    .into_par_iter()
                    .map(|nonce| self.check(nonce).map(|valid| valid.then_some(nonce)))
                    .find_first(|result| !matches!(result, Ok(None)))
            });

            match hit {
                Some(Ok(Some(nonce))) => {
                    debug!("Found nonce {} in batch {}..{}", nonce, start, end);
                    return Ok(SearchOutcome::Found(nonce));
                }
                Some(Err(err)) => return Err(err),
                _ => start = end,
            }
        }

        Ok(SearchOutcome::Exhausted { attempts: limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transactions() -> Vec<Transaction> {
        vec![
            Transaction::new("Alice", "Bob", 100.0),
            Transaction::reward("THE BLOCKCHAIN", "miner", 1.0),
        ]
    }

    #[test]
    fn test_sequential_search_finds_first_valid_nonce() {
        let transactions = sample_transactions();
        let search = ProofSearch::new(1_000, BlockHash::default(), &transactions, 2);

        let nonce = match search.run().unwrap() {
            SearchOutcome::Found(nonce) => nonce,
            other => panic!("unexpected outcome: {:?}", other),
        };

        assert!(search.check(nonce).unwrap());
        for earlier in 0..nonce {
            assert!(!search.check(earlier).unwrap());
        }
    }

    #[test]
    fn test_parallel_search_agrees_with_sequential() {
        let transactions = sample_transactions();
        let previous_hash = BlockHash::from([3u8; 32]);

        let sequential = ProofSearch::new(77, previous_hash, &transactions, 3)
            .run()
            .unwrap();
        let pool = build_pool(4).unwrap();
        let parallel = ProofSearch::new(77, previous_hash, &transactions, 3)
            .pool(pool.as_ref())
            .run()
            .unwrap();

        assert!(matches!(sequential, SearchOutcome::Found(_)));
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_build_pool() {
        assert!(build_pool(1).unwrap().is_none());

        let pool = build_pool(3).unwrap().unwrap();
        assert_eq!(pool.current_num_threads(), 3);
    }

    #[test]
    fn test_zero_difficulty_accepts_first_nonce() {
        let transactions = sample_transactions();
        let search = ProofSearch::new(0, BlockHash::default(), &transactions, 0);

        assert_eq!(search.run().unwrap(), SearchOutcome::Found(0));
    }

    #[test]
    fn test_bounded_search_exhausts() {
        let transactions = sample_transactions();

        // 64 leading zero digits is never hit in practice
        let sequential = ProofSearch::new(0, BlockHash::default(), &transactions, 64)
            .max_iterations(Some(50))
            .run()
            .unwrap();
        let pool = build_pool(2).unwrap();
        let parallel = ProofSearch::new(0, BlockHash::default(), &transactions, 64)
            .max_iterations(Some(10_000))
            .pool(pool.as_ref())
            .run()
            .unwrap();

        assert_eq!(sequential, SearchOutcome::Exhausted { attempts: 50 });
        assert_eq!(parallel, SearchOutcome::Exhausted { attempts: 10_000 });
    }

    #[test]
    fn test_valid_proof_matches_hex_prefix() {
        let transactions = sample_transactions();
        let found = ProofSearch::new(0, BlockHash::default(), &transactions, 2)
            .run()
            .unwrap();

        let SearchOutcome::Found(nonce) = found else {
            panic!("search should succeed");
        };

        assert!(valid_proof(0, nonce, &BlockHash::default(), &transactions, 2).unwrap());
        let hash = digest(0, nonce, &BlockHash::default(), &transactions).unwrap();
        assert!(hash.to_hex().starts_with("00"));
    }
}
