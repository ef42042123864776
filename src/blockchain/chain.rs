use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::ThreadPool;
use thiserror::Error;

use crate::config::{ChainConfig, ConfigError};

use super::block::{now_nanos, Block, BlockError, BlockHash};
use super::pow::{self, ProofSearch, SearchError, SearchOutcome};
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Block error: {0}")]
    BlockError(#[from] BlockError),

    #[error("Search error: {0}")]
    SearchError(#[from] SearchError),

    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Chain is empty")]
    EmptyChain,

    #[error("Proof of work search exhausted after {attempts} attempts")]
    SearchExhausted { attempts: u64 },

    #[error("Invalid chain: {0}")]
    InvalidChain(String),
}

/// Represents the blockchain
///
/// Clones share the same chain and pending pool. At most one mining round
/// runs at a time per chain. Transactions stay visible in the pending pool
/// until the block sealing them is appended; submissions made during a round
/// wait there for the next one.
#[derive(Debug, Clone)]
pub struct Blockchain {
    /// The chain of blocks
    chain: Arc<Mutex<Vec<Block>>>,

    /// Pending transactions to be included in the next block
    pending_transactions: Arc<Mutex<Vec<Transaction>>>,

    /// Held for the duration of a mining round
    mining: Arc<Mutex<()>>,

    /// Address credited with mining rewards
    reward_address: String,

    config: ChainConfig,

    /// Nonce search workers, built once when `config.workers > 1`
    workers: Option<Arc<ThreadPool>>,
}

impl Blockchain {
    /// Creates a new blockchain with a genesis block
    ///
    /// # Arguments
    ///
    /// * `reward_address` - The address credited with mining rewards
    /// * `config` - Difficulty, reward and search settings
    ///
    /// # Returns
    ///
    /// A new Blockchain instance
    pub fn new(reward_address: impl Into<String>, config: ChainConfig) -> Result<Self, BlockchainError> {
        config.validate()?;
        let workers = pow::build_pool(config.workers)?.map(Arc::new);

        let blockchain = Blockchain {
            chain: Arc::new(Mutex::new(Vec::new())),
            pending_transactions: Arc::new(Mutex::new(Vec::new())),
            mining: Arc::new(Mutex::new(())),
            reward_address: reward_address.into(),
            config,
            workers,
        };

        blockchain.create_genesis_block()?;

        Ok(blockchain)
    }

    /// Creates the genesis block (first block in the chain)
    fn create_genesis_block(&self) -> Result<(), BlockchainError> {
        let seed = Block::zero().hash()?;
        let genesis_block = Block::new(0, seed, Vec::new());

        self.chain.lock().push(genesis_block);
        debug!("Created genesis block on top of seed {}", seed);

        Ok(())
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Result<Block, BlockchainError> {
        self.chain
            .lock()
            .last()
            .cloned()
            .ok_or(BlockchainError::EmptyChain)
    }

    /// Adds a new transaction to the pending transactions
    ///
    /// Nothing is validated; use [`Blockchain::submit_transaction`] to reject
    /// unusable amounts.
    pub fn add_transaction(&self, from: impl Into<String>, to: impl Into<String>, amount: f32) {
        self.pending_transactions
            .lock()
            .push(Transaction::new(from, to, amount));
    }

    /// Validates a transaction and adds it to the pending transactions
    pub fn submit_transaction(&self, transaction: Transaction) -> Result<(), BlockchainError> {
        transaction.validate()?;
        self.pending_transactions.lock().push(transaction);
        Ok(())
    }

    /// Returns an independent copy of the pending transactions
    pub fn copy_pending_pool(&self) -> Vec<Transaction> {
        self.pending_transactions.lock().clone()
    }

    /// Checks a nonce against a candidate block stamped with timestamp zero
    ///
    /// # Arguments
    ///
    /// * `nonce` - The nonce to test
    /// * `previous_hash` - The hash of the block being extended
    /// * `transactions` - The transactions of the candidate block
    /// * `difficulty` - Required leading zero hex digits
    pub fn valid_proof(
        &self,
        nonce: u64,
        previous_hash: &BlockHash,
        transactions: &[Transaction],
        difficulty: usize,
    ) -> Result<bool, BlockchainError> {
        self.valid_proof_at(0, nonce, previous_hash, transactions, difficulty)
    }

    /// Same as [`Blockchain::valid_proof`] for a candidate with the given timestamp
    pub fn valid_proof_at(
        &self,
        timestamp: i64,
        nonce: u64,
        previous_hash: &BlockHash,
        transactions: &[Transaction],
        difficulty: usize,
    ) -> Result<bool, BlockchainError> {
        Ok(pow::valid_proof(
            timestamp,
            nonce,
            previous_hash,
            transactions,
            difficulty,
        )?)
    }

    /// Finds the first nonce valid for the current pending pool
    ///
    /// Searches over a snapshot of the pool on top of the last block, with
    /// candidates stamped with timestamp zero. Does not modify the chain, and
    /// the nonce it returns is never used to seal a block: [`Blockchain::mine`]
    /// searches again against the timestamp it seals with.
    pub fn proof_of_work(&self) -> Result<u64, BlockchainError> {
        let transactions = self.copy_pending_pool();
        let previous_hash = self.last_block()?.hash()?;

        self.search(0, previous_hash, &transactions)
    }

    fn search(
        &self,
        timestamp: i64,
        previous_hash: BlockHash,
        transactions: &[Transaction],
    ) -> Result<u64, BlockchainError> {
        let outcome = ProofSearch::new(timestamp, previous_hash, transactions, self.config.difficulty)
            .max_iterations(self.config.max_iterations)
            .pool(self.workers.as_deref())
            .run()?;

        match outcome {
            SearchOutcome::Found(nonce) => Ok(nonce),
            SearchOutcome::Exhausted { attempts } => {
                Err(BlockchainError::SearchExhausted { attempts })
            }
        }
    }

    /// Mines a new block with the pending transactions
    ///
    /// Appends the reward transaction to the pool and searches a nonce over a
    /// snapshot of it on top of the current last block. The sealed prefix
    /// leaves the pool in the same critical section that appends the block;
    /// anything submitted meanwhile stays pending. If the search fails only
    /// the reward is withdrawn.
    ///
    /// # Returns
    ///
    /// Result with the newly mined block
    pub fn mine(&self) -> Result<Block, BlockchainError> {
        let _round = self.mining.lock();

        let transactions = {
            let mut pending = self.pending_transactions.lock();
            pending.push(self.reward_transaction());
            pending.clone()
        };

        let (timestamp, nonce, previous_hash) = match self.find_proof(&transactions) {
            Ok(proof) => proof,
            Err(err) => {
                warn!("Mining failed, withdrawing the round's reward: {}", err);
                // Nothing leaves the pool outside a round, so the reward kept its index
                self.pending_transactions.lock().remove(transactions.len() - 1);
                return Err(err);
            }
        };

        let sealed = transactions.len();
        let block = Block::with_timestamp(timestamp, nonce, previous_hash, transactions);

        let height = {
            let mut pending = self.pending_transactions.lock();
            let mut chain = self.chain.lock();
            chain.push(block.clone());
            pending.drain(..sealed);
            chain.len() - 1
        };

        info!(
            "action=mining, message=success, height={}, nonce={}, transactions={}",
            height, nonce, sealed
        );

        Ok(block)
    }

    /// Reads the previous hash and timestamp once and searches a nonce for them
    fn find_proof(&self, transactions: &[Transaction]) -> Result<(i64, u64, BlockHash), BlockchainError> {
        let previous_hash = self.last_block()?.hash()?;
        let timestamp = now_nanos();

        let nonce = self.search(timestamp, previous_hash, transactions)?;

        Ok((timestamp, nonce, previous_hash))
    }

    fn reward_transaction(&self) -> Transaction {
        Transaction::reward(
            self.config.reward_sender.as_str(),
            self.reward_address.as_str(),
            self.config.reward_amount,
        )
    }

    /// Sums everything received minus everything sent by `address`
    pub fn calculate_total_amount(&self, address: &str) -> f32 {
        let chain = self.chain.lock();
        let mut total_amount = 0.0f32;

        for block in chain.iter() {
            for transaction in block.transactions() {
                let amount = transaction.amount();

                if transaction.recipient() == address {
                    total_amount += amount;
                }

                if transaction.sender() == address {
                    total_amount -= amount;
                }
            }
        }

        total_amount
    }

    /// Balance of every address that appears in the chain
    pub fn balances(&self) -> BTreeMap<String, f32> {
        let chain = self.chain.lock();
        let mut balances = BTreeMap::new();

        for transaction in chain.iter().flat_map(|block| block.transactions()) {
            *balances
                .entry(transaction.recipient().to_string())
                .or_insert(0.0) += transaction.amount();
            *balances
                .entry(transaction.sender().to_string())
                .or_insert(0.0) -= transaction.amount();
        }

        balances
    }

    /// Gets the entire blockchain
    pub fn get_chain(&self) -> Vec<Block> {
        self.chain.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.chain.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.lock().is_empty()
    }

    pub fn reward_address(&self) -> &str {
        &self.reward_address
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Checks hash linkage, the proof of work and the closing reward of every
    /// mined block
    pub fn verify(&self) -> Result<(), BlockchainError> {
        let chain = self.chain.lock();

        let genesis = chain.first().ok_or(BlockchainError::EmptyChain)?;
        if genesis.previous_hash() != &Block::zero().hash()? {
            return Err(BlockchainError::InvalidChain(
                "genesis block does not link to the zero block".to_string(),
            ));
        }

        for (index, pair) in chain.windows(2).enumerate() {
            let (previous_block, current_block) = (&pair[0], &pair[1]);
            let height = index + 1;

            if current_block.previous_hash() != &previous_block.hash()? {
                return Err(BlockchainError::InvalidChain(format!(
                    "block {} does not link to block {}",
                    height, index
                )));
            }

            if !current_block.hash()?.meets_difficulty(self.config.difficulty) {
                return Err(BlockchainError::InvalidChain(format!(
                    "block {} does not meet difficulty {}",
                    height, self.config.difficulty
                )));
            }

            let rewarded = current_block.transactions().last().is_some_and(|reward| {
                reward.is_reward(&self.config.reward_sender)
                    && reward.recipient() == self.reward_address
                    && reward.amount() == self.config.reward_amount
            });
            if !rewarded {
                return Err(BlockchainError::InvalidChain(format!(
                    "block {} does not end with the mining reward",
                    height
                )));
            }
        }

        Ok(())
    }

    /// Validates the blockchain
    ///
    /// # Returns
    ///
    /// true if the blockchain is valid, false otherwise
    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    /// Prints the whole chain to stdout
    pub fn show(&self) {
        print!("{}", self);
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(25);

        for (index, block) in self.chain.lock().iter().enumerate() {
            writeln!(f, "{} Chain {} {}", rule, index, rule)?;
            write!(f, "{}", block)?;
        }

        Ok(())
    }
}
