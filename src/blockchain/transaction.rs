use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Represents a transfer of value between two named parties
///
/// The serialized form is part of the block hash contract: it carries exactly
/// `from`, `to` and `amount`, in that order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// Sender's identifier
    #[serde(rename = "from")]
    sender: String,

    /// Recipient's identifier
    #[serde(rename = "to")]
    recipient: String,

    /// Amount being transferred
    amount: f32,
}

impl Transaction {
    /// Creates a new transaction
    ///
    /// No validation is applied: identifiers are opaque and zero or negative
    /// amounts are accepted. Use [`Transaction::validate`] when that matters.
    ///
    /// # Arguments
    ///
    /// * `sender` - The identifier of the sender
    /// * `recipient` - The identifier of the recipient
    /// * `amount` - The amount to transfer
    ///
    /// # Returns
    ///
    /// A new Transaction instance
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f32) -> Self {
        Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }

    /// Creates a mining reward transaction from the reserved sender identity
    pub fn reward(sender: impl Into<String>, recipient: impl Into<String>, amount: f32) -> Self {
        Self::new(sender, recipient, amount)
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }

    /// Checks if the transaction was minted by the given reward sender
    pub fn is_reward(&self, reward_sender: &str) -> bool {
        self.sender == reward_sender
    }

    /// Checks that the amount is a finite, strictly positive number
    ///
    /// # Returns
    ///
    /// Ok(()) if the transaction carries a usable amount
    pub fn validate(&self) -> Result<(), TransactionError> {
        if !self.amount.is_finite() {
            return Err(TransactionError::InvalidAmount(format!(
                "Amount must be finite: {}",
                self.amount
            )));
        }

        if self.amount <= 0.0 {
            return Err(TransactionError::InvalidAmount(format!(
                "Amount must be positive: {}",
                self.amount
            )));
        }

        Ok(())
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\tfrom: {}", self.sender)?;
        writeln!(f, "\tto: {}", self.recipient)?;
        writeln!(f, "\tamount: {}", self.amount)
    }
}
