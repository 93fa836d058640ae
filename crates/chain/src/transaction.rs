//! Ledger transactions

use crate::hash::{serde_hex, Hash};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Account / validator identity
pub type Address = String;

/// A value transfer between two addresses
///
/// Fields are private so a transaction cannot change after it is built; its
/// identity is the hash of its full borsh encoding, signature included.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Transaction {
    sender: Address,
    recipient: Address,
    amount: u64,
    /// Unix millis
    timestamp: u64,
    #[serde(default, with = "serde_hex::opt_bytes")]
    signature: Option<Vec<u8>>,
}

impl Transaction {
    /// Create an unsigned transaction
    pub fn new(sender: impl Into<Address>, recipient: impl Into<Address>, amount: u64, timestamp: u64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            timestamp,
            signature: None,
        }
    }

    /// Attach a signature over [`Transaction::signing_bytes`]
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Canonical bytes covered by the sender's signature (everything but the signature)
    pub fn signing_bytes(&self) -> Vec<u8> {
        borsh::to_vec(&(&self.sender, &self.recipient, self.amount, self.timestamp))
            .expect("Transaction payload serialization should not fail")
    }

    /// Content hash; pool key and merkle leaf
    pub fn id(&self) -> Hash {
        Hash::digest(&self.to_bytes())
    }

    /// Serialize for network transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("Transaction serialization should not fail")
    }

    /// Deserialize from network
    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}
