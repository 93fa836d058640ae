//! Node Configuration
//!
//! Read from a JSON file. Every node in a network must agree on the shard
//! layout and `genesis_timestamp`, otherwise their genesis blocks differ.

use alsania_chain::{hash::serde_hex, ShardId, Validator, MAX_DIFFICULTY};
use alsania_consensus::{keys::public_key_for, ConsensusConfig};
use alsania_ledger::{LedgerConfig, LocalValidator};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// A shard and the validators it admits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    pub id: ShardId,
    #[serde(default)]
    pub validators: Vec<Validator>,
}

/// A funded account, optionally with a key so its transfers can be signed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub address: String,
    #[serde(default)]
    pub balance: u64,
    #[serde(default, with = "serde_hex::opt_bytes", skip_serializing_if = "Option::is_none")]
    pub public_key: Option<Vec<u8>>,
}

/// The identity this node votes with
#[derive(Clone, Serialize, Deserialize)]
pub struct LocalKeyConfig {
    pub id: String,
    /// ed25519 secret seed, hex
    pub secret_key: String,
}

impl std::fmt::Debug for LocalKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyConfig").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP RPC bind address
    pub rpc_addr: String,
    /// Peer transport bind address
    pub p2p_addr: String,
    /// Peer transport addresses to dial
    pub peers: Vec<String>,
    pub shards: Vec<ShardConfig>,
    pub accounts: Vec<AccountConfig>,
    /// Absent for an observer node
    pub local_validator: Option<LocalKeyConfig>,
    /// Unix millis
    pub genesis_timestamp: u64,
    /// Minted per confirmed block, split by stake
    pub block_reward: u64,
    pub difficulty: u32,
    pub max_txs_per_block: usize,
    pub proposal_timeout_ms: u64,
    pub require_signatures: bool,
    pub allow_empty_blocks: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let consensus = ConsensusConfig::default();
        Self {
            rpc_addr: "127.0.0.1:8899".to_string(),
            p2p_addr: "127.0.0.1:9000".to_string(),
            peers: Vec::new(),
            shards: Vec::new(),
            accounts: Vec::new(),
            local_validator: None,
            genesis_timestamp: 0,
            block_reward: 0,
            difficulty: consensus.difficulty,
            max_txs_per_block: consensus.max_txs_per_block,
            proposal_timeout_ms: consensus.block_proposal_timeout.as_millis() as u64,
            require_signatures: consensus.require_signatures,
            allow_empty_blocks: false,
        }
    }
}

impl NodeConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Every validator across all shards, in shard order
    pub fn validators(&self) -> Vec<Validator> {
        self.shards.iter().flat_map(|s| s.validators.iter().cloned()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            bail!("difficulty {} exceeds the maximum of {}", self.difficulty, MAX_DIFFICULTY);
        }

        let mut shard_ids = HashSet::new();
        let mut validator_ids = HashSet::new();
        for shard in &self.shards {
            if !shard_ids.insert(shard.id) {
                bail!("shard {} listed twice", shard.id);
            }
            for v in &shard.validators {
                if !validator_ids.insert(v.id.as_str()) {
                    bail!("validator {} listed twice", v.id);
                }
            }
        }

        for account in &self.accounts {
            if let Some(key) = &account.public_key {
                if key.len() != 32 {
                    bail!("account {} public key must be 32 bytes", account.address);
                }
            }
        }

        if let Some(local) = &self.local_validator {
            let secret = self.local_secret(local)?;
            let validator = self
                .validators()
                .into_iter()
                .find(|v| v.id == local.id)
                .with_context(|| format!("local validator {} is not in any shard", local.id))?;
            if public_key_for(&secret) != validator.public_key {
                bail!("secret key does not match the public key of {}", local.id);
            }
        }
        Ok(())
    }

    fn local_secret(&self, local: &LocalKeyConfig) -> Result<[u8; 32]> {
        let mut secret = [0u8; 32];
        hex::decode_to_slice(&local.secret_key, &mut secret)
            .with_context(|| format!("secret key of {} must be 64 hex chars", local.id))?;
        Ok(secret)
    }

    pub fn consensus(&self) -> ConsensusConfig {
        ConsensusConfig {
            difficulty: self.difficulty,
            max_txs_per_block: self.max_txs_per_block,
            block_proposal_timeout: Duration::from_millis(self.proposal_timeout_ms),
            require_signatures: self.require_signatures,
        }
    }

    pub fn ledger(&self) -> Result<LedgerConfig> {
        let local_validator = match &self.local_validator {
            Some(local) => Some(LocalValidator {
                id: local.id.clone(),
                secret_key: self.local_secret(local)?,
            }),
            None => None,
        };

        Ok(LedgerConfig {
            consensus: self.consensus(),
            genesis_timestamp: self.genesis_timestamp,
            allow_empty_blocks: self.allow_empty_blocks,
            local_validator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: [u8; 32] = [7u8; 32];

    fn sample() -> serde_json::Value {
        serde_json::json!({
            "genesis_timestamp": 1_700_000_000_000u64,
            "block_reward": 40,
            "shards": [
                { "id": 1, "validators": [
                    { "id": "v0", "stake": 25, "public_key": hex::encode(public_key_for(&SECRET)) },
                    { "id": "v1", "stake": 25, "public_key": hex::encode([1u8; 32]) }
                ]},
                { "id": 2 }
            ],
            "accounts": [
                { "address": "alice", "balance": 100, "public_key": hex::encode([2u8; 32]) }
            ],
            "local_validator": { "id": "v0", "secret_key": hex::encode(SECRET) }
        })
    }

    #[test]
    fn test_parse_with_defaults() {
        let config: NodeConfig = serde_json::from_value(sample()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.rpc_addr, "127.0.0.1:8899");
        assert_eq!(config.validators().len(), 2);
        assert_eq!(config.shards[1].validators.len(), 0);
        assert_eq!(config.accounts[0].public_key.as_deref(), Some(&[2u8; 32][..]));

        let ledger = config.ledger().unwrap();
        assert_eq!(ledger.genesis_timestamp, 1_700_000_000_000);
        assert_eq!(ledger.consensus.block_proposal_timeout, Duration::from_secs(10));
        assert_eq!(ledger.local_validator.unwrap().secret_key, SECRET);
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut raw = sample();
        raw["shards"][1]["id"] = serde_json::json!(1);
        let config: NodeConfig = serde_json::from_value(raw).unwrap();
        assert!(config.validate().is_err());

        let mut raw = sample();
        let repeated = raw["shards"][0]["validators"].clone();
        raw["shards"][1]["validators"] = repeated;
        let config: NodeConfig = serde_json::from_value(raw).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_mismatched_local_key() {
        let mut raw = sample();
        raw["local_validator"]["id"] = serde_json::json!("v1");
        let config: NodeConfig = serde_json::from_value(raw).unwrap();
        assert!(config.validate().is_err());

        let mut raw = sample();
        raw["local_validator"]["id"] = serde_json::json!("nobody");
        let config: NodeConfig = serde_json::from_value(raw).unwrap();
        assert!(config.validate().is_err());

        let mut raw = sample();
        raw["local_validator"]["secret_key"] = serde_json::json!("abcd");
        let config: NodeConfig = serde_json::from_value(raw).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unreachable_difficulty() {
        let mut raw = sample();
        raw["difficulty"] = serde_json::json!(MAX_DIFFICULTY);
        let config: NodeConfig = serde_json::from_value(raw).unwrap();
        config.validate().unwrap();

        for difficulty in [MAX_DIFFICULTY + 1, 65, u32::MAX] {
            let mut raw = sample();
            raw["difficulty"] = serde_json::json!(difficulty);
            let config: NodeConfig = serde_json::from_value(raw).unwrap();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("difficulty"), "{}", err);
        }
    }
}
