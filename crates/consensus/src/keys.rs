//! ed25519 key registry

use crate::interfaces::KeyRegistry;
use alsania_chain::{Address, Validator};
use dashmap::DashMap;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

/// Address -> verifying key, safe to share across tasks
#[derive(Default)]
pub struct Ed25519KeyRegistry {
    keys: DashMap<Address, [u8; 32]>,
}

impl Ed25519KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with each validator's key
    pub fn from_validators(validators: &[Validator]) -> Self {
        let registry = Self::new();
        for v in validators {
            registry.register(v.id.clone(), v.public_key);
        }
        registry
    }

    /// Register or replace an address's key
    pub fn register(&self, address: impl Into<Address>, public_key: [u8; 32]) {
        self.keys.insert(address.into(), public_key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Verifying key for a 32-byte secret seed
pub fn public_key_for(secret_key: &[u8; 32]) -> [u8; 32] {
    SigningKey::from_bytes(secret_key).verifying_key().to_bytes()
}

impl KeyRegistry for Ed25519KeyRegistry {
    fn sign(&self, payload: &[u8], secret_key: &[u8; 32]) -> Vec<u8> {
        SigningKey::from_bytes(secret_key).sign(payload).to_bytes().to_vec()
    }

    fn verify(&self, public_key: &[u8; 32], payload: &[u8], signature: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify_strict(payload, &signature).is_ok()
    }

    fn get_public_key(&self, address: &str) -> Option<[u8; 32]> {
        self.keys.get(address).map(|k| *k)
    }
}
