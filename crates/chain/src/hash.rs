//! 32-byte blake3 digest used for block hashes, merkle nodes and transaction ids

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BorshSerialize, BorshDeserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// All-zero digest, the genesis block's previous hash
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Hash arbitrary bytes
    pub fn digest(data: &[u8]) -> Self {
        Hash(*blake3::hash(data).as_bytes())
    }

    /// Hash the concatenation `left || right`
    pub fn combine(left: &Hash, right: &Hash) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&left.0);
        hasher.update(&right.0);
        Hash(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Hash(out))
    }

    /// First 8 hex characters, for log lines
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }

    /// Number of leading zero hex digits
    pub fn leading_zero_nibbles(&self) -> u32 {
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
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

// Hex strings for JSON, raw bytes for bincode.
impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            Serialize::serialize(&self.0, serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = <String as Deserialize>::deserialize(deserializer)?;
            Hash::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            <[u8; 32] as Deserialize>::deserialize(deserializer).map(Hash)
        }
    }
}

/// Serde helpers for byte fields that should read as hex in JSON
pub mod serde_hex {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub mod bytes32 {
        use super::*;

        pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
            if serializer.is_human_readable() {
                serializer.serialize_str(&hex::encode(bytes))
            } else {
                Serialize::serialize(bytes, serializer)
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
            if deserializer.is_human_readable() {
                let s = <String as Deserialize>::deserialize(deserializer)?;
                let mut out = [0u8; 32];
                hex::decode_to_slice(&s, &mut out).map_err(serde::de::Error::custom)?;
                Ok(out)
            } else {
                <[u8; 32] as Deserialize>::deserialize(deserializer)
            }
        }
    }

    pub mod opt_bytes {
        use super::*;

        pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
            if serializer.is_human_readable() {
                Serialize::serialize(&bytes.as_ref().map(hex::encode), serializer)
            } else {
                Serialize::serialize(bytes, serializer)
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
            if deserializer.is_human_readable() {
                let s = <Option<String> as Deserialize>::deserialize(deserializer)?;
                s.map(|s| hex::decode(s).map_err(serde::de::Error::custom)).transpose()
            } else {
                <Option<Vec<u8>> as Deserialize>::deserialize(deserializer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip_and_nibbles() {
        let mut bytes = [0xffu8; 32];
        bytes[0] = 0x00;
        bytes[1] = 0x0a;
        let hash = Hash(bytes);
        assert_eq!(hash.leading_zero_nibbles(), 3);
        assert_eq!(Hash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert_eq!(Hash::ZERO.leading_zero_nibbles(), 64);
    }

    #[test]
    fn test_json_uses_hex() {
        let hash = Hash::digest(b"alsania");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_bincode_uses_raw_bytes() {
        let hash = Hash::digest(b"alsania");
        let bytes = bincode::serialize(&hash).unwrap();
        assert_eq!(bytes, hash.as_bytes().to_vec());
        let back: Hash = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, hash);

        // Borsh and serde agree on the raw form
        assert_eq!(borsh::to_vec(&hash).unwrap(), bytes);
    }
}
