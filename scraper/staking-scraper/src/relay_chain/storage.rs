//! Substrate storage key construction

use blake2::{Blake2b, Digest, digest::consts::U16};
use twox_hash::XxHash64;

/// The hasher applied to a storage map key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageHasher {
    /// `twox64(key) ++ key`
    Twox64Concat,
    /// `blake2_128(key) ++ key`
    Blake2_128Concat,
}

impl StorageHasher {
    /// Hash a map key, appending the key itself
    pub fn hash(&self, key: &[u8]) -> Vec<u8> {
        let mut out = match self {
            StorageHasher::Twox64Concat => twox_64(key).to_vec(),
            StorageHasher::Blake2_128Concat => blake2_128(key).to_vec(),
        };
        out.extend_from_slice(key);
        out
    }
}

/// The 64-bit xxHash of the data
pub fn twox_64(data: &[u8]) -> [u8; 8] {
    XxHash64::oneshot(0, data).to_le_bytes()
}

/// Two concatenated 64-bit xxHashes of the data, seeded 0 and 1
pub fn twox_128(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&XxHash64::oneshot(0, data).to_le_bytes());
    out[8..].copy_from_slice(&XxHash64::oneshot(1, data).to_le_bytes());
    out
}

/// The 128-bit BLAKE2b hash of the data
pub fn blake2_128(data: &[u8]) -> [u8; 16] {
    Blake2b::<U16>::digest(data).into()
}

/// The key of a storage value
pub fn storage_value_key(pallet: &str, item: &str) -> Vec<u8> {
    let mut key = twox_128(pallet.as_bytes()).to_vec();
    key.extend_from_slice(&twox_128(item.as_bytes()));
    key
}

/// The key of an entry of a storage map
pub fn storage_map_key(pallet: &str, item: &str, hasher: StorageHasher, map_key: &[u8]) -> Vec<u8> {
    let mut key = storage_value_key(pallet, item);
    key.extend(hasher.hash(map_key));
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_value_keys() {
        assert_eq!(
            hex::encode(storage_value_key("Timestamp", "Now")),
            "f0c365c3cf59d671eb72da0e7a4113c49f1f0515f462cdcf84e0f1d6045dfcbb"
        );
    }

    #[test]
    fn test_map_key_layout() {
        let account = [7u8; 32];
        let key = storage_map_key("System", "Account", StorageHasher::Blake2_128Concat, &account);

        assert_eq!(
            hex::encode(&key[..32]),
            "26aa394eea5630e07c48ae0c9558cef7b99d880ec681799c0cf30e8886371da9"
        );
        assert_eq!(&key[32..48], &blake2_128(&account));
        assert_eq!(&key[48..], &account);
    }

    #[test]
    fn test_twox64_concat_appends_key() {
        let era = 1234u32.to_le_bytes();
        let hashed = StorageHasher::Twox64Concat.hash(&era);
        assert_eq!(hashed.len(), 12);
        assert_eq!(&hashed[8..], &era);
    }
}
