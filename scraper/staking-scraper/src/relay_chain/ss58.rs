//! SS58 account address encoding

use blake2::{Blake2b512, Digest};

/// The checksum preimage prefix
const SS58_PREFIX: &[u8] = b"SS58PRE";
/// The checksum length for 32-byte accounts
const CHECKSUM_LEN: usize = 2;
/// The largest address format identifier
const MAX_FORMAT: u16 = 16_383;

/// Errors decoding an SS58 address
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Ss58Error {
    /// The address is not valid base58
    #[error("invalid base58: {0}")]
    Base58(String),
    /// The address has an unexpected length
    #[error("invalid address length {0}")]
    Length(usize),
    /// The address format prefix is reserved
    #[error("invalid address format prefix")]
    Format,
    /// The checksum does not match
    #[error("invalid checksum")]
    Checksum,
}

/// Encode a 32-byte public key as an SS58 address of the given format
pub fn ss58_encode(public_key: &[u8; 32], format: u16) -> String {
    let format = format & MAX_FORMAT;
    let mut bytes = if format < 64 {
        vec![format as u8]
    } else {
        vec![
            (((format & 0b0000_0000_1111_1100) >> 2) as u8) | 0b0100_0000,
            ((format >> 8) as u8) | (((format & 0b0000_0000_0000_0011) as u8) << 6),
        ]
    };
    bytes.extend_from_slice(public_key);

    let checksum = checksum(&bytes);
    bytes.extend_from_slice(&checksum[..CHECKSUM_LEN]);
    bs58::encode(bytes).into_string()
}

/// Decode an SS58 address into its public key and format
pub fn ss58_decode(address: &str) -> Result<([u8; 32], u16), Ss58Error> {
    let bytes = bs58::decode(address).into_vec().map_err(|e| Ss58Error::Base58(e.to_string()))?;
    let first = *bytes.first().ok_or(Ss58Error::Length(0))?;

    let (prefix_len, format) = match first {
        0..=63 => (1, u16::from(first)),
        64..=127 => {
            let second = *bytes.get(1).ok_or(Ss58Error::Length(bytes.len()))?;
            let lower = ((first & 0b0011_1111) << 2) | (second >> 6);
            let upper = second & 0b0011_1111;
            (2, u16::from(lower) | (u16::from(upper) << 8))
        },
        _ => return Err(Ss58Error::Format),
    };

    if bytes.len() != prefix_len + 32 + CHECKSUM_LEN {
        return Err(Ss58Error::Length(bytes.len()));
    }

    let body_len = prefix_len + 32;
    let expected = checksum(&bytes[..body_len]);
    if bytes[body_len..] != expected[..CHECKSUM_LEN] {
        return Err(Ss58Error::Checksum);
    }

    let mut public_key = [0u8; 32];
    public_key.copy_from_slice(&bytes[prefix_len..body_len]);
    Ok((public_key, format))
}

/// The BLAKE2b-512 checksum of the prefixed payload
fn checksum(payload: &[u8]) -> [u8; 64] {
    let mut hasher = Blake2b512::new();
    hasher.update(SS58_PREFIX);
    hasher.update(payload);
    hasher.finalize().into()
}
