//! Key builders for the wallet index namespaces.
//!
//! All builders are pure and total: they concatenate a namespace prefix
//! with fixed-width fields. Layouts:
//!
//! - `NUM  || pk(64)`                                  → next block height
//! - `ROOT || root(32)`                                → root record
//! - `PK   || pk(64) || asset_key(32) || root(32)`     → marker (130 bytes)
//! - `PKR  || pkr(96) || be_u64(num)`                  → root list (107 bytes)
//! - `NIL  || (nil(32) | root(32))`                    → the full PK key

use sero_wallet_core::{Id32, Id64, SubAddr};

const NUM_PREFIX: &[u8] = b"NUM";
const PK_PREFIX: &[u8] = b"PK";
const PKR_PREFIX: &[u8] = b"PKR";
const ROOT_PREFIX: &[u8] = b"ROOT";
const NIL_PREFIX: &[u8] = b"NIL";

/// Total length of a `PK` index entry key.
pub const PK_KEY_LEN: usize = 2 + 64 + 32 + 32;

/// Total length of a `PKR` index entry key.
pub const PKR_KEY_LEN: usize = 3 + 96 + 8;

/// Big-endian encoding of a block height.
pub fn encode_number(number: u64) -> [u8; 8] {
    number.to_be_bytes()
}

/// Decode a big-endian block height.
pub fn decode_number(data: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = data.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// The scan-cursor key of an account.
pub fn num_key(pk: &Id64) -> Vec<u8> {
    [NUM_PREFIX, &pk.0].concat()
}

/// Prefix spanning every scan cursor.
pub fn num_prefix() -> Vec<u8> {
    NUM_PREFIX.to_vec()
}

/// The record key of an output root.
pub fn root_key(root: &Id32) -> Vec<u8> {
    [ROOT_PREFIX, &root.0].concat()
}

/// The alias key of a nullifier or root, pointing at the `PK` entry.
pub fn nil_key(id: &Id32) -> Vec<u8> {
    [NIL_PREFIX, &id.0].concat()
}

/// The per-account, per-asset marker key of a UTXO.
pub fn pk_key(pk: &Id64, asset_key: &Id32, root: &Id32) -> Vec<u8> {
    [PK_PREFIX, &pk.0, &asset_key.0, &root.0].concat()
}

/// Prefix spanning an account's UTXOs of one asset.
pub fn pk_asset_prefix(pk: &Id64, asset_key: &Id32) -> Vec<u8> {
    [PK_PREFIX, &pk.0, &asset_key.0].concat()
}

/// Prefix spanning every UTXO of an account.
pub fn pk_prefix(pk: &Id64) -> Vec<u8> {
    [PK_PREFIX, &pk.0].concat()
}

/// The per-subaddress, per-block history key.
pub fn pkr_key(pkr: &SubAddr, num: u64) -> Vec<u8> {
    [PKR_PREFIX, pkr.as_bytes().as_slice(), &encode_number(num)].concat()
}

/// Prefix spanning a subaddress's history.
pub fn pkr_prefix(pkr: &SubAddr) -> Vec<u8> {
    [PKR_PREFIX, pkr.as_bytes().as_slice()].concat()
}

/// Recover the root from a full `PK` entry key.
pub fn root_from_pk_key(key: &[u8]) -> Option<Id32> {
    if key.len() != PK_KEY_LEN {
        return None;
    }
    Id32::from_slice(&key[98..130]).ok()
}

/// Recover the block height from a full `PKR` entry key.
pub fn num_from_pkr_key(key: &[u8]) -> Option<u64> {
    if key.len() != PKR_KEY_LEN {
        return None;
    }
    decode_number(&key[99..107])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_round_trip() {
        for n in [0u64, 1, 255, 256, u64::MAX] {
            assert_eq!(decode_number(&encode_number(n)), Some(n));
        }
        assert_eq!(decode_number(&[1, 2, 3]), None);
    }

    #[test]
    fn test_number_encoding_preserves_order() {
        // Lexicographic order of the encoding must match numeric order;
        // PKR range seeks depend on it.
        let mut encoded: Vec<[u8; 8]> = [7u64, 1, 300, 255, 65536].iter().map(|n| encode_number(*n)).collect();
        encoded.sort();
        let decoded: Vec<u64> = encoded.iter().map(|b| decode_number(b).unwrap()).collect();
        assert_eq!(decoded, vec![1, 7, 255, 300, 65536]);
    }

    #[test]
    fn test_pk_key_layout() {
        let pk = Id64([1u8; 64]);
        let asset = Id32([2u8; 32]);
        let root = Id32([3u8; 32]);
        let key = pk_key(&pk, &asset, &root);
        assert_eq!(key.len(), PK_KEY_LEN);
        assert_eq!(&key[..2], b"PK");
        assert_eq!(root_from_pk_key(&key), Some(root));
        assert!(key.starts_with(&pk_asset_prefix(&pk, &asset)));
        assert!(key.starts_with(&pk_prefix(&pk)));
    }

    #[test]
    fn test_pkr_key_layout() {
        let pkr = SubAddr([4u8; 96]);
        let key = pkr_key(&pkr, 77);
        assert_eq!(key.len(), PKR_KEY_LEN);
        assert_eq!(&key[..3], b"PKR");
        assert_eq!(num_from_pkr_key(&key), Some(77));
        assert!(key.starts_with(&pkr_prefix(&pkr)));
    }

    #[test]
    fn test_slice_decoders_reject_wrong_length() {
        assert_eq!(root_from_pk_key(&[0u8; 129]), None);
        assert_eq!(num_from_pkr_key(&[0u8; 108]), None);
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        // "PK" is a strict prefix of "PKR" as a string, but the fixed
        // field widths keep the key sets disjoint: a PK entry is 130
        // bytes and never 107.
        assert_ne!(PK_KEY_LEN, PKR_KEY_LEN);
        let pk = Id64([0xaa; 64]);
        let num = num_key(&pk);
        assert_eq!(num.len(), 3 + 64);
    }
}
