//! On-chain output states, blocks, and the persisted UTXO record.
//!
//! An output is either cleartext (its address and asset are visible) or
//! sealed (recipient-encrypted payload plus a commitment). The scanner
//! turns matched outputs into [`RootRecord`]s; the builder reads them
//! back to recover the on-chain state for witness assembly.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::types::{Asset, Id32, Id64, SubAddr};

/// A cleartext output: destination, asset and memo are on-chain.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct PlainOut {
    /// Destination subaddress.
    pub addr: SubAddr,
    /// The asset carried by this output.
    pub asset: Asset,
    /// Cleartext memo.
    pub memo: Id64,
}

/// A sealed output: only the holder of the matching viewing key can
/// recover the payload.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SealedOut {
    /// Destination subaddress (visible; ownership is tested against it).
    pub pkr: SubAddr,
    /// Recipient-encrypted ephemeral key.
    pub rpk: Id64,
    /// Encrypted info blob (currency, value, ticket, memo).
    #[serde(with = "hex_bytes")]
    pub einfo: Vec<u8>,
    /// Commitment over the sealed payload, checked on decryption.
    pub out_cm: Id32,
}

/// The cleartext-or-sealed discriminant of an output.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum OutKind {
    /// Cleartext output.
    Plain(PlainOut),
    /// Sealed output.
    Sealed(SealedOut),
}

/// An output as published on chain: the kind plus the nullifier base
/// commitment.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct OutState {
    /// Cleartext or sealed payload.
    pub kind: OutKind,
    /// Output commitment; nullifiers are derived from it.
    pub root_cm: Id32,
}

impl OutState {
    /// The destination subaddress of this output.
    pub fn dest(&self) -> &SubAddr {
        match &self.kind {
            OutKind::Plain(o) => &o.addr,
            OutKind::Sealed(o) => &o.pkr,
        }
    }
}

/// An output state with its block metadata, as served by the chain reader.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ChainOutState {
    /// The output itself.
    pub os: OutState,
    /// Block height the output was created in.
    pub num: u64,
    /// Hash of the owning transaction.
    pub tx_hash: Id32,
}

/// A chain output: its stable root identifier plus state.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ChainOut {
    /// On-chain stable identifier, distinct from the commitment.
    pub root: Id32,
    /// Output state and metadata.
    pub state: ChainOutState,
}

/// A block as served by the chain reader: outputs created plus nullifiers
/// spent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height.
    pub num: u64,
    /// Block hash.
    pub hash: Id32,
    /// Outputs created in this block.
    pub outs: Vec<ChainOut>,
    /// Nullifiers published (spent) in this block.
    pub nils: Vec<Id32>,
}

/// Witness data proving an input's commitment is in the global
/// accumulator; opaque to the wallet, consumed by the prover.
#[derive(
    Clone, Debug, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Witness(#[serde(with = "hex_bytes")] pub Vec<u8>);

/// The persisted form of a matched output, keyed by its root.
///
/// Carries both the decrypted UTXO fields and the on-chain [`OutState`],
/// so transaction building can recover the state without another chain
/// round trip. Records are archival: they are never deleted, even after
/// the nullifier is observed.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RootRecord {
    /// On-chain stable identifier.
    pub root: Id32,
    /// Hash of the transaction that created the output.
    pub tx_hash: Id32,
    /// Nullifier derived for this output.
    pub nil: Id32,
    /// Block height the output was created in.
    pub num: u64,
    /// Decrypted asset.
    pub asset: Asset,
    /// On-chain output state.
    pub state: OutState,
}

impl RootRecord {
    /// View this record as a UTXO with the given reserved-spent flag.
    pub fn to_utxo(&self, flag: u8) -> Utxo {
        Utxo {
            root: self.root,
            tx_hash: self.tx_hash,
            nil: self.nil,
            num: self.num,
            asset: self.asset.clone(),
            flag,
        }
    }
}

/// An unspent output known to this wallet, with its decrypted asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Utxo {
    /// On-chain stable identifier.
    pub root: Id32,
    /// Hash of the transaction that created the output.
    pub tx_hash: Id32,
    /// Nullifier; its on-chain appearance retires the UTXO.
    pub nil: Id32,
    /// Block height the output was created in.
    pub num: u64,
    /// Decrypted asset.
    pub asset: Asset,
    /// Reserved-spent tag: non-zero when a built transaction has already
    /// claimed this output. Not persisted.
    #[serde(skip)]
    pub flag: u8,
}

/// Hex-string (de)serialization for byte vectors in JSON surfaces.
pub mod hex_bytes {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a `0x`-prefixed hex string.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    /// Deserialize bytes from a hex string, `0x` prefix optional.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let raw = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{currency_id, Amount};

    fn sample_record() -> RootRecord {
        let asset = Asset::token(currency_id("SERO"), Amount::from_u64(1000));
        let state = OutState {
            kind: OutKind::Plain(PlainOut {
                addr: SubAddr::bare(&Id64([3u8; 64])),
                asset: asset.clone(),
                memo: Id64::default(),
            }),
            root_cm: Id32([7u8; 32]),
        };
        RootRecord {
            root: Id32([1u8; 32]),
            tx_hash: Id32([2u8; 32]),
            nil: Id32([4u8; 32]),
            num: 5,
            asset,
            state,
        }
    }

    #[test]
    fn test_root_record_borsh_round_trip() {
        let record = sample_record();
        let bytes = borsh::to_vec(&record).unwrap();
        let back = RootRecord::try_from_slice(&bytes).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_root_list_borsh_round_trip() {
        let roots = vec![Id32([1u8; 32]), Id32([2u8; 32]), Id32([0xffu8; 32])];
        let bytes = borsh::to_vec(&roots).unwrap();
        let back = Vec::<Id32>::try_from_slice(&bytes).unwrap();
        assert_eq!(back, roots);
    }

    #[test]
    fn test_sealed_out_json_uses_hex_payload() {
        let out = SealedOut {
            pkr: SubAddr::bare(&Id64([9u8; 64])),
            rpk: Id64([8u8; 64]),
            einfo: vec![0xde, 0xad],
            out_cm: Id32([6u8; 32]),
        };
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("0xdead"));
        let back: SealedOut = serde_json::from_str(&json).unwrap();
        assert_eq!(back, out);
    }

    #[test]
    fn test_dest_picks_the_right_arm() {
        let record = sample_record();
        assert_eq!(*record.state.dest(), SubAddr::bare(&Id64([3u8; 64])));
    }
}
