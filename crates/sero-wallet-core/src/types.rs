//! Fixed-width identifiers, subaddresses, amounts and assets.
//!
//! Two byte-string widths are fundamental: 32 bytes for commitments,
//! nullifiers, roots, hashes and currency tags, and 64 bytes for public
//! and viewing keys. A subaddress is 96 bytes; a zero tag in its last 32
//! bytes marks a "bare public key" subaddress.

use borsh::{BorshDeserialize, BorshSerialize};
use num_bigint::BigUint;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::error::Error;

/// The native gas currency name.
pub const SERO_CURRENCY: &str = "SERO";

macro_rules! fixed_id {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Byte width of this identifier.
            pub const LEN: usize = $len;

            /// Borrow the raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// True when every byte is zero.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            /// Build from a byte slice of exactly the right length.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
                if bytes.len() != $len {
                    return Err(Error::InputMalformed(format!(
                        "expected {} bytes, got {}",
                        $len,
                        bytes.len()
                    )));
                }
                let mut out = [0u8; $len];
                out.copy_from_slice(bytes);
                Ok(Self(out))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self([0u8; $len])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Error> {
                let raw = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(raw)
                    .map_err(|e| Error::InputMalformed(format!("hex decode: {e}")))?;
                Self::from_slice(&bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(D::Error::custom)
            }
        }
    };
}

fixed_id!(Id32, 32, "32-byte identifier: commitments, nullifiers, roots, hashes, currency tags.");
fixed_id!(Id64, 64, "64-byte identifier: public keys and viewing keys.");

impl Id32 {
    /// The 32-byte big-endian left-padded encoding of a subaddress index.
    pub fn from_index(index: u64) -> Self {
        let mut out = [0u8; 32];
        out[24..].copy_from_slice(&index.to_be_bytes());
        Self(out)
    }
}

/// A 96-byte subaddress (`PKr`): a 64-byte base followed by a 32-byte tag.
///
/// A zero tag marks a "bare public key" subaddress, i.e. the account key
/// itself used as a destination.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct SubAddr(pub [u8; 96]);

impl SubAddr {
    /// Byte width of a subaddress.
    pub const LEN: usize = 96;

    /// Assemble from a base key and tag.
    pub fn from_parts(base: &Id64, tag: &Id32) -> Self {
        let mut out = [0u8; 96];
        out[..64].copy_from_slice(&base.0);
        out[64..].copy_from_slice(&tag.0);
        Self(out)
    }

    /// A bare subaddress: the 64-byte key with a zero tag.
    pub fn bare(key: &Id64) -> Self {
        Self::from_parts(key, &Id32::default())
    }

    /// The 64-byte base of this subaddress.
    pub fn base(&self) -> Id64 {
        let mut out = [0u8; 64];
        out.copy_from_slice(&self.0[..64]);
        Id64(out)
    }

    /// The 32-byte tag distinguishing derived subaddresses from bare keys.
    pub fn tag(&self) -> Id32 {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.0[64..]);
        Id32(out)
    }

    /// True when the tag is all zeros, i.e. this is a bare public key.
    pub fn is_bare(&self) -> bool {
        self.0[64..].iter().all(|b| *b == 0)
    }

    /// Recover the owning account key from a subaddress.
    pub fn to_pk(&self) -> Id64 {
        self.base()
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 96] {
        &self.0
    }

    /// Build from a byte slice of exactly 96 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::LEN {
            return Err(Error::InputMalformed(format!(
                "expected 96 bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 96];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }
}

impl Default for SubAddr {
    fn default() -> Self {
        Self([0u8; 96])
    }
}

impl AsRef<[u8]> for SubAddr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for SubAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for SubAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for SubAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(raw).map_err(|e| Error::InputMalformed(format!("hex decode: {e}")))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for SubAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SubAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Wallet seed material, zeroized on drop.
#[derive(Clone)]
pub struct Seed(Zeroizing<[u8; 32]>);

impl Seed {
    /// Wrap raw seed bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Borrow the seed bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(..)")
    }
}

/// An arbitrary-precision unsigned token amount.
///
/// The canonical persisted encoding is the minimal big-endian byte string
/// (empty for zero), length-delimited by the surrounding codec.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount(pub BigUint);

impl Amount {
    /// The zero amount.
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    /// True when the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    /// Amount from a u64.
    pub fn from_u64(v: u64) -> Self {
        Self(BigUint::from(v))
    }

    /// Amount from a u128.
    pub fn from_u128(v: u128) -> Self {
        Self(BigUint::from(v))
    }

    /// Checked subtraction; `None` when `other` exceeds `self`.
    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if self.0 >= other.0 {
            Some(Amount(&self.0 - &other.0))
        } else {
            None
        }
    }

    /// Add another amount in place.
    pub fn add_assign(&mut self, other: &Amount) {
        self.0 += &other.0;
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_str_radix(10))
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Self::from_u64(v)
    }
}

impl BorshSerialize for Amount {
    fn serialize<W: borsh::io::Write>(&self, writer: &mut W) -> borsh::io::Result<()> {
        let bytes = if self.is_zero() {
            Vec::new()
        } else {
            self.0.to_bytes_be()
        };
        BorshSerialize::serialize(&bytes, writer)
    }
}

impl BorshDeserialize for Amount {
    fn deserialize_reader<R: borsh::io::Read>(reader: &mut R) -> borsh::io::Result<Self> {
        let bytes = Vec::<u8>::deserialize_reader(reader)?;
        Ok(Amount(BigUint::from_bytes_be(&bytes)))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_str_radix(10))
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        let v = BigUint::parse_bytes(s.as_bytes(), 10)
            .ok_or_else(|| D::Error::custom(format!("invalid decimal amount: {s}")))?;
        Ok(Amount(v))
    }
}

/// A fungible token: a currency tag and a value.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Token {
    /// Currency tag: the ASCII name left-padded to 32 bytes.
    pub currency: Id32,
    /// Token value.
    pub value: Amount,
}

/// A non-fungible ticket: a category and a unique value.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket category.
    pub category: Id32,
    /// Ticket value, unique within its category.
    pub value: Id32,
}

/// A decrypted output asset: fungible, non-fungible, or both.
#[derive(
    Clone, Debug, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Asset {
    /// Fungible component, if any.
    pub token: Option<Token>,
    /// Non-fungible component, if any.
    pub ticket: Option<Ticket>,
}

impl Asset {
    /// A purely fungible asset.
    pub fn token(currency: Id32, value: Amount) -> Self {
        Self {
            token: Some(Token { currency, value }),
            ticket: None,
        }
    }

    /// A purely non-fungible asset.
    pub fn ticket(category: Id32, value: Id32) -> Self {
        Self {
            token: None,
            ticket: Some(Ticket { category, value }),
        }
    }
}

/// The 32-byte currency tag for an ASCII currency name (left zero-padded).
pub fn currency_id(name: &str) -> Id32 {
    let upper = name.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[32 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
    Id32(out)
}

/// The ASCII currency name for a 32-byte currency tag (zero padding trimmed).
pub fn currency_name(id: &Id32) -> String {
    let trimmed: Vec<u8> = id.0.iter().copied().filter(|b| *b != 0).collect();
    String::from_utf8_lossy(&trimmed).into_owned()
}

/// Per-currency balance map keyed by trimmed currency name.
pub type Balances = HashMap<String, Amount>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id32_hex_round_trip() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        bytes[31] = 0x01;
        let id = Id32(bytes);
        let s = id.to_string();
        assert!(s.starts_with("0x"));
        assert_eq!(s.parse::<Id32>().unwrap(), id);
        // Bare hex is accepted too.
        assert_eq!(s[2..].parse::<Id32>().unwrap(), id);
    }

    #[test]
    fn test_id_from_slice_rejects_wrong_length() {
        assert!(Id32::from_slice(&[0u8; 31]).is_err());
        assert!(Id64::from_slice(&[0u8; 32]).is_err());
        assert!(SubAddr::from_slice(&[0u8; 95]).is_err());
    }

    #[test]
    fn test_subaddr_bare_detection() {
        let mut key = [0u8; 64];
        key[7] = 9;
        let pk = Id64(key);
        let bare = SubAddr::bare(&pk);
        assert!(bare.is_bare());
        assert_eq!(bare.to_pk(), pk);

        let derived = SubAddr::from_parts(&pk, &Id32([1u8; 32]));
        assert!(!derived.is_bare());
        assert_eq!(derived.base(), pk);
        assert_eq!(derived.tag(), Id32([1u8; 32]));
    }

    #[test]
    fn test_index_encoding_is_left_padded() {
        let r = Id32::from_index(0x0102);
        assert_eq!(&r.0[..24], &[0u8; 24]);
        assert_eq!(&r.0[24..], &[0, 0, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_amount_borsh_round_trip() {
        for v in [0u128, 1, 1000, u64::MAX as u128, u128::MAX] {
            let a = Amount::from_u128(v);
            let bytes = borsh::to_vec(&a).unwrap();
            let back = Amount::try_from_slice(&bytes).unwrap();
            assert_eq!(a, back);
        }
    }

    #[test]
    fn test_amount_checked_sub() {
        let a = Amount::from_u64(10);
        let b = Amount::from_u64(4);
        assert_eq!(a.checked_sub(&b), Some(Amount::from_u64(6)));
        assert_eq!(b.checked_sub(&a), None);
    }

    #[test]
    fn test_currency_tag_round_trip() {
        let id = currency_id("SERO");
        assert_eq!(&id.0[..28], &[0u8; 28]);
        assert_eq!(&id.0[28..], b"SERO");
        assert_eq!(currency_name(&id), "SERO");
        // Names are uppercased before tagging.
        assert_eq!(currency_id("sero"), id);
    }

    #[test]
    fn test_amount_json_is_decimal_string() {
        let a = Amount::from_u64(1234);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"1234\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
