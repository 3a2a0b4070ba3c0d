//! The crypto provider contract and its software reference
//! implementation.
//!
//! The curve library is an external collaborator: the wallet only needs
//! key derivation, the subaddress ownership test, payload decryption with
//! confirmation, and deterministic nullifier generation. Production
//! deployments bind the native library behind [`CryptoProvider`]; the
//! in-tree [`SoftwareCrypto`] provider implements the same contract with
//! domain-separated Blake2b derivations and a ChaCha20 payload cipher,
//! which is what the CLI and the test suite run against.

use blake2b_simd::Params;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;

use crate::tx::Stx;
use crate::types::{Amount, Asset, Id32, Id64, Seed, SubAddr};
use crate::outputs::SealedOut;

/// Byte length of a sealed info payload: currency, value, ticket
/// category, ticket value, memo.
pub const EINFO_LEN: usize = 32 + 32 + 32 + 32 + 64;

/// A decrypted sealed-output payload, prior to confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoDesc {
    /// Currency tag.
    pub currency: Id32,
    /// Token value, big-endian.
    pub value: Id32,
    /// Ticket category.
    pub category: Id32,
    /// Ticket value.
    pub tkt_value: Id32,
    /// Memo.
    pub memo: Id64,
}

impl InfoDesc {
    /// The asset described by this payload. A zero currency means no
    /// fungible component; a zero category means no ticket.
    pub fn to_asset(&self) -> Asset {
        let mut asset = Asset::default();
        if !self.currency.is_zero() {
            asset.token = Some(crate::types::Token {
                currency: self.currency,
                value: Amount(num_bigint::BigUint::from_bytes_be(&self.value.0)),
            });
        }
        if !self.category.is_zero() {
            asset.ticket = Some(crate::types::Ticket {
                category: self.category,
                value: self.tkt_value,
            });
        }
        asset
    }
}

/// Cryptographic operations the wallet engine depends on.
pub trait CryptoProvider: Send + Sync {
    /// Derive the spending key from wallet seed material.
    fn seed_to_sk(&self, seed: &Seed) -> Id64;

    /// Derive the viewing key from a spending key.
    fn sk_to_tk(&self, sk: &Id64) -> Id64;

    /// Derive the public key from a viewing key.
    fn tk_to_pk(&self, tk: &Id64) -> Id64;

    /// Derive the subaddress of `pk` at `r32` (the big-endian left-padded
    /// index).
    fn derive_subaddress(&self, pk: &Id64, r32: &Id32) -> SubAddr;

    /// True when `addr` belongs to the holder of viewing key `tk`.
    fn is_my_address(&self, tk: &Id64, addr: &SubAddr) -> bool;

    /// Recover the shared payload key (and cipher flag) for a sealed
    /// output's ephemeral key.
    fn fetch_key(&self, skr: &SubAddr, rpk: &Id64) -> (Id32, bool);

    /// Decrypt a sealed info blob. Returns `None` only on malformed
    /// input; a wrong key yields garbage that fails confirmation.
    fn decrypt_info(&self, key: &Id32, flag: bool, einfo: &[u8]) -> Option<InfoDesc>;

    /// Check a decrypted payload against the sealed output's commitment.
    fn confirm_sealed(&self, info: &InfoDesc, out: &SealedOut) -> bool;

    /// Deterministically derive the nullifier of an output commitment.
    fn generate_nullifier(&self, skr: &SubAddr, root_cm: &Id32) -> Id32;
}

fn hash(domain: &str, parts: &[&[u8]], len: usize) -> Vec<u8> {
    let mut state = Params::new().hash_length(len).to_state();
    state.update(domain.as_bytes());
    for part in parts {
        state.update(part);
    }
    state.finalize().as_bytes().to_vec()
}

fn hash32(domain: &str, parts: &[&[u8]]) -> Id32 {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hash(domain, parts, 32));
    Id32(out)
}

fn hash64(domain: &str, parts: &[&[u8]]) -> Id64 {
    let mut out = [0u8; 64];
    out.copy_from_slice(&hash(domain, parts, 64));
    Id64(out)
}

/// Hash of a proven transaction body.
pub fn hash_stx(stx: &Stx) -> Id32 {
    let bytes = borsh::to_vec(stx).expect("stx encoding is infallible");
    hash32("sero.stx", &[&bytes])
}

/// Software reference implementation of [`CryptoProvider`].
///
/// A derived subaddress carries an unlinkable hashed base plus a tag the
/// viewing-key holder can recompute; a bare subaddress is the account
/// key itself with a zero tag.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoftwareCrypto;

impl SoftwareCrypto {
    fn keystream(key: &Id32, flag: bool, data: &mut [u8]) {
        let mut nonce = [0u8; 12];
        nonce[0] = flag as u8;
        let mut cipher = ChaCha20::new(key.as_bytes().into(), (&nonce).into());
        cipher.apply_keystream(data);
    }

    /// Seal an info payload for tests and tooling: the inverse of
    /// [`CryptoProvider::decrypt_info`].
    pub fn seal_info(&self, key: &Id32, flag: bool, info: &InfoDesc) -> Vec<u8> {
        let mut buf = Vec::with_capacity(EINFO_LEN);
        buf.extend_from_slice(&info.currency.0);
        buf.extend_from_slice(&info.value.0);
        buf.extend_from_slice(&info.category.0);
        buf.extend_from_slice(&info.tkt_value.0);
        buf.extend_from_slice(&info.memo.0);
        Self::keystream(key, flag, &mut buf);
        buf
    }

    /// The payload commitment for a sealed output carrying `info`.
    pub fn seal_commitment(&self, pkr: &SubAddr, info: &InfoDesc) -> Id32 {
        hash32(
            "sero.out-cm",
            &[
                pkr.as_bytes(),
                &info.currency.0,
                &info.value.0,
                &info.category.0,
                &info.tkt_value.0,
                &info.memo.0,
            ],
        )
    }
}

impl CryptoProvider for SoftwareCrypto {
    fn seed_to_sk(&self, seed: &Seed) -> Id64 {
        hash64("sero.seed2sk", &[seed.as_bytes()])
    }

    fn sk_to_tk(&self, sk: &Id64) -> Id64 {
        hash64("sero.sk2tk", &[&sk.0])
    }

    fn tk_to_pk(&self, tk: &Id64) -> Id64 {
        hash64("sero.tk2pk", &[&tk.0])
    }

    fn derive_subaddress(&self, pk: &Id64, r32: &Id32) -> SubAddr {
        let base = hash64("sero.sub-base", &[&pk.0, &r32.0]);
        let tag = hash32("sero.sub-tag", &[&pk.0, &base.0]);
        SubAddr::from_parts(&base, &tag)
    }

    fn is_my_address(&self, tk: &Id64, addr: &SubAddr) -> bool {
        let pk = self.tk_to_pk(tk);
        if addr.is_bare() {
            return pk == addr.base();
        }
        addr.tag() == hash32("sero.sub-tag", &[&pk.0, &addr.base().0])
    }

    fn fetch_key(&self, skr: &SubAddr, rpk: &Id64) -> (Id32, bool) {
        let key = hash32("sero.fetch-key", &[&skr.base().0, &rpk.0]);
        (key, rpk.0[0] & 1 == 1)
    }

    fn decrypt_info(&self, key: &Id32, flag: bool, einfo: &[u8]) -> Option<InfoDesc> {
        if einfo.len() != EINFO_LEN {
            return None;
        }
        let mut buf = einfo.to_vec();
        Self::keystream(key, flag, &mut buf);
        Some(InfoDesc {
            currency: Id32::from_slice(&buf[..32]).ok()?,
            value: Id32::from_slice(&buf[32..64]).ok()?,
            category: Id32::from_slice(&buf[64..96]).ok()?,
            tkt_value: Id32::from_slice(&buf[96..128]).ok()?,
            memo: Id64::from_slice(&buf[128..192]).ok()?,
        })
    }

    fn confirm_sealed(&self, info: &InfoDesc, out: &SealedOut) -> bool {
        self.seal_commitment(&out.pkr, info) == out.out_cm
    }

    fn generate_nullifier(&self, skr: &SubAddr, root_cm: &Id32) -> Id32 {
        hash32("sero.nil", &[skr.as_bytes(), &root_cm.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::currency_id;

    fn info() -> InfoDesc {
        InfoDesc {
            currency: currency_id("SERO"),
            value: Id32::from_index(1000),
            category: Id32::default(),
            tkt_value: Id32::default(),
            memo: Id64([5u8; 64]),
        }
    }

    #[test]
    fn test_seal_then_decrypt_round_trip() {
        let crypto = SoftwareCrypto;
        let key = Id32([9u8; 32]);
        let sealed = crypto.seal_info(&key, true, &info());
        assert_eq!(sealed.len(), EINFO_LEN);
        let back = crypto.decrypt_info(&key, true, &sealed).unwrap();
        assert_eq!(back, info());
    }

    #[test]
    fn test_wrong_key_fails_confirmation() {
        let crypto = SoftwareCrypto;
        let pkr = SubAddr::bare(&Id64([1u8; 64]));
        let key = Id32([9u8; 32]);
        let out = SealedOut {
            pkr,
            rpk: Id64([2u8; 64]),
            einfo: crypto.seal_info(&key, false, &info()),
            out_cm: crypto.seal_commitment(&pkr, &info()),
        };

        let good = crypto.decrypt_info(&key, false, &out.einfo).unwrap();
        assert!(crypto.confirm_sealed(&good, &out));

        let bad = crypto
            .decrypt_info(&Id32([8u8; 32]), false, &out.einfo)
            .unwrap();
        assert!(!crypto.confirm_sealed(&bad, &out));
    }

    #[test]
    fn test_decrypt_rejects_short_payload() {
        let crypto = SoftwareCrypto;
        assert!(crypto.decrypt_info(&Id32::default(), false, &[0u8; 10]).is_none());
    }

    #[test]
    fn test_nullifier_is_deterministic() {
        let crypto = SoftwareCrypto;
        let skr = SubAddr::bare(&Id64([3u8; 64]));
        let cm = Id32([4u8; 32]);
        assert_eq!(
            crypto.generate_nullifier(&skr, &cm),
            crypto.generate_nullifier(&skr, &cm)
        );
        assert_ne!(
            crypto.generate_nullifier(&skr, &cm),
            crypto.generate_nullifier(&skr, &Id32([5u8; 32]))
        );
    }

    #[test]
    fn test_subaddress_ownership() {
        let crypto = SoftwareCrypto;
        let sk = crypto.seed_to_sk(&Seed::new([7u8; 32]));
        let tk = crypto.sk_to_tk(&sk);
        let pk = crypto.tk_to_pk(&tk);

        let main = crypto.derive_subaddress(&pk, &Id32::from_index(1));
        assert!(crypto.is_my_address(&tk, &main));
        assert!(crypto.is_my_address(&tk, &SubAddr::bare(&pk)));

        let other_tk = crypto.sk_to_tk(&crypto.seed_to_sk(&Seed::new([8u8; 32])));
        assert!(!crypto.is_my_address(&other_tk, &main));
    }

    #[test]
    fn test_info_desc_to_asset_normalizes_zero_components() {
        let asset = info().to_asset();
        assert!(asset.token.is_some());
        assert!(asset.ticket.is_none());
        assert_eq!(
            asset.token.unwrap().value,
            Amount::from_u64(1000)
        );
    }
}
