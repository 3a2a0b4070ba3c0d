//! Ordered key-value storage for the wallet index.
//!
//! A typed key layout (`NUM`, `ROOT`, `PK`, `PKR`, `NIL` namespaces) over
//! an embedded ordered byte store with prefix iteration, range seeks and
//! atomic batches. Numeric key fields are big-endian so lexicographic
//! order matches numeric order; range decoders slice keys positionally,
//! so the byte offsets here are part of the on-disk schema and must not
//! change without a migration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod keys;
pub mod store;

pub use error::{Error, Result};
pub use keys::{
    decode_number, encode_number, nil_key, num_key, num_prefix, pk_asset_prefix, pk_key,
    pk_prefix, pkr_key, pkr_prefix, root_key, num_from_pkr_key, root_from_pk_key,
    PK_KEY_LEN, PKR_KEY_LEN,
};
pub use store::{KvStore, WriteBatch};
