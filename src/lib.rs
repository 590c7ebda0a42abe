//! A persistent double-array trie with suffix-tail compression.
//!
//! This crate provides [`Trie`], an ordered map from Unicode strings to
//! `i32` values. Branching states live in a compact double-array; every
//! non-branching chain is collapsed into a single suffix block in a side
//! pool (the *tail*), which keeps memory close to the total key material
//! even for hundreds of thousands of entries. The whole structure
//! round-trips through a stable big-endian file format.
//!
//! Keys are restricted to an alphabet declared up front via [`AlphaMap`];
//! this is what lets the trie map code points onto a dense code space.
//!
//! # Quick start
//!
//! ```
//! use tailtrie::{AlphaMap, Trie};
//!
//! let mut alpha = AlphaMap::new();
//! alpha.add_range('a', 'z').unwrap();
//!
//! let mut trie = Trie::new(alpha).unwrap();
//! trie.insert("foo", 10).unwrap();
//! trie.insert("bar", 20).unwrap();
//! trie.insert("foobar", 30).unwrap();
//!
//! assert_eq!(trie.get("foo"), Some(10));
//! assert_eq!(trie.longest_prefix("foobar!"), Some("foobar"));
//! let keys: Vec<String> = trie.keys().collect();
//! assert_eq!(keys, ["bar", "foo", "foobar"]);
//! ```

#![warn(missing_docs)]

mod alpha_map;
mod darray;
mod state;
mod tail;
mod trie;

pub use alpha_map::AlphaMap;
pub use state::{Iter, Keys, TrieState, Values};
pub use trie::Trie;

/// Index of a double-array state; also the on-disk integer type.
pub type TrieIndex = i32;

/// One symbol of the internal code space. `0` is the key terminator,
/// user symbols are `1..=N` for an alphabet of `N` code points.
pub type TrieCode = u16;

/// Satellite value attached to every stored key.
pub type TrieData = i32;

/// Errors that can occur during trie operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TrieError {
    /// A key contains a code point outside the trie's alphabet.
    #[error("character {0:?} is not in the alphabet")]
    UnmappedChar(char),
    /// Lookup or removal of a key that is not stored.
    #[error("key not found")]
    KeyNotFound,
    /// An alphabet range with `lo > hi`.
    #[error("invalid alphabet range: {lo:#x} > {hi:#x}")]
    InvalidRange {
        /// Start of the offending range.
        lo: u32,
        /// End of the offending range.
        hi: u32,
    },
    /// The alphabet maps more code points than the code space can hold.
    #[error("alphabet spans {0} code points, exceeding the trie code space")]
    AlphabetTooLarge(usize),
    /// The double-array index space is exhausted.
    #[error("double-array index space exhausted")]
    IndexOverflow,
    /// A magic number or structural check failed while loading.
    #[error("malformed trie data: {0}")]
    Format(&'static str),
    /// An underlying stream failure on save or load.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Shorthand for `std::result::Result<T, TrieError>`.
pub type Result<T> = std::result::Result<T, TrieError>;
