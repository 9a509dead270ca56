//! Chunkset - a compressed, mutable set of `u32` values.
//!
//! The library is built from three layers:
//!
//! * [`DenseBitset`] - a fixed capacity bitset, one word per 64 values, with a
//!   cached population count.
//! * [`HybridContainer`] - a set over a fixed capacity that stores its content
//!   as a sorted `u16` array while sparse, and as a dense bitset once it grows
//!   past a threshold derived from the capacity. It has a compact, self
//!   describing binary encoding.
//! * [`ChunkedDomain`] - a set over a large domain, split into fixed width
//!   chunks each backed by its own container, allocated on demand.
//!
//! # Examples
//! ```
//! use chunkset::{ChunkedDomain, Container, DomainSize, HybridContainer, SetOps};
//!
//! let mut a = HybridContainer::from_values(30000, vec![1, 2, 3]);
//! let b = HybridContainer::from_values(30000, vec![2]);
//! a.and(&b).unwrap();
//! assert_eq!(a.to_array(), vec![2]);
//!
//! let size = DomainSize::new(1024, 16).unwrap();
//! let mut d: ChunkedDomain = ChunkedDomain::new(size);
//! d.add(5000);
//! assert!(d.contains(5000));
//! assert_eq!(d.cardinality(), 1);
//! ```
//!
//! The serialized form is not portable: it uses the byte order of the machine
//! that produced it.

#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate tracing;

pub mod array;
pub mod codec;
pub mod dense;
pub mod domain;
mod error;
pub mod hybrid;

pub use crate::dense::DenseBitset;
pub use crate::domain::{ChunkedDomain, DomainSize};
pub use crate::error::Error;
pub use crate::hybrid::HybridContainer;

/// In-place set algebra between two values of the same shape. Each operation
/// mutates the receiver and only reads `other`.
///
/// Operands of a different capacity (or domain geometry) are refused with
/// [`Error::IncompatibleCapacity`], and the receiver is left unchanged.
pub trait SetOps: Clone {
    /// Intersect `other` into this set.
    fn and(&mut self, other: &Self) -> Result<(), Error>;

    /// Union `other` into this set.
    fn or(&mut self, other: &Self) -> Result<(), Error>;

    /// Remove every member of `other` from this set.
    fn andnot(&mut self, other: &Self) -> Result<(), Error>;
}

/// The common surface of a set over a fixed capacity. Both [`DenseBitset`] and
/// [`HybridContainer`] implement this, and [`ChunkedDomain`] is generic over it
/// so that either can back a chunk.
///
/// Values passed to `add`, `remove` and `contains` must be below `capacity()`.
/// Implementations panic otherwise.
pub trait Container: SetOps + PartialEq + Sized {
    /// Construct an empty set able to hold the values `0..capacity`.
    fn with_capacity(capacity: u32) -> Self;

    /// The number of addressable values.
    fn capacity(&self) -> u32;

    /// Insert a value.
    fn add(&mut self, value: u32);

    /// Remove a value. If the value is not present, no action is taken.
    fn remove(&mut self, value: u32);

    /// Returns `true` if the value is present.
    fn contains(&self, value: u32) -> bool;

    /// Toggle every value in `[start, stop)`.
    fn flip(&mut self, start: u32, stop: u32);

    /// The number of values in the set.
    fn cardinality(&self) -> u64;

    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.cardinality() == 0
    }

    /// All values in ascending order.
    fn to_array(&self) -> Vec<u32>;

    /// Append to `buffer` up to `limit` ascending values that are `>= from`.
    /// Returns `true` if more values remain after the last one appended, so
    /// the caller can resume from that value plus one.
    fn next_many(&self, from: u32, buffer: &mut Vec<u32>, limit: usize) -> bool;

    /// Encode this set in the wire format.
    fn serialize(&self) -> Vec<u8>;

    /// Decode a set previously produced by `serialize` with the same capacity.
    fn deserialize(buf: &[u8], capacity: u32) -> Result<Self, Error>;
}

/// Intersect all of `sets` into a new value. An empty input yields `empty`.
pub fn and_all<S: SetOps>(empty: S, sets: &[&S]) -> Result<S, Error> {
    match sets.split_first() {
        None => Ok(empty),
        Some((first, rest)) => {
            let mut acc = (*first).clone();
            for s in rest {
                acc.and(s)?;
            }
            Ok(acc)
        }
    }
}

/// Union all of `sets` into a new value. An empty input yields `empty`.
pub fn or_all<S: SetOps>(empty: S, sets: &[&S]) -> Result<S, Error> {
    match sets.split_first() {
        None => Ok(empty),
        Some((first, rest)) => {
            let mut acc = (*first).clone();
            for s in rest {
                acc.or(s)?;
            }
            Ok(acc)
        }
    }
}

/// The values of `a` that are not in `b`, as a new value.
pub fn andnot_of<S: SetOps>(a: &S, b: &S) -> Result<S, Error> {
    let mut acc = a.clone();
    acc.andnot(b)?;
    Ok(acc)
}

/// A copy of `set` with `[start, stop)` toggled.
pub fn flip_of<C: Container>(set: &C, start: u32, stop: u32) -> C {
    let mut acc = set.clone();
    acc.flip(start, stop);
    acc
}
