//! A self-adaptive container. While the set is sparse its values are held as a
//! sorted `u16` array. Once the array would use as much memory as the dense
//! form, the container converts to a [`DenseBitset`]. When a bitset falls
//! below half of that threshold it converts back, so a set hovering around
//! the threshold does not flap between encodings.
//!
//! The encoding is never visible in the results of an operation. It only
//! changes the cost of them.

use crate::array::{self, ArrayStore};
use crate::codec::{self, Packed, Payload, ARRAY_CAPACITY_LIMIT};
use crate::dense::{DenseBitset, DenseBitsetIter};
use crate::{Container, Error, SetOps};
use bytes::BufMut;
use std::{fmt, slice};

/// The number of array values at which a container of `capacity` converts to
/// a bitset. This is the number of `u16` values that fit in the bytes of the
/// dense words. Capacities too large for 16-bit values return 0, since they
/// are always bitset encoded.
pub fn array_threshold(capacity: u32) -> usize {
    if capacity > ARRAY_CAPACITY_LIMIT {
        0
    } else {
        (codec::words_for(capacity) * 4).clamp(1, u16::MAX as usize)
    }
}

#[derive(Clone)]
enum HybridState {
    Array(ArrayStore),
    Bitset(DenseBitset),
}

/// A set of `u32` values in `0..capacity` that picks its own encoding.
///
/// # Examples
/// ```
/// use chunkset::{Container, HybridContainer, SetOps};
///
/// let mut a = HybridContainer::with_capacity(30000);
/// (0..30000).step_by(2).for_each(|v| a.add(v));
/// assert!(a.is_bitset());
///
/// let b = HybridContainer::from_values(30000, vec![2, 3, 4]);
/// assert!(b.is_array());
///
/// a.and(&b).unwrap();
/// assert_eq!(a.to_array(), vec![2, 4]);
/// assert!(a.is_array());
/// ```
#[derive(Serialize, Deserialize, Clone)]
#[serde(try_from = "Packed", into = "Packed")]
pub struct HybridContainer {
    capacity: u32,
    state: HybridState,
}

fn promote(values: &[u16], capacity: u32) -> DenseBitset {
    DenseBitset::from_values(capacity, values.iter().map(|v| u32::from(*v)))
}

fn demote(bits: &DenseBitset) -> ArrayStore {
    bits.iter().map(|v| v as u16).collect()
}

impl HybridContainer {
    /// Build a container of `capacity` holding every value of `iter`.
    ///
    /// # Panics
    ///
    /// If any value is `>= capacity`.
    pub fn from_values<I: IntoIterator<Item = u32>>(capacity: u32, iter: I) -> Self {
        let mut c = Self::with_capacity(capacity);
        iter.into_iter().for_each(|v| c.add(v));
        c
    }

    /// Show if the values are held as a sorted array.
    pub fn is_array(&self) -> bool {
        matches!(self.state, HybridState::Array(_))
    }

    /// Show if the values are held as a bitset.
    pub fn is_bitset(&self) -> bool {
        matches!(self.state, HybridState::Bitset(_))
    }

    /// Force the bitset encoding, even if the adaptive behaviour would not
    /// choose it. The next mutation re-applies the threshold.
    pub fn to_bitset_encoding(&mut self) {
        let next = match &self.state {
            HybridState::Array(values) => promote(values, self.capacity),
            HybridState::Bitset(_) => return,
        };
        self.state = HybridState::Bitset(next);
    }

    /// Force the array encoding, even if the adaptive behaviour would not
    /// choose it. Returns `false` if the capacity is too large for 16-bit
    /// values, in which case the container is unchanged.
    pub fn to_array_encoding(&mut self) -> bool {
        if self.capacity > ARRAY_CAPACITY_LIMIT {
            return false;
        }
        let next = match &self.state {
            HybridState::Array(_) => return true,
            HybridState::Bitset(bits) => demote(bits),
        };
        self.state = HybridState::Array(next);
        true
    }

    /// Convert the encoding if the cardinality has crossed the threshold.
    fn maybe_convert(&mut self) {
        let threshold = array_threshold(self.capacity);
        let next = match &self.state {
            HybridState::Array(values) if values.len() >= threshold => {
                trace!(
                    capacity = self.capacity,
                    cardinality = values.len(),
                    "array -> bitset"
                );
                HybridState::Bitset(promote(values, self.capacity))
            }
            HybridState::Bitset(bits)
                if self.capacity <= ARRAY_CAPACITY_LIMIT
                    && (bits.cardinality() as usize) < threshold / 2 =>
            {
                trace!(
                    capacity = self.capacity,
                    cardinality = bits.cardinality(),
                    "bitset -> array"
                );
                HybridState::Array(demote(bits))
            }
            _ => return,
        };
        self.state = next;
    }

    #[inline(always)]
    fn check_bounds(&self, value: u32) {
        assert!(
            value < self.capacity,
            "value {} is out of range for capacity {}",
            value,
            self.capacity
        );
    }

    fn check_capacity(&self, other: &Self) -> Result<(), Error> {
        if self.capacity == other.capacity {
            Ok(())
        } else {
            debug!(
                left = self.capacity,
                right = other.capacity,
                "refusing container operation"
            );
            Err(Error::capacity(self.capacity as u64, other.capacity as u64))
        }
    }

    /// Iterate over the values that are `>= from`, in ascending order.
    pub fn iter_from(&self, from: u32) -> HybridIter<'_> {
        match &self.state {
            HybridState::Array(values) => {
                let start = values.partition_point(|v| u32::from(*v) < from);
                HybridIter::Array(values[start..].iter())
            }
            HybridState::Bitset(bits) => HybridIter::Bitset(bits.iter_from(from)),
        }
    }

    pub fn iter(&self) -> HybridIter<'_> {
        self.iter_from(0)
    }

    /// Encode into a caller supplied buffer. The array form is written for
    /// small sets whatever the in-memory encoding is.
    pub fn serialize_into<B: BufMut>(&self, buf: &mut B) {
        let card = self.cardinality();
        let array_form = codec::prefers_array(self.capacity, card);
        match &self.state {
            HybridState::Array(values) if array_form => {
                codec::encode_array(values.iter().copied(), buf)
            }
            HybridState::Array(values) => {
                let bits = promote(values, self.capacity);
                codec::encode_bitset(bits.words(), card, buf)
            }
            HybridState::Bitset(bits) if array_form => {
                let values = demote(bits);
                codec::encode_array(values.iter().copied(), buf)
            }
            HybridState::Bitset(bits) => codec::encode_bitset(bits.words(), card, buf),
        }
    }
}

impl SetOps for HybridContainer {
    fn and(&mut self, other: &Self) -> Result<(), Error> {
        self.check_capacity(other)?;
        match (&mut self.state, &other.state) {
            (HybridState::Array(lhs), HybridState::Array(rhs)) => {
                *lhs = array::intersect(lhs, rhs);
            }
            (HybridState::Array(lhs), HybridState::Bitset(rhs)) => {
                lhs.retain(|v| rhs.contains(u32::from(*v)));
            }
            (HybridState::Bitset(lhs), HybridState::Array(rhs)) => {
                let rhs = promote(rhs, other.capacity);
                lhs.and(&rhs)?;
            }
            (HybridState::Bitset(lhs), HybridState::Bitset(rhs)) => {
                lhs.and(rhs)?;
            }
        }
        self.maybe_convert();
        Ok(())
    }

    fn or(&mut self, other: &Self) -> Result<(), Error> {
        self.check_capacity(other)?;
        let widened = match (&mut self.state, &other.state) {
            (HybridState::Array(lhs), HybridState::Array(rhs)) => {
                *lhs = array::union(lhs, rhs);
                None
            }
            (HybridState::Array(lhs), HybridState::Bitset(rhs)) => {
                let mut bits = rhs.clone();
                lhs.iter().for_each(|v| bits.add(u32::from(*v)));
                Some(bits)
            }
            (HybridState::Bitset(lhs), HybridState::Array(rhs)) => {
                rhs.iter().for_each(|v| lhs.add(u32::from(*v)));
                None
            }
            (HybridState::Bitset(lhs), HybridState::Bitset(rhs)) => {
                lhs.or(rhs)?;
                None
            }
        };
        if let Some(bits) = widened {
            self.state = HybridState::Bitset(bits);
        }
        self.maybe_convert();
        Ok(())
    }

    fn andnot(&mut self, other: &Self) -> Result<(), Error> {
        self.check_capacity(other)?;
        match (&mut self.state, &other.state) {
            (HybridState::Array(lhs), HybridState::Array(rhs)) => {
                *lhs = array::difference(lhs, rhs);
            }
            (HybridState::Array(lhs), HybridState::Bitset(rhs)) => {
                lhs.retain(|v| !rhs.contains(u32::from(*v)));
            }
            (HybridState::Bitset(lhs), HybridState::Array(rhs)) => {
                rhs.iter().for_each(|v| lhs.remove(u32::from(*v)));
            }
            (HybridState::Bitset(lhs), HybridState::Bitset(rhs)) => {
                lhs.andnot(rhs)?;
            }
        }
        self.maybe_convert();
        Ok(())
    }
}

impl Container for HybridContainer {
    fn with_capacity(capacity: u32) -> Self {
        let state = if capacity > ARRAY_CAPACITY_LIMIT {
            HybridState::Bitset(DenseBitset::with_capacity(capacity))
        } else {
            HybridState::Array(ArrayStore::new())
        };
        HybridContainer { capacity, state }
    }

    #[inline(always)]
    fn capacity(&self) -> u32 {
        self.capacity
    }

    /// # Panics
    ///
    /// If `value >= capacity`.
    fn add(&mut self, value: u32) {
        self.check_bounds(value);
        match &mut self.state {
            HybridState::Array(values) => {
                let x = value as u16;
                match values.last() {
                    // Appending in order is the common case.
                    Some(last) if *last < x => values.push(x),
                    None => values.push(x),
                    _ => {
                        if let Err(idx) = values.binary_search(&x) {
                            values.insert(idx, x);
                        }
                    }
                }
            }
            HybridState::Bitset(bits) => bits.add(value),
        }
        self.maybe_convert();
    }

    /// # Panics
    ///
    /// If `value >= capacity`.
    fn remove(&mut self, value: u32) {
        self.check_bounds(value);
        match &mut self.state {
            HybridState::Array(values) => {
                if let Ok(idx) = values.binary_search(&(value as u16)) {
                    values.remove(idx);
                }
            }
            HybridState::Bitset(bits) => bits.remove(value),
        }
        self.maybe_convert();
    }

    /// # Panics
    ///
    /// If `value >= capacity`.
    fn contains(&self, value: u32) -> bool {
        self.check_bounds(value);
        match &self.state {
            HybridState::Array(values) => values.binary_search(&(value as u16)).is_ok(),
            HybridState::Bitset(bits) => bits.contains(value),
        }
    }

    /// # Panics
    ///
    /// If `stop > capacity`.
    fn flip(&mut self, start: u32, stop: u32) {
        assert!(
            stop <= self.capacity,
            "flip stop {} is out of range for capacity {}",
            stop,
            self.capacity
        );
        if start >= stop {
            return;
        }
        self.to_bitset_encoding();
        if let HybridState::Bitset(bits) = &mut self.state {
            bits.flip(start, stop);
        }
        self.maybe_convert();
    }

    fn cardinality(&self) -> u64 {
        match &self.state {
            HybridState::Array(values) => values.len() as u64,
            HybridState::Bitset(bits) => bits.cardinality(),
        }
    }

    fn to_array(&self) -> Vec<u32> {
        match &self.state {
            HybridState::Array(values) => values.iter().map(|v| u32::from(*v)).collect(),
            HybridState::Bitset(bits) => bits.to_array(),
        }
    }

    fn next_many(&self, from: u32, buffer: &mut Vec<u32>, limit: usize) -> bool {
        let mut iter = self.iter_from(from);
        for _ in 0..limit {
            match iter.next() {
                Some(v) => buffer.push(v),
                None => return false,
            }
        }
        iter.next().is_some()
    }

    fn serialize(&self) -> Vec<u8> {
        let card = self.cardinality();
        let len = if codec::prefers_array(self.capacity, card) {
            codec::HEADER_SIZE + card as usize * 2
        } else {
            codec::bitset_len(self.capacity)
        };
        let mut buf = Vec::with_capacity(len);
        self.serialize_into(&mut buf);
        buf
    }

    fn deserialize(buf: &[u8], capacity: u32) -> Result<Self, Error> {
        let state = match codec::decode(buf, capacity)? {
            Payload::Array(values) => HybridState::Array(ArrayStore::from_vec(values)),
            Payload::Bitset(words) => {
                HybridState::Bitset(DenseBitset::from_words(capacity, words))
            }
        };
        let mut c = HybridContainer { capacity, state };
        c.maybe_convert();
        Ok(c)
    }
}

impl PartialEq for HybridContainer {
    fn eq(&self, other: &Self) -> bool {
        if self.capacity != other.capacity || self.cardinality() != other.cardinality() {
            return false;
        }
        match (&self.state, &other.state) {
            (HybridState::Array(lhs), HybridState::Array(rhs)) => lhs == rhs,
            (HybridState::Array(values), HybridState::Bitset(bits))
            | (HybridState::Bitset(bits), HybridState::Array(values)) => {
                values.iter().all(|v| bits.contains(u32::from(*v)))
            }
            (HybridState::Bitset(lhs), HybridState::Bitset(rhs)) => lhs.words() == rhs.words(),
        }
    }
}

impl Eq for HybridContainer {}

impl From<HybridContainer> for Packed {
    fn from(c: HybridContainer) -> Self {
        Packed {
            capacity: c.capacity,
            bytes: c.serialize(),
        }
    }
}

impl TryFrom<Packed> for HybridContainer {
    type Error = Error;

    fn try_from(p: Packed) -> Result<Self, Error> {
        HybridContainer::deserialize(&p.bytes, p.capacity)
    }
}

impl fmt::Display for HybridContainer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.state {
            HybridState::Array(values) => write!(
                f,
                "HybridContainer (array values) {:?} (capacity) {} <optimised out>",
                values.len(),
                self.capacity
            ),
            HybridState::Bitset(bits) => write!(
                f,
                "HybridContainer (bitset values) {:?} (capacity) {} <optimised out>",
                bits.cardinality(),
                self.capacity
            ),
        }
    }
}

impl fmt::Debug for HybridContainer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.state {
            HybridState::Array(values) => {
                write!(f, "HybridContainer (array values) {:?} [ ", values.len())?;
            }
            HybridState::Bitset(bits) => {
                write!(
                    f,
                    "HybridContainer (bitset values) {:?} [ ",
                    bits.cardinality()
                )?;
            }
        }
        for v in self {
            write!(f, "{}, ", v)?;
        }
        write!(f, "]")
    }
}

/// An iterator over the content of a [`HybridContainer`].
#[derive(Debug, Clone)]
pub enum HybridIter<'a> {
    /// The array encoding
    Array(slice::Iter<'a, u16>),
    /// The bitset encoding
    Bitset(DenseBitsetIter<'a>),
}

impl<'a> Iterator for HybridIter<'a> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        match self {
            HybridIter::Array(i) => i.next().map(|v| u32::from(*v)),
            HybridIter::Bitset(i) => i.next(),
        }
    }
}

impl<'a> IntoIterator for &'a HybridContainer {
    type Item = u32;
    type IntoIter = HybridIter<'a>;

    fn into_iter(self) -> HybridIter<'a> {
        self.iter()
    }
}
