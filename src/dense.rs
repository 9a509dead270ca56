//! A fixed capacity dense bitset. One `u64` word holds 64 values, and the
//! number of set bits is cached so that cardinality is O(1).

use crate::codec::{self, Packed, Payload, WORD_BITS};
use crate::{Container, Error, SetOps};
use bytes::BufMut;
use std::fmt;

/// A set of `u32` values in `0..capacity`, one bit per value.
///
/// # Examples
/// ```
/// use chunkset::{Container, DenseBitset, SetOps};
///
/// let mut b = DenseBitset::with_capacity(128);
/// b.add(3);
/// b.add(100);
/// assert!(b.contains(100));
/// assert_eq!(b.cardinality(), 2);
/// assert_eq!(b.to_array(), vec![3, 100]);
/// ```
#[derive(Serialize, Deserialize, Clone)]
#[serde(try_from = "Packed", into = "Packed")]
pub struct DenseBitset {
    capacity: u32,
    words: Vec<u64>,
    cardinality: u64,
}

#[inline(always)]
fn word_index(value: u32) -> usize {
    (value / WORD_BITS) as usize
}

#[inline(always)]
fn bit_mask(value: u32) -> u64 {
    1 << (value % WORD_BITS)
}

fn popcount(words: &[u64]) -> u64 {
    words.iter().fold(0, |acc, w| acc + w.count_ones() as u64)
}

impl DenseBitset {
    /// Build a bitset of `capacity` holding every value of `iter`.
    ///
    /// # Panics
    ///
    /// If any value is `>= capacity`.
    pub fn from_values<I: IntoIterator<Item = u32>>(capacity: u32, iter: I) -> Self {
        let mut b = Self::with_capacity(capacity);
        iter.into_iter().for_each(|v| b.add(v));
        b
    }

    /// Adopt a word vector, recomputing the cardinality. The caller guarantees
    /// `words.len() == words_for(capacity)` and that no bit at or beyond
    /// `capacity` is set.
    pub(crate) fn from_words(capacity: u32, words: Vec<u64>) -> Self {
        debug_assert_eq!(words.len(), codec::words_for(capacity));
        let cardinality = popcount(&words);
        DenseBitset {
            capacity,
            words,
            cardinality,
        }
    }

    pub(crate) fn words(&self) -> &[u64] {
        &self.words
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

    /// Apply `op` word by word with `other`, recounting as we go.
    fn combine<F>(&mut self, other: &Self, op: F) -> Result<(), Error>
    where
        F: Fn(u64, u64) -> u64,
    {
        if self.capacity != other.capacity {
            debug!(
                left = self.capacity,
                right = other.capacity,
                "refusing bitset operation"
            );
            return Err(Error::capacity(self.capacity as u64, other.capacity as u64));
        }
        let mut cnt = 0;
        self.words
            .iter_mut()
            .zip(other.words.iter())
            .for_each(|(l, r)| {
                *l = op(*l, *r);
                cnt += l.count_ones() as u64;
            });
        self.cardinality = cnt;
        Ok(())
    }

    /// Iterate over the values that are `>= from`, in ascending order.
    pub fn iter_from(&self, from: u32) -> DenseBitsetIter<'_> {
        if from >= self.capacity {
            return DenseBitsetIter {
                words: &self.words,
                idx: self.words.len(),
                cur: 0,
            };
        }
        let idx = word_index(from);
        DenseBitsetIter {
            words: &self.words,
            idx,
            cur: self.words[idx] & (!0u64 << (from % WORD_BITS)),
        }
    }

    pub fn iter(&self) -> DenseBitsetIter<'_> {
        self.iter_from(0)
    }

    /// Encode into a caller supplied buffer.
    pub fn serialize_into<B: BufMut>(&self, buf: &mut B) {
        if codec::prefers_array(self.capacity, self.cardinality) {
            let values: Vec<u16> = self.iter().map(|v| v as u16).collect();
            codec::encode_array(values.into_iter(), buf);
        } else {
            codec::encode_bitset(&self.words, self.cardinality, buf);
        }
    }
}

impl SetOps for DenseBitset {
    fn and(&mut self, other: &Self) -> Result<(), Error> {
        self.combine(other, |l, r| l & r)
    }

    fn or(&mut self, other: &Self) -> Result<(), Error> {
        self.combine(other, |l, r| l | r)
    }

    fn andnot(&mut self, other: &Self) -> Result<(), Error> {
        self.combine(other, |l, r| l & !r)
    }
}

impl Container for DenseBitset {
    fn with_capacity(capacity: u32) -> Self {
        DenseBitset {
            capacity,
            words: vec![0; codec::words_for(capacity)],
            cardinality: 0,
        }
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
        let idx = word_index(value);
        let previous = self.words[idx];
        let next = previous | bit_mask(value);
        self.words[idx] = next;
        self.cardinality += (previous ^ next) >> (value % WORD_BITS);
    }

    /// # Panics
    ///
    /// If `value >= capacity`.
    fn remove(&mut self, value: u32) {
        self.check_bounds(value);
        let idx = word_index(value);
        let mask = bit_mask(value);
        if self.words[idx] & mask != 0 {
            self.words[idx] &= !mask;
            self.cardinality -= 1;
        }
    }

    /// # Panics
    ///
    /// If `value >= capacity`.
    #[inline(always)]
    fn contains(&self, value: u32) -> bool {
        self.check_bounds(value);
        self.words[word_index(value)] & bit_mask(value) != 0
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
        let first = word_index(start);
        let last = word_index(stop - 1);
        let first_mask = !0u64 << (start % WORD_BITS);
        let last_mask = !0u64 >> (WORD_BITS - 1 - ((stop - 1) % WORD_BITS));

        if first == last {
            self.words[first] ^= first_mask & last_mask;
        } else {
            self.words[first] ^= first_mask;
            self.words[first + 1..last].iter_mut().for_each(|w| *w = !*w);
            self.words[last] ^= last_mask;
        }
        self.cardinality = popcount(&self.words);
    }

    #[inline(always)]
    fn cardinality(&self) -> u64 {
        self.cardinality
    }

    fn to_array(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.cardinality as usize);
        out.extend(self.iter());
        out
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
        let mut buf = Vec::with_capacity(codec::bitset_len(self.capacity));
        self.serialize_into(&mut buf);
        buf
    }

    fn deserialize(buf: &[u8], capacity: u32) -> Result<Self, Error> {
        match codec::decode(buf, capacity)? {
            Payload::Array(values) => Ok(DenseBitset::from_values(
                capacity,
                values.into_iter().map(u32::from),
            )),
            Payload::Bitset(words) => Ok(DenseBitset::from_words(capacity, words)),
        }
    }
}

impl PartialEq for DenseBitset {
    fn eq(&self, other: &Self) -> bool {
        self.capacity == other.capacity
            && self.cardinality == other.cardinality
            && self.words == other.words
    }
}

impl Eq for DenseBitset {}

impl From<DenseBitset> for Packed {
    fn from(b: DenseBitset) -> Self {
        Packed {
            capacity: b.capacity,
            bytes: b.serialize(),
        }
    }
}

impl TryFrom<Packed> for DenseBitset {
    type Error = Error;

    fn try_from(p: Packed) -> Result<Self, Error> {
        DenseBitset::deserialize(&p.bytes, p.capacity)
    }
}

impl fmt::Display for DenseBitset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "DenseBitset (capacity) {} (cardinality) {} <optimised out>",
            self.capacity, self.cardinality
        )
    }
}

impl fmt::Debug for DenseBitset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "DenseBitset (capacity) {} (cardinality) {} [ ",
            self.capacity, self.cardinality
        )?;
        for v in self {
            write!(f, "{}, ", v)?;
        }
        write!(f, "]")
    }
}

/// Ascending iteration over a [`DenseBitset`]. Each word is drained by
/// isolating its lowest set bit.
#[derive(Debug, Clone)]
pub struct DenseBitsetIter<'a> {
    words: &'a [u64],
    idx: usize,
    cur: u64,
}

impl<'a> Iterator for DenseBitsetIter<'a> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            if self.cur != 0 {
                let lowest = self.cur & self.cur.wrapping_neg();
                let bit = lowest.trailing_zeros();
                self.cur ^= lowest;
                return Some((self.idx as u32) * WORD_BITS + bit);
            }
            self.idx += 1;
            if self.idx >= self.words.len() {
                self.idx = self.words.len();
                return None;
            }
            self.cur = self.words[self.idx];
        }
    }
}

impl<'a> IntoIterator for &'a DenseBitset {
    type Item = u32;
    type IntoIter = DenseBitsetIter<'a>;

    fn into_iter(self) -> DenseBitsetIter<'a> {
        self.iter()
    }
}
