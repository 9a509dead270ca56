//! A set over a large domain, split into equal width chunks. A value `v` lives
//! in chunk `v / chunk_width` at offset `v % chunk_width`. Chunks that have
//! never held a value are absent and cost nothing.

use crate::{Container, Error, HybridContainer, SetOps};
use std::fmt;

/// The geometry of a [`ChunkedDomain`]: how many values each chunk holds, and
/// how many chunks there are.
///
/// This can be loaded from an application's configuration with serde. It is
/// validated the same way as [`DomainSize::new`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "RawDomainSize")]
pub struct DomainSize {
    chunk_width: u32,
    chunks: usize,
}

#[derive(Deserialize)]
struct RawDomainSize {
    chunk_width: u32,
    chunks: usize,
}

impl TryFrom<RawDomainSize> for DomainSize {
    type Error = Error;

    fn try_from(raw: RawDomainSize) -> Result<Self, Error> {
        DomainSize::new(raw.chunk_width, raw.chunks)
    }
}

impl DomainSize {
    /// The whole domain must be addressable by a `u32`.
    pub fn new(chunk_width: u32, chunks: usize) -> Result<Self, Error> {
        let total = (chunk_width as u64).checked_mul(chunks as u64);
        match total {
            Some(t) if chunk_width > 0 && chunks > 0 && t <= (u32::MAX as u64) + 1 => {
                Ok(DomainSize {
                    chunk_width,
                    chunks,
                })
            }
            _ => Err(Error::InvalidSize {
                chunk_width,
                chunks,
            }),
        }
    }

    pub fn chunk_width(&self) -> u32 {
        self.chunk_width
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// The number of addressable values in the domain.
    pub fn capacity(&self) -> u64 {
        self.chunk_width as u64 * self.chunks as u64
    }
}

/// A set of `u32` values in `0..size.capacity()`, backed by one container per
/// chunk.
///
/// # Examples
/// ```
/// use chunkset::{ChunkedDomain, DomainSize, SetOps};
///
/// let size = DomainSize::new(2, 250).unwrap();
/// let mut a: ChunkedDomain = ChunkedDomain::new(size);
/// let mut b: ChunkedDomain = ChunkedDomain::new(size);
/// (0..500).step_by(2).for_each(|v| a.add(v));
/// b.add(4);
/// b.add(5);
///
/// a.and(&b).unwrap();
/// assert_eq!(a.to_array(), vec![4]);
///
/// // Rank based paging.
/// b.add(100);
/// assert_eq!(b.range(1, 3), vec![5, 100]);
/// ```
#[derive(Clone)]
pub struct ChunkedDomain<C: Container = HybridContainer> {
    size: DomainSize,
    chunks: Vec<Option<C>>,
}

impl<C: Container> ChunkedDomain<C> {
    /// Construct an empty domain. No chunk is allocated until a value lands
    /// in it.
    pub fn new(size: DomainSize) -> Self {
        let mut chunks = Vec::with_capacity(size.chunks);
        chunks.resize_with(size.chunks, || None);
        ChunkedDomain { size, chunks }
    }

    pub fn size(&self) -> DomainSize {
        self.size
    }

    /// A view of every chunk slot, in order. `None` is an absent chunk.
    pub fn chunks(&self) -> &[Option<C>] {
        &self.chunks
    }

    /// Install `container` as the content of chunk `chunk`, replacing what
    /// was there.
    pub fn set(&mut self, chunk: usize, container: C) -> Result<(), Error> {
        if chunk >= self.size.chunks {
            return Err(Error::OutOfRange {
                value: chunk as u64,
                capacity: self.size.chunks as u64,
            });
        }
        if container.capacity() != self.size.chunk_width {
            return Err(Error::capacity(
                self.size.chunk_width as u64,
                container.capacity() as u64,
            ));
        }
        self.chunks[chunk] = Some(container);
        Ok(())
    }

    /// Split a value into its chunk index and offset.
    ///
    /// # Panics
    ///
    /// If the value lies beyond the last chunk.
    #[inline(always)]
    fn locate(&self, value: u32) -> (usize, u32) {
        let chunk = (value / self.size.chunk_width) as usize;
        assert!(
            chunk < self.size.chunks,
            "value {} is out of range for capacity {}",
            value,
            self.size.capacity()
        );
        (chunk, value % self.size.chunk_width)
    }

    #[inline(always)]
    fn base(&self, chunk: usize) -> u32 {
        chunk as u32 * self.size.chunk_width
    }

    fn check_geometry(&self, other: &Self) -> Result<(), Error> {
        if self.size == other.size {
            Ok(())
        } else {
            debug!(
                left = ?self.size,
                right = ?other.size,
                "refusing domain operation"
            );
            if self.size.chunks != other.size.chunks {
                Err(Error::capacity(
                    self.size.chunks as u64,
                    other.size.chunks as u64,
                ))
            } else {
                Err(Error::capacity(
                    self.size.chunk_width as u64,
                    other.size.chunk_width as u64,
                ))
            }
        }
    }

    /// Insert a value, allocating its chunk if needed.
    ///
    /// # Panics
    ///
    /// If `value >= size().capacity()`.
    pub fn add(&mut self, value: u32) {
        let (chunk, offset) = self.locate(value);
        let width = self.size.chunk_width;
        self.chunks[chunk]
            .get_or_insert_with(|| {
                trace!(chunk, "allocating chunk");
                C::with_capacity(width)
            })
            .add(offset);
    }

    /// Remove a value. If the value is not present, no action is taken.
    ///
    /// # Panics
    ///
    /// If `value >= size().capacity()`.
    pub fn remove(&mut self, value: u32) {
        let (chunk, offset) = self.locate(value);
        if let Some(c) = self.chunks[chunk].as_mut() {
            c.remove(offset);
        }
    }

    /// # Panics
    ///
    /// If `value >= size().capacity()`.
    pub fn contains(&self, value: u32) -> bool {
        let (chunk, offset) = self.locate(value);
        self.chunks[chunk]
            .as_ref()
            .map(|c| c.contains(offset))
            .unwrap_or(false)
    }

    /// Toggle every value of the domain. Every chunk is allocated.
    pub fn flip(&mut self) {
        let width = self.size.chunk_width;
        self.chunks.iter_mut().for_each(|slot| {
            slot.get_or_insert_with(|| C::with_capacity(width))
                .flip(0, width);
        });
    }

    pub fn cardinality(&self) -> u64 {
        self.chunks
            .iter()
            .flatten()
            .fold(0, |acc, c| acc + c.cardinality())
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.iter().flatten().all(|c| c.is_empty())
    }

    /// All values in ascending order.
    pub fn to_array(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.cardinality() as usize);
        for (idx, c) in self.chunks.iter().enumerate() {
            if let Some(c) = c {
                let base = self.base(idx);
                out.extend(c.to_array().into_iter().map(|v| base + v));
            }
        }
        out
    }

    /// Append to `buffer` up to `limit` ascending values that are `>= from`,
    /// crossing chunk boundaries as needed. Returns `true` if more values
    /// remain after the last one appended.
    ///
    /// ```
    /// use chunkset::{ChunkedDomain, DomainSize};
    ///
    /// let mut d: ChunkedDomain = ChunkedDomain::new(DomainSize::new(2, 250).unwrap());
    /// [0, 1, 2, 10, 400].iter().for_each(|v| d.add(*v));
    ///
    /// let mut buf = Vec::new();
    /// let mut j = 0;
    /// while d.next_many(j, &mut buf, 2) {
    ///     j = buf[buf.len() - 1] + 1;
    /// }
    /// assert_eq!(buf, vec![0, 1, 2, 10, 400]);
    /// ```
    pub fn next_many(&self, from: u32, buffer: &mut Vec<u32>, limit: usize) -> bool {
        let width = self.size.chunk_width;
        let mut chunk = (from / width) as usize;
        let mut offset = from % width;
        let mut remaining = limit;
        let mut scratch = Vec::new();

        while chunk < self.chunks.len() {
            if let Some(c) = &self.chunks[chunk] {
                scratch.clear();
                let more = c.next_many(offset, &mut scratch, remaining);
                remaining -= scratch.len();
                let base = self.base(chunk);
                buffer.extend(scratch.iter().map(|v| base + v));
                if remaining == 0 {
                    return more || self.any_from(chunk + 1);
                }
            }
            chunk += 1;
            offset = 0;
        }
        false
    }

    fn any_from(&self, chunk: usize) -> bool {
        self.chunks
            .get(chunk..)
            .map(|rest| rest.iter().flatten().any(|c| !c.is_empty()))
            .unwrap_or(false)
    }

    /// Call `process` with successive batches of at most `batch_size` values,
    /// in ascending order. Iteration stops when `process` returns `Ok(true)`,
    /// the values are exhausted, or `process` fails, in which case the error is
    /// returned. A `batch_size` of zero is treated as one.
    pub fn each_batch<F, E>(&self, batch_size: usize, mut process: F) -> Result<(), E>
    where
        F: FnMut(&[u32]) -> Result<bool, E>,
    {
        let batch_size = batch_size.max(1);
        let mut buf = Vec::with_capacity(batch_size);
        let mut from = 0;
        loop {
            buf.clear();
            let more = self.next_many(from, &mut buf, batch_size);
            if buf.is_empty() {
                break;
            }
            if process(&buf)? {
                break;
            }
            if !more {
                break;
            }
            from = buf[buf.len() - 1] + 1;
        }
        Ok(())
    }

    /// The values whose rank, their position among all values in ascending
    /// order, lies in `[start, stop)`.
    ///
    /// Chunks that end before `start` are skipped by cardinality alone.
    pub fn range(&self, start: usize, stop: usize) -> Vec<u32> {
        let mut out = Vec::new();
        if start >= stop {
            return out;
        }
        let (start, stop) = (start as u64, stop as u64);
        let mut cur: u64 = 0;

        for (idx, slot) in self.chunks.iter().enumerate() {
            if cur >= stop {
                break;
            }
            let c = match slot {
                Some(c) => c,
                None => continue,
            };
            let card = c.cardinality();
            if cur + card <= start {
                cur += card;
                continue;
            }
            let base = self.base(idx);
            let skip = start.saturating_sub(cur) as usize;
            let take = (stop - cur.max(start)) as usize;
            out.extend(
                c.to_array()
                    .into_iter()
                    .skip(skip)
                    .take(take)
                    .map(|v| base + v),
            );
            cur += card;
        }
        out
    }

    /// Iterate over every value in ascending order.
    pub fn iter(&self) -> ChunkedDomainIter<'_, C> {
        ChunkedDomainIter {
            domain: self,
            page: Vec::with_capacity(ITER_PAGE),
            pos: 0,
            from: 0,
            more: true,
        }
    }

    /// Encode every chunk independently. Absent chunks stay absent.
    pub fn serialize_chunks(&self) -> Vec<Option<Vec<u8>>> {
        self.chunks
            .iter()
            .map(|slot| slot.as_ref().map(|c| c.serialize()))
            .collect()
    }

    /// Rebuild a domain from buffers produced by [`serialize_chunks`]. One
    /// malformed chunk fails the whole domain.
    ///
    /// [`serialize_chunks`]: ChunkedDomain::serialize_chunks
    pub fn from_chunks<'a, I>(size: DomainSize, buffers: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Option<&'a [u8]>>,
    {
        let mut chunks = Vec::with_capacity(size.chunks);
        for (idx, buf) in buffers.into_iter().enumerate() {
            if idx >= size.chunks {
                return Err(Error::corrupt(format!(
                    "more than {} chunk buffers supplied",
                    size.chunks
                )));
            }
            let slot = match buf {
                Some(b) => Some(C::deserialize(b, size.chunk_width).map_err(|e| {
                    debug!(chunk = idx, %e, "failed to rebuild chunk");
                    e
                })?),
                None => None,
            };
            chunks.push(slot);
        }
        if chunks.len() != size.chunks {
            return Err(Error::corrupt(format!(
                "expected {} chunk buffers, found {}",
                size.chunks,
                chunks.len()
            )));
        }
        Ok(ChunkedDomain { size, chunks })
    }
}

impl<C: Container> SetOps for ChunkedDomain<C> {
    /// An absent chunk on either side makes the result chunk absent.
    fn and(&mut self, other: &Self) -> Result<(), Error> {
        self.check_geometry(other)?;
        for (l, r) in self.chunks.iter_mut().zip(other.chunks.iter()) {
            match (l.as_mut(), r) {
                (Some(lc), Some(rc)) => lc.and(rc)?,
                _ => *l = None,
            }
        }
        Ok(())
    }

    /// An absent chunk is the identity. An absent left chunk takes a copy of
    /// the right.
    fn or(&mut self, other: &Self) -> Result<(), Error> {
        self.check_geometry(other)?;
        for (l, r) in self.chunks.iter_mut().zip(other.chunks.iter()) {
            match (l.as_mut(), r) {
                (Some(lc), Some(rc)) => lc.or(rc)?,
                (None, Some(rc)) => *l = Some(rc.clone()),
                (_, None) => {}
            }
        }
        Ok(())
    }

    /// Chunks absent on either side are left as they are.
    fn andnot(&mut self, other: &Self) -> Result<(), Error> {
        self.check_geometry(other)?;
        for (l, r) in self.chunks.iter_mut().zip(other.chunks.iter()) {
            if let (Some(lc), Some(rc)) = (l.as_mut(), r) {
                lc.andnot(rc)?;
            }
        }
        Ok(())
    }
}

impl<C: Container> PartialEq for ChunkedDomain<C> {
    /// Equality is over the values held. An absent chunk equals an allocated
    /// chunk that is empty.
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size
            && self
                .chunks
                .iter()
                .zip(other.chunks.iter())
                .all(|pair| match pair {
                    (Some(l), Some(r)) => l == r,
                    (Some(c), None) | (None, Some(c)) => c.is_empty(),
                    (None, None) => true,
                })
    }
}

impl<C: Container> fmt::Debug for ChunkedDomain<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let allocated = self.chunks.iter().flatten().count();
        write!(
            f,
            "ChunkedDomain {:?} (allocated) {} [ ",
            self.size, allocated
        )?;
        for v in self {
            write!(f, "{}, ", v)?;
        }
        write!(f, "]")
    }
}

const ITER_PAGE: usize = 256;

/// Ascending iteration over a [`ChunkedDomain`], paging through
/// [`ChunkedDomain::next_many`].
pub struct ChunkedDomainIter<'a, C: Container> {
    domain: &'a ChunkedDomain<C>,
    page: Vec<u32>,
    pos: usize,
    from: u32,
    more: bool,
}

impl<'a, C: Container> Iterator for ChunkedDomainIter<'a, C> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.pos == self.page.len() {
            if !self.more {
                return None;
            }
            self.page.clear();
            self.pos = 0;
            self.more = self.domain.next_many(self.from, &mut self.page, ITER_PAGE);
            match self.page.last() {
                Some(last) if self.more => self.from = last + 1,
                Some(_) => {}
                None => return None,
            }
        }
        let v = self.page[self.pos];
        self.pos += 1;
        Some(v)
    }
}

impl<'a, C: Container> IntoIterator for &'a ChunkedDomain<C> {
    type Item = u32;
    type IntoIter = ChunkedDomainIter<'a, C>;

    fn into_iter(self) -> ChunkedDomainIter<'a, C> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{ChunkedDomain, DomainSize};
    use crate::{and_all, andnot_of, or_all};
    use crate::{Container, DenseBitset, Error, HybridContainer, SetOps};

    fn sz() -> DomainSize {
        // 30k values of storage.
        DomainSize::new(30, 1000).unwrap()
    }

    fn small() -> DomainSize {
        DomainSize::new(2, 250).unwrap()
    }

    fn domain(size: DomainSize, values: impl IntoIterator<Item = u32>) -> ChunkedDomain {
        let mut d = ChunkedDomain::new(size);
        values.into_iter().for_each(|v| d.add(v));
        d
    }

    #[test]
    fn test_size() {
        assert!(DomainSize::new(0, 10).is_err());
        assert!(DomainSize::new(10, 0).is_err());
        assert!(DomainSize::new(1 << 16, 1 << 16).is_ok());
        assert!(matches!(
            DomainSize::new(1 << 16, (1 << 16) + 1),
            Err(Error::InvalidSize { .. })
        ));
        assert_eq!(sz().capacity(), 30000);
    }

    #[test]
    fn test_size_from_config() {
        let s: DomainSize = serde_json::from_str(r#"{"chunk_width":30,"chunks":1000}"#).unwrap();
        assert_eq!(s, sz());
        assert!(serde_json::from_str::<DomainSize>(r#"{"chunk_width":0,"chunks":1}"#).is_err());
        let out = serde_json::to_string(&s).unwrap();
        assert_eq!(serde_json::from_str::<DomainSize>(&out).unwrap(), s);
    }

    #[test]
    fn test_lazy_allocation() {
        let mut d: ChunkedDomain = ChunkedDomain::new(sz());
        assert!(d.chunks().iter().all(|c| c.is_none()));
        d.add(95);
        assert!(d.chunks()[3].is_some());
        assert_eq!(d.chunks().iter().flatten().count(), 1);
        // Removing and querying absent chunks never allocates.
        d.remove(5000);
        assert!(!d.contains(6000));
        assert_eq!(d.chunks().iter().flatten().count(), 1);
    }

    #[test]
    fn test_clone() {
        let b = domain(sz(), (0..30000).step_by(2));
        let b1 = domain(sz(), (1..30000).step_by(2));
        for _ in 0..10 {
            let mut c = b.clone();
            c.or(&b1).unwrap();
            assert_eq!(b.cardinality(), 15000);
            assert_eq!(c.cardinality(), 30000);

            let mut c = b1.clone();
            c.or(&b).unwrap();
            assert_eq!(b1.cardinality(), 15000);
            assert_eq!(c.cardinality(), 30000);
        }
    }

    #[test]
    fn test_or_short() {
        let mut b: ChunkedDomain = ChunkedDomain::new(sz());
        for v in (0..30000).step_by(100) {
            let o = domain(sz(), v..v + 100);
            b.or(&o).unwrap();
        }
        assert_eq!(b.cardinality(), 30000);
    }

    #[test]
    fn test_equals() {
        let mut a: ChunkedDomain = ChunkedDomain::new(sz());
        let mut c: ChunkedDomain = ChunkedDomain::new(sz());
        assert_eq!(a, c);
        a.add(99);
        c.add(0);
        assert_ne!(a, c);
        c.add(99);
        a.add(0);
        assert_eq!(a, c);

        // An emptied chunk equals an absent one.
        a.add(500);
        assert_ne!(a, c);
        a.remove(500);
        assert_eq!(a, c);

        let d = domain(DomainSize::new(30, 999).unwrap(), vec![0, 99]);
        let d2 = domain(DomainSize::new(30, 1000).unwrap(), vec![0, 99]);
        assert_ne!(d, d2);
    }

    #[test]
    fn test_contains_remove() {
        let mut b = domain(sz(), vec![99, 12345]);
        assert!(b.contains(99));
        assert!(!b.contains(98));
        assert!(b.contains(12345));
        b.remove(99);
        assert!(!b.contains(99));
        assert_eq!(b.cardinality(), 1);
        assert!(!b.is_empty());
        b.remove(12345);
        assert!(b.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_add_out_of_range() {
        let mut b: ChunkedDomain = ChunkedDomain::new(sz());
        b.add(30000);
    }

    #[test]
    fn test_and() {
        let a = domain(sz(), vec![1, 2, 3, 64, 1000, 29999]);
        let b = domain(sz(), vec![2, 64, 999, 29999]);
        let mut c = a.clone();
        c.and(&b).unwrap();
        assert_eq!(c.to_array(), vec![2, 64, 29999]);

        let r = and_all(ChunkedDomain::new(sz()), &[&a, &b]).unwrap();
        assert_eq!(r, c);
    }

    #[test]
    fn test_and_absent_chunk() {
        let k = 7;
        let mut a: ChunkedDomain = ChunkedDomain::new(sz());
        a.add(0);
        let mut b: ChunkedDomain = ChunkedDomain::new(sz());
        b.add(0);
        b.add(k as u32 * 30 + 1);
        assert!(a.chunks()[k].is_none());
        assert!(b.chunks()[k].is_some());

        let mut r = a.clone();
        r.and(&b).unwrap();
        assert!(r.chunks()[k].is_none());

        let mut r = b.clone();
        r.and(&a).unwrap();
        assert!(r.chunks()[k].is_none());
        assert_eq!(r.to_array(), vec![0]);
        // The right operand is never modified.
        assert!(a.chunks()[0].is_some());
        assert!(b.chunks()[k].is_some());
    }

    #[test]
    fn test_or_absent_chunk() {
        let a = domain(sz(), vec![0]);
        let b = domain(sz(), vec![301]);
        let mut r = a.clone();
        r.or(&b).unwrap();
        assert_eq!(r.to_array(), vec![0, 301]);
        // The copied chunk is independent of the source.
        r.remove(301);
        assert!(b.contains(301));
    }

    #[test]
    fn test_andnot() {
        let a = domain(sz(), vec![1, 2, 3, 301, 29999]);
        let b = domain(sz(), vec![2, 29999, 5000]);

        let c = andnot_of(&a, &b).unwrap();
        assert_eq!(c.to_array(), vec![1, 3, 301]);

        let d = andnot_of(&b, &a).unwrap();
        assert_eq!(d.to_array(), vec![5000]);
        // Difference, here, should not be symmetric.
        assert_ne!(c, d);

        let u = or_all(ChunkedDomain::new(sz()), &[&a, &b]).unwrap();
        assert_eq!(u.cardinality(), 6);
    }

    #[test]
    fn test_geometry_mismatch() {
        let mut a = domain(sz(), vec![1]);
        let b = domain(DomainSize::new(30, 999).unwrap(), vec![1]);
        let c = domain(DomainSize::new(10, 1000).unwrap(), vec![1]);
        assert_eq!(
            a.and(&b),
            Err(Error::IncompatibleCapacity {
                left: 1000,
                right: 999
            })
        );
        assert_eq!(
            a.or(&c),
            Err(Error::IncompatibleCapacity {
                left: 30,
                right: 10
            })
        );
        assert!(a.andnot(&b).is_err());
        assert_eq!(a.to_array(), vec![1]);
    }

    #[test]
    fn test_flip() {
        let mut d = domain(small(), vec![0, 3, 499]);
        d.flip();
        assert_eq!(d.cardinality(), 497);
        assert!(!d.contains(0) && d.contains(1) && d.contains(2) && !d.contains(3));
        assert!(!d.contains(499));
        assert!(d.chunks().iter().all(|c| c.is_some()));
        d.flip();
        assert_eq!(d.to_array(), vec![0, 3, 499]);
    }

    #[test]
    fn test_iterate() {
        let mut v = domain(small(), vec![0, 1, 2]);
        let mut buf = Vec::new();
        let mut j = 0;
        while v.next_many(j, &mut buf, 1) {
            j = buf[buf.len() - 1] + 1;
        }
        assert_eq!(buf, vec![0, 1, 2]);

        v.add(10);
        v.add(400);
        let mut buf = Vec::new();
        let mut j = 0;
        while v.next_many(j, &mut buf, 1) {
            j = buf[buf.len() - 1] + 1;
        }
        assert_eq!(buf, vec![0, 1, 2, 10, 400]);
    }

    #[test]
    fn test_iterate_split() {
        let v = domain(small(), (0..500).step_by(2));
        let mut buf = Vec::new();
        let mut j = 0;
        while v.next_many(j, &mut buf, 3) {
            j = buf[buf.len() - 1] + 1;
        }
        assert_eq!(buf, (0..500).step_by(2).collect::<Vec<_>>());
    }

    #[test]
    fn test_next_many_more_flag() {
        let v = domain(small(), vec![4, 400]);
        let mut buf = Vec::new();
        // Filling the limit exactly on the last value reports no more.
        assert!(!v.next_many(0, &mut buf, 2));
        assert_eq!(buf, vec![4, 400]);
        let mut buf = Vec::new();
        assert!(v.next_many(0, &mut buf, 1));
        assert_eq!(buf, vec![4]);
        let mut buf = Vec::new();
        assert!(v.next_many(5, &mut buf, 0));
        assert!(buf.is_empty());
        assert!(!v.next_many(401, &mut buf, 10));
        assert!(!v.next_many(100000, &mut buf, 10));
    }

    #[test]
    fn test_each_batch() {
        let v = domain(small(), (0..500).step_by(2));
        let mut data: Vec<u32> = (0..500).step_by(2).collect();
        let r: Result<(), ()> = v.each_batch(1, |batch| {
            assert_eq!(batch.len(), 1);
            assert_eq!(batch[0], data[0]);
            data.remove(0);
            Ok(false)
        });
        assert!(r.is_ok());
        assert!(data.is_empty());
    }

    #[test]
    fn test_each_batch_stop_and_error() {
        let v = domain(small(), (0..500).step_by(2));
        let mut seen = 0;
        let r: Result<(), ()> = v.each_batch(10, |batch| {
            seen += batch.len();
            Ok(seen >= 30)
        });
        assert!(r.is_ok());
        assert_eq!(seen, 30);

        let mut calls = 0;
        let r = v.each_batch(10, |_| {
            calls += 1;
            if calls == 2 {
                Err("stop")
            } else {
                Ok(false)
            }
        });
        assert_eq!(r, Err("stop"));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_range() {
        let v = domain(small(), (0..500).step_by(2));
        let mut data: Vec<u32> = (0..500).step_by(2).collect();
        let mut i = 0;
        loop {
            let batch = v.range(i, i + 1);
            i += 1;
            if batch.is_empty() {
                break;
            }
            assert_eq!(batch[0], data[0]);
            data.remove(0);
        }
        assert!(data.is_empty());
    }

    #[test]
    fn test_range_by_rank() {
        let v = domain(sz(), vec![0, 2, 4, 6, 8, 10, 12345, 29999]);
        // index 0 1 2 3 4 5
        // value 0 2 4 6 8 10
        assert_eq!(v.range(2, 3), vec![4]);
        assert_eq!(v.range(2, 4), vec![4, 6]);
        assert_eq!(v.range(5, 8), vec![10, 12345, 29999]);
        assert_eq!(v.range(6, 100), vec![12345, 29999]);
        assert!(v.range(8, 10).is_empty());
        assert!(v.range(3, 3).is_empty());
        assert!(v.range(4, 2).is_empty());
    }

    #[test]
    fn test_iter() {
        let v = domain(sz(), (0..30000).step_by(7));
        let all: Vec<u32> = v.iter().collect();
        assert_eq!(all, v.to_array());
        assert_eq!(all, (0..30000).step_by(7).collect::<Vec<_>>());

        let empty: ChunkedDomain = ChunkedDomain::new(sz());
        assert_eq!(empty.iter().count(), 0);
    }

    #[test]
    fn test_set_chunk() {
        let mut d: ChunkedDomain = ChunkedDomain::new(sz());
        d.set(2, HybridContainer::from_values(30, vec![0, 29])).unwrap();
        assert_eq!(d.to_array(), vec![60, 89]);
        assert!(matches!(
            d.set(2, HybridContainer::with_capacity(31)),
            Err(Error::IncompatibleCapacity { .. })
        ));
        assert!(matches!(
            d.set(1000, HybridContainer::with_capacity(30)),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_dense_chunks() {
        let mut d: ChunkedDomain<DenseBitset> = ChunkedDomain::new(sz());
        (0..30000).step_by(3).for_each(|v| d.add(v));
        assert_eq!(d.cardinality(), 10000);
        let mut e: ChunkedDomain<DenseBitset> = ChunkedDomain::new(sz());
        (0..30000).step_by(2).for_each(|v| e.add(v));
        d.and(&e).unwrap();
        assert_eq!(d.cardinality(), 5000);
        assert_eq!(d.range(1, 2), vec![6]);
    }

    #[test]
    fn test_marshal_unmarshal_chunks() {
        let d = domain(sz(), vec![1, 3, 5, 7, 9, 11, 13, 15, 12345]);
        let bufs = d.serialize_chunks();
        assert_eq!(bufs.len(), 1000);
        assert_eq!(bufs.iter().flatten().count(), 2);

        let d1: ChunkedDomain =
            ChunkedDomain::from_chunks(sz(), bufs.iter().map(|b| b.as_deref())).unwrap();
        assert_eq!(d1, d);
        assert!(d1.chunks()[1].is_none());

        let empty: ChunkedDomain = ChunkedDomain::new(sz());
        let bufs = empty.serialize_chunks();
        let e1: ChunkedDomain =
            ChunkedDomain::from_chunks(sz(), bufs.iter().map(|b| b.as_deref())).unwrap();
        assert!(e1.is_empty());
        assert_eq!(e1.cardinality(), 0);
    }

    #[test]
    fn test_unmarshal_chunks_rejects() {
        let d = domain(sz(), vec![1, 12345]);
        let mut bufs = d.serialize_chunks();

        // Too few chunks.
        let r: Result<ChunkedDomain, _> =
            ChunkedDomain::from_chunks(sz(), bufs[..10].iter().map(|b| b.as_deref()));
        assert!(r.is_err());

        // One corrupt chunk aborts the whole domain.
        if let Some(b) = bufs[411].as_mut() {
            b[0] ^= 0xFF;
        }
        let r: Result<ChunkedDomain, _> =
            ChunkedDomain::from_chunks(sz(), bufs.iter().map(|b| b.as_deref()));
        assert!(matches!(r, Err(Error::CorruptEncoding(_))));
    }

    #[test]
    fn test_chunk_is_container() {
        // Every allocated chunk has the chunk width as its capacity.
        let d = domain(sz(), vec![1, 12345, 29999]);
        assert!(d
            .chunks()
            .iter()
            .flatten()
            .all(|c| c.capacity() == d.size().chunk_width()));
    }
}
