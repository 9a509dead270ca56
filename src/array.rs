//! Set kernels over strictly ascending `u16` slices. These back the array
//! encoding of [`HybridContainer`](crate::HybridContainer).

use smallvec::SmallVec;
use std::cmp::Ordering;

/// Number of values kept inline before the array spills into the heap. Most
/// chunks of a sparse domain hold only a handful of values.
pub const ARRAY_INLINE: usize = 8;

pub type ArrayStore = SmallVec<[u16; ARRAY_INLINE]>;

// When one side is this many times larger than the other, intersection
// gallops through the larger side instead of merging.
const GALLOP_RATIO: usize = 64;

/// Find the first index after `pos` whose value is `>= min`, or `array.len()`
/// if there is none. The probe span doubles until it passes `min`, and then
/// a binary search narrows within the last span.
pub fn advance_until(array: &[u16], pos: usize, min: u16) -> usize {
    let len = array.len();
    let mut lower = pos + 1;
    if lower >= len || array[lower] >= min {
        return lower;
    }

    let mut span = 1;
    while lower + span < len && array[lower + span] < min {
        span *= 2;
    }
    let mut upper = if lower + span < len {
        lower + span
    } else {
        len - 1
    };

    match array[upper].cmp(&min) {
        Ordering::Equal => return upper,
        // Nothing in the array is >= min.
        Ordering::Less => return len,
        Ordering::Greater => {}
    }

    // The previous span was too small, so the answer is past it.
    lower += span >> 1;
    while lower + 1 != upper {
        let mid = (lower + upper) >> 1;
        match array[mid].cmp(&min) {
            Ordering::Equal => return mid,
            Ordering::Less => lower = mid,
            Ordering::Greater => upper = mid,
        }
    }
    upper
}

fn galloping_intersect(small: &[u16], large: &[u16]) -> ArrayStore {
    let mut out = ArrayStore::with_capacity(small.len());
    if small.is_empty() || large.is_empty() {
        return out;
    }

    let mut k1 = 0;
    let mut k2 = 0;
    // advance_until searches strictly after its position, so handle the head
    // of the large side first.
    if large[0] < small[0] {
        k1 = advance_until(large, 0, small[0]);
        if k1 == large.len() {
            return out;
        }
    }

    loop {
        let s1 = large[k1];
        let s2 = small[k2];
        match s2.cmp(&s1) {
            Ordering::Less => {
                k2 += 1;
                if k2 == small.len() {
                    break;
                }
            }
            Ordering::Equal => {
                out.push(s2);
                k2 += 1;
                if k2 == small.len() {
                    break;
                }
                k1 = advance_until(large, k1, small[k2]);
                if k1 == large.len() {
                    break;
                }
            }
            Ordering::Greater => {
                k1 = advance_until(large, k1, s2);
                if k1 == large.len() {
                    break;
                }
            }
        }
    }
    out
}

fn merge_intersect(lhs: &[u16], rhs: &[u16]) -> ArrayStore {
    let mut out = ArrayStore::with_capacity(lhs.len().min(rhs.len()));

    let mut liter = lhs.iter();
    let mut riter = rhs.iter();

    let mut lnext = liter.next();
    let mut rnext = riter.next();

    while let (Some(l), Some(r)) = (lnext, rnext) {
        match l.cmp(r) {
            Ordering::Equal => {
                out.push(*l);
                lnext = liter.next();
                rnext = riter.next();
            }
            Ordering::Less => {
                lnext = liter.next();
            }
            Ordering::Greater => {
                rnext = riter.next();
            }
        }
    }
    out
}

/// The values present in both `lhs` and `rhs`.
pub fn intersect(lhs: &[u16], rhs: &[u16]) -> ArrayStore {
    if lhs.len() * GALLOP_RATIO < rhs.len() {
        galloping_intersect(lhs, rhs)
    } else if rhs.len() * GALLOP_RATIO < lhs.len() {
        galloping_intersect(rhs, lhs)
    } else {
        merge_intersect(lhs, rhs)
    }
}

/// The values present in either side. The output is sized for the worst case
/// of no shared values.
pub fn union(lhs: &[u16], rhs: &[u16]) -> ArrayStore {
    let mut out = ArrayStore::with_capacity(lhs.len() + rhs.len());

    let mut liter = lhs.iter();
    let mut riter = rhs.iter();

    let mut lnext = liter.next();
    let mut rnext = riter.next();

    while let (Some(l), Some(r)) = (lnext, rnext) {
        let n = match l.cmp(r) {
            Ordering::Equal => {
                lnext = liter.next();
                rnext = riter.next();
                l
            }
            Ordering::Less => {
                lnext = liter.next();
                l
            }
            Ordering::Greater => {
                rnext = riter.next();
                r
            }
        };
        out.push(*n);
    }

    // Drain whichever side remains.
    lnext.into_iter().chain(liter).for_each(|l| out.push(*l));
    rnext.into_iter().chain(riter).for_each(|r| out.push(*r));
    out
}

/// The values of `lhs` that are not in `rhs`.
pub fn difference(lhs: &[u16], rhs: &[u16]) -> ArrayStore {
    let mut out = ArrayStore::with_capacity(lhs.len());

    let mut liter = lhs.iter();
    let mut riter = rhs.iter();

    let mut lnext = liter.next();
    let mut rnext = riter.next();

    while let (Some(l), Some(r)) = (lnext, rnext) {
        match l.cmp(r) {
            Ordering::Equal => {
                // It's in right, so exclude.
                lnext = liter.next();
                rnext = riter.next();
            }
            Ordering::Less => {
                out.push(*l);
                lnext = liter.next();
            }
            Ordering::Greater => {
                rnext = riter.next();
            }
        }
    }

    lnext.into_iter().chain(liter).for_each(|l| out.push(*l));
    out
}
