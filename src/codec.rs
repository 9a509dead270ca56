//! The binary layout shared by every container.
//!
//! ```text
//! offset 0..4   magic (u32, native endian)
//! offset 4      encoding tag (0x0F array, 0xF0 bitset)
//! offset 5      unused, zero
//! offset 6..8   cardinality (u16, native endian)
//! offset 8..    payload
//!                 array:  cardinality x u16, strictly ascending
//!                 bitset: ceil(capacity / 64) x u64
//! ```
//!
//! All reads go through [`bytes::Buf`] on a slice cursor, with the length
//! checked before each field is taken.

use crate::Error;
use bytes::{Buf, BufMut};

pub const MAGIC: u32 = 0xFAD4_F00D;
pub const HEADER_SIZE: usize = 8;

/// Sets with fewer values than this are written in the array form,
/// regardless of how they are held in memory.
pub const EXPORT_ARRAY_MAX: u64 = 1000;

/// The largest capacity for which values fit the 16-bit array form.
pub const ARRAY_CAPACITY_LIMIT: u32 = 1 << 16;

pub(crate) const WORD_BITS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Array,
    Bitset,
}

impl Encoding {
    const ARRAY_TAG: u8 = 0x0F;
    const BITSET_TAG: u8 = 0xF0;

    pub fn tag(self) -> u8 {
        match self {
            Encoding::Array => Self::ARRAY_TAG,
            Encoding::Bitset => Self::BITSET_TAG,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, Error> {
        match tag {
            Self::ARRAY_TAG => Ok(Encoding::Array),
            Self::BITSET_TAG => Ok(Encoding::Bitset),
            other => Err(reject(format!("unknown encoding tag {:#04x}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub encoding: Encoding,
    pub cardinality: u16,
}

impl Header {
    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_ne(MAGIC);
        buf.put_u8(self.encoding.tag());
        buf.put_u8(0);
        buf.put_u16_ne(self.cardinality);
    }

    /// Read and validate a header, advancing the cursor past it.
    pub fn read(cursor: &mut &[u8]) -> Result<Self, Error> {
        if cursor.remaining() < HEADER_SIZE {
            return Err(reject(format!(
                "buffer of {} bytes is shorter than the header",
                cursor.remaining()
            )));
        }
        let magic = cursor.get_u32_ne();
        if magic != MAGIC {
            return Err(reject(format!("bad magic {:#010x}", magic)));
        }
        let encoding = Encoding::from_tag(cursor.get_u8())?;
        let _unused = cursor.get_u8();
        let cardinality = cursor.get_u16_ne();
        Ok(Header {
            encoding,
            cardinality,
        })
    }
}

/// The serde form of a container: its capacity and its wire bytes. Decoding
/// goes through the same validation as [`decode`].
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename = "P")]
pub struct Packed {
    #[serde(rename = "c")]
    pub capacity: u32,
    #[serde(rename = "b")]
    pub bytes: Vec<u8>,
}

/// A decoded, validated payload.
#[derive(Debug, PartialEq)]
pub enum Payload {
    Array(Vec<u16>),
    Bitset(Vec<u64>),
}

/// Number of words needed to hold `capacity` bits.
#[inline(always)]
pub fn words_for(capacity: u32) -> usize {
    ((capacity as usize) + (WORD_BITS as usize - 1)) / WORD_BITS as usize
}

/// The exact length of a bitset form buffer for `capacity`.
pub fn bitset_len(capacity: u32) -> usize {
    HEADER_SIZE + words_for(capacity) * 8
}

/// Whether a set of this size should be written in the array form.
#[inline(always)]
pub fn prefers_array(capacity: u32, cardinality: u64) -> bool {
    capacity <= ARRAY_CAPACITY_LIMIT && cardinality < EXPORT_ARRAY_MAX
}

/// Write the array form. `values` must be strictly ascending and fewer than
/// [`EXPORT_ARRAY_MAX`].
pub fn encode_array<B, I>(values: I, buf: &mut B)
where
    B: BufMut,
    I: ExactSizeIterator<Item = u16>,
{
    debug_assert!((values.len() as u64) < EXPORT_ARRAY_MAX);
    Header {
        encoding: Encoding::Array,
        cardinality: values.len() as u16,
    }
    .write(buf);
    values.for_each(|v| buf.put_u16_ne(v));
}

/// Write the bitset form. The header cardinality saturates at `u16::MAX`,
/// readers recompute it from the words.
pub fn encode_bitset<B: BufMut>(words: &[u64], cardinality: u64, buf: &mut B) {
    Header {
        encoding: Encoding::Bitset,
        cardinality: cardinality.min(u16::MAX as u64) as u16,
    }
    .write(buf);
    words.iter().for_each(|w| buf.put_u64_ne(*w));
}

/// Decode and validate `buf` for a set of `capacity`. Nothing is returned
/// unless the whole buffer is well formed.
pub fn decode(buf: &[u8], capacity: u32) -> Result<Payload, Error> {
    let mut cursor = buf;
    let header = Header::read(&mut cursor)?;

    match header.encoding {
        Encoding::Array => {
            let expect = header.cardinality as usize * 2;
            if cursor.remaining() != expect {
                return Err(reject(format!(
                    "array encoding expects {} payload bytes, found {}",
                    expect,
                    cursor.remaining()
                )));
            }
            let mut values = Vec::with_capacity(header.cardinality as usize);
            let mut prev: Option<u16> = None;
            while cursor.has_remaining() {
                let v = cursor.get_u16_ne();
                if (v as u32) >= capacity {
                    return Err(reject(format!(
                        "array value {} exceeds capacity {}",
                        v, capacity
                    )));
                }
                if matches!(prev, Some(p) if p >= v) {
                    return Err(reject("array values are not strictly ascending"));
                }
                prev = Some(v);
                values.push(v);
            }
            Ok(Payload::Array(values))
        }
        Encoding::Bitset => {
            let expect = bitset_len(capacity);
            if buf.len() != expect {
                return Err(reject(format!(
                    "bitset encoding expects {} bytes, found {}",
                    expect,
                    buf.len()
                )));
            }
            let mut words = Vec::with_capacity(words_for(capacity));
            while cursor.has_remaining() {
                words.push(cursor.get_u64_ne());
            }
            let tail = capacity % WORD_BITS;
            if tail != 0 {
                if let Some(last) = words.last() {
                    if last >> tail != 0 {
                        return Err(reject("bits set beyond capacity"));
                    }
                }
            }
            Ok(Payload::Bitset(words))
        }
    }
}

fn reject<S: Into<String>>(msg: S) -> Error {
    let err = Error::corrupt(msg);
    debug!(%err, "rejecting serialized buffer");
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut buf = Vec::new();
        Header {
            encoding: Encoding::Array,
            cardinality: 3,
        }
        .write(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[0..4], &MAGIC.to_ne_bytes());
        assert_eq!(buf[4], 0x0F);
        assert_eq!(buf[5], 0);
        assert_eq!(&buf[6..8], &3u16.to_ne_bytes());
    }

    #[test]
    fn test_words_for() {
        assert_eq!(words_for(0), 0);
        assert_eq!(words_for(1), 1);
        assert_eq!(words_for(64), 1);
        assert_eq!(words_for(65), 2);
        assert_eq!(words_for(30000), 469);
        assert_eq!(bitset_len(30000), 8 + 469 * 8);
    }

    #[test]
    fn test_decode_short() {
        assert!(matches!(
            decode(&[0, 1, 2], 100),
            Err(Error::CorruptEncoding(_))
        ));
        assert!(decode(&[], 100).is_err());
    }

    #[test]
    fn test_decode_bad_magic() {
        let mut buf = Vec::new();
        encode_array([1u16, 2].iter().copied(), &mut buf);
        buf[0] ^= 0xFF;
        assert!(matches!(decode(&buf, 100), Err(Error::CorruptEncoding(_))));
    }

    #[test]
    fn test_decode_bad_tag() {
        let mut buf = Vec::new();
        encode_array([1u16].iter().copied(), &mut buf);
        buf[4] = 0x42;
        assert!(decode(&buf, 100).is_err());
    }

    #[test]
    fn test_decode_array() {
        let mut buf = Vec::new();
        encode_array([1u16, 5, 99].iter().copied(), &mut buf);
        assert_eq!(buf.len(), HEADER_SIZE + 6);
        assert_eq!(decode(&buf, 100).unwrap(), Payload::Array(vec![1, 5, 99]));

        // Value beyond capacity.
        assert!(decode(&buf, 99).is_err());

        // Truncated payload.
        assert!(decode(&buf[..buf.len() - 1], 100).is_err());

        // Trailing garbage.
        let mut long = buf.clone();
        long.push(0);
        assert!(decode(&long, 100).is_err());
    }

    #[test]
    fn test_decode_array_unsorted() {
        let mut buf = Vec::new();
        encode_array([5u16, 1].iter().copied(), &mut buf);
        assert!(decode(&buf, 100).is_err());

        let mut buf = Vec::new();
        encode_array([5u16, 5].iter().copied(), &mut buf);
        assert!(decode(&buf, 100).is_err());
    }

    #[test]
    fn test_decode_bitset() {
        let words = vec![0b1011u64, 0, 1];
        let mut buf = Vec::new();
        encode_bitset(&words, 4, &mut buf);
        assert_eq!(buf.len(), bitset_len(130));
        assert_eq!(decode(&buf, 130).unwrap(), Payload::Bitset(words));

        // Wrong capacity implies a wrong length.
        assert!(decode(&buf, 200).is_err());
        assert!(decode(&buf, 64).is_err());
    }

    #[test]
    fn test_decode_bitset_tail_bits() {
        // Capacity 130 leaves 2 valid bits in the last word.
        let words = vec![0u64, 0, 0b100];
        let mut buf = Vec::new();
        encode_bitset(&words, 1, &mut buf);
        assert!(decode(&buf, 130).is_err());
    }

    #[test]
    fn test_prefers_array() {
        assert!(prefers_array(30000, 0));
        assert!(prefers_array(30000, EXPORT_ARRAY_MAX - 1));
        assert!(!prefers_array(30000, EXPORT_ARRAY_MAX));
        assert!(!prefers_array(ARRAY_CAPACITY_LIMIT + 1, 1));
    }
}
