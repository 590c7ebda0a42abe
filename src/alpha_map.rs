use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{Result, TrieCode, TrieError};

const MAGIC: &[u8; 4] = b"TMAP";
const VERSION: u32 = 1;

const SURROGATE_LO: u32 = 0xD800;
const SURROGATE_HI: u32 = 0xDFFF;

/// Maps Unicode code points onto the dense trie code space.
///
/// An `AlphaMap` is an ordered set of disjoint, closed code-point ranges.
/// When a [`Trie`](crate::Trie) is constructed the map is frozen: every
/// mapped code point receives a *trie code* in `1..=N`, assigned in
/// ascending code-point order. Code `0` is reserved for the key
/// terminator and `N + 1` bounds child scans.
///
/// ```
/// use tailtrie::AlphaMap;
///
/// let mut alpha = AlphaMap::new();
/// alpha.add_range('a', 'z').unwrap();
/// alpha.add_range('0', '9').unwrap();
/// assert_eq!(alpha.ranges().count(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct AlphaMap {
    /// Sorted, pairwise disjoint and non-adjacent closed ranges.
    ranges: Vec<(u32, u32)>,
    /// `[cp - alpha_begin] -> code`; 0 means unmapped.
    to_code: Vec<TrieCode>,
    /// `[code] -> cp`; index 0 is the terminator and unused.
    to_char: Vec<u32>,
    alpha_begin: u32,
}

impl AlphaMap {
    /// Creates an empty alphabet map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unions the closed range `[lo, hi]` into the map.
    ///
    /// Overlapping and adjacent ranges are merged, so the map stays a
    /// sorted list of disjoint intervals.
    ///
    /// # Errors
    ///
    /// Returns [`TrieError::InvalidRange`] if `lo > hi`.
    pub fn add_range(&mut self, lo: char, hi: char) -> Result<()> {
        self.add_range_u32(lo as u32, hi as u32)
    }

    /// Adds every character of `alphabet` to the map.
    pub fn add_alphabet(&mut self, alphabet: &str) -> Result<()> {
        for ch in alphabet.chars() {
            self.add_range(ch, ch)?;
        }
        Ok(())
    }

    fn add_range_u32(&mut self, lo: u32, hi: u32) -> Result<()> {
        if lo > hi {
            return Err(TrieError::InvalidRange { lo, hi });
        }

        // The endpoints come from chars, so neither is a surrogate, but
        // the range may span the block. Keep it out of the map so every
        // mapped value is a real scalar.
        if lo < SURROGATE_LO && hi > SURROGATE_HI {
            self.add_range_u32(lo, SURROGATE_LO - 1)?;
            return self.add_range_u32(SURROGATE_HI + 1, hi);
        }

        // Position of the first range that could touch [lo, hi].
        let start = self.ranges.partition_point(|&(_, h)| h + 1 < lo);
        let mut merged = (lo, hi);
        let mut end = start;
        while end < self.ranges.len() && self.ranges[end].0 <= hi.saturating_add(1) {
            merged.0 = merged.0.min(self.ranges[end].0);
            merged.1 = merged.1.max(self.ranges[end].1);
            end += 1;
        }
        self.ranges.splice(start..end, [merged]);
        Ok(())
    }

    /// Iterates over the mapped ranges in ascending code-point order.
    pub fn ranges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.ranges.iter().copied()
    }

    /// Total number of mapped code points.
    pub fn symbol_count(&self) -> usize {
        self.ranges
            .iter()
            .map(|&(lo, hi)| (hi - lo + 1) as usize)
            .sum()
    }

    /// Precomputes the dense lookup tables. Called once when a trie takes
    /// ownership of the map; the map is immutable from then on.
    pub(crate) fn freeze(&mut self) -> Result<()> {
        let total = self.symbol_count();
        // Terminator 0 plus the scan bound N + 1 must also fit in TrieCode.
        if total + 2 > TrieCode::MAX as usize + 1 {
            return Err(TrieError::AlphabetTooLarge(total));
        }

        self.to_code.clear();
        self.to_char.clear();
        self.to_char.push(0); // code 0: terminator

        let Some(&(first, _)) = self.ranges.first() else {
            self.alpha_begin = 0;
            return Ok(());
        };
        let (_, last) = *self.ranges.last().unwrap();

        self.alpha_begin = first;
        self.to_code = vec![0; (last - first + 1) as usize];
        for &(lo, hi) in &self.ranges {
            for cp in lo..=hi {
                let code = self.to_char.len() as TrieCode;
                self.to_code[(cp - first) as usize] = code;
                self.to_char.push(cp);
            }
        }
        Ok(())
    }

    /// Returns the trie code for `ch`, or `None` if it is unmapped.
    pub fn encode(&self, ch: char) -> Option<TrieCode> {
        let cp = ch as u32;
        let idx = cp.checked_sub(self.alpha_begin)? as usize;
        match self.to_code.get(idx) {
            Some(&code) if code != 0 => Some(code),
            _ => None,
        }
    }

    /// Returns the code point for a user trie code.
    ///
    /// `None` for the terminator code `0` and for codes past the alphabet.
    pub fn decode(&self, code: TrieCode) -> Option<char> {
        if code == 0 {
            return None;
        }
        self.to_char
            .get(code as usize)
            .and_then(|&cp| char::from_u32(cp))
    }

    /// Exclusive upper bound of the code space: `N + 1` for an alphabet
    /// of `N` symbols. Child scans cover `0..bound`.
    pub(crate) fn code_bound(&self) -> TrieCode {
        self.to_char.len() as TrieCode
    }

    /// Encodes `key` and appends the terminator code.
    pub(crate) fn encode_key(&self, key: &str) -> Result<Vec<TrieCode>> {
        let mut codes = self.encode_prefix(key)?;
        codes.push(0);
        Ok(codes)
    }

    /// Encodes `key` without a terminator, for prefix queries.
    pub(crate) fn encode_prefix(&self, key: &str) -> Result<Vec<TrieCode>> {
        key.chars()
            .map(|ch| self.encode(ch).ok_or(TrieError::UnmappedChar(ch)))
            .collect()
    }

    /// Writes the alpha-map region: magic, version, range count, ranges.
    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32::<BigEndian>(VERSION)?;
        writer.write_u32::<BigEndian>(self.ranges.len() as u32)?;
        for &(lo, hi) in &self.ranges {
            writer.write_u32::<BigEndian>(lo)?;
            writer.write_u32::<BigEndian>(hi)?;
        }
        Ok(())
    }

    /// Reads the alpha-map region and freezes the result.
    pub(crate) fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(TrieError::Format("bad alpha-map magic"));
        }
        if reader.read_u32::<BigEndian>()? != VERSION {
            return Err(TrieError::Format("unsupported alpha-map version"));
        }

        let count = reader.read_u32::<BigEndian>()?;
        let mut map = AlphaMap::new();
        let mut prev_hi: Option<u32> = None;
        for _ in 0..count {
            let lo = reader.read_u32::<BigEndian>()?;
            let hi = reader.read_u32::<BigEndian>()?;
            if lo > hi {
                return Err(TrieError::Format("alpha-map range with lo > hi"));
            }
            // The writer only emits char-derived ranges, so anything past
            // the scalar range or touching the surrogate block is corrupt.
            // Bounding `hi` here also bounds the span `freeze` allocates
            // tables for.
            if hi > char::MAX as u32 {
                return Err(TrieError::Format("alpha-map code point out of range"));
            }
            if lo <= SURROGATE_HI && hi >= SURROGATE_LO {
                return Err(TrieError::Format("alpha-map range spans surrogates"));
            }
            if prev_hi.is_some_and(|p| lo <= p) {
                return Err(TrieError::Format("alpha-map ranges out of order"));
            }
            prev_hi = Some(hi);
            map.ranges.push((lo, hi));
        }
        map.freeze()?;
        Ok(map)
    }
}
