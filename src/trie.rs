use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::alpha_map::AlphaMap;
use crate::darray::{CellKind, DArray, POOL_BEGIN, ROOT};
use crate::state::{Iter, Keys, TrieState, Values};
use crate::tail::Tail;
use crate::{Result, TrieCode, TrieData, TrieError, TrieIndex};

/// An ordered map from Unicode strings to [`TrieData`] values.
///
/// Keys must consist of code points declared in the [`AlphaMap`] the trie
/// was built with; the map is frozen at construction. Every stored key is
/// terminated internally by the code `0`, so the empty string is a legal
/// key. Enumeration order is ascending by trie-code sequence, which for
/// an alpha map of sorted ranges is ascending code-point order.
pub struct Trie {
    alpha: AlphaMap,
    da: DArray,
    tail: Tail,
    dirty: bool,
}

impl Trie {
    /// Builds an empty trie over `alpha`, freezing the alphabet.
    ///
    /// # Errors
    ///
    /// Returns [`TrieError::AlphabetTooLarge`] if the mapped code points
    /// do not fit the trie code space.
    pub fn new(mut alpha: AlphaMap) -> Result<Self> {
        alpha.freeze()?;
        Ok(Self {
            da: DArray::new(alpha.code_bound()),
            tail: Tail::new(),
            alpha,
            dirty: true,
        })
    }

    /// Builds an empty trie over the given closed code-point ranges.
    pub fn from_ranges(ranges: &[(char, char)]) -> Result<Self> {
        let mut alpha = AlphaMap::new();
        for &(lo, hi) in ranges {
            alpha.add_range(lo, hi)?;
        }
        Self::new(alpha)
    }

    /// Builds an empty trie whose alphabet is the characters of
    /// `alphabet`.
    pub fn from_alphabet(alphabet: &str) -> Result<Self> {
        let mut alpha = AlphaMap::new();
        alpha.add_alphabet(alphabet)?;
        Self::new(alpha)
    }

    /// The alphabet this trie was built with.
    pub fn alpha_map(&self) -> &AlphaMap {
        &self.alpha
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        // Exactly one live tail block per stored key.
        self.tail.live()
    }

    /// True if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the trie has been modified since it was created, loaded,
    /// or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Removes all keys, keeping the alphabet.
    pub fn clear(&mut self) {
        self.da = DArray::new(self.alpha.code_bound());
        self.tail = Tail::new();
        self.dirty = true;
    }

    /// Inserts `key` with `value`, returning the previous value if the
    /// key was already stored.
    ///
    /// # Errors
    ///
    /// Returns [`TrieError::UnmappedChar`] (leaving the trie unchanged)
    /// if `key` contains a code point outside the alphabet.
    pub fn insert(&mut self, key: &str, value: TrieData) -> Result<Option<TrieData>> {
        let codes = self.alpha.encode_key(key)?;

        let mut s = ROOT;
        let mut i = 0;
        while !self.da.is_separate(s) {
            let c = codes[i];
            match self.da.walk(s, c) {
                Some(t) => s = t,
                None => {
                    self.branch_in_branch(s, &codes[i..], value)?;
                    self.dirty = true;
                    return Ok(None);
                }
            }
            if c == 0 {
                break;
            }
            i += 1;
        }

        let sep = s;
        let handle = self.da.tail_handle(sep);
        let tail_start = i;
        let mut pos = 0;
        loop {
            let c = codes[i];
            match self.tail.walk_char(handle, pos, c) {
                Some(p) => pos = p,
                None => {
                    self.branch_in_tail(sep, handle, &codes[tail_start..], value)?;
                    self.dirty = true;
                    return Ok(None);
                }
            }
            if c == 0 {
                break;
            }
            i += 1;
        }

        // The whole key matched an existing entry.
        let old = self.tail.data(handle);
        self.tail.set_data(handle, value);
        self.dirty = true;
        Ok(Some(old))
    }

    /// Grows a fresh branch from the branching state `s`.
    ///
    /// `rest` is the unconsumed part of the encoded key, terminator
    /// included; everything after the branching code goes to the tail.
    fn branch_in_branch(&mut self, s: TrieIndex, rest: &[TrieCode], value: TrieData) -> Result<()> {
        let c = rest[0];
        let (new_da, _) = self.da.insert_branch(s, c)?;
        let suffix = if c == 0 {
            Vec::new()
        } else {
            rest[1..rest.len() - 1].to_vec()
        };
        let handle = self.tail.add_suffix(suffix, value);
        self.da.link_tail(new_da, handle);
        Ok(())
    }

    /// Splits the tail behind the separate state `sep`: the longest
    /// common extension of the old suffix and the new key moves into the
    /// double-array, then the two residual suffixes re-separate.
    fn branch_in_tail(
        &mut self,
        sep: TrieIndex,
        old_tail: i32,
        rest: &[TrieCode],
        value: TrieData,
    ) -> Result<()> {
        let old_suffix = self.tail.suffix(old_tail).to_vec();

        let mut s = sep;
        let mut i = 0;
        while i < old_suffix.len() && old_suffix[i] == rest[i] {
            let (t, _) = self.da.insert_branch(s, old_suffix[i])?;
            s = t;
            i += 1;
        }

        // Re-attach the old key's residue; the virtual terminator branches
        // on code 0 when the old key is a prefix of the new one.
        let old_c = old_suffix.get(i).copied().unwrap_or(0);
        let (old_da, s) = self.da.insert_branch(s, old_c)?;
        let old_rest = old_suffix.get(i + 1..).map(|s| s.to_vec()).unwrap_or_default();
        self.tail.set_suffix(old_tail, old_rest);
        self.da.link_tail(old_da, old_tail);

        self.branch_in_branch(s, &rest[i..], value)
    }

    /// Finds the separate state and tail handle that terminate `codes`.
    fn find_terminal(&self, codes: &[TrieCode]) -> Option<(TrieIndex, i32)> {
        let mut s = ROOT;
        let mut i = 0;
        while !self.da.is_separate(s) {
            let c = *codes.get(i)?;
            s = self.da.walk(s, c)?;
            if c == 0 {
                break;
            }
            i += 1;
        }

        let handle = self.da.tail_handle(s);
        let mut pos = 0;
        loop {
            let c = *codes.get(i)?;
            pos = self.tail.walk_char(handle, pos, c)?;
            if c == 0 {
                return Some((s, handle));
            }
            i += 1;
        }
    }

    /// Returns the value stored for `key`, if any.
    pub fn get(&self, key: &str) -> Option<TrieData> {
        let codes = self.alpha.encode_key(key).ok()?;
        let (_, handle) = self.find_terminal(&codes)?;
        Some(self.tail.data(handle))
    }

    /// Like [`get`](Self::get), but swallows the miss.
    pub fn get_or(&self, key: &str, default: TrieData) -> TrieData {
        self.get(key).unwrap_or(default)
    }

    /// True if `key` is stored.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Removes `key`, returning its value.
    ///
    /// Frees the key's tail block and releases every double-array state
    /// that becomes childless, walking up until a still-shared ancestor.
    ///
    /// # Errors
    ///
    /// Returns [`TrieError::KeyNotFound`] if `key` is not stored (a key
    /// with out-of-alphabet characters cannot be stored).
    pub fn remove(&mut self, key: &str) -> Result<TrieData> {
        let codes = self
            .alpha
            .encode_key(key)
            .map_err(|_| TrieError::KeyNotFound)?;
        let (sep, handle) = self.find_terminal(&codes).ok_or(TrieError::KeyNotFound)?;

        let value = self.tail.data(handle);
        self.tail.remove(handle);
        self.da.prune(sep);
        self.dirty = true;
        Ok(value)
    }

    /// Walks the codes of a prefix (no terminator). Returns the reached
    /// double-array state and, once inside a tail, the cursor there.
    fn walk_prefix(&self, codes: &[TrieCode]) -> Option<(TrieIndex, Option<(i32, usize)>)> {
        let mut s = ROOT;
        let mut in_tail: Option<(i32, usize)> = None;
        for &c in codes {
            match in_tail {
                None => {
                    s = self.da.walk(s, c)?;
                    if self.da.is_separate(s) {
                        in_tail = Some((self.da.tail_handle(s), 0));
                    }
                }
                Some((h, pos)) => {
                    in_tail = Some((h, self.tail.walk_char(h, pos, c)?));
                }
            }
        }
        Some((s, in_tail))
    }

    /// Collects `(byte_end, value)` for every stored key that is a
    /// prefix of `query`, shortest first.
    fn scan_prefixes(&self, query: &str) -> Vec<(usize, TrieData)> {
        let mut out = Vec::new();
        let mut s = ROOT;
        let mut in_tail: Option<(i32, usize)> = None;

        if let Some(v) = self.terminal_at(s, in_tail) {
            out.push((0, v));
        }
        for (idx, ch) in query.char_indices() {
            let Some(c) = self.alpha.encode(ch) else {
                return out;
            };
            match in_tail {
                None => {
                    let Some(t) = self.da.walk(s, c) else {
                        return out;
                    };
                    s = t;
                    if self.da.is_separate(t) {
                        in_tail = Some((self.da.tail_handle(t), 0));
                    }
                }
                Some((h, pos)) => {
                    let Some(p) = self.tail.walk_char(h, pos, c) else {
                        return out;
                    };
                    in_tail = Some((h, p));
                }
            }
            if let Some(v) = self.terminal_at(s, in_tail) {
                out.push((idx + ch.len_utf8(), v));
            }
        }
        out
    }

    /// The value of the key ending exactly at the given position, if any.
    fn terminal_at(&self, s: TrieIndex, in_tail: Option<(i32, usize)>) -> Option<TrieData> {
        match in_tail {
            Some((h, pos)) => self
                .tail
                .walk_char(h, pos, 0)
                .map(|_| self.tail.data(h)),
            None => {
                let t = self.da.walk(s, 0)?;
                if self.da.is_separate(t) {
                    let h = self.da.tail_handle(t);
                    if self.tail.suffix(h).is_empty() {
                        return Some(self.tail.data(h));
                    }
                }
                None
            }
        }
    }

    /// All stored keys that are prefixes of `query`, shortest first, as
    /// subslices of `query`.
    pub fn prefixes<'q>(&self, query: &'q str) -> Vec<&'q str> {
        self.scan_prefixes(query)
            .into_iter()
            .map(|(end, _)| &query[..end])
            .collect()
    }

    /// Like [`prefixes`](Self::prefixes), with each prefix's value.
    pub fn prefix_items<'q>(&self, query: &'q str) -> Vec<(&'q str, TrieData)> {
        self.scan_prefixes(query)
            .into_iter()
            .map(|(end, v)| (&query[..end], v))
            .collect()
    }

    /// The longest stored key that is a prefix of `query`.
    pub fn longest_prefix<'q>(&self, query: &'q str) -> Option<&'q str> {
        self.scan_prefixes(query)
            .last()
            .map(|&(end, _)| &query[..end])
    }

    /// The longest stored prefix of `query` together with its value.
    pub fn longest_prefix_item<'q>(&self, query: &'q str) -> Option<(&'q str, TrieData)> {
        self.scan_prefixes(query)
            .last()
            .map(|&(end, v)| (&query[..end], v))
    }

    /// True if any stored key starts with `prefix`.
    pub fn has_keys_with_prefix(&self, prefix: &str) -> bool {
        if self.is_empty() {
            return false;
        }
        let Ok(codes) = self.alpha.encode_prefix(prefix) else {
            return false;
        };
        self.walk_prefix(&codes).is_some()
    }

    /// Iterates over all `(key, value)` pairs in trie-code order.
    pub fn iter(&self) -> Iter<'_> {
        Iter::subtree(self, ROOT, String::new())
    }

    /// Iterates, in order, over the entries whose key starts with
    /// `prefix`.
    pub fn iter_prefix(&self, prefix: &str) -> Iter<'_> {
        let Ok(codes) = self.alpha.encode_prefix(prefix) else {
            return Iter::empty(self);
        };
        let Some((s, in_tail)) = self.walk_prefix(&codes) else {
            return Iter::empty(self);
        };
        match in_tail {
            None => Iter::subtree(self, s, prefix.to_string()),
            Some((h, pos)) => {
                // The prefix ends inside a collapsed suffix: exactly one
                // key remains below it.
                let mut key = String::from(prefix);
                for &c in &self.tail.suffix(h)[pos..] {
                    if let Some(ch) = self.alpha.decode(c) {
                        key.push(ch);
                    }
                }
                Iter::single(self, key, self.tail.data(h))
            }
        }
    }

    /// Iterates over all keys in order.
    pub fn keys(&self) -> Keys<'_> {
        Keys::new(self.iter())
    }

    /// Iterates, in order, over the keys starting with `prefix`.
    pub fn keys_prefix(&self, prefix: &str) -> Keys<'_> {
        Keys::new(self.iter_prefix(prefix))
    }

    /// Iterates over all values in key order.
    pub fn values(&self) -> Values<'_> {
        Values::new(self.iter())
    }

    /// Iterates over the values of keys starting with `prefix`.
    pub fn values_prefix(&self, prefix: &str) -> Values<'_> {
        Values::new(self.iter_prefix(prefix))
    }

    /// A low-level cursor positioned at the root.
    pub fn state(&self) -> TrieState<'_> {
        TrieState::new(self)
    }

    pub(crate) fn parts(&self) -> (&AlphaMap, &DArray, &Tail) {
        (&self.alpha, &self.da, &self.tail)
    }

    /// Writes the trie to a stream: alpha-map region, tail region,
    /// double-array region, all integers big-endian.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.alpha.write(writer)?;
        self.tail.write(writer)?;
        self.da.write(writer)
    }

    /// Reads a trie written by [`write`](Self::write), verifying magics
    /// and structural invariants.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let alpha = AlphaMap::read(reader)?;
        let tail = Tail::read(reader)?;
        let da = DArray::read(reader, alpha.code_bound())?;

        // Cross-region check: separate states and live tail blocks must
        // pair up one to one.
        let mut seen = vec![false; tail.num_blocks()];
        let mut num_separate = 0;
        for s in POOL_BEGIN..da.num_cells() {
            if let CellKind::Separate { tail: h, .. } = da.kind(s) {
                if h < 0 || h as usize >= tail.num_blocks() || !tail.is_live(h) {
                    return Err(TrieError::Format("separate state with dead tail handle"));
                }
                if seen[h as usize] {
                    return Err(TrieError::Format("tail handle shared by two states"));
                }
                seen[h as usize] = true;
                num_separate += 1;
            }
        }
        if num_separate != tail.live() {
            return Err(TrieError::Format("orphaned tail block"));
        }

        Ok(Self {
            alpha,
            da,
            tail,
            dirty: false,
        })
    }

    /// Saves the trie to a file and clears the dirty flag.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;
        self.dirty = false;
        Ok(())
    }

    /// Loads a trie from a file written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read(&mut reader)
    }
}

impl<'a> IntoIterator for &'a Trie {
    type Item = (String, TrieData);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lowercase() -> Trie {
        Trie::from_ranges(&[('a', 'z')]).unwrap()
    }

    #[test]
    fn insert_get_contains() {
        let mut trie = lowercase();
        assert!(!trie.contains("foo"));
        assert_eq!(trie.insert("foo", 5).unwrap(), None);
        assert!(trie.contains("foo"));
        assert_eq!(trie.get("foo"), Some(5));
        assert_eq!(trie.get("bar"), None);
        assert_eq!(trie.get("fo"), None);
        assert_eq!(trie.get("fooo"), None);
    }

    #[test]
    fn overwrite_returns_previous() {
        let mut trie = lowercase();
        trie.insert("foo", 5).unwrap();
        assert_eq!(trie.insert("foo", 9).unwrap(), Some(5));
        assert_eq!(trie.get("foo"), Some(9));
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn items_in_order() {
        let mut trie = lowercase();
        trie.insert("foo", 10).unwrap();
        trie.insert("bar", 20).unwrap();
        trie.insert("foobar", 30).unwrap();

        let items: Vec<(String, TrieData)> = trie.iter().collect();
        assert_eq!(
            items,
            [
                ("bar".to_string(), 20),
                ("foo".to_string(), 10),
                ("foobar".to_string(), 30)
            ]
        );
        assert_eq!(trie.len(), 3);
    }

    #[test]
    fn shared_prefix_splits() {
        let mut trie = lowercase();
        trie.insert("foobar", 1).unwrap();
        trie.insert("foovar", 2).unwrap();
        trie.insert("foo", 3).unwrap();
        trie.insert("fo", 4).unwrap();

        assert_eq!(trie.get("foobar"), Some(1));
        assert_eq!(trie.get("foovar"), Some(2));
        assert_eq!(trie.get("foo"), Some(3));
        assert_eq!(trie.get("fo"), Some(4));
        assert_eq!(trie.get("f"), None);
        assert_eq!(trie.len(), 4);
    }

    #[test]
    fn empty_key_is_storable() {
        let mut trie = lowercase();
        trie.insert("", 7).unwrap();
        assert_eq!(trie.get(""), Some(7));
        assert_eq!(trie.len(), 1);
        trie.insert("a", 1).unwrap();
        let keys: Vec<String> = trie.keys().collect();
        assert_eq!(keys, ["", "a"]);
        assert_eq!(trie.remove("").unwrap(), 7);
        assert_eq!(trie.get(""), None);
    }

    #[test]
    fn unmapped_char_leaves_trie_unchanged() {
        let mut trie = lowercase();
        trie.insert("abc", 1).unwrap();
        let err = trie.insert("ab!", 2).unwrap_err();
        assert!(matches!(err, TrieError::UnmappedChar('!')));
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.get("abc"), Some(1));
        assert_eq!(trie.get("ab"), None);
    }

    #[test]
    fn remove_and_reinsert() {
        let mut trie = lowercase();
        trie.insert("pool", 2).unwrap();
        trie.insert("prize", 6).unwrap();
        trie.insert("preview", 5).unwrap();

        assert_eq!(trie.remove("prize").unwrap(), 6);
        assert!(!trie.contains("prize"));
        assert_eq!(trie.get("pool"), Some(2));
        assert_eq!(trie.get("preview"), Some(5));
        assert_eq!(trie.len(), 2);

        assert!(matches!(trie.remove("prize"), Err(TrieError::KeyNotFound)));
        assert!(matches!(trie.remove("qq!"), Err(TrieError::KeyNotFound)));

        trie.insert("prize", 66).unwrap();
        assert_eq!(trie.get("prize"), Some(66));
        assert_eq!(trie.len(), 3);
    }

    #[test]
    fn remove_key_that_is_prefix_of_another() {
        let mut trie = lowercase();
        trie.insert("foo", 1).unwrap();
        trie.insert("foobar", 2).unwrap();
        assert_eq!(trie.remove("foo").unwrap(), 1);
        assert_eq!(trie.get("foobar"), Some(2));
        assert_eq!(trie.remove("foobar").unwrap(), 2);
        assert!(trie.is_empty());
    }

    #[test]
    fn longest_prefix_cases() {
        let mut trie = lowercase();
        for key in ["pool", "prepare", "preview", "prize", "produce", "producer", "progress"] {
            trie.insert(key, 1).unwrap();
        }
        assert_eq!(trie.longest_prefix("producers"), Some("producer"));
        assert_eq!(trie.longest_prefix("pooler"), Some("pool"));
        assert_eq!(trie.longest_prefix("z"), None);
        assert_eq!(trie.longest_prefix("pro"), None);
        assert_eq!(trie.longest_prefix("prize"), Some("prize"));
    }

    #[test]
    fn prefix_items_collects_all() {
        let mut trie = lowercase();
        for (key, value) in [
            ("producers", 1),
            ("pr", 3),
            ("pool", 2),
            ("prepare", 4),
            ("preview", 5),
            ("prize", 6),
            ("produce", 7),
            ("producer", 8),
            ("progress", 9),
        ] {
            trie.insert(key, value).unwrap();
        }
        assert_eq!(
            trie.prefix_items("producers"),
            [("pr", 3), ("produce", 7), ("producer", 8), ("producers", 1)]
        );
        assert_eq!(
            trie.prefixes("producers"),
            ["pr", "produce", "producer", "producers"]
        );
        assert_eq!(trie.longest_prefix_item("producers"), Some(("producers", 1)));
    }

    #[test]
    fn empty_key_participates_in_prefixes() {
        let mut trie = lowercase();
        trie.insert("", 1).unwrap();
        trie.insert("ab", 2).unwrap();
        assert_eq!(trie.prefixes("abc"), ["", "ab"]);
        assert_eq!(trie.longest_prefix(""), Some(""));
    }

    #[test]
    fn has_keys_with_prefix_cases() {
        let mut trie = lowercase();
        assert!(!trie.has_keys_with_prefix(""));
        trie.insert("foobar", 1).unwrap();
        trie.insert("fog", 2).unwrap();
        assert!(trie.has_keys_with_prefix(""));
        assert!(trie.has_keys_with_prefix("f"));
        assert!(trie.has_keys_with_prefix("fo"));
        assert!(trie.has_keys_with_prefix("foob"));
        assert!(trie.has_keys_with_prefix("foobar"));
        assert!(!trie.has_keys_with_prefix("foobarx"));
        assert!(!trie.has_keys_with_prefix("fx"));
        assert!(!trie.has_keys_with_prefix("x!"));
    }

    #[test]
    fn iter_prefix_is_the_contiguous_subrange() {
        let mut trie = lowercase();
        for (i, key) in ["pool", "prepare", "preview", "prize", "pro", "proof"]
            .iter()
            .enumerate()
        {
            trie.insert(key, i as TrieData).unwrap();
        }
        let keys: Vec<String> = trie.keys_prefix("pre").collect();
        assert_eq!(keys, ["prepare", "preview"]);

        // A prefix ending inside a collapsed suffix selects one key.
        let keys: Vec<String> = trie.keys_prefix("proo").collect();
        assert_eq!(keys, ["proof"]);

        let keys: Vec<String> = trie.keys_prefix("pq").collect();
        assert!(keys.is_empty());

        let all: Vec<String> = trie.keys_prefix("").collect();
        assert_eq!(all.len(), 6);
    }

    #[test]
    fn cyrillic_alphabet() {
        let mut trie = Trie::from_ranges(&[('а', 'я')]).unwrap();
        trie.insert("а", 1).unwrap();
        trie.insert("б", 2).unwrap();
        trie.insert("аб", 3).unwrap();

        assert_eq!(trie.get("а"), Some(1));
        assert_eq!(trie.get("б"), Some(2));
        assert_eq!(trie.get("аб"), Some(3));

        trie.insert("в", 4).unwrap();
        assert_eq!(trie.get("в"), Some(4));
        assert!(matches!(
            trie.insert("x", 5),
            Err(TrieError::UnmappedChar('x'))
        ));
    }

    #[test]
    fn negative_values_round_trip() {
        let mut trie = lowercase();
        trie.insert("debt", -42).unwrap();
        assert_eq!(trie.get("debt"), Some(-42));

        let mut buf = Vec::new();
        trie.write(&mut buf).unwrap();
        let loaded = Trie::read(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.get("debt"), Some(-42));
    }

    #[test]
    fn stream_round_trip_preserves_everything() {
        let mut trie = lowercase();
        for (key, value) in [("foobar", 1), ("foovar", 2), ("baz", 3), ("fo", 4)] {
            trie.insert(key, value).unwrap();
        }
        // Leave a hole in both pools.
        trie.remove("baz").unwrap();

        let mut buf = Vec::new();
        trie.write(&mut buf).unwrap();
        let loaded = Trie::read(&mut buf.as_slice()).unwrap();

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.get("foobar"), Some(1));
        assert_eq!(loaded.get("foovar"), Some(2));
        assert_eq!(loaded.get("fo"), Some(4));
        assert_eq!(loaded.get("baz"), None);
        assert!(!loaded.is_dirty());

        let a: Vec<(String, TrieData)> = trie.iter().collect();
        let b: Vec<(String, TrieData)> = loaded.iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn read_rejects_wrong_region_order() {
        let mut trie = lowercase();
        trie.insert("ab", 1).unwrap();
        let mut buf = Vec::new();
        // Regions swapped: tail written where the alpha map belongs.
        trie.parts().2.write(&mut buf).unwrap();
        assert!(matches!(
            Trie::read(&mut buf.as_slice()),
            Err(TrieError::Format(_))
        ));
    }

    #[test]
    fn dirty_flag_follows_mutation_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trie.bin");

        let mut trie = lowercase();
        assert!(trie.is_dirty());
        trie.insert("abc", 1).unwrap();
        trie.save(&path).unwrap();
        assert!(!trie.is_dirty());

        trie.insert("abd", 2).unwrap();
        assert!(trie.is_dirty());

        let loaded = Trie::load(&path).unwrap();
        assert!(!loaded.is_dirty());
        assert_eq!(loaded.get("abc"), Some(1));
        assert_eq!(loaded.get("abd"), None);
    }

    #[test]
    fn clear_resets_but_keeps_alphabet() {
        let mut trie = lowercase();
        trie.insert("abc", 1).unwrap();
        trie.insert("xyz", 2).unwrap();
        trie.clear();
        assert!(trie.is_empty());
        assert_eq!(trie.get("abc"), None);

        trie.insert("abc", 3).unwrap();
        assert_eq!(trie.get("abc"), Some(3));
    }

    #[test]
    fn load_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Trie::load(dir.path().join("absent.bin")),
            Err(TrieError::Io(_))
        ));
    }
}
