use crate::{Trie, TrieCode, TrieData, TrieIndex};

/// Stepping context for [`TrieState::next`].
enum Stepping {
    /// No step taken since the last walk or rewind.
    NotStarted,
    /// Enumerating the subtree rooted where stepping began.
    Active {
        root: TrieIndex,
        /// Length of `path` at the subtree root.
        base_len: usize,
        keybuf: Vec<TrieCode>,
        sep: TrieIndex,
    },
    Exhausted,
}

/// A cursor over a [`Trie`].
///
/// A state tracks a position reached by walking characters: either a
/// branching double-array state or an offset into a collapsed suffix.
/// From any position, [`next`](Self::next) steps through the stored keys
/// of the subtree below it in trie-code order.
///
/// The cursor borrows the trie, so the trie cannot be mutated while any
/// state is live.
///
/// ```
/// use tailtrie::Trie;
///
/// let mut trie = Trie::from_ranges(&[('a', 'z')]).unwrap();
/// trie.insert("he", 1).unwrap();
/// trie.insert("hers", 2).unwrap();
///
/// let mut state = trie.state();
/// assert!(state.walk("he"));
/// assert_eq!(state.data(), Some(1));
/// assert!(state.is_terminal());
/// assert!(state.next()); // "he"
/// assert!(state.next()); // "hers"
/// assert_eq!(state.key(), "hers");
/// assert!(!state.next());
/// ```
pub struct TrieState<'a> {
    trie: &'a Trie,
    node: TrieIndex,
    /// `(tail handle, offset)` once the walk has entered a suffix.
    in_tail: Option<(i32, usize)>,
    /// Codes consumed since the root; never contains the terminator.
    path: Vec<TrieCode>,
    stepping: Stepping,
}

impl<'a> TrieState<'a> {
    /// A cursor positioned at the root of `trie`.
    pub fn new(trie: &'a Trie) -> Self {
        Self {
            trie,
            node: crate::darray::ROOT,
            in_tail: None,
            path: Vec::new(),
            stepping: Stepping::NotStarted,
        }
    }

    /// Returns the cursor to the root.
    pub fn rewind(&mut self) {
        self.node = crate::darray::ROOT;
        self.in_tail = None;
        self.path.clear();
        self.stepping = Stepping::NotStarted;
    }

    /// Consumes one character. Returns `false` (leaving the position
    /// unchanged) if there is no such continuation.
    pub fn walk_char(&mut self, ch: char) -> bool {
        let (alpha, da, tail) = self.trie.parts();
        let Some(c) = alpha.encode(ch) else {
            return false;
        };
        match self.in_tail {
            None => match da.walk(self.node, c) {
                Some(t) => {
                    self.node = t;
                    if da.is_separate(t) {
                        self.in_tail = Some((da.tail_handle(t), 0));
                    }
                }
                None => return false,
            },
            Some((h, pos)) => match tail.walk_char(h, pos, c) {
                Some(p) => self.in_tail = Some((h, p)),
                None => return false,
            },
        }
        self.path.push(c);
        self.stepping = Stepping::NotStarted;
        true
    }

    /// Consumes every character of `s`. Returns `false` as soon as one
    /// fails; the cursor stays at the last successful position.
    pub fn walk(&mut self, s: &str) -> bool {
        s.chars().all(|ch| self.walk_char(ch))
    }

    /// The value of the key ending exactly at this position, if any.
    pub fn data(&self) -> Option<TrieData> {
        let (_, da, tail) = self.trie.parts();
        match self.in_tail {
            Some((h, pos)) => tail.walk_char(h, pos, 0).map(|_| tail.data(h)),
            None => {
                let t = da.walk(self.node, 0)?;
                if da.is_separate(t) {
                    let h = da.tail_handle(t);
                    if tail.suffix(h).is_empty() {
                        return Some(tail.data(h));
                    }
                }
                None
            }
        }
    }

    /// True if a stored key ends exactly here.
    pub fn is_terminal(&self) -> bool {
        self.data().is_some()
    }

    /// True if nothing extends past this position.
    pub fn is_leaf(&self) -> bool {
        let (_, da, tail) = self.trie.parts();
        match self.in_tail {
            Some((h, pos)) => pos == tail.suffix(h).len(),
            None => da.output_codes(self.node) == [0],
        }
    }

    /// The string consumed so far (after [`next`](Self::next), the key
    /// of the entry the cursor is on).
    pub fn key(&self) -> String {
        let (alpha, _, _) = self.trie.parts();
        self.path
            .iter()
            .filter_map(|&c| alpha.decode(c))
            .collect()
    }

    /// Steps to the next stored key, in trie-code order, within the
    /// subtree the cursor was in when stepping began. Returns `false`
    /// when the subtree is exhausted.
    ///
    /// The first step visits the first key at or below the current
    /// position; afterwards the cursor sits on that key's terminal, so
    /// [`key`](Self::key) and [`data`](Self::data) describe it.
    pub fn next(&mut self) -> bool {
        let (_, da, tail) = self.trie.parts();
        match std::mem::replace(&mut self.stepping, Stepping::Exhausted) {
            Stepping::NotStarted => match self.in_tail {
                Some((h, pos)) => {
                    // Inside a suffix there is exactly one key below.
                    let rest: Vec<TrieCode> = tail.suffix(h)[pos..].to_vec();
                    self.path.extend(rest);
                    self.in_tail = Some((h, tail.suffix(h).len()));
                    true
                }
                None => {
                    let root = self.node;
                    let base_len = self.path.len();
                    let mut keybuf = Vec::new();
                    match da.first_separate(root, &mut keybuf) {
                        Some(sep) => {
                            self.land_on(sep, &keybuf, base_len);
                            self.stepping = Stepping::Active {
                                root,
                                base_len,
                                keybuf,
                                sep,
                            };
                            true
                        }
                        None => false,
                    }
                }
            },
            Stepping::Active {
                root,
                base_len,
                mut keybuf,
                sep,
            } => match da.next_separate(root, sep, &mut keybuf) {
                Some(next) => {
                    self.land_on(next, &keybuf, base_len);
                    self.stepping = Stepping::Active {
                        root,
                        base_len,
                        keybuf,
                        sep: next,
                    };
                    true
                }
                None => false,
            },
            Stepping::Exhausted => false,
        }
    }

    /// Positions the cursor on the terminal of the separate state `sep`.
    fn land_on(&mut self, sep: TrieIndex, keybuf: &[TrieCode], base_len: usize) {
        let (_, da, tail) = self.trie.parts();
        let h = da.tail_handle(sep);
        self.path.truncate(base_len);
        self.path.extend(keybuf.iter().copied().filter(|&c| c != 0));
        self.path.extend_from_slice(tail.suffix(h));
        self.node = sep;
        self.in_tail = Some((h, tail.suffix(h).len()));
    }
}

enum Inner {
    Empty,
    Single(Option<(String, TrieData)>),
    Walk {
        root: TrieIndex,
        sep: Option<TrieIndex>,
        started: bool,
    },
}

/// In-order iterator over `(key, value)` entries of a [`Trie`] subtree.
///
/// Created by [`Trie::iter`] and [`Trie::iter_prefix`].
pub struct Iter<'a> {
    trie: &'a Trie,
    prefix: String,
    keybuf: Vec<TrieCode>,
    inner: Inner,
}

impl<'a> Iter<'a> {
    pub(crate) fn empty(trie: &'a Trie) -> Self {
        Self {
            trie,
            prefix: String::new(),
            keybuf: Vec::new(),
            inner: Inner::Empty,
        }
    }

    pub(crate) fn single(trie: &'a Trie, key: String, value: TrieData) -> Self {
        Self {
            trie,
            prefix: String::new(),
            keybuf: Vec::new(),
            inner: Inner::Single(Some((key, value))),
        }
    }

    pub(crate) fn subtree(trie: &'a Trie, root: TrieIndex, prefix: String) -> Self {
        Self {
            trie,
            prefix,
            keybuf: Vec::new(),
            inner: Inner::Walk {
                root,
                sep: None,
                started: false,
            },
        }
    }
}

impl Iterator for Iter<'_> {
    type Item = (String, TrieData);

    fn next(&mut self) -> Option<(String, TrieData)> {
        match &mut self.inner {
            Inner::Empty => None,
            Inner::Single(slot) => slot.take(),
            Inner::Walk { root, sep, started } => {
                let (alpha, da, tail) = self.trie.parts();
                let found = if *started {
                    da.next_separate(*root, (*sep)?, &mut self.keybuf)
                } else {
                    *started = true;
                    da.first_separate(*root, &mut self.keybuf)
                };
                *sep = found;
                let s = found?;

                let h = da.tail_handle(s);
                let mut key = self.prefix.clone();
                key.extend(self.keybuf.iter().filter_map(|&c| alpha.decode(c)));
                key.extend(tail.suffix(h).iter().filter_map(|&c| alpha.decode(c)));
                Some((key, tail.data(h)))
            }
        }
    }
}

/// In-order iterator over the keys of a [`Trie`].
pub struct Keys<'a>(Iter<'a>);

impl<'a> Keys<'a> {
    pub(crate) fn new(iter: Iter<'a>) -> Self {
        Self(iter)
    }
}

impl Iterator for Keys<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.0.next().map(|(k, _)| k)
    }
}

/// In-order iterator over the values of a [`Trie`].
pub struct Values<'a>(Iter<'a>);

impl<'a> Values<'a> {
    pub(crate) fn new(iter: Iter<'a>) -> Self {
        Self(iter)
    }
}

impl Iterator for Values<'_> {
    type Item = TrieData;

    fn next(&mut self) -> Option<TrieData> {
        self.0.next().map(|(_, v)| v)
    }
}
