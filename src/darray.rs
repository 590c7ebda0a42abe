use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{Result, TrieCode, TrieError, TrieIndex};

const MAGIC: &[u8; 4] = b"TDAR";

/// Header cell; anchors the doubly linked free list.
pub(crate) const HEADER: TrieIndex = 0;
/// The root state.
pub(crate) const ROOT: TrieIndex = 1;
/// First pool cell.
pub(crate) const POOL_BEGIN: TrieIndex = 2;

/// One `(base, check)` pair.
///
/// Interpretation depends on the cell's role, see [`CellKind`]. The raw
/// pair is what goes to disk, bit-identical to the packed form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Cell {
    base: TrieIndex,
    check: TrieIndex,
}

/// Typed view of a pool cell, unpacking the sign conventions:
/// free cells thread the free list through negated neighbor indices,
/// separate states carry a negated, biased tail handle in `base`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CellKind {
    /// On the free list. `prev`/`next` of `0` point at the anchor.
    Free {
        prev: TrieIndex,
        next: TrieIndex,
    },
    /// A branching state owning the cells `base + c` for its child codes.
    Branch {
        base: TrieIndex,
        parent: TrieIndex,
    },
    /// A state whose subtree lives in the tail pool.
    Separate {
        tail: i32,
        parent: TrieIndex,
    },
}

/// The branching automaton: parallel `base`/`check` arrays with a free
/// list woven through unused cells.
///
/// A transition on code `c` from state `s` goes to `base[s] + c` and is
/// valid iff that cell's `check` points back at `s`. The scan bound for
/// child enumeration comes from the alphabet and is not serialized; the
/// trie re-supplies it on load.
#[derive(Clone, Debug)]
pub(crate) struct DArray {
    cells: Vec<Cell>,
    /// Exclusive upper bound of the code space (`N + 1`).
    code_bound: TrieCode,
}

impl DArray {
    pub(crate) fn new(code_bound: TrieCode) -> Self {
        let mut cells = vec![Cell::default(); POOL_BEGIN as usize];
        // Empty free list: the anchor links to itself (index 0 negates
        // to itself, so both links read as "anchor").
        cells[HEADER as usize] = Cell { base: 0, check: 0 };
        cells[ROOT as usize] = Cell {
            base: POOL_BEGIN,
            check: 0,
        };
        Self { cells, code_bound }
    }

    pub(crate) fn num_cells(&self) -> TrieIndex {
        self.cells.len() as TrieIndex
    }

    fn base(&self, s: TrieIndex) -> TrieIndex {
        self.cells[s as usize].base
    }

    fn check(&self, s: TrieIndex) -> TrieIndex {
        self.cells[s as usize].check
    }

    fn set_base(&mut self, s: TrieIndex, v: TrieIndex) {
        self.cells[s as usize].base = v;
    }

    fn set_check(&mut self, s: TrieIndex, v: TrieIndex) {
        self.cells[s as usize].check = v;
    }

    /// Typed view of cell `s`.
    pub(crate) fn kind(&self, s: TrieIndex) -> CellKind {
        let Cell { base, check } = self.cells[s as usize];
        if s >= POOL_BEGIN && check <= 0 {
            CellKind::Free {
                prev: -base,
                next: -check,
            }
        } else if base < 0 {
            CellKind::Separate {
                tail: -base - 1,
                parent: check,
            }
        } else {
            CellKind::Branch {
                base,
                parent: check,
            }
        }
    }

    /// Whether pool cell `s` is on the free list.
    fn is_free(&self, s: TrieIndex) -> bool {
        s >= POOL_BEGIN && (s as usize) < self.cells.len() && self.check(s) <= 0
    }

    /// True if `s` has been collapsed into a tail block.
    pub(crate) fn is_separate(&self, s: TrieIndex) -> bool {
        self.base(s) < 0
    }

    /// The tail handle of a separate state.
    pub(crate) fn tail_handle(&self, s: TrieIndex) -> i32 {
        debug_assert!(self.is_separate(s));
        -self.base(s) - 1
    }

    /// Marks `s` separate, pointing it at `handle`.
    pub(crate) fn link_tail(&mut self, s: TrieIndex, handle: i32) {
        self.set_base(s, -(handle + 1));
    }

    /// Follows the transition on `c` from `s`, if it exists.
    pub(crate) fn walk(&self, s: TrieIndex, c: TrieCode) -> Option<TrieIndex> {
        let base = self.base(s);
        if base < 0 {
            return None;
        }
        let t = base.checked_add(c as TrieIndex)?;
        if t < self.num_cells() && self.check(t) == s {
            Some(t)
        } else {
            None
        }
    }

    /// Highest child code worth scanning under `base`.
    fn scan_bound(&self, base: TrieIndex) -> TrieIndex {
        let max_code = self.code_bound as TrieIndex - 1;
        max_code.min(self.num_cells() - 1 - base)
    }

    pub(crate) fn has_children(&self, s: TrieIndex) -> bool {
        let base = self.base(s);
        if base <= 0 {
            return false;
        }
        (0..=self.scan_bound(base)).any(|c| self.check(base + c) == s)
    }

    /// Child codes of `s` in ascending order.
    pub(crate) fn output_codes(&self, s: TrieIndex) -> Vec<TrieCode> {
        let base = self.base(s);
        if base <= 0 {
            return Vec::new();
        }
        (0..=self.scan_bound(base))
            .filter(|&c| self.check(base + c) == s)
            .map(|c| c as TrieCode)
            .collect()
    }

    /// Grows the pool so index `to_index` exists, weaving the new run of
    /// cells into the free list. Doubles capacity so repeated growth
    /// stays amortized.
    fn extend_pool(&mut self, to_index: TrieIndex) -> Result<()> {
        if to_index <= 0 || to_index == TrieIndex::MAX {
            return Err(TrieError::IndexOverflow);
        }
        let old_len = self.num_cells();
        if to_index < old_len {
            return Ok(());
        }

        let new_len = (to_index + 1).max(old_len.saturating_mul(2).min(TrieIndex::MAX - 1));
        self.cells.resize(new_len as usize, Cell::default());

        // Chain the fresh cells among themselves...
        for i in old_len..new_len - 1 {
            self.set_check(i, -(i + 1));
            self.set_base(i + 1, -i);
        }
        // ...then splice the run after the current free tail.
        let free_tail = -self.base(HEADER);
        self.set_check(free_tail, -old_len);
        self.set_base(old_len, -free_tail);
        self.set_check(new_len - 1, -HEADER);
        self.set_base(HEADER, -(new_len - 1));
        Ok(())
    }

    /// Unlinks a free cell, claiming it for use.
    fn alloc_cell(&mut self, cell: TrieIndex) {
        debug_assert!(self.is_free(cell));
        let prev = -self.base(cell);
        let next = -self.check(cell);
        self.set_check(prev, -next);
        self.set_base(next, -prev);
    }

    /// Returns `cell` to the free list, keeping it sorted by address so
    /// free-base searches run in ascending order.
    fn free_cell(&mut self, cell: TrieIndex) {
        let mut i = -self.check(HEADER);
        while i != HEADER && i < cell {
            i = -self.check(i);
        }
        let prev = -self.base(i);
        self.set_check(cell, -i);
        self.set_base(cell, -prev);
        self.set_check(prev, -cell);
        self.set_base(i, -cell);
    }

    /// Extends the pool to cover `idx` and reports whether it is free.
    fn reachable_free(&mut self, idx: TrieIndex) -> Result<bool> {
        self.extend_pool(idx)?;
        Ok(self.is_free(idx))
    }

    /// True when every `base + code` cell is free.
    fn fits(&mut self, base: TrieIndex, codes: &[TrieCode]) -> Result<bool> {
        for &code in codes {
            let code = code as TrieIndex;
            if base > TrieIndex::MAX - 1 - code || !self.reachable_free(base + code)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Finds a base where every code of `codes` lands on a free cell,
    /// scanning the free list in ascending address order.
    fn find_free_base(&mut self, codes: &[TrieCode]) -> Result<TrieIndex> {
        debug_assert!(!codes.is_empty());
        let first = codes[0] as TrieIndex;

        // Skip free cells that would put the base below the pool.
        let mut s = -self.check(HEADER);
        while s != HEADER && s < first + POOL_BEGIN {
            s = -self.check(s);
        }
        if s == HEADER {
            s = first + POOL_BEGIN;
            loop {
                self.extend_pool(s)?;
                if self.is_free(s) {
                    break;
                }
                s += 1;
            }
        }

        while !self.fits(s - first, codes)? {
            let mut next = -self.check(s);
            if next == HEADER {
                // Free list exhausted; grow and keep scanning.
                self.extend_pool(self.num_cells())?;
                next = -self.check(s);
            }
            s = next;
        }
        Ok(s - first)
    }

    /// Moves the children of `s` to `new_base`, re-parenting grandchildren
    /// and releasing the vacated cells.
    fn relocate(&mut self, s: TrieIndex, new_base: TrieIndex) {
        let old_base = self.base(s);
        for code in self.output_codes(s) {
            let code = code as TrieIndex;
            let old_next = old_base + code;
            let new_next = new_base + code;

            self.alloc_cell(new_next);
            self.set_check(new_next, s);
            let old_next_base = self.base(old_next);
            self.set_base(new_next, old_next_base);

            if old_next_base > 0 {
                for g in 0..=self.scan_bound(old_next_base) {
                    if self.check(old_next_base + g) == old_next {
                        self.set_check(old_next_base + g, new_next);
                    }
                }
            }
            self.free_cell(old_next);
        }
        self.set_base(s, new_base);
    }

    /// Claims the free cell `t` as a child of `s` with a tentative base.
    fn claim(&mut self, t: TrieIndex, s: TrieIndex) {
        self.alloc_cell(t);
        self.set_check(t, s);
        self.set_base(t, 0);
    }

    /// Adds (or finds) the transition on `c` from `s`.
    ///
    /// On collision, relocates whichever of the two competing sibling
    /// sets is smaller; ties go to the set rooted at `s`. Relocating the
    /// foreign set can move `s` itself when `s` is one of its children,
    /// so the possibly-updated parent index is returned alongside the
    /// child.
    pub(crate) fn insert_branch(
        &mut self,
        s: TrieIndex,
        c: TrieCode,
    ) -> Result<(TrieIndex, TrieIndex)> {
        let base = self.base(s);
        if base > 0 {
            let t = base
                .checked_add(c as TrieIndex)
                .ok_or(TrieError::IndexOverflow)?;
            if t < self.num_cells() && self.check(t) == s {
                return Ok((t, s));
            }

            if !self.reachable_free(t)? {
                // Collision: compare the sibling set of `s` (plus the new
                // code) with the set owned by the conflicting parent.
                let mut own = self.output_codes(s);
                let at = own.partition_point(|&x| x < c);
                own.insert(at, c);
                let owner = self.check(t);
                let foreign = self.output_codes(owner);

                if own.len() <= foreign.len() {
                    let new_base = self.find_free_base(&own)?;
                    self.relocate(s, new_base);
                    let t = new_base + c as TrieIndex;
                    self.claim(t, s);
                    return Ok((t, s));
                }

                let s_moves = self.check(s) == owner;
                let owner_base = self.base(owner);
                let new_base = self.find_free_base(&foreign)?;
                self.relocate(owner, new_base);
                let s = if s_moves {
                    new_base + (s - owner_base)
                } else {
                    s
                };
                let t = self.base(s) + c as TrieIndex;
                self.claim(t, s);
                return Ok((t, s));
            }
            self.claim(t, s);
            return Ok((t, s));
        }

        // First double-array child of a separate or tentative state.
        let new_base = self.find_free_base(&[c])?;
        self.set_base(s, new_base);
        let t = new_base + c as TrieIndex;
        self.claim(t, s);
        Ok((t, s))
    }

    /// Releases states upward from `s` while they are childless, stopping
    /// at `p` (exclusive).
    pub(crate) fn prune_upto(&mut self, p: TrieIndex, mut s: TrieIndex) {
        while s != p && !self.has_children(s) {
            let parent = self.check(s);
            self.free_cell(s);
            s = parent;
        }
    }

    /// Releases states upward from `s` toward the root.
    pub(crate) fn prune(&mut self, s: TrieIndex) {
        self.prune_upto(ROOT, s);
    }

    /// Descends from `root` along smallest child codes to the first
    /// separate state, appending consumed codes to `keybuf`. `None` when
    /// the subtree is empty.
    pub(crate) fn first_separate(
        &self,
        mut root: TrieIndex,
        keybuf: &mut Vec<TrieCode>,
    ) -> Option<TrieIndex> {
        loop {
            let base = self.base(root);
            if base < 0 {
                return Some(root);
            }
            let next = (0..=self.scan_bound(base)).find(|&c| self.check(base + c) == root)?;
            keybuf.push(next as TrieCode);
            root = base + next;
        }
    }

    /// Steps from the separate state `sep` to the next separate state in
    /// code order within the subtree of `root`, maintaining `keybuf`.
    pub(crate) fn next_separate(
        &self,
        root: TrieIndex,
        mut sep: TrieIndex,
        keybuf: &mut Vec<TrieCode>,
    ) -> Option<TrieIndex> {
        while sep != root {
            let parent = self.check(sep);
            let base = self.base(parent);
            let c = sep - base;
            keybuf.pop();

            let sibling = ((c + 1)..=self.scan_bound(base)).find(|&c2| self.check(base + c2) == parent);
            if let Some(c2) = sibling {
                keybuf.push(c2 as TrieCode);
                return self.first_separate(base + c2, keybuf);
            }
            sep = parent;
        }
        None
    }

    /// Writes the double-array region: magic, cell count, then every
    /// `(base, check)` pair including the header and root.
    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32::<BigEndian>(self.cells.len() as u32)?;
        for cell in &self.cells {
            writer.write_i32::<BigEndian>(cell.base)?;
            writer.write_i32::<BigEndian>(cell.check)?;
        }
        Ok(())
    }

    /// Reads the double-array region and checks structural invariants:
    /// parent links must resolve to real transitions and the free list
    /// must be an acyclic chain covering every free cell.
    pub(crate) fn read<R: Read>(reader: &mut R, code_bound: TrieCode) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(TrieError::Format("bad double-array magic"));
        }

        let num_cells = reader.read_u32::<BigEndian>()?;
        if num_cells < POOL_BEGIN as u32 || num_cells > TrieIndex::MAX as u32 {
            return Err(TrieError::Format("double-array cell count out of range"));
        }
        let num_cells = num_cells as usize;

        let mut cells = Vec::with_capacity(num_cells.min(1 << 20));
        for _ in 0..num_cells {
            let base = reader.read_i32::<BigEndian>()?;
            let check = reader.read_i32::<BigEndian>()?;
            cells.push(Cell { base, check });
        }

        let da = Self { cells, code_bound };
        da.check_structure()?;
        Ok(da)
    }

    fn check_structure(&self) -> Result<()> {
        let len = self.num_cells();
        if self.base(HEADER) > 0 || self.check(HEADER) > 0 {
            return Err(TrieError::Format("double-array header corrupt"));
        }
        if self.base(ROOT) < 0 || self.check(ROOT) != 0 {
            return Err(TrieError::Format("double-array root corrupt"));
        }

        let mut num_free = 0;
        for s in POOL_BEGIN..len {
            let check = self.check(s);
            if check <= 0 {
                num_free += 1;
                continue;
            }
            // Used cell: its parent must own it through a real transition.
            if check >= len {
                return Err(TrieError::Format("check out of range"));
            }
            let parent = check;
            if parent >= POOL_BEGIN && self.check(parent) <= 0 {
                return Err(TrieError::Format("used cell parented to a free cell"));
            }
            let pbase = self.base(parent);
            if pbase <= 0 {
                return Err(TrieError::Format("used cell under a childless parent"));
            }
            let code = s - pbase;
            if code < 0 || code >= self.code_bound as TrieIndex {
                return Err(TrieError::Format("transition code out of alphabet"));
            }
        }

        // Free chain: acyclic, complete, with consistent back links.
        let mut hops = 0;
        let mut prev = HEADER;
        let mut cur = -self.check(HEADER);
        while cur != HEADER {
            if cur < POOL_BEGIN || cur >= len || !self.is_free(cur) {
                return Err(TrieError::Format("free link out of range"));
            }
            if -self.base(cur) != prev {
                return Err(TrieError::Format("free list back link broken"));
            }
            hops += 1;
            if hops > num_free {
                return Err(TrieError::Format("free list cyclic"));
            }
            prev = cur;
            cur = -self.check(cur);
        }
        if -self.base(HEADER) != prev {
            return Err(TrieError::Format("free list back link broken"));
        }
        if hops != num_free {
            return Err(TrieError::Format("free list incomplete"));
        }
        Ok(())
    }
}
