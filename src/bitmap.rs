use crate::*;
use std::collections::BTreeSet;
use std::ops::Range;

/// In-memory free-block map, rebuilt at every mount.
///
/// Only positions inside `alloc_range` are ever handed out by `alloc`;
/// anything below `nr_blk` can be marked used.
pub struct BitMap {
    used: BTreeSet<u64>,
    nr_blk: u64,
    alloc_range: Range<u64>,
    possible_free_pos: u64,
}

impl BitMap {
    /// the superblock is always used
    pub fn new(nr_blk: u64, alloc_range: Range<u64>) -> Self {
        let mut used = BTreeSet::new();
        used.insert(0);
        Self {
            used,
            nr_blk,
            possible_free_pos: alloc_range.start,
            alloc_range,
        }
    }

    pub fn set_used(&mut self, pos: u64) -> FsResult<()> {
        if pos >= self.nr_blk {
            return Err(new_error!(FsError::CorruptPointer(pos)));
        }
        self.used.insert(pos);
        Ok(())
    }

    pub fn is_used(&self, pos: u64) -> bool {
        self.used.contains(&pos)
    }

    /// first-fit over the data region, None when it is exhausted
    pub fn alloc(&mut self) -> Option<u64> {
        let start = self.possible_free_pos.max(self.alloc_range.start);
        let pos = (start..self.alloc_range.end).find(|p| !self.used.contains(p))?;
        self.used.insert(pos);
        self.possible_free_pos = pos + 1;
        debug!("alloc block {}", pos);
        Some(pos)
    }

    /// returns false if `pos` was not in use
    pub fn free(&mut self, pos: u64) -> bool {
        if self.used.remove(&pos) {
            self.possible_free_pos = self.possible_free_pos.min(pos);
            debug!("free block {}", pos);
            true
        } else {
            warn!("freeing unused block {}", pos);
            false
        }
    }

    pub fn nr_used(&self) -> usize {
        self.used.len()
    }

    /// free blocks left for data
    pub fn nr_free(&self) -> usize {
        let used_in_range = self.used.range(self.alloc_range.clone()).count();
        (self.alloc_range.end - self.alloc_range.start) as usize - used_in_range
    }
}

/// Live-record counters, one per inode block or directory block.
pub struct Counter {
    cnts: Vec<u32>,
    cap: u32,
}

impl Counter {
    pub fn new(nr: usize, cap: usize) -> Self {
        Self {
            cnts: vec![0; nr],
            cap: cap as u32,
        }
    }

    pub fn get(&self, idx: usize) -> u32 {
        self.cnts.get(idx).copied().unwrap_or(0)
    }

    pub fn set(&mut self, idx: usize, cnt: u32) {
        if let Some(c) = self.cnts.get_mut(idx) {
            *c = cnt.min(self.cap);
        }
    }

    pub fn is_full(&self, idx: usize) -> bool {
        self.get(idx) >= self.cap
    }

    pub fn inc(&mut self, idx: usize) {
        if let Some(c) = self.cnts.get_mut(idx) {
            *c = (*c + 1).min(self.cap);
        }
    }

    /// returns the count after decrement
    pub fn dec(&mut self, idx: usize) -> u32 {
        match self.cnts.get_mut(idx) {
            Some(c) => {
                *c = c.saturating_sub(1);
                *c
            }
            None => 0,
        }
    }

    /// indices whose count is below capacity, in order
    pub fn not_full(&self) -> impl Iterator<Item = usize> + '_ {
        self.cnts.iter().enumerate().filter(|(_, c)| **c < self.cap).map(|(i, _)| i)
    }

    pub fn total(&self) -> usize {
        self.cnts.iter().map(|c| *c as usize).sum()
    }

    pub fn capacity(&self) -> usize {
        self.cnts.len() * self.cap as usize
    }
}
