// Page frame bitset
use alloc::vec;
use alloc::vec::Vec;

const WORD_BITS: usize = 64;

/// One bit per page frame, set = allocated.
///
/// Indices past the end read as allocated, so a scan can never hand them
/// out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBitmap {
    words: Vec<u64>,
    len: usize,
}

impl PageBitmap {
    /// All `len` bits start clear.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; (len + WORD_BITS - 1) / WORD_BITS],
            len,
        }
    }

    pub fn test(&self, index: usize) -> bool {
        if index >= self.len {
            return true;
        }
        self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    /// Returns `false` if the bit was already set or out of range.
    pub fn set(&mut self, index: usize) -> bool {
        if self.test(index) {
            return false;
        }
        self.words[index / WORD_BITS] |= 1 << (index % WORD_BITS);
        true
    }

    /// Returns `false` if the bit was already clear or out of range.
    pub fn clear(&mut self, index: usize) -> bool {
        if index >= self.len || !self.test(index) {
            return false;
        }
        self.words[index / WORD_BITS] &= !(1 << (index % WORD_BITS));
        true
    }

    /// Number of set bits.
    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// First clear bit in `start..end`, skipping full words.
    pub fn find_clear_in(&self, start: usize, end: usize) -> Option<usize> {
        let end = end.min(self.len);
        let mut index = start;
        while index < end {
            let word = self.words[index / WORD_BITS];
            if word == u64::MAX && index % WORD_BITS == 0 {
                index += WORD_BITS;
                continue;
            }
            if word & (1 << (index % WORD_BITS)) == 0 {
                return Some(index);
            }
            index += 1;
        }
        None
    }

    /// Lowest index starting a run of `count` clear bits.
    pub fn find_clear_run(&self, count: usize) -> Option<usize> {
        if count == 0 || count > self.len {
            return None;
        }
        let mut run_start = 0;
        let mut run_len = 0;
        for index in 0..self.len {
            if self.test(index) {
                run_len = 0;
                run_start = index + 1;
            } else {
                run_len += 1;
                if run_len == count {
                    return Some(run_start);
                }
            }
        }
        None
    }
}
