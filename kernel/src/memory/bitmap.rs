//! Page bitmap backing the physical memory ledger
//!
//! Fixed size so the ledger exists before any heap does: one bit per 4KB
//! page, 1 = allocated, 0 = free.

/// 262144 bits = 1GB of RAM at 4KB pages
pub const MAX_BITS: usize = 256 * 1024;
const WORD_BITS: usize = u64::BITS as usize;
const WORDS: usize = MAX_BITS / WORD_BITS;

pub struct Bitmap {
    words: [u64; WORDS],
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::new()
    }
}

/// Word index and bit mask of `index`
#[inline]
const fn locate(index: usize) -> (usize, u64) {
    (index / WORD_BITS, 1u64 << (index % WORD_BITS))
}

impl Bitmap {
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    #[inline]
    pub fn is_set(&self, index: usize) -> bool {
        let (word, mask) = locate(index);
        self.words[word] & mask != 0
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        let (word, mask) = locate(index);
        self.words[word] |= mask;
    }

    #[inline]
    pub fn clear(&mut self, index: usize) {
        let (word, mask) = locate(index);
        self.words[word] &= !mask;
    }

    /// First bit in `start..end` equal to `value`
    ///
    /// Whole words holding only the other value are skipped.
    fn find(&self, start: usize, end: usize, value: bool) -> Option<usize> {
        let skip = if value { 0 } else { !0 };
        let mut index = start;
        while index < end {
            if index % WORD_BITS == 0 && self.words[index / WORD_BITS] == skip {
                index += WORD_BITS;
                continue;
            }
            if self.is_set(index) == value {
                return Some(index);
            }
            index += 1;
        }
        None
    }

    /// First set bit in `start..end`
    pub fn find_set(&self, start: usize, end: usize) -> Option<usize> {
        self.find(start, end, true)
    }

    /// First clear bit in `start..end`
    pub fn find_first_unset(&self, start: usize, end: usize) -> Option<usize> {
        self.find(start, end, false)
    }
}
