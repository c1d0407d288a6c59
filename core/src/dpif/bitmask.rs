/// Packed one-bit-per-cell map of Doppler-direction hits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmask {
    words: Vec<u32>,
}

impl Bitmask {
    pub const BITS_PER_WORD: usize = 32;

    pub fn with_words(num_words: usize) -> Self {
        Self {
            words: vec![0; num_words],
        }
    }

    /// Smallest mask covering `num_cells`.
    pub fn for_cells(num_cells: usize) -> Self {
        Self::with_words(Self::words_for(num_cells))
    }

    pub fn words_for(num_cells: usize) -> usize {
        num_cells.div_ceil(Self::BITS_PER_WORD)
    }

    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    pub fn capacity_bits(&self) -> usize {
        self.words.len() * Self::BITS_PER_WORD
    }

    /// Clears the first `num_cells` bits.
    pub fn clear(&mut self, num_cells: usize) {
        let used = Self::words_for(num_cells).min(self.words.len());
        self.words[..used].iter_mut().for_each(|w| *w = 0);
    }

    pub fn set(&mut self, bit: usize) -> bool {
        match self.words.get_mut(bit / Self::BITS_PER_WORD) {
            Some(word) => {
                *word |= 1 << (bit % Self::BITS_PER_WORD);
                true
            }
            None => false,
        }
    }

    pub fn is_set(&self, bit: usize) -> bool {
        self.words
            .get(bit / Self::BITS_PER_WORD)
            .map(|word| word & (1 << (bit % Self::BITS_PER_WORD)) != 0)
            .unwrap_or(false)
    }

    /// Returns whether the bit was set, clearing it.
    pub fn take(&mut self, bit: usize) -> bool {
        match self.words.get_mut(bit / Self::BITS_PER_WORD) {
            Some(word) => {
                let mask = 1 << (bit % Self::BITS_PER_WORD);
                let was_set = *word & mask != 0;
                *word &= !mask;
                was_set
            }
            None => false,
        }
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}
