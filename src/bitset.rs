//! Dense bit set over state indices.
//!
//! Used for the state sets of the graph-based precomputations (`Sat`, `Prob0`,
//! `Prob1`, ancestors) and as the visited set of the ancestor search.

/// A bit set over the universe `0..universe`, backed by a vector of u64 words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSet {
    /// Storage: each u64 holds 64 bits
    words: Vec<u64>,
    /// Number of set bits (cached for O(1) len())
    count: usize,
    /// Number of valid indices
    universe: usize,
}

impl BitSet {
    const BITS_PER_WORD: usize = 64;

    /// Creates an empty set over `0..universe`.
    pub fn new(universe: usize) -> Self {
        let num_words = universe.div_ceil(Self::BITS_PER_WORD);
        Self {
            words: vec![0; num_words],
            count: 0,
            universe,
        }
    }

    /// Creates the set `{0, 1, ..., universe - 1}`.
    pub fn full(universe: usize) -> Self {
        let mut bs = Self::new(universe);
        for w in bs.words.iter_mut() {
            *w = u64::MAX;
        }
        bs.trim();
        bs.count = universe;
        bs
    }

    /// Creates a set from indices.
    ///
    /// # Panics
    ///
    /// Panics if any index is outside the universe.
    pub fn from_indices(universe: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut bs = Self::new(universe);
        bs.extend(indices);
        bs
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn universe(&self) -> usize {
        self.universe
    }

    #[inline]
    fn word_and_bit(index: usize) -> (usize, usize) {
        (index / Self::BITS_PER_WORD, index % Self::BITS_PER_WORD)
    }

    /// Clears the bits past the universe in the last word.
    fn trim(&mut self) {
        let rest = self.universe % Self::BITS_PER_WORD;
        if rest != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rest) - 1;
            }
        }
    }

    fn recount(&mut self) {
        self.count = self.words.iter().map(|w| w.count_ones() as usize).sum();
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        if index >= self.universe {
            return false;
        }
        let (word_idx, bit_idx) = Self::word_and_bit(index);
        (self.words[word_idx] & (1u64 << bit_idx)) != 0
    }

    /// Sets the bit at `index`. Returns true if the bit was not previously set.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the universe.
    #[inline]
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(index < self.universe, "Index {} is outside of universe {}", index, self.universe);
        let (word_idx, bit_idx) = Self::word_and_bit(index);
        let mask = 1u64 << bit_idx;
        let was_clear = (self.words[word_idx] & mask) == 0;
        if was_clear {
            self.words[word_idx] |= mask;
            self.count += 1;
        }
        was_clear
    }

    /// Clears the bit at `index`. Returns true if the bit was previously set.
    #[inline]
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.universe {
            return false;
        }
        let (word_idx, bit_idx) = Self::word_and_bit(index);
        let mask = 1u64 << bit_idx;
        let was_set = (self.words[word_idx] & mask) != 0;
        if was_set {
            self.words[word_idx] &= !mask;
            self.count -= 1;
        }
        was_set
    }

    pub fn clear(&mut self) {
        for word in &mut self.words {
            *word = 0;
        }
        self.count = 0;
    }

    pub fn extend(&mut self, iter: impl IntoIterator<Item = usize>) {
        for index in iter {
            self.insert(index);
        }
    }

    /// Returns the set of indices of the universe that are not in `self`.
    pub fn complement(&self) -> Self {
        let mut result = Self {
            words: self.words.iter().map(|w| !w).collect(),
            count: 0,
            universe: self.universe,
        };
        result.trim();
        result.count = self.universe - self.count;
        result
    }

    pub fn union_with(&mut self, other: &BitSet) {
        assert_eq!(self.universe, other.universe, "Universes differ");
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
        self.recount();
    }

    pub fn intersect_with(&mut self, other: &BitSet) {
        assert_eq!(self.universe, other.universe, "Universes differ");
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= *b;
        }
        self.recount();
    }

    pub fn difference_with(&mut self, other: &BitSet) {
        assert_eq!(self.universe, other.universe, "Universes differ");
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !*b;
        }
        self.recount();
    }

    /// Returns an iterator over all set bit indices, in increasing order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            bitset: self,
            word_idx: 0,
            current_word: self.words.first().copied().unwrap_or(0),
        }
    }
}

/// Iterator over set bits in a BitSet.
pub struct BitSetIter<'a> {
    bitset: &'a BitSet,
    word_idx: usize,
    current_word: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_word != 0 {
                let bit_idx = self.current_word.trailing_zeros() as usize;
                self.current_word &= self.current_word - 1; // Clear lowest set bit
                return Some(self.word_idx * BitSet::BITS_PER_WORD + bit_idx);
            }

            self.word_idx += 1;
            if self.word_idx >= self.bitset.words.len() {
                return None;
            }
            self.current_word = self.bitset.words[self.word_idx];
        }
    }
}

impl<'a> IntoIterator for &'a BitSet {
    type Item = usize;
    type IntoIter = BitSetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
