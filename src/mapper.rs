//! Bipartite mapping between continuations and distributions.
//!
//! While the successors of one state are computed, every continuation id (cid)
//! that is currently a leaf belongs to one or more distribution ids (dids).
//! A probabilistic split keeps the number of distributions, a nondeterministic
//! split copies every distribution the split continuation belongs to, once per
//! additional alternative.
//!
//! # Invariants
//!
//! - A cid with no distributions is either interior (already split) or retracted,
//!   and must not be used as a transition target.
//! - Distribution ids are allocated monotonically and never reused until [`clear`].
//!
//! [`clear`]: ContinuationDistributionMapper::clear

use log::trace;

#[derive(Debug, Clone, Default)]
pub struct ContinuationDistributionMapper {
    /// First cid handled by this mapper; cids are stored relative to it.
    offset: usize,
    /// cid - offset -> dids containing the cid as a leaf.
    cid_to_dids: Vec<Vec<usize>>,
    /// did -> leaf cids.
    did_to_cids: Vec<Vec<usize>>,
}

impl ContinuationDistributionMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every continuation and distribution.
    pub fn clear(&mut self) {
        self.offset = 0;
        self.cid_to_dids.clear();
        self.did_to_cids.clear();
    }

    /// Resets the mapper so that `offset` is the only continuation and belongs to did 0.
    pub fn add_initial_distribution_and_continuation(&mut self, offset: usize) {
        self.clear();
        self.offset = offset;
        self.cid_to_dids.push(vec![0]);
        self.did_to_cids.push(vec![offset]);
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of allocated distribution ids, including emptied ones.
    pub fn number_of_distributions(&self) -> usize {
        self.did_to_cids.len()
    }

    pub fn is_distribution_empty(&self, did: usize) -> bool {
        self.did_to_cids.get(did).map_or(true, |cids| cids.is_empty())
    }

    /// Distributions with at least one leaf, in allocation order.
    pub fn non_empty_distributions(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.did_to_cids.len()).filter(move |&did| !self.is_distribution_empty(did))
    }

    /// Distributions in which `cid` is currently a leaf. Empty for interior or unknown cids.
    pub fn distributions_of_continuation(&self, cid: usize) -> &[usize] {
        cid.checked_sub(self.offset)
            .and_then(|i| self.cid_to_dids.get(i))
            .map_or(&[], |dids| dids.as_slice())
    }

    /// Leaf cids of distribution `did`.
    pub fn continuations_of_distribution(&self, did: usize) -> &[usize] {
        self.did_to_cids.get(did).map_or(&[], |cids| cids.as_slice())
    }

    fn slot(&mut self, cid: usize) -> &mut Vec<usize> {
        assert!(cid >= self.offset, "Continuation {} is below offset {}", cid, self.offset);
        let index = cid - self.offset;
        if index >= self.cid_to_dids.len() {
            self.cid_to_dids.resize_with(index + 1, Vec::new);
        }
        &mut self.cid_to_dids[index]
    }

    fn take_distributions_of(&mut self, cid: usize) -> Vec<usize> {
        std::mem::take(self.slot(cid))
    }

    fn allocate_distribution(&mut self, cids: Vec<usize>) -> usize {
        let did = self.did_to_cids.len();
        self.did_to_cids.push(cids);
        did
    }

    /// `parent` branches by chance into `from..=to`: every child replaces `parent` in all its distributions.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not a leaf of any distribution.
    pub fn probabilistic_split(&mut self, parent: usize, from: usize, to: usize) {
        assert!(from <= to, "Empty split range {}..={}", from, to);
        let dids = self.take_distributions_of(parent);
        assert!(!dids.is_empty(), "Continuation {} is not a leaf of any distribution", parent);
        trace!("probabilistic split {} -> {}..={} in {:?}", parent, from, to, dids);

        for &did in &dids {
            let cids = &mut self.did_to_cids[did];
            cids.retain(|&c| c != parent);
            cids.extend(from..=to);
        }
        for child in from..=to {
            *self.slot(child) = dids.clone();
        }
    }

    /// `parent` branches by scheduler choice into `from..=to`.
    ///
    /// Every distribution containing `parent` is kept for `from` and copied once for
    /// each further child, the copy holding that child instead of `from`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not a leaf of any distribution.
    pub fn nondeterministic_split(&mut self, parent: usize, from: usize, to: usize) {
        assert!(from <= to, "Empty split range {}..={}", from, to);
        self.change_cid(parent, from);
        let dids = self.distributions_of_continuation(from).to_vec();
        trace!("nondeterministic split {} -> {}..={} in {:?}", parent, from, to, dids);

        for child in from + 1..=to {
            for &did in &dids {
                let cids: Vec<usize> = self.did_to_cids[did]
                    .iter()
                    .map(|&c| if c == from { child } else { c })
                    .collect();
                let new_did = self.allocate_distribution(cids.clone());
                for c in cids {
                    self.slot(c).push(new_did);
                }
            }
        }
    }

    /// Replaces the leaf `source` by `target` in every distribution.
    fn change_cid(&mut self, source: usize, target: usize) {
        let dids = self.take_distributions_of(source);
        assert!(!dids.is_empty(), "Continuation {} is not a leaf of any distribution", source);
        for &did in &dids {
            for c in self.did_to_cids[did].iter_mut() {
                if *c == source {
                    *c = target;
                }
            }
        }
        *self.slot(target) = dids;
    }

    /// Retracts `cid` as a leaf from every distribution it belongs to.
    pub fn remove_cid_in_distributions(&mut self, cid: usize) {
        let dids = self.take_distributions_of(cid);
        for did in dids {
            self.did_to_cids[did].retain(|&c| c != cid);
        }
    }

    /// Deletes every distribution that has `cid` as a leaf.
    pub fn remove_distributions_with_cid(&mut self, cid: usize) {
        let dids = self.take_distributions_of(cid);
        for did in dids {
            let cids = std::mem::take(&mut self.did_to_cids[did]);
            for c in cids {
                self.slot(c).retain(|&d| d != did);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn mapper() -> ContinuationDistributionMapper {
        let mut m = ContinuationDistributionMapper::new();
        m.add_initial_distribution_and_continuation(0);
        m
    }

    #[test]
    fn test_initial() {
        let m = mapper();
        assert_eq!(m.distributions_of_continuation(0), &[0]);
        assert_eq!(m.continuations_of_distribution(0), &[0]);
        assert_eq!(m.number_of_distributions(), 1);
        assert!(m.distributions_of_continuation(7).is_empty());
    }

    #[test]
    fn test_probabilistic_split() {
        let mut m = mapper();
        m.probabilistic_split(0, 1, 3);
        assert!(m.distributions_of_continuation(0).is_empty());
        for cid in 1..=3 {
            assert_eq!(m.distributions_of_continuation(cid), &[0]);
        }
        assert_eq!(m.non_empty_distributions().collect::<Vec<_>>(), vec![0]);
        assert_eq!(m.continuations_of_distribution(0), &[1, 2, 3]);
    }

    #[test]
    fn test_nondeterministic_split_duplicates_siblings() {
        let mut m = mapper();
        m.probabilistic_split(0, 1, 3);
        m.nondeterministic_split(1, 4, 5);
        assert!(m.distributions_of_continuation(1).is_empty());
        assert_eq!(m.distributions_of_continuation(2), &[0, 1]);
        assert_eq!(m.distributions_of_continuation(3), &[0, 1]);
        assert_eq!(m.distributions_of_continuation(4), &[0]);
        assert_eq!(m.distributions_of_continuation(5), &[1]);
        assert_eq!(m.continuations_of_distribution(1), &[5, 2, 3]);
    }

    #[test]
    fn test_nondeterministic_split_multiplies() {
        // cid 2 is in k = 2 distributions before a split of cid 3 into n = 3 children.
        let mut m = mapper();
        m.nondeterministic_split(0, 1, 2);
        m.probabilistic_split(1, 3, 4);
        m.probabilistic_split(2, 5, 6);
        // dids: 0 = {3, 4}, 1 = {5, 6}
        m.nondeterministic_split(3, 7, 9);
        assert_eq!(m.distributions_of_continuation(4).len(), 3);
        for child in 7..=9 {
            assert_eq!(m.distributions_of_continuation(child).len(), 1);
        }
        assert_eq!(m.distributions_of_continuation(5), &[1]);
        assert_eq!(m.number_of_distributions(), 4);
    }

    #[test]
    fn test_remove_cid_in_distributions() {
        let mut m = mapper();
        m.probabilistic_split(0, 1, 3);
        m.remove_cid_in_distributions(2);
        m.remove_cid_in_distributions(3);
        assert!(m.distributions_of_continuation(2).is_empty());
        assert_eq!(m.continuations_of_distribution(0), &[1]);
    }

    #[test]
    fn test_remove_distributions_with_cid() {
        let mut m = mapper();
        m.probabilistic_split(0, 1, 3);
        m.nondeterministic_split(1, 4, 5);
        m.remove_distributions_with_cid(5);
        assert!(m.is_distribution_empty(1));
        assert_eq!(m.distributions_of_continuation(2), &[0]);
        assert_eq!(m.distributions_of_continuation(4), &[0]);
        assert!(m.distributions_of_continuation(5).is_empty());
        assert_eq!(m.non_empty_distributions().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_offset() {
        let mut m = ContinuationDistributionMapper::new();
        m.add_initial_distribution_and_continuation(10);
        m.nondeterministic_split(10, 11, 12);
        assert_eq!(m.distributions_of_continuation(11), &[0]);
        assert_eq!(m.distributions_of_continuation(12), &[1]);
        assert!(m.distributions_of_continuation(3).is_empty());
    }

    #[test]
    #[should_panic(expected = "is not a leaf of any distribution")]
    fn test_split_of_interior_cid() {
        let mut m = mapper();
        m.probabilistic_split(0, 1, 2);
        m.probabilistic_split(0, 3, 4);
    }
}
