// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::ops::Add;

use crate::PeerId;

/// Set of peer identities.
///
/// Members are kept sorted and free of duplicates, so iteration order is
/// deterministic. Membership tests are O(1) expected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerGroup {
    members: Vec<PeerId>,
    index: HashSet<PeerId>,
}

impl PeerGroup {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.index.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterates over all members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.members.iter().copied()
    }

    pub fn members(&self) -> &[PeerId] {
        &self.members
    }

    /// Returns `true` iff every member of `self` is also in `other`.
    pub fn is_subset(&self, other: &PeerGroup) -> bool {
        self.members.len() <= other.members.len() && self.iter().all(|id| other.contains(id))
    }

    /// Returns the number of members that are also in `other`.
    pub fn intersection_len(&self, other: &PeerGroup) -> usize {
        self.iter().filter(|id| other.contains(*id)).count()
    }

    fn insert(&mut self, id: PeerId) {
        if self.index.insert(id) {
            let pos = self.members.partition_point(|m| *m < id);
            self.members.insert(pos, id);
        }
    }
}

impl FromIterator<PeerId> for PeerGroup {
    fn from_iter<I: IntoIterator<Item = PeerId>>(iter: I) -> Self {
        let index: HashSet<PeerId> = iter.into_iter().collect();
        let mut members: Vec<PeerId> = index.iter().copied().collect();
        members.sort_unstable();
        Self { members, index }
    }
}

impl<'a> IntoIterator for &'a PeerGroup {
    type Item = PeerId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, PeerId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter().copied()
    }
}

impl Add<PeerId> for PeerGroup {
    type Output = PeerGroup;

    fn add(mut self, id: PeerId) -> PeerGroup {
        self.insert(id);
        self
    }
}

impl Add<&PeerGroup> for PeerGroup {
    type Output = PeerGroup;

    fn add(mut self, other: &PeerGroup) -> PeerGroup {
        for id in other {
            self.insert(id);
        }
        self
    }
}

impl Add<PeerGroup> for PeerGroup {
    type Output = PeerGroup;

    fn add(self, other: PeerGroup) -> PeerGroup {
        self + &other
    }
}

impl Add<&PeerGroup> for &PeerGroup {
    type Output = PeerGroup;

    fn add(self, other: &PeerGroup) -> PeerGroup {
        self.clone() + other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic() {
        let group: PeerGroup = [5, 1, 3, 1, 5].into_iter().collect();
        assert_eq!(group.len(), 3);
        assert_eq!(group.members(), &[1, 3, 5]);
        assert!(group.contains(3));
        assert!(!group.contains(2));
        assert!(PeerGroup::new().is_empty());
    }

    #[test]
    fn union() {
        let a: PeerGroup = [1, 2, 3].into_iter().collect();
        let b: PeerGroup = [3, 4].into_iter().collect();
        let u = &a + &b;
        assert_eq!(u.members(), &[1, 2, 3, 4]);
        assert!(a.is_subset(&u));
        assert!(b.is_subset(&u));
        assert!(!u.is_subset(&a));
        assert_eq!(a.intersection_len(&b), 1);

        let u = u + 0 + 2;
        assert_eq!(u.members(), &[0, 1, 2, 3, 4]);
        assert_eq!(u.clone() + PeerGroup::new(), u);
    }
}
