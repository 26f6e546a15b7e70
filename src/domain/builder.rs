//! Builds the group tree of one proportional election from its tally input.

use std::collections::{BTreeMap, BTreeSet};

use generational_arena::Index;
use tracing::{debug, instrument};

use crate::domain::arena::GroupTree;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::group::{GroupData, GroupKind};
use crate::domain::tally::{ListUnionInput, ProportionalElectionInput};

/// Validates a [`ProportionalElectionInput`] and turns it into a [`GroupTree`].
///
/// Root children are the list unions and every list outside a union. A union's
/// children are its sub unions and its lists outside any sub union.
#[derive(Debug, Default)]
pub struct GroupTreeBuilder {
    /// List id -> validated list group
    lists: BTreeMap<String, GroupData>,
    /// List id -> owning union id
    union_of: BTreeMap<String, String>,
    /// List id -> owning sub union id
    sub_union_of: BTreeMap<String, String>,
}

impl GroupTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validated seat count of the election.
    pub fn seats(input: &ProportionalElectionInput) -> DomainResult<u64> {
        u64::try_from(input.number_of_mandates)
            .ok()
            .filter(|&s| s > 0)
            .ok_or_else(|| DomainError::NonPositiveSeats {
                id: input.id.clone(),
                mandates: input.number_of_mandates,
            })
    }

    #[instrument(level = "debug", skip(self, input), fields(id = %input.id))]
    pub fn build(&mut self, input: &ProportionalElectionInput) -> DomainResult<GroupTree> {
        self.lists.clear();
        self.union_of.clear();
        self.sub_union_of.clear();

        Self::seats(input)?;
        self.collect_lists(input)?;
        for union in &input.list_unions {
            self.collect_union(union)?;
        }

        // union totals are bounded by this one
        let total = self
            .lists
            .values()
            .try_fold(0u64, |acc, l| acc.checked_add(l.vote_count))
            .ok_or_else(|| DomainError::CountOverflow(input.id.clone()))?;
        if total == 0 {
            return Err(DomainError::NoVotes(input.id.clone()));
        }

        let mut tree = GroupTree::new();
        let root = tree.insert_node(GroupData::new(&input.id, GroupKind::Root, 0, total), None);

        for union in &input.list_unions {
            self.insert_union(&mut tree, root, union);
        }
        for (id, list) in &self.lists {
            if !self.union_of.contains_key(id) {
                tree.insert_node(list.clone(), Some(root));
            }
        }

        tree.validate_structure()?;
        debug!(
            "built tree with {} groups, depth {}, {} votes",
            tree.len(),
            tree.depth(),
            total
        );
        Ok(tree)
    }

    fn collect_lists(&mut self, input: &ProportionalElectionInput) -> DomainResult<()> {
        let mut ids = BTreeSet::from([input.id.as_str()]);
        for list in &input.lists {
            if !ids.insert(list.id.as_str()) {
                return Err(DomainError::DuplicateId(list.id.clone()));
            }
            let votes = u64::try_from(list.vote_count).map_err(|_| DomainError::NegativeVoteCount {
                id: list.id.clone(),
                vote_count: list.vote_count,
            })?;
            self.lists.insert(
                list.id.clone(),
                GroupData::new(&list.id, GroupKind::List, list.position, votes),
            );
        }
        for union in &input.list_unions {
            if !ids.insert(union.id.as_str()) {
                return Err(DomainError::DuplicateId(union.id.clone()));
            }
            for sub in &union.sub_list_unions {
                if !ids.insert(sub.id.as_str()) {
                    return Err(DomainError::DuplicateId(sub.id.clone()));
                }
            }
        }
        Ok(())
    }

    fn collect_union(&mut self, union: &ListUnionInput) -> DomainResult<()> {
        for list_id in &union.list_ids {
            if !self.lists.contains_key(list_id) {
                return Err(DomainError::UnknownList(list_id.clone()));
            }
            if let Some(first) = self.union_of.insert(list_id.clone(), union.id.clone()) {
                return Err(DomainError::ListInMultipleUnions {
                    list: list_id.clone(),
                    first,
                    second: union.id.clone(),
                });
            }
        }
        for sub in &union.sub_list_unions {
            for list_id in &sub.list_ids {
                if !self.lists.contains_key(list_id) {
                    return Err(DomainError::UnknownList(list_id.clone()));
                }
                if !union.list_ids.contains(list_id) {
                    return Err(DomainError::SubUnionOutsideUnion {
                        sub_union: sub.id.clone(),
                        union: union.id.clone(),
                        list: list_id.clone(),
                    });
                }
                if let Some(first) = self.sub_union_of.insert(list_id.clone(), sub.id.clone()) {
                    return Err(DomainError::ListInMultipleUnions {
                        list: list_id.clone(),
                        first,
                        second: sub.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn sum_votes(&self, list_ids: &[String]) -> u64 {
        list_ids
            .iter()
            .filter_map(|id| self.lists.get(id))
            .map(|l| l.vote_count)
            .sum()
    }

    fn insert_union(&self, tree: &mut GroupTree, root: Index, union: &ListUnionInput) {
        let union_idx = tree.insert_node(
            GroupData::new(
                &union.id,
                GroupKind::ListUnion,
                union.position,
                self.sum_votes(&union.list_ids),
            ),
            Some(root),
        );

        let mut sub_indices = BTreeMap::new();
        for sub in &union.sub_list_unions {
            let idx = tree.insert_node(
                GroupData::new(
                    &sub.id,
                    GroupKind::SubListUnion,
                    sub.position,
                    self.sum_votes(&sub.list_ids),
                ),
                Some(union_idx),
            );
            sub_indices.insert(sub.id.as_str(), idx);
        }

        for list_id in &union.list_ids {
            let Some(list) = self.lists.get(list_id) else {
                continue;
            };
            let parent = self
                .sub_union_of
                .get(list_id)
                .and_then(|sub| sub_indices.get(sub.as_str()))
                .copied()
                .unwrap_or(union_idx);
            tree.insert_node(list.clone(), Some(parent));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tally::{ListInput, SubListUnionInput};

    fn list(id: &str, position: u32, votes: i64) -> ListInput {
        ListInput {
            id: id.into(),
            position,
            vote_count: votes,
        }
    }

    fn input() -> ProportionalElectionInput {
        ProportionalElectionInput {
            id: "nr".into(),
            number_of_mandates: 5,
            lists: vec![
                list("l1", 1, 100),
                list("l2", 2, 60),
                list("l3", 3, 40),
                list("l4", 4, 30),
            ],
            list_unions: vec![ListUnionInput {
                id: "u1".into(),
                position: 1,
                list_ids: vec!["l2".into(), "l3".into(), "l4".into()],
                sub_list_unions: vec![SubListUnionInput {
                    id: "s1".into(),
                    position: 1,
                    list_ids: vec!["l3".into(), "l4".into()],
                }],
            }],
            lot_decisions: vec![],
        }
    }

    #[test]
    fn given_unions_when_building_then_nested_with_summed_votes() {
        let tree = GroupTreeBuilder::new().build(&input()).unwrap();
        let root = tree.root().unwrap();
        assert_eq!(tree.data(root).unwrap().vote_count, 230);
        assert_eq!(tree.depth(), 4);

        let top: Vec<_> = tree
            .children(root)
            .iter()
            .map(|&c| tree.data(c).unwrap().id.clone())
            .collect();
        assert_eq!(top, vec!["u1", "l1"]);

        let union = tree.find("u1").unwrap();
        assert_eq!(tree.data(union).unwrap().vote_count, 130);
        let sub = tree.find("s1").unwrap();
        assert_eq!(tree.data(sub).unwrap().vote_count, 70);
        assert_eq!(tree.all_list_ids(union), "l3, l4, l2");
    }

    #[test]
    fn given_negative_votes_when_building_then_contract_violation() {
        let mut input = input();
        input.lists[0].vote_count = -5;
        assert_eq!(
            GroupTreeBuilder::new().build(&input).unwrap_err(),
            DomainError::NegativeVoteCount {
                id: "l1".into(),
                vote_count: -5
            }
        );
    }

    #[test]
    fn given_vote_total_beyond_u64_when_building_then_contract_violation() {
        let mut input = input();
        input.lists.iter_mut().for_each(|l| l.vote_count = i64::MAX);

        let err = GroupTreeBuilder::new().build(&input).unwrap_err();

        assert_eq!(err, DomainError::CountOverflow("nr".into()));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn given_zero_seats_when_building_then_contract_violation() {
        let mut input = input();
        input.number_of_mandates = 0;
        assert!(matches!(
            GroupTreeBuilder::new().build(&input),
            Err(DomainError::NonPositiveSeats { .. })
        ));
    }

    #[test]
    fn given_list_in_two_unions_when_building_then_contract_violation() {
        let mut input = input();
        input.list_unions.push(ListUnionInput {
            id: "u2".into(),
            position: 2,
            list_ids: vec!["l1".into(), "l2".into()],
            sub_list_unions: vec![],
        });
        assert!(matches!(
            GroupTreeBuilder::new().build(&input),
            Err(DomainError::ListInMultipleUnions { .. })
        ));
    }

    #[test]
    fn given_sub_union_outside_union_when_building_then_contract_violation() {
        let mut input = input();
        input.list_unions[0].sub_list_unions[0].list_ids.push("l1".into());
        assert!(matches!(
            GroupTreeBuilder::new().build(&input),
            Err(DomainError::SubUnionOutsideUnion { .. })
        ));
    }

    #[test]
    fn given_duplicate_or_unknown_ids_when_building_then_contract_violation() {
        let mut duplicate = input();
        duplicate.lists.push(list("l1", 9, 1));
        assert_eq!(
            GroupTreeBuilder::new().build(&duplicate).unwrap_err(),
            DomainError::DuplicateId("l1".into())
        );

        let mut unknown = input();
        unknown.list_unions[0].list_ids.push("ghost".into());
        assert_eq!(
            GroupTreeBuilder::new().build(&unknown).unwrap_err(),
            DomainError::UnknownList("ghost".into())
        );
    }

    #[test]
    fn given_no_votes_when_building_then_contract_violation() {
        let mut input = input();
        for l in &mut input.lists {
            l.vote_count = 0;
        }
        assert_eq!(
            GroupTreeBuilder::new().build(&input).unwrap_err(),
            DomainError::NoVotes("nr".into())
        );
    }
}
