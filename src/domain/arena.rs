use generational_arena::{Arena, Index};
use serde::Serialize;
use tracing::instrument;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::group::{GroupData, GroupKind};

/// Group node in the arena-based hierarchy.
#[derive(Debug, Clone)]
pub struct GroupNode {
    /// Votes and mandates of this group
    pub data: GroupData,
    /// Index of parent node in the arena, None for the root
    pub parent: Option<Index>,
    /// Indices of child nodes, kept in deterministic order
    pub children: Vec<Index>,
}

/// Arena-based tree of apportionment groups for one election.
///
/// Uses a generational arena so parents and children reference each other by
/// index instead of by pointer. Sibling order is a pure function of the stored
/// kind and position (see [`GroupData::order_key`]).
#[derive(Debug, Clone)]
pub struct GroupTree {
    arena: Arena<GroupNode>,
    root: Option<Index>,
}

/// Owned, serializable copy of a subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSnapshot {
    #[serde(flatten)]
    pub data: GroupData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<GroupSnapshot>,
}

impl Default for GroupTree {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupTree {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
        }
    }

    /// Inserts a node; children are placed by their order key, not by call order.
    #[instrument(level = "trace", skip(self))]
    pub fn insert_node(&mut self, data: GroupData, parent: Option<Index>) -> Index {
        let position = parent
            .and_then(|p| self.arena.get(p))
            .map(|p| {
                p.children.partition_point(|&c| {
                    self.arena
                        .get(c)
                        .map(|n| n.data.order_key() < data.order_key())
                        .unwrap_or(false)
                })
            })
            .unwrap_or(0);

        let node = GroupNode {
            data,
            parent,
            children: Vec::new(),
        };
        let node_idx = self.arena.insert(node);

        if let Some(parent_idx) = parent {
            if let Some(parent) = self.arena.get_mut(parent_idx) {
                parent.children.insert(position, node_idx);
            }
        } else {
            self.root = Some(node_idx);
        }

        node_idx
    }

    #[instrument(level = "trace", skip(self))]
    pub fn get_node(&self, idx: Index) -> Option<&GroupNode> {
        self.arena.get(idx)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn get_node_mut(&mut self, idx: Index) -> Option<&mut GroupNode> {
        self.arena.get_mut(idx)
    }

    pub fn root(&self) -> Option<Index> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn data(&self, idx: Index) -> DomainResult<&GroupData> {
        self.get_node(idx)
            .map(|n| &n.data)
            .ok_or_else(|| DomainError::InvariantViolation(format!("dangling node index {idx:?}")))
    }

    pub fn data_mut(&mut self, idx: Index) -> DomainResult<&mut GroupData> {
        self.get_node_mut(idx)
            .map(|n| &mut n.data)
            .ok_or_else(|| DomainError::InvariantViolation(format!("dangling node index {idx:?}")))
    }

    pub fn children(&self, idx: Index) -> &[Index] {
        self.get_node(idx)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Finds a node by group id (preorder, first match).
    pub fn find(&self, id: &str) -> Option<Index> {
        self.iter().find(|(_, n)| n.data.id == id).map(|(i, _)| i)
    }

    pub fn iter(&self) -> GroupIterator<'_> {
        GroupIterator::new(self)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        if let Some(root) = self.root {
            self.calculate_depth(root)
        } else {
            0
        }
    }

    fn calculate_depth(&self, node_idx: Index) -> usize {
        if let Some(node) = self.get_node(node_idx) {
            1 + node
                .children
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// All `List` nodes in preorder.
    pub fn leaf_nodes(&self) -> Vec<Index> {
        self.iter()
            .filter(|(_, n)| n.data.kind.is_leaf())
            .map(|(i, _)| i)
            .collect()
    }

    /// Comma separated ids of all lists below `idx`, recomputed on every call.
    pub fn all_list_ids(&self, idx: Index) -> String {
        let mut ids = Vec::new();
        self.collect_list_ids(idx, &mut ids);
        ids.join(", ")
    }

    fn collect_list_ids<'a>(&'a self, idx: Index, ids: &mut Vec<&'a str>) {
        if let Some(node) = self.get_node(idx) {
            if node.data.kind.is_leaf() {
                ids.push(node.data.id.as_str());
            }
            for &child in &node.children {
                self.collect_list_ids(child, ids);
            }
        }
    }

    /// Checks the structural invariants: lists are leaves, non-lists hold the
    /// sum of their children's votes, nesting follows Root > ListUnion >
    /// SubListUnion > List.
    #[instrument(level = "debug", skip(self))]
    pub fn validate_structure(&self) -> DomainResult<()> {
        let root = self.root.ok_or(DomainError::EmptyTree)?;
        if self.data(root)?.kind != GroupKind::Root {
            return Err(DomainError::InvariantViolation(
                "tree root is not of kind root".into(),
            ));
        }
        for (_, node) in self.iter() {
            if node.data.kind.is_leaf() {
                if !node.children.is_empty() {
                    return Err(DomainError::InvariantViolation(format!(
                        "list {} has children",
                        node.data.id
                    )));
                }
                continue;
            }
            let mut sum = 0u64;
            for &child in &node.children {
                let child = self.data(child)?;
                if child.kind <= node.data.kind {
                    return Err(DomainError::InvariantViolation(format!(
                        "{} {} nested below {} {}",
                        child.kind, child.id, node.data.kind, node.data.id
                    )));
                }
                sum += child.vote_count;
            }
            if sum != node.data.vote_count {
                return Err(DomainError::InvariantViolation(format!(
                    "{} {} holds {} votes, children sum to {}",
                    node.data.kind, node.data.id, node.data.vote_count, sum
                )));
            }
        }
        Ok(())
    }

    /// Checks a completed distribution: the root holds exactly `seats`, every
    /// non-list holds the sum of its children and no group fell below its
    /// first-distribution share.
    #[instrument(level = "debug", skip(self))]
    pub fn verify_distribution(&self, seats: u64) -> DomainResult<()> {
        let root = self.root.ok_or(DomainError::EmptyTree)?;
        let root_mandates = self.data(root)?.current_mandates;
        if root_mandates != seats {
            return Err(DomainError::InvariantViolation(format!(
                "root holds {root_mandates} mandates, {seats} available"
            )));
        }
        for (_, node) in self.iter() {
            let data = &node.data;
            if data.current_mandates < data.initial_mandates {
                return Err(DomainError::InvariantViolation(format!(
                    "{} {} holds {} mandates, below its first distribution share {}",
                    data.kind, data.id, data.current_mandates, data.initial_mandates
                )));
            }
            if node.children.is_empty() {
                continue;
            }
            let sum: u64 = node
                .children
                .iter()
                .filter_map(|&c| self.get_node(c))
                .map(|c| c.data.current_mandates)
                .sum();
            if sum != data.current_mandates {
                return Err(DomainError::InvariantViolation(format!(
                    "{} {} holds {} mandates, children hold {}",
                    data.kind, data.id, data.current_mandates, sum
                )));
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Option<GroupSnapshot> {
        self.root.and_then(|r| self.snapshot_node(r))
    }

    fn snapshot_node(&self, idx: Index) -> Option<GroupSnapshot> {
        let node = self.get_node(idx)?;
        Some(GroupSnapshot {
            data: node.data.clone(),
            children: node
                .children
                .iter()
                .filter_map(|&c| self.snapshot_node(c))
                .collect(),
        })
    }
}

pub struct GroupIterator<'a> {
    tree: &'a GroupTree,
    stack: Vec<Index>,
}

impl<'a> GroupIterator<'a> {
    fn new(tree: &'a GroupTree) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = tree.root() {
            stack.push(root);
        }
        Self { tree, stack }
    }
}

impl<'a> Iterator for GroupIterator<'a> {
    type Item = (Index, &'a GroupNode);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.tree.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> GroupTree {
        let mut tree = GroupTree::new();
        let root = tree.insert_node(GroupData::new("e", GroupKind::Root, 0, 230), None);
        // Inserted out of order on purpose
        tree.insert_node(GroupData::new("l3", GroupKind::List, 3, 40), Some(root));
        let union = tree.insert_node(GroupData::new("u1", GroupKind::ListUnion, 1, 190), Some(root));
        tree.insert_node(GroupData::new("l2", GroupKind::List, 2, 60), Some(union));
        tree.insert_node(GroupData::new("l1", GroupKind::List, 1, 130), Some(union));
        tree
    }

    #[test]
    fn given_unordered_inserts_when_iterating_then_children_follow_order_key() {
        let tree = sample_tree();
        let ids: Vec<_> = tree.iter().map(|(_, n)| n.data.id.clone()).collect();
        assert_eq!(ids, vec!["e", "u1", "l1", "l2", "l3"]);
    }

    #[test]
    fn given_union_when_all_list_ids_then_recomputed_from_children() {
        let tree = sample_tree();
        let union = tree.find("u1").unwrap();
        assert_eq!(tree.all_list_ids(union), "l1, l2");
        assert_eq!(tree.all_list_ids(tree.root().unwrap()), "l1, l2, l3");
    }

    #[test]
    fn given_consistent_tree_when_validating_then_ok() {
        let tree = sample_tree();
        assert!(tree.validate_structure().is_ok());
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.leaf_nodes().len(), 3);
    }

    #[test]
    fn given_vote_mismatch_when_validating_then_invariant_violation() {
        let mut tree = sample_tree();
        let union = tree.find("u1").unwrap();
        tree.data_mut(union).unwrap().vote_count = 1;
        assert!(matches!(
            tree.validate_structure(),
            Err(DomainError::InvariantViolation(_))
        ));
    }
}
