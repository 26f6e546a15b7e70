//! Apportionment groups: the nodes of a Hagenbach-Bischoff tree.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a group. The derived order is the primary child order key:
/// unions come before sub-unions, sub-unions before plain lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Root,
    ListUnion,
    SubListUnion,
    List,
}

impl GroupKind {
    pub fn is_leaf(self) -> bool {
        matches!(self, GroupKind::List)
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GroupKind::Root => "root",
            GroupKind::ListUnion => "list union",
            GroupKind::SubListUnion => "sub list union",
            GroupKind::List => "list",
        };
        write!(f, "{label}")
    }
}

/// Data payload of one group node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupData {
    /// List id, union id, or the election id for the root
    pub id: String,
    pub kind: GroupKind,
    /// Union position or list number; secondary child order key
    pub position: u32,
    pub vote_count: u64,
    /// Share of the first distribution: `vote_count / distribution number` of the parent
    pub initial_mandates: u64,
    pub current_mandates: u64,
}

impl GroupData {
    pub fn new(id: impl Into<String>, kind: GroupKind, position: u32, vote_count: u64) -> Self {
        Self {
            id: id.into(),
            kind,
            position,
            vote_count,
            initial_mandates: 0,
            current_mandates: 0,
        }
    }

    /// Deterministic sibling order: kind, then position, then id.
    pub fn order_key(&self) -> (GroupKind, u32, &str) {
        (self.kind, self.position, self.id.as_str())
    }
}

impl fmt::Display for GroupData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({} votes, {} mandates)",
            self.kind, self.id, self.vote_count, self.current_mandates
        )
    }
}
