//! Rendering of group trees as `termtree` trees.

use generational_arena::Index;
use termtree::Tree;
use tracing::instrument;

use crate::domain::arena::GroupTree;

pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

impl TreeNodeConvert for GroupTree {
    #[instrument(level = "debug", skip(self))]
    fn to_tree_string(&self) -> Tree<String> {
        let Some(root_idx) = self.root() else {
            return Tree::new("Empty tree".to_string());
        };

        fn build_tree(tree: &GroupTree, node_idx: Index) -> Tree<String> {
            let label = tree
                .get_node(node_idx)
                .map(|n| n.data.to_string())
                .unwrap_or_default();
            let leaves: Vec<_> = tree
                .children(node_idx)
                .iter()
                .map(|&c| build_tree(tree, c))
                .collect();
            Tree::new(label).with_leaves(leaves)
        }

        build_tree(self, root_idx)
    }
}
