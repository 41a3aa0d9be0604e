//! Tagged parameter trees.
//!
//! A named collection of tensors is represented as an explicit recursive
//! variant rather than a runtime-introspected container protocol: a tree is a
//! leaf tensor, a named mapping, or a sequence. Flattening produces the leaves
//! in a deterministic order together with a [`TreeDef`] that rebuilds the
//! structure.

use std::collections::BTreeMap;

use crate::tensor::Tensor;

/// Named dictionary of parameter tensors, ordered by site name.
pub type Params = BTreeMap<String, Tensor>;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamTree {
    Leaf(Tensor),
    Map(BTreeMap<String, ParamTree>),
    List(Vec<ParamTree>),
}

/// Structure of a [`ParamTree`] with the leaves removed.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeDef {
    Leaf,
    Map(Vec<(String, TreeDef)>),
    List(Vec<TreeDef>),
}

impl ParamTree {
    /// Collect the leaves in traversal order along with the tree structure.
    pub fn flatten(&self) -> (Vec<&Tensor>, TreeDef) {
        let mut leaves = Vec::new();
        let def = self.flatten_into(&mut leaves);
        (leaves, def)
    }

    fn flatten_into<'a>(&'a self, leaves: &mut Vec<&'a Tensor>) -> TreeDef {
        match self {
            ParamTree::Leaf(tensor) => {
                leaves.push(tensor);
                TreeDef::Leaf
            }
            ParamTree::Map(entries) => TreeDef::Map(
                entries
                    .iter()
                    .map(|(name, child)| (name.clone(), child.flatten_into(leaves)))
                    .collect(),
            ),
            ParamTree::List(children) => {
                TreeDef::List(children.iter().map(|child| child.flatten_into(leaves)).collect())
            }
        }
    }

    /// Rebuild a tree from a structure and exactly the matching number of leaves.
    pub fn unflatten(def: &TreeDef, leaves: Vec<Tensor>) -> Self {
        let mut iter = leaves.into_iter();
        let tree = Self::unflatten_from(def, &mut iter);
        assert!(iter.next().is_none(), "too many leaves for tree structure");
        tree
    }

    fn unflatten_from(def: &TreeDef, leaves: &mut impl Iterator<Item = Tensor>) -> Self {
        match def {
            TreeDef::Leaf => {
                ParamTree::Leaf(leaves.next().expect("too few leaves for tree structure"))
            }
            TreeDef::Map(entries) => ParamTree::Map(
                entries
                    .iter()
                    .map(|(name, child)| (name.clone(), Self::unflatten_from(child, leaves)))
                    .collect(),
            ),
            TreeDef::List(children) => ParamTree::List(
                children
                    .iter()
                    .map(|child| Self::unflatten_from(child, leaves))
                    .collect(),
            ),
        }
    }

    /// Apply a function to every leaf, preserving structure.
    pub fn map_leaves(&self, f: &mut impl FnMut(&Tensor) -> Tensor) -> Self {
        match self {
            ParamTree::Leaf(tensor) => ParamTree::Leaf(f(tensor)),
            ParamTree::Map(entries) => ParamTree::Map(
                entries
                    .iter()
                    .map(|(name, child)| (name.clone(), child.map_leaves(f)))
                    .collect(),
            ),
            ParamTree::List(children) => {
                ParamTree::List(children.iter().map(|child| child.map_leaves(f)).collect())
            }
        }
    }

    /// Single-level map of leaves, the shape parameter dictionaries take.
    pub fn from_params(params: &Params) -> Self {
        ParamTree::Map(
            params
                .iter()
                .map(|(name, tensor)| (name.clone(), ParamTree::Leaf(tensor.clone())))
                .collect(),
        )
    }

    /// Inverse of [`ParamTree::from_params`]. Panics on nested structure.
    pub fn into_params(self) -> Params {
        match self {
            ParamTree::Map(entries) => entries
                .into_iter()
                .map(|(name, child)| match child {
                    ParamTree::Leaf(tensor) => (name, tensor),
                    other => panic!("expected leaf under `{name}`, found {other:?}"),
                })
                .collect(),
            other => panic!("expected a map of leaves, found {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DType;
    use pretty_assertions::assert_eq;

    fn leaf(data: Vec<f64>) -> ParamTree {
        ParamTree::Leaf(Tensor::vector(data))
    }

    #[test]
    fn flatten_unflatten_round_trips() {
        let mut inner = BTreeMap::new();
        inner.insert("b".to_string(), leaf(vec![3.0]));
        inner.insert("a".to_string(), leaf(vec![1.0, 2.0]));
        let tree = ParamTree::List(vec![
            ParamTree::Map(inner),
            ParamTree::Leaf(Tensor::new(vec![2], DType::I64, vec![4.0, 5.0])),
        ]);

        let (leaves, def) = tree.flatten();
        // map entries come out in name order
        assert_eq!(leaves[0].data(), &[1.0, 2.0]);
        assert_eq!(leaves[1].data(), &[3.0]);
        assert_eq!(leaves[2].dtype(), DType::I64);

        let rebuilt = ParamTree::unflatten(&def, leaves.into_iter().cloned().collect());
        assert_eq!(rebuilt, tree);
    }

    #[test]
    fn params_round_trip() {
        let mut params = Params::new();
        params.insert("loc".to_string(), Tensor::scalar(0.5));
        params.insert("scale".to_string(), Tensor::vector(vec![1.0, 2.0]));
        assert_eq!(ParamTree::from_params(&params).into_params(), params);
    }

    #[test]
    #[should_panic]
    fn unflatten_rejects_leftover_leaves() {
        let (_, def) = leaf(vec![1.0]).flatten();
        ParamTree::unflatten(&def, vec![Tensor::scalar(1.0), Tensor::scalar(2.0)]);
    }
}
