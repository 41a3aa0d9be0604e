//! Flatten a parameter tree into one dense vector per batch entry and back.
//!
//! Kernels on the joint latent space need every particle-owned value in a
//! single vector, so the leaves are reshaped to `[*batch, event_size]` and
//! concatenated along the last axis in traversal order. The returned
//! [`TreeRavel`] records per-leaf shape, dtype and offset metadata so the
//! inverse is exact, including dtypes.

use crate::tensor::{DType, Tensor};
use crate::tree::{ParamTree, TreeDef};

#[derive(Debug, Clone)]
struct LeafMeta {
    shape: Vec<usize>,
    dtype: DType,
    event_size: usize,
}

/// Inverse mapping produced by [`ravel_tree`].
#[derive(Debug, Clone)]
pub struct TreeRavel {
    treedef: TreeDef,
    meta: Vec<LeafMeta>,
    offsets: Vec<usize>,
    batch_dims: usize,
    batch_shape: Vec<usize>,
    event_total: usize,
}

/// Ravel a tree of tensors into a flat `[*batch, total]` tensor.
///
/// The leading `batch_dims` axes of every leaf are batch axes and must agree
/// across leaves; everything after them is flattened. Zero leaves produce a
/// zero-length vector whose unravel functions rebuild the empty structure.
pub fn ravel_tree(tree: &ParamTree, batch_dims: usize) -> (Tensor, TreeRavel) {
    let (leaves, treedef) = tree.flatten();

    if leaves.is_empty() {
        let ravel = TreeRavel {
            treedef,
            meta: Vec::new(),
            offsets: vec![0],
            batch_dims,
            batch_shape: Vec::new(),
            event_total: 0,
        };
        return (Tensor::vector(Vec::new()), ravel);
    }

    let batch_shape = leaves[0].shape()[..batch_dims].to_vec();
    let mut meta = Vec::with_capacity(leaves.len());
    let mut offsets = vec![0usize];
    for leaf in &leaves {
        assert!(
            leaf.ndim() >= batch_dims && leaf.shape()[..batch_dims] == batch_shape[..],
            "leaf shape {:?} does not share batch shape {:?}",
            leaf.shape(),
            batch_shape
        );
        let event_size = leaf.shape()[batch_dims..].iter().product();
        meta.push(LeafMeta {
            shape: leaf.shape().to_vec(),
            dtype: leaf.dtype(),
            event_size,
        });
        offsets.push(offsets.last().unwrap() + event_size);
    }
    let event_total = *offsets.last().unwrap();
    let batch_count: usize = batch_shape.iter().product();

    let mut data = vec![0f64; batch_count * event_total];
    for (leaf, (m, offset)) in leaves.iter().zip(meta.iter().zip(&offsets)) {
        for b in 0..batch_count {
            let src = &leaf.data()[b * m.event_size..(b + 1) * m.event_size];
            data[b * event_total + offset..b * event_total + offset + m.event_size]
                .copy_from_slice(src);
        }
    }

    let mut flat_shape = batch_shape.clone();
    flat_shape.push(event_total);
    let flat = Tensor::new(flat_shape, DType::F64, data);

    let ravel = TreeRavel {
        treedef,
        meta,
        offsets,
        batch_dims,
        batch_shape,
        event_total,
    };
    (flat, ravel)
}

impl TreeRavel {
    pub fn num_leaves(&self) -> usize {
        self.meta.len()
    }

    /// Flattened length of one batch entry.
    pub fn event_total(&self) -> usize {
        self.event_total
    }

    pub fn batch_shape(&self) -> &[usize] {
        &self.batch_shape
    }

    /// Rebuild the tree from a single batch entry, batch axes stripped.
    pub fn unravel(&self, vector: &[f64]) -> ParamTree {
        assert!(
            vector.len() == self.event_total,
            "unravel of vector with length {}, expected {}",
            vector.len(),
            self.event_total
        );
        let leaves = self
            .meta
            .iter()
            .zip(&self.offsets)
            .map(|(m, &offset)| {
                let data = vector[offset..offset + m.event_size].to_vec();
                Tensor::new(m.shape[self.batch_dims..].to_vec(), DType::F64, data).cast(m.dtype)
            })
            .collect();
        ParamTree::unflatten(&self.treedef, leaves)
    }

    /// Rebuild the tree from a full `[*batch, total]` tensor, batch axes kept.
    pub fn unravel_batched(&self, flat: &Tensor) -> ParamTree {
        let mut expected = self.batch_shape.clone();
        expected.push(self.event_total);
        assert!(
            flat.shape() == expected,
            "unravel_batched of tensor with shape {:?}, expected {:?}",
            flat.shape(),
            expected
        );
        let batch_count: usize = self.batch_shape.iter().product();
        let leaves = self
            .meta
            .iter()
            .zip(&self.offsets)
            .map(|(m, &offset)| {
                let mut data = vec![0f64; batch_count * m.event_size];
                for b in 0..batch_count {
                    let src = &flat.data()
                        [b * self.event_total + offset..b * self.event_total + offset + m.event_size];
                    data[b * m.event_size..(b + 1) * m.event_size].copy_from_slice(src);
                }
                Tensor::new(m.shape.clone(), DType::F64, data).cast(m.dtype)
            })
            .collect();
        ParamTree::unflatten(&self.treedef, leaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Params;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn particle_params() -> Params {
        let mut params = Params::new();
        // two particles, one matrix site and one integer vector site
        params.insert(
            "loc".to_string(),
            Tensor::new(vec![2, 2, 3], DType::F64, (0..12).map(|v| v as f64 * 0.5).collect()),
        );
        params.insert(
            "count".to_string(),
            Tensor::new(vec![2, 2], DType::I64, vec![1.0, 2.0, 3.0, 4.0]),
        );
        params
    }

    #[test]
    fn round_trip_batched() {
        let tree = ParamTree::from_params(&particle_params());
        let (flat, ravel) = ravel_tree(&tree, 1);
        assert_eq!(flat.shape(), &[2, 8]);
        assert_eq!(ravel.event_total(), 8);
        assert_eq!(ravel.unravel_batched(&flat), tree);
    }

    #[test]
    fn round_trip_single_entry() {
        let params = particle_params();
        let tree = ParamTree::from_params(&params);
        let (flat, ravel) = ravel_tree(&tree, 1);

        let row = ravel.unravel(&flat.data()[..8]).into_params();
        assert_eq!(row["count"], params["count"].index_leading(0));
        assert_eq!(row["loc"], params["loc"].index_leading(0));
    }

    #[test]
    fn leaves_concatenate_in_name_order() {
        let tree = ParamTree::from_params(&particle_params());
        let (flat, _) = ravel_tree(&tree, 1);
        // "count" sorts before "loc"
        assert_eq!(&flat.data()[..2], &[1.0, 2.0]);
    }

    #[test]
    fn dtype_survives_numeric_concatenation() {
        let tree = ParamTree::from_params(&particle_params());
        let (flat, ravel) = ravel_tree(&tree, 1);
        let ParamTree::Map(entries) = ravel.unravel_batched(&flat) else {
            panic!("expected map");
        };
        let ParamTree::Leaf(count) = &entries["count"] else {
            panic!("expected leaf");
        };
        assert_eq!(count.dtype(), DType::I64);
    }

    #[test]
    fn empty_tree_ravels_to_zero_length_vector() {
        let tree = ParamTree::Map(Default::default());
        let (flat, ravel) = ravel_tree(&tree, 1);
        assert_eq!(flat.len(), 0);
        assert_eq!(ravel.event_total(), 0);
        assert_eq!(ravel.unravel(&[]), tree);
        assert_eq!(ravel.unravel_batched(&flat), tree);
    }

    #[test]
    fn zero_batch_dims() {
        let mut params = Params::new();
        params.insert("w".to_string(), Tensor::new(vec![2, 2], DType::F64, vec![1.0, 2.0, 3.0, 4.0]));
        let tree = ParamTree::from_params(&params);
        let (flat, ravel) = ravel_tree(&tree, 0);
        assert_eq!(flat.shape(), &[4]);
        assert_eq!(ravel.unravel(flat.data()), tree);
    }

    #[test]
    #[should_panic]
    fn mismatched_batch_shapes_panic() {
        let mut params = Params::new();
        params.insert("a".to_string(), Tensor::zeros(&[2, 3]));
        params.insert("b".to_string(), Tensor::zeros(&[3, 3]));
        ravel_tree(&ParamTree::from_params(&params), 1);
    }

    #[test]
    #[should_panic]
    fn differently_shaped_vector_panics() {
        let mut params = Params::new();
        params.insert("a".to_string(), Tensor::zeros(&[2, 3]));
        let (_, ravel) = ravel_tree(&ParamTree::from_params(&params), 1);
        ravel.unravel(&[0.0; 5]);
    }

    proptest! {
        #[test]
        fn round_trips_for_arbitrary_shapes(
            batch in 1usize..4,
            event_shapes in prop::collection::vec(prop::collection::vec(1usize..4, 0..3), 1..5),
            seed in 0u64..512,
        ) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut params = Params::new();
            for (index, event_shape) in event_shapes.iter().enumerate() {
                let mut shape = vec![batch];
                shape.extend_from_slice(event_shape);
                let len: usize = shape.iter().product();
                let (dtype, data): (DType, Vec<f64>) = if index % 2 == 0 {
                    (DType::F64, (0..len).map(|_| rng.random::<f64>() * 8.0 - 4.0).collect())
                } else {
                    (DType::I64, (0..len).map(|_| f64::from(rng.random::<i8>())).collect())
                };
                params.insert(format!("site_{index}"), Tensor::new(shape, dtype, data));
            }
            let tree = ParamTree::from_params(&params);
            let (flat, ravel) = ravel_tree(&tree, 1);

            prop_assert_eq!(flat.shape(), &[batch, ravel.event_total()][..]);
            prop_assert_eq!(ravel.unravel_batched(&flat), tree);

            // per-entry inverse strips the batch axis
            let row = ravel.unravel(&flat.data()[..ravel.event_total()]).into_params();
            for (name, tensor) in &params {
                prop_assert_eq!(&row[name], &tensor.index_leading(0));
            }
        }
    }
}
