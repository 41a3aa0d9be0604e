//! Dense tensors with shape and dtype metadata.
//!
//! Values are stored as `f64` regardless of dtype; the dtype tag records how
//! a leaf is restored after flowing through a numeric concatenation, so that
//! integer-valued leaves survive a ravel round trip exactly.

/// Element type of a [`Tensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F64,
    I64,
}

/// A dense row-major tensor. Rank 0 (a scalar) is allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    dtype: DType,
    data: Vec<f64>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, dtype: DType, data: Vec<f64>) -> Self {
        assert!(
            shape.iter().product::<usize>() == data.len(),
            "tensor data length {} does not match shape {:?}",
            data.len(),
            shape
        );
        Self { shape, dtype, data }
    }

    /// Rank-0 tensor holding a single value.
    pub fn scalar(value: f64) -> Self {
        Self::new(vec![], DType::F64, vec![value])
    }

    /// 1-D tensor from a vector of values.
    pub fn vector(data: Vec<f64>) -> Self {
        Self::new(vec![data.len()], DType::F64, data)
    }

    pub fn zeros(shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Self::new(shape.to_vec(), DType::F64, vec![0f64; len])
    }

    pub fn zeros_like(&self) -> Self {
        Self::new(self.shape.clone(), self.dtype, vec![0f64; self.data.len()])
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// The value of a rank-0 or single-element tensor.
    pub fn item(&self) -> f64 {
        assert!(self.data.len() == 1, "item() on tensor with {} elements", self.data.len());
        self.data[0]
    }

    /// Elementwise map, keeping shape and dtype.
    pub fn map(&self, mut f: impl FnMut(f64) -> f64) -> Self {
        Self::new(self.shape.clone(), self.dtype, self.data.iter().map(|&v| f(v)).collect())
    }

    /// Elementwise combination of two same-shaped tensors.
    pub fn zip_map(&self, other: &Tensor, mut f: impl FnMut(f64, f64) -> f64) -> Self {
        assert!(
            self.shape == other.shape,
            "shape mismatch: {:?} vs {:?}",
            self.shape,
            other.shape
        );
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Self::new(self.shape.clone(), self.dtype, data)
    }

    /// Re-tag the dtype, normalizing stored values through the cast.
    pub fn cast(&self, dtype: DType) -> Self {
        let data = match dtype {
            DType::F64 => self.data.clone(),
            DType::I64 => self.data.iter().map(|&v| v as i64 as f64).collect(),
        };
        Self::new(self.shape.clone(), dtype, data)
    }

    /// Stack same-shaped tensors along a new leading axis.
    pub fn stack(parts: &[Tensor]) -> Self {
        assert!(!parts.is_empty(), "cannot stack zero tensors");
        let first = &parts[0];
        let mut data = Vec::with_capacity(parts.len() * first.len());
        for part in parts {
            assert!(
                part.shape == first.shape && part.dtype == first.dtype,
                "stack of mismatched tensors: {:?}/{:?} vs {:?}/{:?}",
                part.shape,
                part.dtype,
                first.shape,
                first.dtype
            );
            data.extend_from_slice(&part.data);
        }
        let mut shape = Vec::with_capacity(first.ndim() + 1);
        shape.push(parts.len());
        shape.extend_from_slice(&first.shape);
        Self::new(shape, first.dtype, data)
    }

    /// View entry `index` along the leading axis as its own tensor.
    pub fn index_leading(&self, index: usize) -> Self {
        assert!(self.ndim() >= 1, "index_leading on rank-0 tensor");
        assert!(index < self.shape[0]);
        let stride: usize = self.shape[1..].iter().product();
        let data = self.data[index * stride..(index + 1) * stride].to_vec();
        Self::new(self.shape[1..].to_vec(), self.dtype, data)
    }
}
