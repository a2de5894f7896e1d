// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type and view abstractions.

use crate::{DType, Shape, TensorError};
use half::{bf16, f16};

/// An owned, n-dimensional tensor stored in contiguous memory.
///
/// `Tensor` is the data carrier for the reference kernels and the oracle
/// harness. It owns its data buffer and exposes immutable views via
/// [`TensorView`]. Tensors are value objects: the kernels never mutate their
/// inputs, and every output is a freshly constructed tensor.
///
/// # Memory Layout
/// Data is stored in row-major (C) order as a flat byte buffer. Typed access
/// is provided via [`as_f32_slice`](Tensor::as_f32_slice) and friends; the
/// 16-bit element types use the `half` crate's `f16`/`bf16` representations.
#[derive(Debug, Clone)]
pub struct Tensor {
    shape: Shape,
    dtype: DType,
    data: Vec<u8>,
}

impl Tensor {
    /// Creates a new tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape, DType};
    /// let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
    /// assert_eq!(t.size_bytes(), 24); // 2 * 3 * 4 bytes
    /// ```
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let size = shape.size_bytes(dtype);
        Self {
            shape,
            dtype,
            data: vec![0u8; size],
        }
    }

    /// Creates a tensor from raw bytes.
    ///
    /// Returns an error if the buffer size does not match `shape.size_bytes(dtype)`.
    pub fn from_bytes(shape: Shape, dtype: DType, data: Vec<u8>) -> Result<Self, TensorError> {
        let expected = shape.size_bytes(dtype);
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, dtype, data })
    }

    /// Creates a tensor from a slice of `f64` values.
    pub fn from_f64(shape: Shape, values: &[f64]) -> Result<Self, TensorError> {
        Self::from_typed(shape, DType::F64, values)
    }

    /// Creates a tensor from a slice of `f32` values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.as_f32_slice(), &[1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        Self::from_typed(shape, DType::F32, values)
    }

    /// Creates a tensor from a slice of `f16` values.
    pub fn from_f16(shape: Shape, values: &[f16]) -> Result<Self, TensorError> {
        Self::from_typed(shape, DType::F16, values)
    }

    /// Creates a tensor from a slice of `bf16` values.
    pub fn from_bf16(shape: Shape, values: &[bf16]) -> Result<Self, TensorError> {
        Self::from_typed(shape, DType::BF16, values)
    }

    /// Creates a tensor of the given dtype from `f32` values, converting each
    /// element through the target storage representation.
    ///
    /// This is the downcast half of the upcast/downcast boundary: values land
    /// in the buffer exactly as a narrow-precision kernel would store them.
    pub fn from_f32_cast(
        shape: Shape,
        values: &[f32],
        dtype: DType,
    ) -> Result<Self, TensorError> {
        match dtype {
            DType::F64 => {
                let wide: Vec<f64> = values.iter().map(|&v| v as f64).collect();
                Self::from_f64(shape, &wide)
            }
            DType::F32 => Self::from_f32(shape, values),
            DType::F16 => {
                let narrow: Vec<f16> = values.iter().map(|&v| f16::from_f32(v)).collect();
                Self::from_f16(shape, &narrow)
            }
            DType::BF16 => {
                let narrow: Vec<bf16> = values.iter().map(|&v| bf16::from_f32(v)).collect();
                Self::from_bf16(shape, &narrow)
            }
        }
    }

    fn from_typed<T: Copy>(
        shape: Shape,
        dtype: DType,
        values: &[T],
    ) -> Result<Self, TensorError> {
        let expected_elements = shape.num_elements();
        if values.len() != expected_elements {
            return Err(TensorError::BufferSizeMismatch {
                expected: expected_elements * dtype.size_bytes(),
                actual: values.len() * dtype.size_bytes(),
            });
        }
        // SAFETY: reinterpreting &[T] as &[u8] is safe for Copy types.
        let byte_slice = unsafe {
            std::slice::from_raw_parts(
                values.as_ptr() as *const u8,
                std::mem::size_of_val(values),
            )
        };
        Ok(Self {
            shape,
            dtype,
            data: byte_slice.to_vec(),
        })
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns an immutable view over this tensor's data.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            dtype: self.dtype,
            data: &self.data,
        }
    }

    /// Returns the raw byte slice backing this tensor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Interprets the buffer as a slice of `f64`.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::F64`.
    pub fn as_f64_slice(&self) -> &[f64] {
        assert_eq!(
            self.dtype,
            DType::F64,
            "as_f64_slice called on {:?} tensor",
            self.dtype
        );
        // SAFETY: data was constructed from f64s and the element count is
        // bounded by the buffer length checked at construction.
        unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr() as *const f64,
                self.shape.num_elements(),
            )
        }
    }

    /// Interprets the buffer as a slice of `f32`.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::F32`.
    pub fn as_f32_slice(&self) -> &[f32] {
        assert_eq!(
            self.dtype,
            DType::F32,
            "as_f32_slice called on {:?} tensor",
            self.dtype
        );
        // SAFETY: data was constructed from f32s; see as_f64_slice.
        unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr() as *const f32,
                self.shape.num_elements(),
            )
        }
    }

    /// Interprets the buffer as a slice of `f16`.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::F16`.
    pub fn as_f16_slice(&self) -> &[f16] {
        assert_eq!(
            self.dtype,
            DType::F16,
            "as_f16_slice called on {:?} tensor",
            self.dtype
        );
        // SAFETY: f16 is a transparent wrapper over u16; data was
        // constructed from f16s.
        unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr() as *const f16,
                self.shape.num_elements(),
            )
        }
    }

    /// Interprets the buffer as a slice of `bf16`.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::BF16`.
    pub fn as_bf16_slice(&self) -> &[bf16] {
        assert_eq!(
            self.dtype,
            DType::BF16,
            "as_bf16_slice called on {:?} tensor",
            self.dtype
        );
        // SAFETY: bf16 is a transparent wrapper over u16; data was
        // constructed from bf16s.
        unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr() as *const bf16,
                self.shape.num_elements(),
            )
        }
    }

    /// Interprets the buffer as a mutable slice of `f32`.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::F32`.
    pub fn as_f32_slice_mut(&mut self) -> &mut [f32] {
        assert_eq!(
            self.dtype,
            DType::F32,
            "as_f32_slice_mut called on {:?} tensor",
            self.dtype
        );
        let n = self.shape.num_elements();
        // SAFETY: data was constructed from f32s; see as_f64_slice.
        unsafe { std::slice::from_raw_parts_mut(self.data.as_mut_ptr() as *mut f32, n) }
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Converts the buffer to `f32` values, upcasting narrow element types.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.view().to_f32_vec()
    }

    /// Converts the buffer to `f64` values, upcasting every element type.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.view().to_f64_vec()
    }
}

/// A borrowed, read-only view over a [`Tensor`]'s data.
///
/// Views are zero-copy and tied to the lifetime of the source tensor,
/// enforced by the borrow checker.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a Shape,
    dtype: DType,
    data: &'a [u8],
}

impl<'a> TensorView<'a> {
    /// Creates a view from raw parts (used internally by tensor ops).
    pub fn from_parts(shape: &'a Shape, dtype: DType, data: &'a [u8]) -> Self {
        Self { shape, dtype, data }
    }

    /// Returns the shape of the viewed tensor.
    pub fn shape(&self) -> &Shape {
        self.shape
    }

    /// Returns the data type of the viewed tensor.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        self.data
    }

    /// Interprets the view as a slice of `f64`.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::F64`.
    pub fn as_f64_slice(&self) -> &'a [f64] {
        assert_eq!(
            self.dtype,
            DType::F64,
            "as_f64_slice called on {:?} view",
            self.dtype
        );
        // SAFETY: data was constructed from f64s; see Tensor::as_f64_slice.
        unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr() as *const f64,
                self.shape.num_elements(),
            )
        }
    }

    /// Interprets the view as a slice of `f32`.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::F32`.
    pub fn as_f32_slice(&self) -> &'a [f32] {
        assert_eq!(
            self.dtype,
            DType::F32,
            "as_f32_slice called on {:?} view",
            self.dtype
        );
        // SAFETY: data was constructed from f32s; see Tensor::as_f64_slice.
        unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr() as *const f32,
                self.shape.num_elements(),
            )
        }
    }

    /// Interprets the view as a slice of `f16`.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::F16`.
    pub fn as_f16_slice(&self) -> &'a [f16] {
        assert_eq!(
            self.dtype,
            DType::F16,
            "as_f16_slice called on {:?} view",
            self.dtype
        );
        // SAFETY: f16 is a transparent wrapper over u16; data was
        // constructed from f16s.
        unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr() as *const f16,
                self.shape.num_elements(),
            )
        }
    }

    /// Interprets the view as a slice of `bf16`.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::BF16`.
    pub fn as_bf16_slice(&self) -> &'a [bf16] {
        assert_eq!(
            self.dtype,
            DType::BF16,
            "as_bf16_slice called on {:?} view",
            self.dtype
        );
        // SAFETY: bf16 is a transparent wrapper over u16; data was
        // constructed from bf16s.
        unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr() as *const bf16,
                self.shape.num_elements(),
            )
        }
    }

    /// Converts the viewed buffer to `f32` values.
    ///
    /// This is the upcast half of the upcast/downcast boundary for the
    /// reduced-precision types; `F64` values are truncated to `f32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self.dtype {
            DType::F64 => self.as_f64_slice().iter().map(|&v| v as f32).collect(),
            DType::F32 => self.as_f32_slice().to_vec(),
            DType::F16 => self.as_f16_slice().iter().map(|v| v.to_f32()).collect(),
            DType::BF16 => self.as_bf16_slice().iter().map(|v| v.to_f32()).collect(),
        }
    }

    /// Converts the viewed buffer to `f64` values (lossless for every dtype).
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self.dtype {
            DType::F64 => self.as_f64_slice().to_vec(),
            DType::F32 => self.as_f32_slice().iter().map(|&v| v as f64).collect(),
            DType::F16 => self.as_f16_slice().iter().map(|v| v.to_f64()).collect(),
            DType::BF16 => self.as_bf16_slice().iter().map(|v| v.to_f64()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        assert_eq!(t.size_bytes(), 24);
        assert_eq!(t.shape(), &Shape::matrix(2, 3));
        assert_eq!(t.dtype(), DType::F32);
        assert!(t.as_f32_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_from_f32() {
        let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let t = Tensor::from_f32(Shape::matrix(2, 3), &data).unwrap();
        assert_eq!(t.as_f32_slice(), &data);
    }

    #[test]
    fn test_from_f64() {
        let data = vec![1.5f64, -2.5, 0.0];
        let t = Tensor::from_f64(Shape::vector(3), &data).unwrap();
        assert_eq!(t.dtype(), DType::F64);
        assert_eq!(t.as_f64_slice(), &data);
    }

    #[test]
    fn test_from_bytes_size_mismatch() {
        let result = Tensor::from_bytes(Shape::matrix(2, 3), DType::F32, vec![0u8; 10]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_f32_length_mismatch() {
        let result = Tensor::from_f32(Shape::vector(4), &[1.0, 2.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_view_lifetime() {
        let t = Tensor::from_f32(Shape::vector(4), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let v = t.view();
        assert_eq!(v.shape(), &Shape::vector(4));
        assert_eq!(v.as_f32_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_f16_roundtrip() {
        let values: Vec<f16> = [0.5f32, -1.25, 3.0]
            .iter()
            .map(|&v| f16::from_f32(v))
            .collect();
        let t = Tensor::from_f16(Shape::vector(3), &values).unwrap();
        assert_eq!(t.dtype(), DType::F16);
        assert_eq!(t.size_bytes(), 6);
        assert_eq!(t.to_f32_vec(), vec![0.5, -1.25, 3.0]);
    }

    #[test]
    fn test_bf16_roundtrip() {
        let values: Vec<bf16> = [1.0f32, -2.0, 0.5]
            .iter()
            .map(|&v| bf16::from_f32(v))
            .collect();
        let t = Tensor::from_bf16(Shape::vector(3), &values).unwrap();
        assert_eq!(t.to_f32_vec(), vec![1.0, -2.0, 0.5]);
    }

    #[test]
    fn test_from_f32_cast_rounds_through_storage() {
        // 0.1 is not exactly representable in f16; the cast must store the
        // rounded value, not the original.
        let t = Tensor::from_f32_cast(Shape::vector(1), &[0.1], DType::F16).unwrap();
        let stored = t.to_f32_vec()[0];
        assert_ne!(stored, 0.1f32);
        assert!((stored - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_to_f64_vec_upcasts() {
        let t = Tensor::from_f32(Shape::vector(2), &[1.5, -0.25]).unwrap();
        assert_eq!(t.to_f64_vec(), vec![1.5f64, -0.25]);
    }

    #[test]
    fn test_as_f32_mut() {
        let mut t = Tensor::zeros(Shape::vector(3), DType::F32);
        let slice = t.as_f32_slice_mut();
        slice[0] = 10.0;
        slice[1] = 20.0;
        slice[2] = 30.0;
        assert_eq!(t.as_f32_slice(), &[10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_view_from_parts() {
        let shape = Shape::vector(2);
        let t = Tensor::from_f32(shape.clone(), &[7.0, 8.0]).unwrap();
        let v = TensorView::from_parts(&shape, t.dtype(), t.as_bytes());
        assert_eq!(v.as_f32_slice(), &[7.0, 8.0]);
    }
}
