//! Observation values.
//!
//! A step observation maps dotted keys to [`Value`]s. Sensor arrays are
//! carried as [`Tensor`]s: a shape plus a typed, row-major buffer.
//!
//! ## Equality Rules
//!
//! - Different variants are never equal (`Int(1) != Float(1.0)`)
//! - Tensors compare by shape and by buffer, including dtype
//! - Float comparison follows IEEE-754 (`NaN != NaN`)

use serde::{Deserialize, Serialize};

/// Element type of a tensor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 8-bit unsigned (image pixels)
    Uint8,
    /// 32-bit signed
    Int32,
    /// 64-bit signed
    Int64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// Boolean
    Bool,
}

impl DType {
    /// Canonical name, as written into feature specs and `info.json`
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Uint8 => "uint8",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Bool => "bool",
        }
    }

    /// True for floating point element types
    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed tensor storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum TensorData {
    /// `uint8`
    #[serde(rename = "uint8")]
    U8(Vec<u8>),
    /// `int32`
    #[serde(rename = "int32")]
    I32(Vec<i32>),
    /// `int64`
    #[serde(rename = "int64")]
    I64(Vec<i64>),
    /// `float32`
    #[serde(rename = "float32")]
    F32(Vec<f32>),
    /// `float64`
    #[serde(rename = "float64")]
    F64(Vec<f64>),
    /// `bool`
    #[serde(rename = "bool")]
    Bool(Vec<bool>),
}

impl TensorData {
    /// Element type
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::U8(_) => DType::Uint8,
            TensorData::I32(_) => DType::Int32,
            TensorData::I64(_) => DType::Int64,
            TensorData::F32(_) => DType::Float32,
            TensorData::F64(_) => DType::Float64,
            TensorData::Bool(_) => DType::Bool,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            TensorData::U8(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::I64(v) => v.len(),
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
            TensorData::Bool(v) => v.len(),
        }
    }

    /// True when the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen every element to f64.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            TensorData::U8(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::I32(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::I64(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::F32(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::F64(v) => v.clone(),
            TensorData::Bool(v) => v.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect(),
        }
    }

    /// Pixel bytes: u8 passes through, floats are clamped into `[0, 255]`,
    /// integers saturate.
    pub fn to_u8(&self) -> Vec<u8> {
        match self {
            TensorData::U8(v) => v.clone(),
            TensorData::Bool(v) => v.iter().map(|&x| if x { 255 } else { 0 }).collect(),
            other => other
                .to_f64()
                .into_iter()
                .map(|x| if x.is_nan() { 0 } else { x.clamp(0.0, 255.0) as u8 })
                .collect(),
        }
    }

    /// True when any float element is NaN or infinite. Always false for
    /// integer buffers.
    pub fn has_non_finite(&self) -> bool {
        match self {
            TensorData::F32(v) => v.iter().any(|x| !x.is_finite()),
            TensorData::F64(v) => v.iter().any(|x| !x.is_finite()),
            _ => false,
        }
    }
}

/// N-dimensional array in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Dimensions, outermost first
    pub shape: Vec<usize>,
    /// Element buffer
    pub data: TensorData,
}

impl Tensor {
    /// Build a tensor. The caller is responsible for `shape` matching the
    /// buffer length; integrity validators report mismatches.
    pub fn new(shape: Vec<usize>, data: TensorData) -> Self {
        Tensor { shape, data }
    }

    /// Zero-filled `h x w x 3` RGB image.
    pub fn rgb(height: usize, width: usize) -> Self {
        Tensor::new(
            vec![height, width, 3],
            TensorData::U8(vec![0; height * width * 3]),
        )
    }

    /// One-dimensional f32 vector.
    pub fn vector(values: Vec<f32>) -> Self {
        Tensor::new(vec![values.len()], TensorData::F32(values))
    }

    /// Element type
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Number of dimensions
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Product of the shape
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// A single observation value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Sensor array (images, state vectors, depth)
    Tensor(Tensor),
    /// Scalar float
    Float(f64),
    /// Scalar integer
    Int(i64),
    /// Scalar boolean
    Bool(bool),
    /// UTF-8 text (e.g. language instruction)
    String(String),
    /// Opaque bytes
    Bytes(Vec<u8>),
}

impl Value {
    /// Type name used in findings and inferred feature specs
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Tensor(_) => "tensor",
            Value::Float(_) => "float64",
            Value::Int(_) => "int64",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
        }
    }

    /// Borrow the tensor, if this is one
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// Borrow the string, if this is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content widened to f64. `None` for strings and bytes.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Value::Tensor(t) => Some(t.data.to_f64()),
            Value::Float(x) => Some(vec![*x]),
            Value::Int(x) => Some(vec![*x as f64]),
            Value::Bool(x) => Some(vec![if *x { 1.0 } else { 0.0 }]),
            Value::String(_) | Value::Bytes(_) => None,
        }
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Value::Tensor(t)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Value::Int(x)
    }
}

impl From<bool> for Value {
    fn from(x: bool) -> Self {
        Value::Bool(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_pixels_clamp_into_u8() {
        let data = TensorData::F32(vec![-3.0, 0.4, 128.9, 900.0, f32::NAN]);
        assert_eq!(data.to_u8(), vec![0, 0, 128, 255, 0]);
    }

    #[test]
    fn test_non_finite_only_for_floats() {
        assert!(TensorData::F64(vec![1.0, f64::INFINITY]).has_non_finite());
        assert!(!TensorData::I64(vec![i64::MAX]).has_non_finite());
    }

    #[test]
    fn test_value_serde_is_tagged() {
        let v = Value::Tensor(Tensor::vector(vec![1.0, 2.0]));
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["type"], "tensor");
        assert_eq!(json["value"]["data"]["dtype"], "float32");

        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_variants_never_equal_across_types() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::String("a".into()), Value::Bytes(b"a".to_vec()));
    }
}
