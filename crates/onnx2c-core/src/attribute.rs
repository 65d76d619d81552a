// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! Attribute types for nodes.
//!
//! An [`Attr`] carries its parsed value directly (`AttrValue`) rather than
//! leaving parsing to call sites — operator `parse_attributes` implementations
//! read off `AttrValue` variants with `Attr::as_*` accessors, mirroring how
//! `parse_attribute_int`/`parse_attribute_ints`/… work in the original
//! implementation this crate's operator set is grounded on.

use crate::enums::AttributeType;

/// An embedded tensor literal, as carried by a `Tensor`-typed attribute
/// (e.g. `Constant`'s `value` attribute). Distinct from [`crate::tensor::Tensor`]:
/// this is the attribute-parsing-time shape before the tensor has been
/// registered into a `Graph` arena.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
    pub dims: Vec<i64>,
    pub data_type: crate::enums::DataType,
    pub raw_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Float(f32),
    Int(i64),
    String(String),
    Tensor(RawTensor),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
}

impl AttrValue {
    pub fn type_tag(&self) -> AttributeType {
        match self {
            AttrValue::Float(_) => AttributeType::Float,
            AttrValue::Int(_) => AttributeType::Int,
            AttrValue::String(_) => AttributeType::String,
            AttrValue::Tensor(_) => AttributeType::Tensor,
            AttrValue::Floats(_) => AttributeType::Floats,
            AttrValue::Ints(_) => AttributeType::Ints,
            AttrValue::Strings(_) => AttributeType::Strings,
        }
    }
}

/// A parsed ONNX attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: String,
    pub value: AttrValue,
    pub doc_string: Option<String>,
}

impl Attr {
    pub fn new(name: impl Into<String>, value: AttrValue) -> Self {
        Attr {
            name: name.into(),
            value,
            doc_string: None,
        }
    }

    pub fn float(name: impl Into<String>, v: f32) -> Self {
        Attr::new(name, AttrValue::Float(v))
    }

    pub fn int(name: impl Into<String>, v: i64) -> Self {
        Attr::new(name, AttrValue::Int(v))
    }

    pub fn string(name: impl Into<String>, v: impl Into<String>) -> Self {
        Attr::new(name, AttrValue::String(v.into()))
    }

    pub fn floats(name: impl Into<String>, v: Vec<f32>) -> Self {
        Attr::new(name, AttrValue::Floats(v))
    }

    pub fn ints(name: impl Into<String>, v: Vec<i64>) -> Self {
        Attr::new(name, AttrValue::Ints(v))
    }

    pub fn strings(name: impl Into<String>, v: Vec<String>) -> Self {
        Attr::new(name, AttrValue::Strings(v))
    }

    pub fn tensor(name: impl Into<String>, v: RawTensor) -> Self {
        Attr::new(name, AttrValue::Tensor(v))
    }

    pub fn type_(&self) -> AttributeType {
        self.value.type_tag()
    }

    pub fn as_float(&self) -> Option<f32> {
        match &self.value {
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match &self.value {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match &self.value {
            AttrValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f32]> {
        match &self.value {
            AttrValue::Floats(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match &self.value {
            AttrValue::Ints(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&RawTensor> {
        match &self.value {
            AttrValue::Tensor(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_values() {
        let a = Attr::float("alpha", 0.5);
        assert_eq!(a.as_float(), Some(0.5));
        assert_eq!(a.type_(), AttributeType::Float);

        let b = Attr::ints("pads", vec![1, 1, 1, 1]);
        assert_eq!(b.as_ints(), Some(&[1, 1, 1, 1][..]));

        let c = Attr::string("mode", "constant");
        assert_eq!(c.as_string(), Some("constant"));
    }

    #[test]
    fn wrong_accessor_returns_none() {
        let a = Attr::int("axis", 1);
        assert_eq!(a.as_float(), None);
        assert_eq!(a.as_string(), None);
        assert_eq!(a.as_int(), Some(1));
    }
}
