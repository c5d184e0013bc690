//! Kernel parameters: ordered name → scalar / vec2 / vec3.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// A single kernel parameter value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
}

impl ParamValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Scalar(_) => "scalar",
            ParamValue::Vec2(_) => "vec2",
            ParamValue::Vec3(_) => "vec3",
        }
    }

    pub fn same_kind(&self, other: &ParamValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Zero-padded `vec4` layout used for GPU uniform upload.
    pub fn as_vec4(&self) -> [f32; 4] {
        match *self {
            ParamValue::Scalar(v) => [v, 0.0, 0.0, 0.0],
            ParamValue::Vec2([x, y]) => [x, y, 0.0, 0.0],
            ParamValue::Vec3([x, y, z]) => [x, y, z, 0.0],
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Scalar(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Scalar(if v { 1.0 } else { 0.0 })
    }
}

impl From<[f32; 2]> for ParamValue {
    fn from(v: [f32; 2]) -> Self {
        ParamValue::Vec2(v)
    }
}

impl From<[f32; 3]> for ParamValue {
    fn from(v: [f32; 3]) -> Self {
        ParamValue::Vec3(v)
    }
}

impl From<Vec2> for ParamValue {
    fn from(v: Vec2) -> Self {
        ParamValue::Vec2(v.to_array())
    }
}

impl From<Vec3> for ParamValue {
    fn from(v: Vec3) -> Self {
        ParamValue::Vec3(v.to_array())
    }
}

/// Ordered parameter set. Registration order fixes the GPU uniform layout.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamSet {
    entries: Vec<(String, ParamValue)>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`ParamSet::insert`].
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds or replaces a parameter, keeping its original position.
    pub fn insert(&mut self, name: &str, value: impl Into<ParamValue>) {
        let value = value.into();
        match self.get_mut(name) {
            Some(slot) => *slot = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ParamValue> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Missing or non-scalar parameters read as zero.
    pub fn scalar(&self, name: &str) -> f32 {
        match self.get(name) {
            Some(ParamValue::Scalar(v)) => *v,
            _ => 0.0,
        }
    }

    pub fn vec2(&self, name: &str) -> Vec2 {
        match self.get(name) {
            Some(ParamValue::Vec2(v)) => Vec2::from_array(*v),
            _ => Vec2::ZERO,
        }
    }

    pub fn vec3(&self, name: &str) -> Vec3 {
        match self.get(name) {
            Some(ParamValue::Vec3(v)) => Vec3::from_array(*v),
            _ => Vec3::ZERO,
        }
    }
}
