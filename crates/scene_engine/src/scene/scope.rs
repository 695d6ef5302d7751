//! Per-traversal variable scope
//!
//! A [`Scope`] is a layered, immutable key/value map. The scene root builds
//! one from the data passed to `set_data`; nodes that add data create a new
//! layer on top, visible only to their subtree. Layers share their parents
//! through `Rc`, so extending a scope never copies it.
//!
//! Reading an undefined variable is an error, never a silent default. Use
//! [`Scope::number_or`] when a default is genuinely intended.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::error::{SceneError, SceneResult};
use crate::foundation::math::Vec3;

/// Value stored in a scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Number(f64),
    /// String
    Text(String),
    /// Three-component vector
    Vector([f32; 3]),
}

impl ScopeValue {
    fn type_name(&self) -> &'static str {
        match self {
            ScopeValue::Bool(_) => "bool",
            ScopeValue::Int(_) => "int",
            ScopeValue::Number(_) => "number",
            ScopeValue::Text(_) => "text",
            ScopeValue::Vector(_) => "vector",
        }
    }
}

impl fmt::Display for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeValue::Bool(value) => write!(f, "{value}"),
            ScopeValue::Int(value) => write!(f, "{value}"),
            ScopeValue::Number(value) => write!(f, "{value}"),
            ScopeValue::Text(value) => write!(f, "{value:?}"),
            ScopeValue::Vector([x, y, z]) => write!(f, "({x}, {y}, {z})"),
        }
    }
}

impl From<bool> for ScopeValue {
    fn from(value: bool) -> Self {
        ScopeValue::Bool(value)
    }
}

impl From<i32> for ScopeValue {
    fn from(value: i32) -> Self {
        ScopeValue::Int(i64::from(value))
    }
}

impl From<i64> for ScopeValue {
    fn from(value: i64) -> Self {
        ScopeValue::Int(value)
    }
}

impl From<usize> for ScopeValue {
    fn from(value: usize) -> Self {
        ScopeValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f32> for ScopeValue {
    fn from(value: f32) -> Self {
        ScopeValue::Number(f64::from(value))
    }
}

impl From<f64> for ScopeValue {
    fn from(value: f64) -> Self {
        ScopeValue::Number(value)
    }
}

impl From<&str> for ScopeValue {
    fn from(value: &str) -> Self {
        ScopeValue::Text(value.to_string())
    }
}

impl From<String> for ScopeValue {
    fn from(value: String) -> Self {
        ScopeValue::Text(value)
    }
}

impl From<[f32; 3]> for ScopeValue {
    fn from(value: [f32; 3]) -> Self {
        ScopeValue::Vector(value)
    }
}

impl From<Vec3> for ScopeValue {
    fn from(value: Vec3) -> Self {
        ScopeValue::Vector([value.x, value.y, value.z])
    }
}

struct Frame {
    values: HashMap<String, ScopeValue>,
    parent: Option<Rc<Frame>>,
}

/// Layered immutable variable scope
#[derive(Clone, Default)]
pub struct Scope {
    top: Option<Rc<Frame>>,
}

impl Scope {
    /// Empty scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope holding `data`
    pub fn from_data<K, V>(data: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<ScopeValue>,
    {
        Self::new().extend(data)
    }

    /// New scope layering `data` over this one
    ///
    /// Keys in `data` shadow the same keys further down. `self` is unchanged.
    pub fn extend<K, V>(&self, data: impl IntoIterator<Item = (K, V)>) -> Scope
    where
        K: Into<String>,
        V: Into<ScopeValue>,
    {
        let values: HashMap<String, ScopeValue> = data
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        if values.is_empty() {
            return self.clone();
        }
        Scope {
            top: Some(Rc::new(Frame {
                values,
                parent: self.top.clone(),
            })),
        }
    }

    /// Value of `name`, if defined
    pub fn try_get(&self, name: &str) -> Option<&ScopeValue> {
        let mut frame = self.top.as_deref();
        while let Some(current) = frame {
            if let Some(value) = current.values.get(name) {
                return Some(value);
            }
            frame = current.parent.as_deref();
        }
        None
    }

    /// Value of `name`
    pub fn get(&self, name: &str) -> SceneResult<&ScopeValue> {
        self.try_get(name)
            .ok_or_else(|| SceneError::ScopeLookup(name.to_string()))
    }

    /// Whether `name` is defined
    pub fn contains(&self, name: &str) -> bool {
        self.try_get(name).is_some()
    }

    /// Numeric value of `name`; integers are widened
    pub fn get_number(&self, name: &str) -> SceneResult<f64> {
        match self.get(name)? {
            ScopeValue::Number(value) => Ok(*value),
            ScopeValue::Int(value) => Ok(*value as f64),
            other => Err(type_error(name, "number", other)),
        }
    }

    /// Numeric value of `name`, or `default` when undefined
    pub fn number_or(&self, name: &str, default: f64) -> SceneResult<f64> {
        if self.contains(name) {
            self.get_number(name)
        } else {
            Ok(default)
        }
    }

    /// Non-negative integral value of `name`, as an index
    pub fn get_index(&self, name: &str) -> SceneResult<usize> {
        match self.get(name)? {
            ScopeValue::Int(value) => {
                usize::try_from(*value).map_err(|_| type_error(name, "index", &ScopeValue::Int(*value)))
            }
            ScopeValue::Number(value) if value.fract() == 0.0 && *value >= 0.0 => Ok(*value as usize),
            other => Err(type_error(name, "index", other)),
        }
    }

    /// Boolean value of `name`
    pub fn get_bool(&self, name: &str) -> SceneResult<bool> {
        match self.get(name)? {
            ScopeValue::Bool(value) => Ok(*value),
            other => Err(type_error(name, "bool", other)),
        }
    }

    /// String value of `name`
    pub fn get_str(&self, name: &str) -> SceneResult<&str> {
        match self.get(name)? {
            ScopeValue::Text(value) => Ok(value),
            other => Err(type_error(name, "text", other)),
        }
    }

    /// Vector value of `name`
    pub fn get_vector(&self, name: &str) -> SceneResult<Vec3> {
        match self.get(name)? {
            ScopeValue::Vector([x, y, z]) => Ok(Vec3::new(*x, *y, *z)),
            other => Err(type_error(name, "vector", other)),
        }
    }

    /// Number of layers
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut frame = self.top.as_deref();
        while let Some(current) = frame {
            depth += 1;
            frame = current.parent.as_deref();
        }
        depth
    }
}

fn type_error(name: &str, expected: &'static str, found: &ScopeValue) -> SceneError {
    log::trace!("Scope variable '{}' holds a {}, not a {}", name, found.type_name(), expected);
    SceneError::ScopeType {
        name: name.to_string(),
        expected,
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut visible: Vec<(&String, &ScopeValue)> = Vec::new();
        let mut frame = self.top.as_deref();
        while let Some(current) = frame {
            for (key, value) in &current.values {
                if !visible.iter().any(|(seen, _)| *seen == key) {
                    visible.push((key, value));
                }
            }
            frame = current.parent.as_deref();
        }
        visible.sort_by(|a, b| a.0.cmp(b.0));
        f.debug_map().entries(visible).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_lookup_is_an_error() {
        let scope = Scope::from_data([("activeView", 1)]);
        assert!(matches!(scope.get("missing"), Err(SceneError::ScopeLookup(name)) if name == "missing"));
    }

    #[test]
    fn test_extension_shadows_without_mutating_parent() {
        let parent = Scope::from_data([("angle", 10.0)]);
        let child = parent.extend([("angle", 45.0)]);

        assert_eq!(child.get_number("angle").expect("child"), 45.0);
        assert_eq!(parent.get_number("angle").expect("parent"), 10.0);
        assert_eq!(child.depth(), 2);
    }

    #[test]
    fn test_typed_accessors() {
        let scope = Scope::from_data([
            ("view", ScopeValue::from(2)),
            ("visible", ScopeValue::from(true)),
            ("label", ScopeValue::from("teapot")),
            ("eye", ScopeValue::from([0.0, 0.0, 10.0])),
        ]);

        assert_eq!(scope.get_index("view").expect("index"), 2);
        assert_eq!(scope.get_number("view").expect("widened"), 2.0);
        assert!(scope.get_bool("visible").expect("bool"));
        assert_eq!(scope.get_str("label").expect("text"), "teapot");
        assert_eq!(scope.get_vector("eye").expect("vector"), Vec3::new(0.0, 0.0, 10.0));
        assert!(matches!(scope.get_bool("view"), Err(SceneError::ScopeType { expected: "bool", .. })));
    }

    #[test]
    fn test_negative_index_is_rejected() {
        let scope = Scope::from_data([("view", -1)]);
        assert!(matches!(scope.get_index("view"), Err(SceneError::ScopeType { .. })));
    }

    #[test]
    fn test_number_or_only_defaults_when_undefined() {
        let scope = Scope::from_data([("label", "x")]);
        assert_eq!(scope.number_or("speed", 1.5).expect("default"), 1.5);
        assert!(scope.number_or("label", 1.5).is_err());
    }

    #[test]
    fn test_values_deserialize_untagged() {
        let data: HashMap<String, ScopeValue> =
            toml::from_str("activeView = 1\nscale = 0.5\nname = \"a\"").expect("valid data");
        assert_eq!(data["activeView"], ScopeValue::Int(1));
        assert_eq!(data["scale"], ScopeValue::Number(0.5));
        assert_eq!(data["name"], ScopeValue::Text("a".to_string()));
    }
}
