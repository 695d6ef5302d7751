//! # Scene Nodes
//!
//! Nodes are tagged variants ([`NodeOp`]) over fixed configuration. A
//! configuration value is a [`Param`]: either a literal, which makes the node
//! fixed and lets the evaluator memoize its result, or a function of the
//! per-frame [`Scope`], which is re-evaluated on every traversal.
//!
//! ## Building a graph
//!
//! The free functions in this module ([`scale`], [`look_at`], [`selector`], ...)
//! return [`NodeSpec`]s, an owned tree description. Children are attached with
//! [`NodeSpec::child`]; the finished tree is handed to
//! [`SceneBuilder`](super::SceneBuilder), which moves it into the scene's node
//! arena and assigns each node a [`NodeId`].
//!
//! ```ignore
//! let root = node().child(
//!     selector(dynamic(|scope| Ok(vec![scope.get_index("activeView")?])))
//!         .child(look_at(LookAtParams::eye(Xyz::z(10.0))).child(instance("theScene")))
//!         .child(look_at(LookAtParams::eye(Xyz::x(10.0))).child(instance("theScene"))),
//! );
//! ```

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::error::SceneResult;
use super::objects::Geometry;
use super::scope::{Scope, ScopeValue};
use crate::backend::{BackendKind, LightSource, MaterialState, UniformValue};
use crate::foundation::collections::new_key_type;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};

new_key_type! {
    /// Identity of a node within its scene
    pub struct NodeId;
}

/// Node type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Pass-through grouping node
    Group,
    /// Scaling model transform
    Scale,
    /// Translating model transform
    Translate,
    /// Rotating model transform
    Rotate,
    /// Literal model transform matrix
    Matrix,
    /// Viewing transform
    LookAt,
    /// Projection
    Camera,
    /// Light sources
    Lights,
    /// Surface material
    Material,
    /// Plugin backend state
    State,
    /// Scope extension
    WithData,
    /// Dynamic child selection
    Selector,
    /// Named reusable subgraph
    Symbol,
    /// Reference to a symbol
    Instance,
    /// Drawable mesh
    Geometry,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Group => "group",
            NodeKind::Scale => "scale",
            NodeKind::Translate => "translate",
            NodeKind::Rotate => "rotate",
            NodeKind::Matrix => "matrix",
            NodeKind::LookAt => "lookAt",
            NodeKind::Camera => "camera",
            NodeKind::Lights => "lights",
            NodeKind::Material => "material",
            NodeKind::State => "state",
            NodeKind::WithData => "withData",
            NodeKind::Selector => "selector",
            NodeKind::Symbol => "symbol",
            NodeKind::Instance => "instance",
            NodeKind::Geometry => "geometry",
        };
        f.write_str(name)
    }
}

/// Configuration value: a literal or a function of the scope
pub enum Param<T> {
    /// Literal configuration, eligible for memoization
    Fixed(T),
    /// Computed from the scope on every traversal
    Dynamic(Box<dyn Fn(&Scope) -> SceneResult<T>>),
}

impl<T: Clone> Param<T> {
    /// Whether the value is literal
    pub fn is_fixed(&self) -> bool {
        matches!(self, Param::Fixed(_))
    }

    /// Value for this traversal
    pub fn resolve(&self, scope: &Scope) -> SceneResult<T> {
        match self {
            Param::Fixed(value) => Ok(value.clone()),
            Param::Dynamic(compute) => compute(scope),
        }
    }
}

impl<T> From<T> for Param<T> {
    fn from(value: T) -> Self {
        Param::Fixed(value)
    }
}

impl From<Vec<LightSource>> for Param<Rc<[LightSource]>> {
    fn from(sources: Vec<LightSource>) -> Self {
        Param::Fixed(Rc::from(sources))
    }
}

impl<T: fmt::Debug> fmt::Debug for Param<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Param::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Configuration computed from the scope
pub fn dynamic<T, F>(compute: F) -> Param<T>
where
    F: Fn(&Scope) -> SceneResult<T> + 'static,
{
    Param::Dynamic(Box::new(compute))
}

/// Three components; an unset component is `0`
///
/// Scale nodes see an unset axis as a zero factor, collapsing that axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Xyz {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Xyz {
    /// All three components
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Only x set
    pub const fn x(x: f32) -> Self {
        Self::new(x, 0.0, 0.0)
    }

    /// Only y set
    pub const fn y(y: f32) -> Self {
        Self::new(0.0, y, 0.0)
    }

    /// Only z set
    pub const fn z(z: f32) -> Self {
        Self::new(0.0, 0.0, z)
    }

    /// Replace x
    pub fn with_x(mut self, x: f32) -> Self {
        self.x = x;
        self
    }

    /// Replace y
    pub fn with_y(mut self, y: f32) -> Self {
        self.y = y;
        self
    }

    /// Replace z
    pub fn with_z(mut self, z: f32) -> Self {
        self.z = z;
        self
    }

    /// As a vector
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl From<Vec3> for Xyz {
    fn from(value: Vec3) -> Self {
        Self::new(value.x, value.y, value.z)
    }
}

/// Rotation configuration
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RotateParams {
    /// Angle in degrees
    pub angle: f32,
    /// Rotation axis; a zero axis leaves the transform unchanged
    pub axis: Xyz,
}

impl RotateParams {
    /// Rotation by `angle` degrees about `axis`
    pub const fn new(angle: f32, axis: Xyz) -> Self {
        Self { angle, axis }
    }
}

/// Viewing transform configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookAtParams {
    /// Eye position
    pub eye: Xyz,
    /// Point looked at
    pub look: Xyz,
    /// Up direction
    pub up: Xyz,
}

impl Default for LookAtParams {
    fn default() -> Self {
        Self {
            eye: Xyz::default(),
            look: Xyz::default(),
            up: Xyz::y(1.0),
        }
    }
}

impl LookAtParams {
    /// Eye at `eye` looking at the origin with +Y up
    pub fn eye(eye: Xyz) -> Self {
        Self {
            eye,
            ..Self::default()
        }
    }

    /// Replace the look-at point
    pub fn looking_at(mut self, look: Xyz) -> Self {
        self.look = look;
        self
    }

    /// Replace the up direction
    pub fn with_up(mut self, up: Xyz) -> Self {
        self.up = up;
        self
    }

    /// View matrix
    pub fn matrix(&self) -> Mat4 {
        Mat4::look_at(self.eye.to_vec3(), self.look.to_vec3(), self.up.to_vec3())
    }
}

/// Camera projection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Optics {
    /// Perspective projection
    Perspective {
        /// Vertical field of view in degrees
        fovy: f32,
        /// Width over height
        aspect: f32,
        /// Near clip distance
        near: f32,
        /// Far clip distance
        far: f32,
    },
    /// Orthographic projection
    Ortho {
        /// Left clip plane
        left: f32,
        /// Right clip plane
        right: f32,
        /// Bottom clip plane
        bottom: f32,
        /// Top clip plane
        top: f32,
        /// Near clip distance
        near: f32,
        /// Far clip distance
        far: f32,
    },
}

impl Optics {
    /// Perspective optics
    pub fn perspective(fovy: f32, aspect: f32, near: f32, far: f32) -> Self {
        Optics::Perspective { fovy, aspect, near, far }
    }

    /// Projection matrix
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Optics::Perspective { fovy, aspect, near, far } => Mat4::perspective(fovy, aspect, near, far),
            Optics::Ortho { left, right, bottom, top, near, far } => {
                Mat4::orthographic(left, right, bottom, top, near, far)
            }
        }
    }
}

/// Node operation and its configuration
#[derive(Debug)]
pub enum NodeOp {
    /// Visits its children
    Group,
    /// Scales the model transform
    Scale(Param<Xyz>),
    /// Translates the model transform
    Translate(Param<Xyz>),
    /// Rotates the model transform
    Rotate(Param<RotateParams>),
    /// Multiplies the model transform by a literal matrix
    Matrix(Param<Mat4>),
    /// Composes a viewing transform onto the view transform
    LookAt(Param<LookAtParams>),
    /// Sets the projection
    Camera(Param<Optics>),
    /// Sets the light sources
    Lights(Param<Rc<[LightSource]>>),
    /// Sets the material
    Material(Param<MaterialState>),
    /// Sets the state of the backend installed for the kind
    State(BackendKind, Param<UniformValue>),
    /// Extends the scope
    WithData(Vec<(String, ScopeValue)>),
    /// Visits the children whose indices the configuration returns
    Selector(Param<Vec<usize>>),
    /// Names its subtree
    Symbol(String),
    /// Evaluates the named symbol in place
    Instance(String),
    /// Draws a mesh
    Geometry(Rc<Geometry>),
}

impl NodeOp {
    /// Type tag
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeOp::Group => NodeKind::Group,
            NodeOp::Scale(_) => NodeKind::Scale,
            NodeOp::Translate(_) => NodeKind::Translate,
            NodeOp::Rotate(_) => NodeKind::Rotate,
            NodeOp::Matrix(_) => NodeKind::Matrix,
            NodeOp::LookAt(_) => NodeKind::LookAt,
            NodeOp::Camera(_) => NodeKind::Camera,
            NodeOp::Lights(_) => NodeKind::Lights,
            NodeOp::Material(_) => NodeKind::Material,
            NodeOp::State(..) => NodeKind::State,
            NodeOp::WithData(_) => NodeKind::WithData,
            NodeOp::Selector(_) => NodeKind::Selector,
            NodeOp::Symbol(_) => NodeKind::Symbol,
            NodeOp::Instance(_) => NodeKind::Instance,
            NodeOp::Geometry(_) => NodeKind::Geometry,
        }
    }

    /// Whether the configuration is literal
    pub fn is_fixed(&self) -> bool {
        match self {
            NodeOp::Scale(param) | NodeOp::Translate(param) => param.is_fixed(),
            NodeOp::Rotate(param) => param.is_fixed(),
            NodeOp::Matrix(param) => param.is_fixed(),
            NodeOp::LookAt(param) => param.is_fixed(),
            NodeOp::Camera(param) => param.is_fixed(),
            NodeOp::Lights(param) => param.is_fixed(),
            NodeOp::Material(param) => param.is_fixed(),
            NodeOp::State(_, param) => param.is_fixed(),
            NodeOp::Selector(_) => false,
            NodeOp::Group
            | NodeOp::WithData(_)
            | NodeOp::Symbol(_)
            | NodeOp::Instance(_)
            | NodeOp::Geometry(_) => true,
        }
    }
}

/// A node in the scene arena
#[derive(Debug)]
pub struct Node {
    op: NodeOp,
    children: Vec<NodeId>,
    label: Option<String>,
}

impl Node {
    pub(crate) fn new(op: NodeOp, children: Vec<NodeId>, label: Option<String>) -> Self {
        Self { op, children, label }
    }

    /// Operation and configuration
    pub fn op(&self) -> &NodeOp {
        &self.op
    }

    /// Type tag
    pub fn kind(&self) -> NodeKind {
        self.op.kind()
    }

    /// Children in declaration order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Optional human-readable label
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// Owned description of a node and its subtree
#[derive(Debug)]
pub struct NodeSpec {
    pub(crate) op: NodeOp,
    pub(crate) children: Vec<NodeSpec>,
    pub(crate) label: Option<String>,
}

impl NodeSpec {
    /// Node with no children
    pub fn new(op: NodeOp) -> Self {
        Self {
            op,
            children: Vec::new(),
            label: None,
        }
    }

    /// Append a child
    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Append several children
    pub fn children(mut self, children: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.children.extend(children);
        self
    }

    /// Attach a label, used in logs
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Type tag
    pub fn kind(&self) -> NodeKind {
        self.op.kind()
    }
}

/// Grouping node
pub fn node() -> NodeSpec {
    NodeSpec::new(NodeOp::Group)
}

/// Scaling node
pub fn scale(factors: impl Into<Param<Xyz>>) -> NodeSpec {
    NodeSpec::new(NodeOp::Scale(factors.into()))
}

/// Translation node
pub fn translate(offset: impl Into<Param<Xyz>>) -> NodeSpec {
    NodeSpec::new(NodeOp::Translate(offset.into()))
}

/// Rotation node
pub fn rotate(rotation: impl Into<Param<RotateParams>>) -> NodeSpec {
    NodeSpec::new(NodeOp::Rotate(rotation.into()))
}

/// Literal model matrix node
pub fn matrix(matrix: impl Into<Param<Mat4>>) -> NodeSpec {
    NodeSpec::new(NodeOp::Matrix(matrix.into()))
}

/// Viewing transform node
pub fn look_at(params: impl Into<Param<LookAtParams>>) -> NodeSpec {
    NodeSpec::new(NodeOp::LookAt(params.into()))
}

/// Camera node
pub fn camera(optics: impl Into<Param<Optics>>) -> NodeSpec {
    NodeSpec::new(NodeOp::Camera(optics.into()))
}

/// Lights node
pub fn lights(sources: impl Into<Param<Rc<[LightSource]>>>) -> NodeSpec {
    NodeSpec::new(NodeOp::Lights(sources.into()))
}

/// Material node
pub fn material(material: impl Into<Param<MaterialState>>) -> NodeSpec {
    NodeSpec::new(NodeOp::Material(material.into()))
}

/// Node setting the state of the plugin backend installed as `kind`
///
/// The backend sees the value while the subtree is visited and gets its
/// previous value back afterwards.
pub fn backend_state(kind: &str, value: impl Into<Param<UniformValue>>) -> NodeSpec {
    NodeSpec::new(NodeOp::State(BackendKind::from_name(kind), value.into()))
}

/// Scope-extending node
pub fn with_data<K, V>(data: impl IntoIterator<Item = (K, V)>) -> NodeSpec
where
    K: Into<String>,
    V: Into<ScopeValue>,
{
    let data = data
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect();
    NodeSpec::new(NodeOp::WithData(data))
}

/// Selector node
pub fn selector(selection: impl Into<Param<Vec<usize>>>) -> NodeSpec {
    NodeSpec::new(NodeOp::Selector(selection.into()))
}

/// Symbol node
pub fn symbol(name: impl Into<String>) -> NodeSpec {
    NodeSpec::new(NodeOp::Symbol(name.into()))
}

/// Instance node
pub fn instance(name: impl Into<String>) -> NodeSpec {
    NodeSpec::new(NodeOp::Instance(name.into()))
}

/// Geometry node
pub fn geometry(mesh: impl Into<Rc<Geometry>>) -> NodeSpec {
    NodeSpec::new(NodeOp::Geometry(mesh.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneError;
    use approx::assert_relative_eq;

    #[test]
    fn test_literal_configuration_is_fixed() {
        assert!(scale(Xyz::new(1.0, 2.0, 3.0)).op.is_fixed());
        assert!(!scale(dynamic(|scope| Ok(Xyz::x(scope.get_number("s")? as f32)))).op.is_fixed());
        assert!(!selector(vec![0]).op.is_fixed());
    }

    #[test]
    fn test_dynamic_param_reads_scope() {
        let param: Param<Xyz> = dynamic(|scope| Ok(Xyz::y(scope.get_number("height")? as f32)));
        let scope = Scope::from_data([("height", 4.0)]);
        assert_eq!(param.resolve(&scope).expect("resolved"), Xyz::y(4.0));
        assert!(matches!(param.resolve(&Scope::new()), Err(SceneError::ScopeLookup(_))));
    }

    #[test]
    fn test_look_at_defaults_up_to_y() {
        let params = LookAtParams::eye(Xyz::z(10.0));
        assert_eq!(params.up, Xyz::new(0.0, 1.0, 0.0));
        let eye = params.matrix().transform_point(&crate::foundation::math::Point3::new(0.0, 0.0, 10.0));
        assert_relative_eq!(eye.coords.norm(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_optics_from_toml() {
        let optics: Optics =
            toml::from_str("type = \"perspective\"\nfovy = 65.0\naspect = 1.0\nnear = 0.1\nfar = 300.0")
                .expect("valid optics");
        assert_eq!(optics, Optics::perspective(65.0, 1.0, 0.1, 300.0));
    }

    #[test]
    fn test_backend_state_targets_named_kind() {
        let spec = backend_state("fog", UniformValue::Float(0.5));
        assert_eq!(spec.kind(), NodeKind::State);
        assert!(matches!(&spec.op, NodeOp::State(BackendKind::Custom(name), param) if name == "fog" && param.is_fixed()));
    }

    #[test]
    fn test_spec_builder_keeps_declaration_order() {
        let spec = node()
            .child(translate(Xyz::x(1.0)).label("first"))
            .children([translate(Xyz::x(2.0)), instance("thing")]);
        let kinds: Vec<NodeKind> = spec.children.iter().map(NodeSpec::kind).collect();
        assert_eq!(kinds, vec![NodeKind::Translate, NodeKind::Translate, NodeKind::Instance]);
        assert_eq!(spec.children[0].label.as_deref(), Some("first"));
    }
}
