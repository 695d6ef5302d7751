//! Declarative scene graph
//!
//! A scene is a tree of typed nodes, built once and traversed on every render
//! call. Traversal accumulates transform, material and light state in the
//! scene's backends and issues a draw for every geometry node it reaches.
//!
//! ## Architecture
//!
//! ```text
//! NodeSpec tree (builders)
//!      ↓ SceneBuilder::build
//! SceneGraph (node arena + symbol table)
//!      ↓ Scene::render
//! Traversal ──save/apply/restore──> BackendRegistry
//!      ↓
//! ShaderBackend ──binders/setters──> RenderContext
//! ```
//!
//! Symbols name a subtree; instances evaluate a named subtree in place, under
//! whatever transform and camera state is current. That is how one subgraph
//! is drawn from several viewpoints. Selectors pick which children are
//! visited from the per-render [`Scope`].

pub mod error;
pub mod node;
pub mod objects;
pub mod scope;
mod evaluator;
mod scene_graph;

#[cfg(test)]
mod tests;

pub use error::{SceneError, SceneResult};
pub use evaluator::RenderStats;
pub use node::{
    backend_state, camera, dynamic, geometry, instance, lights, look_at, material, matrix, node, rotate, scale,
    selector, symbol, translate, with_data, LookAtParams, Node, NodeId, NodeKind, NodeOp, NodeSpec,
    Optics, Param, RotateParams, Xyz,
};
pub use objects::Geometry;
pub use scene_graph::{Scene, SceneBuilder, SceneGraph};
pub use scope::{Scope, ScopeValue};
