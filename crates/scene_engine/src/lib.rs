//! # Scene Engine
//!
//! A declarative 3D scene-graph renderer for immediate-mode graphics APIs.
//!
//! ## Features
//!
//! - **Declarative graphs**: transform, camera, light, material, selector,
//!   symbol/instance and geometry nodes built with plain functions
//! - **Memoized traversal**: literal transforms are composed once and reused
//! - **Pluggable backends**: state and shader backends installed per scene
//! - **Context seam**: everything graphics-related goes through [`context::RenderContext`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> SceneResult<()> {
//!     let root = node().child(
//!         selector(dynamic(|scope| Ok(vec![scope.get_index("activeView")?])))
//!             .child(look_at(LookAtParams::eye(Xyz::z(10.0))).child(instance("content")))
//!             .child(look_at(LookAtParams::eye(Xyz::x(10.0))).child(instance("content"))),
//!     );
//!     let content = symbol("content").child(
//!         camera(Optics::perspective(65.0, 1.0, 0.1, 300.0)).child(geometry(objects::cube())),
//!     );
//!
//!     let mut scene = SceneBuilder::new(root).define(content).build(RecordingContext::new())?;
//!     scene.set_data([("activeView", 1)]).render()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod context;
pub mod backend;
pub mod shading;
pub mod scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        backend::{
            AttributeSlot, Backend, BackendKind, BackendRegistry, LightSource, LightType,
            MaterialState, Rgb, ShaderBackend, ShaderDescriptor, UniformSlot, UniformValue,
            VariableResolver,
        },
        config::{Config, SceneConfig},
        context::{RecordingContext, RenderContext},
        foundation::math::{Mat4, Mat4Ext, Vec3},
        scene::{
            backend_state, camera, dynamic, geometry, instance, lights, look_at, material, matrix, node,
            objects, rotate, scale, selector, symbol, translate, with_data, LookAtParams, Optics,
            NodeSpec, RenderStats, RotateParams, Scene, SceneBuilder, SceneError, SceneResult, Scope,
            ScopeValue, Xyz,
        },
        shading::simple_shader,
    };
}
