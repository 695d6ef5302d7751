//! Stock shaders
//!
//! Ready-made [`ShaderDescriptor`](crate::backend::ShaderDescriptor)s that can be
//! installed as a scene's shader backend.

pub mod simple;

pub use simple::simple_shader;
