//! Simple smooth shader
//!
//! Separate projection, view and model matrices, one light (the first of the
//! current light list) and the ambient/diffuse/specular terms of the current
//! material. Meant as a starting point rather than a complete lighting model.
//!
//! Slot mapping:
//!
//! | Slot | Shader variable(s) |
//! |------|--------------------|
//! | `Vertex` / `Normal` | `Vertex` / `Normal` attributes (vec3) |
//! | `scene_ProjectionMatrix` | `PMatrix` |
//! | `scene_ViewMatrix` | `VMatrix` |
//! | `scene_ModelMatrix` | `MMatrix` |
//! | `scene_Material` | `MaterialAmbient`, `MaterialDiffuse`, `MaterialSpecular` |
//! | `scene_Lights` | `LightPos` (w = 0 for directional lights) |

use crate::backend::{AttributeSlot, ShaderDescriptor, UniformSlot, UniformValue, VariableResolver};
use crate::context::{BufferHandle, BufferTarget, RenderContext};
use crate::foundation::math::Mat4Ext;

/// Name the simple shader is registered under
pub const SIMPLE_SHADER: &str = "simple-shader";

const VERTEX_SOURCE: &str = include_str!("../../shaders/simple.vert");
const FRAGMENT_SOURCE: &str = include_str!("../../shaders/simple.frag");

/// Float components per vertex for both attributes
const COMPONENTS: u32 = 3;

/// Descriptor for the simple shader
pub fn simple_shader() -> ShaderDescriptor {
    ShaderDescriptor::new(SIMPLE_SHADER)
        .vertex_shader(VERTEX_SOURCE)
        .fragment_shader(FRAGMENT_SOURCE)
        .binder(AttributeSlot::Vertex, bind_vertex_buffer)
        .binder(AttributeSlot::Normal, bind_normal_buffer)
        .setter(UniformSlot::ProjectionMatrix, set_projection_matrix)
        .setter(UniformSlot::ViewMatrix, set_view_matrix)
        .setter(UniformSlot::ModelMatrix, set_model_matrix)
        .setter(UniformSlot::Material, set_material)
        .setter(UniformSlot::Lights, set_lights)
}

fn bind_attribute(context: &mut dyn RenderContext, resolver: &mut VariableResolver, name: &str, buffer: BufferHandle) {
    let Some(location) = resolver.attribute(context, name) else {
        return;
    };
    context.enable_vertex_attrib_array(location);
    context.bind_buffer(BufferTarget::Array, buffer);
    context.vertex_attrib_pointer(location, COMPONENTS, 0, 0);
}

fn bind_vertex_buffer(context: &mut dyn RenderContext, resolver: &mut VariableResolver, buffer: BufferHandle) {
    bind_attribute(context, resolver, "Vertex", buffer);
}

fn bind_normal_buffer(context: &mut dyn RenderContext, resolver: &mut VariableResolver, buffer: BufferHandle) {
    bind_attribute(context, resolver, "Normal", buffer);
}

fn set_matrix(context: &mut dyn RenderContext, resolver: &mut VariableResolver, name: &str, value: Option<&UniformValue>) {
    let Some(matrix) = value.and_then(UniformValue::as_matrix) else {
        return;
    };
    if let Some(location) = resolver.uniform(context, name) {
        context.uniform_matrix4fv(location, &matrix.to_flat_array());
    }
}

fn set_projection_matrix(context: &mut dyn RenderContext, resolver: &mut VariableResolver, value: Option<&UniformValue>) {
    set_matrix(context, resolver, "PMatrix", value);
}

fn set_view_matrix(context: &mut dyn RenderContext, resolver: &mut VariableResolver, value: Option<&UniformValue>) {
    set_matrix(context, resolver, "VMatrix", value);
}

fn set_model_matrix(context: &mut dyn RenderContext, resolver: &mut VariableResolver, value: Option<&UniformValue>) {
    set_matrix(context, resolver, "MMatrix", value);
}

fn set_material(context: &mut dyn RenderContext, resolver: &mut VariableResolver, value: Option<&UniformValue>) {
    let Some(material) = value.and_then(UniformValue::as_material) else {
        return;
    };
    let terms = [
        ("MaterialAmbient", material.ambient_color),
        ("MaterialDiffuse", material.base_color),
        ("MaterialSpecular", material.specular_reflectance()),
    ];
    for (name, color) in terms {
        if let Some(location) = resolver.uniform(context, name) {
            context.uniform3fv(location, color.to_array());
        }
    }
}

fn set_lights(context: &mut dyn RenderContext, resolver: &mut VariableResolver, value: Option<&UniformValue>) {
    let Some(light) = value.and_then(UniformValue::as_lights).and_then(<[_]>::first) else {
        return;
    };
    if let Some(location) = resolver.uniform(context, "LightPos") {
        context.uniform4fv(location, light.shader_vector());
    }
}
