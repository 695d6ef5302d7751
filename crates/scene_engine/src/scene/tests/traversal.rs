//! Evaluation order, memoization, restore and error propagation

use std::any::Any;

use approx::assert_relative_eq;

use super::{build, model_matrix, translation_of};
use crate::backend::{
    Backend, BackendKind, LightSource, LightsBackend, MaterialBackend, MaterialState, Rgb,
    ShaderDescriptor, TransformBackend, TransformState, UniformSlot, UniformValue,
};
use crate::config::SceneConfig;
use crate::context::ContextCall;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::scene::{
    backend_state, camera, dynamic, geometry, instance, lights, look_at, material, matrix, node,
    objects, rotate, scale, selector, symbol, translate, with_data, LookAtParams, NodeKind, Optics,
    RotateParams, SceneBuilder, SceneError, Xyz,
};

fn offset_from(name: &'static str) -> crate::scene::Param<Xyz> {
    dynamic(move |scope| Ok(Xyz::x(scope.get_number(name)? as f32)))
}

#[test]
fn test_fixed_transforms_compose_once() {
    let root = node().child(
        translate(Xyz::x(1.0))
            .child(rotate(RotateParams::new(90.0, Xyz::z(1.0))).child(geometry(objects::cube()))),
    );
    let mut scene = build(SceneBuilder::new(root));

    scene.render().expect("first render");
    let first = scene.last_stats();
    let first_matrix = model_matrix(&scene.context_mut().take_draws()[0]);

    scene.render().expect("second render");
    let second = scene.last_stats();
    let second_matrix = model_matrix(&scene.context_mut().take_draws()[0]);

    assert_eq!(first.compositions, 2);
    assert_eq!(second.compositions, 0);
    assert_eq!(second.memo_hits, 2);
    assert_eq!(first_matrix.to_flat_array(), second_matrix.to_flat_array());
    assert_relative_eq!(
        first_matrix,
        Mat4::translation(1.0, 0.0, 0.0) * Mat4::rotation(90.0, Vec3::z()),
        epsilon = 1e-6
    );
}

#[test]
fn test_dynamic_transform_recomputes_every_traversal() {
    let root = node().child(translate(offset_from("x")).child(geometry(objects::cube())));
    let mut scene = build(SceneBuilder::new(root));

    scene.set_data([("x", 1.0)]).render().expect("render x=1");
    scene.set_data([("x", 2.0)]).render().expect("render x=2");

    let draws = scene.context_mut().take_draws();
    assert_eq!(translation_of(&model_matrix(&draws[0])).x, 1.0);
    assert_eq!(translation_of(&model_matrix(&draws[1])).x, 2.0);
    assert_eq!(scene.last_stats().compositions, 1);
    assert_eq!(scene.last_stats().memo_hits, 0);
}

#[test]
fn test_fixed_child_of_dynamic_parent_is_not_memoized() {
    let root = node().child(
        translate(offset_from("x")).child(scale(Xyz::new(2.0, 2.0, 2.0)).child(geometry(objects::cube()))),
    );
    let mut scene = build(SceneBuilder::new(root));

    scene.set_data([("x", 1.0)]);
    scene.render().expect("first render");
    scene.render().expect("second render");

    assert_eq!(scene.last_stats().compositions, 2);
    assert_eq!(scene.last_stats().memo_hits, 0);
}

#[test]
fn test_sibling_sees_pristine_state() {
    let root = node()
        .child(translate(Xyz::new(5.0, 0.0, 0.0)).child(geometry(objects::cube())))
        .child(geometry(objects::cube()));
    let mut scene = build(SceneBuilder::new(root));

    scene.render().expect("render");

    let draws = scene.context().draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(translation_of(&model_matrix(&draws[0])), Vec3::new(5.0, 0.0, 0.0));
    assert_eq!(model_matrix(&draws[1]), Mat4::identity());
}

#[test]
fn test_sibling_of_lights_node_sees_no_lights() {
    let counting = ShaderDescriptor::new("light-count")
        .vertex_shader("attribute vec3 Vertex; uniform vec4 LightCount; void main(void) { gl_Position = vec4(Vertex, 1.0); }")
        .fragment_shader("void main(void) { gl_FragColor = vec4(1.0); }")
        .setter(UniformSlot::Lights, |context, resolver, value| {
            let count = value.and_then(UniformValue::as_lights).map_or(0, |lights| lights.len());
            if let Some(location) = resolver.uniform(context, "LightCount") {
                context.uniform4fv(location, [count as f32, 0.0, 0.0, 0.0]);
            }
        });
    let root = node()
        .child(
            lights(vec![LightSource::directional(Rgb::WHITE, Vec3::new(1.0, 1.0, 1.0))])
                .child(geometry(objects::cube())),
        )
        .child(geometry(objects::cube()));
    let mut scene = build(SceneBuilder::new(root).with_shader(counting));

    scene.render().expect("render");

    let draws = scene.context().draws();
    assert_eq!(draws[0].vec4("LightCount"), Some([1.0, 0.0, 0.0, 0.0]));
    assert_eq!(draws[1].vec4("LightCount"), Some([0.0, 0.0, 0.0, 0.0]));
    let backend = scene
        .backends()
        .get::<LightsBackend>(&BackendKind::Lights)
        .expect("lights backend");
    assert!(backend.lights().is_empty());
    assert!(backend.is_fixed());
}

#[test]
fn test_sibling_of_look_at_sees_identity_view() {
    let root = node()
        .child(look_at(LookAtParams::eye(Xyz::z(10.0))).child(geometry(objects::cube())))
        .child(geometry(objects::cube()));
    let mut scene = build(SceneBuilder::new(root));

    scene.render().expect("render");

    let draws = scene.context().draws();
    assert_relative_eq!(
        draws[0].matrix("VMatrix").expect("view uploaded"),
        Mat4::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), Vec3::y()),
        epsilon = 1e-6
    );
    assert_eq!(draws[1].matrix("VMatrix"), Some(Mat4::identity()));
    let view = scene
        .backends()
        .get::<TransformBackend>(&BackendKind::ViewTransform)
        .expect("view backend")
        .transform();
    assert_eq!(view, TransformState::identity());
}

#[test]
fn test_backends_restored_after_render() {
    let root = node().child(
        material(MaterialState::new(Rgb::new(1.0, 0.0, 0.0)))
            .child(translate(Xyz::y(3.0)).child(geometry(objects::cube()))),
    );
    let mut scene = build(SceneBuilder::new(root));

    scene.render().expect("render");

    let backends = scene.backends();
    let model = backends
        .get::<TransformBackend>(&BackendKind::ModelTransform)
        .expect("model backend")
        .transform();
    assert_eq!(model, TransformState::identity());
    assert!(backends
        .get::<MaterialBackend>(&BackendKind::Material)
        .expect("material backend")
        .material()
        .is_none());
}

#[test]
fn test_selector_visits_only_selected_children() {
    let root = node().child(selector(vec![1]).children([
        translate(Xyz::x(1.0)).child(geometry(objects::cube())),
        translate(Xyz::x(2.0)).child(geometry(objects::cube())),
        translate(Xyz::x(3.0)).child(geometry(objects::cube())),
    ]));
    let mut scene = build(SceneBuilder::new(root));

    scene.render().expect("render");

    let draws = scene.context().draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(translation_of(&model_matrix(&draws[0])).x, 2.0);
    assert_eq!(scene.last_stats().compositions, 1);
}

#[test]
fn test_selector_follows_selection_order() {
    let root = node().child(selector(vec![2, 0]).children([
        translate(Xyz::x(1.0)).child(geometry(objects::cube())),
        translate(Xyz::x(2.0)).child(geometry(objects::cube())),
        translate(Xyz::x(3.0)).child(geometry(objects::cube())),
    ]));
    let mut scene = build(SceneBuilder::new(root));

    scene.render().expect("render");

    let xs: Vec<f32> = scene
        .context()
        .draws()
        .iter()
        .map(|draw| translation_of(&model_matrix(draw)).x)
        .collect();
    assert_eq!(xs, vec![3.0, 1.0]);
}

#[test]
fn test_out_of_range_selection_aborts_before_any_child() {
    let root = node().child(selector(vec![0, 3]).children([
        geometry(objects::cube()),
        geometry(objects::cube()),
    ]));
    let mut scene = build(SceneBuilder::new(root));

    let error = scene.render().err().expect("render fails");

    assert!(matches!(
        error.root_cause(),
        SceneError::SelectionIndexOutOfRange { index: 3, len: 2 }
    ));
    assert_eq!(error.failing_node().map(|(_, kind)| kind), Some(NodeKind::Selector));
    assert!(scene.context().draws().is_empty());
}

#[test]
fn test_instances_draw_shared_symbol_in_each_context() {
    let root = node()
        .child(translate(Xyz::x(4.0)).child(instance("thing")))
        .child(translate(Xyz::x(-4.0)).child(instance("thing")));
    let thing = symbol("thing").child(scale(Xyz::new(0.5, 0.5, 0.5)).child(geometry(objects::cube())));
    let mut scene = build(SceneBuilder::new(root).define(thing));

    scene.render().expect("render");

    let draws = scene.context().draws();
    assert_eq!(draws.len(), 2);
    let first = model_matrix(&draws[0]);
    let second = model_matrix(&draws[1]);
    assert_ne!(first, second);
    assert_eq!(translation_of(&first).x, 4.0);
    assert_eq!(translation_of(&second).x, -4.0);
    assert_relative_eq!(first[(0, 0)], 0.5);
}

#[test]
fn test_instanced_symbol_memoizes_per_inbound_transform() {
    let root = node()
        .child(translate(Xyz::x(4.0)).child(instance("thing")))
        .child(translate(Xyz::x(-4.0)).child(instance("thing")));
    let thing = symbol("thing").child(scale(Xyz::new(0.5, 0.5, 0.5)).child(geometry(objects::cube())));
    let mut scene = build(SceneBuilder::new(root).define(thing));

    scene.render().expect("first render");
    scene.render().expect("second render");

    assert_eq!(scene.last_stats().compositions, 0);
    assert_eq!(scene.last_stats().memo_hits, 4);
}

#[test]
fn test_every_instance_path_keeps_its_memo() {
    let root = node().children((0..12).map(|i| translate(Xyz::x(i as f32)).child(instance("thing"))));
    let thing = symbol("thing").child(scale(Xyz::new(0.5, 0.5, 0.5)).child(geometry(objects::cube())));
    let mut scene = build(SceneBuilder::new(root).define(thing));

    scene.render().expect("first render");
    assert_eq!(scene.last_stats().compositions, 24);
    scene.render().expect("second render");
    scene.context_mut().clear_log();
    scene.render().expect("third render");

    assert_eq!(scene.last_stats().compositions, 0);
    assert_eq!(scene.last_stats().memo_hits, 24);
    let draws = scene.context().draws();
    assert_eq!(draws.len(), 12);
    assert_eq!(translation_of(&model_matrix(&draws[11])), Vec3::new(11.0, 0.0, 0.0));
}

#[test]
fn test_symbol_in_tree_is_pass_through() {
    let root = node()
        .child(symbol("thing").child(geometry(objects::cube())))
        .child(translate(Xyz::z(-2.0)).child(instance("thing")));
    let mut scene = build(SceneBuilder::new(root));

    scene.render().expect("render");

    assert_eq!(scene.context().draws().len(), 2);
}

#[test]
fn test_cyclic_instancing_is_rejected_without_drawing() {
    let root = node().child(geometry(objects::cube())).child(instance("a"));
    let a = symbol("a").child(geometry(objects::cube())).child(instance("b"));
    let b = symbol("b").child(instance("a"));
    let mut scene = build(SceneBuilder::new(root).define(a).define(b));

    let error = scene.render().err().expect("render fails");

    match error.root_cause() {
        SceneError::CyclicInstance { chain } => assert_eq!(chain, &["a", "b", "a"]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(error.failing_node().map(|(_, kind)| kind), Some(NodeKind::Instance));
    assert!(scene.context().draws().is_empty());
}

#[test]
fn test_self_instancing_symbol_is_cyclic() {
    let root = node().child(instance("loop"));
    let looping = symbol("loop").child(translate(Xyz::x(1.0)).child(instance("loop")));
    let scene = build(SceneBuilder::new(root).define(looping));

    let error = scene.validate().expect_err("cycle detected");
    assert!(matches!(error.root_cause(), SceneError::CyclicInstance { .. }));
}

#[test]
fn test_unresolved_symbol_names_the_instance() {
    let root = node().child(instance("nowhere"));
    let mut scene = build(SceneBuilder::new(root));

    let error = scene.render().err().expect("render fails");

    assert!(matches!(error.root_cause(), SceneError::UnresolvedSymbol(name) if name == "nowhere"));
    assert_eq!(error.failing_node().map(|(_, kind)| kind), Some(NodeKind::Instance));
}

#[test]
fn test_instance_depth_is_bounded() {
    let root = node().child(instance("outer"));
    let outer = symbol("outer").child(instance("inner"));
    let inner = symbol("inner").child(geometry(objects::cube()));
    let config = SceneConfig::default().with_max_instance_depth(1);
    let mut scene = build(SceneBuilder::new(root).with_config(config).define(outer).define(inner));

    let error = scene.render().err().expect("render fails");

    assert!(matches!(error.root_cause(), SceneError::InstanceDepthExceeded(1)));
}

#[test]
fn test_duplicate_symbols_are_rejected() {
    let root = node().child(symbol("twice")).child(symbol("twice"));
    let result = SceneBuilder::new(root).build(crate::context::RecordingContext::new());
    assert!(matches!(result, Err(SceneError::DuplicateSymbol(name)) if name == "twice"));
}

#[test]
fn test_undefined_scope_variable_aborts_render() {
    let root = node().child(translate(offset_from("missing")).child(geometry(objects::cube())));
    let mut scene = build(SceneBuilder::new(root));

    let error = scene.render().err().expect("render fails");

    assert!(matches!(error.root_cause(), SceneError::ScopeLookup(name) if name == "missing"));
    assert_eq!(error.failing_node().map(|(_, kind)| kind), Some(NodeKind::Translate));
    assert!(scene.context().draws().is_empty());
}

#[test]
fn test_with_data_extends_scope_for_subtree() {
    let root = node()
        .child(with_data([("x", 3.0)]).child(translate(offset_from("x")).child(geometry(objects::cube()))))
        .child(translate(offset_from("x")).child(geometry(objects::cube())));
    let mut scene = build(SceneBuilder::new(root));

    scene.set_data([("x", -1.0)]).render().expect("render");

    let draws = scene.context().draws();
    assert_eq!(translation_of(&model_matrix(&draws[0])).x, 3.0);
    assert_eq!(translation_of(&model_matrix(&draws[1])).x, -1.0);
}

#[test]
fn test_orthographic_camera_scopes_projection() {
    let ortho = Optics::Ortho {
        left: -2.0,
        right: 2.0,
        bottom: -1.0,
        top: 1.0,
        near: 1.0,
        far: 11.0,
    };
    let root = node()
        .child(camera(ortho).child(geometry(objects::cube())))
        .child(geometry(objects::cube()));
    let mut scene = build(SceneBuilder::new(root));

    scene.render().expect("render");

    let draws = scene.context().draws();
    assert_relative_eq!(
        draws[0].matrix("PMatrix").expect("projection uploaded"),
        Mat4::orthographic(-2.0, 2.0, -1.0, 1.0, 1.0, 11.0),
        epsilon = 1e-6
    );
    assert_eq!(draws[1].matrix("PMatrix"), Some(Mat4::identity()));
}

#[test]
fn test_literal_matrix_composes_like_a_transform() {
    let local = Mat4::translation(0.0, 1.0, 0.0) * Mat4::scaling(3.0, 3.0, 3.0);
    let root = node().child(translate(Xyz::z(-5.0)).child(matrix(local).child(geometry(objects::cube()))));
    let mut scene = build(SceneBuilder::new(root));

    scene.render().expect("first render");
    scene.render().expect("second render");

    let draws = scene.context().draws();
    assert_relative_eq!(
        model_matrix(&draws[1]),
        Mat4::translation(0.0, 0.0, -5.0) * local,
        epsilon = 1e-6
    );
    assert_eq!(scene.last_stats().memo_hits, 2);
}

#[test]
fn test_missing_axis_scales_to_zero() {
    // An unset scale axis is a zero factor, not 1; this collapses the mesh along y and z
    let root = node().child(scale(Xyz::x(2.0)).child(geometry(objects::cube())));
    let mut scene = build(SceneBuilder::new(root));

    scene.render().expect("render");

    let matrix = model_matrix(&scene.context().draws()[0]);
    assert_eq!(matrix, Mat4::scaling(2.0, 0.0, 0.0));
}

#[test]
fn test_missing_backend_is_reported_at_geometry() {
    let root = node().child(geometry(objects::cube()));
    let mut scene = build(SceneBuilder::new(root));
    scene.backends_mut().remove(&BackendKind::Shader);

    let error = scene.render().err().expect("render fails");

    assert!(matches!(error.root_cause(), SceneError::BackendNotFound(BackendKind::Shader)));
    assert_eq!(error.failing_node().map(|(_, kind)| kind), Some(NodeKind::Geometry));
}

#[test]
fn test_absent_material_and_lights_upload_nothing() {
    let root = node().child(geometry(objects::cube()));
    let mut scene = build(SceneBuilder::new(root));

    scene.render().expect("render");

    let draw = &scene.context().draws()[0];
    assert!(draw.vec3("MaterialDiffuse").is_none());
    assert!(draw.vec4("LightPos").is_none());
    assert_eq!(draw.matrix("VMatrix"), Some(Mat4::identity()));
    assert!(draw.attributes.contains_key("Vertex"));
    assert!(draw.attributes.contains_key("Normal"));
}

#[test]
fn test_shader_compiled_once_and_locations_memoized() {
    let root = node().child(geometry(objects::cube()));
    let mut scene = build(SceneBuilder::new(root));

    scene.render().expect("first render");
    let lookups = scene.context().location_lookups();
    scene.render().expect("second render");
    scene.render().expect("third render");

    assert_eq!(scene.context().compile_count(), 2);
    assert_eq!(scene.context().location_lookups(), lookups);
    assert_eq!(scene.context().draws().len(), 3);
}

#[test]
fn test_context_loss_recompiles_and_reuploads() {
    let root = node().child(geometry(objects::cube()));
    let mut scene = build(SceneBuilder::new(root));
    scene.render().expect("render");

    scene.context_mut().lose_context();
    assert!(matches!(scene.render().err(), Some(SceneError::ContextLost)));

    scene.context_mut().restore_context();
    scene.render().expect("render after restore");

    let uploads = scene
        .context()
        .calls()
        .iter()
        .filter(|call| matches!(call, ContextCall::CreateBuffer(..)))
        .count();
    assert_eq!(scene.context().compile_count(), 4);
    assert_eq!(uploads, 6);
}

struct FogBackend {
    density: f32,
}

impl Backend for FogBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Custom("fog".to_string())
    }

    fn reset(&mut self) {}

    fn state(&self) -> Option<UniformValue> {
        Some(UniformValue::Float(self.density))
    }

    fn set_state(&mut self, value: Option<UniformValue>) -> crate::scene::SceneResult<()> {
        self.density = match value {
            Some(UniformValue::Float(density)) => density,
            _ => 0.0,
        };
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn test_plugin_backends_are_scene_scoped() {
    let fog = BackendKind::from_name("fog");
    let mut foggy = build(SceneBuilder::new(node()).install_backend(Box::new(FogBackend { density: 0.3 })));
    let plain = build(SceneBuilder::new(node()));

    assert_eq!(foggy.backends().get::<FogBackend>(&fog).expect("installed").density, 0.3);
    assert!(matches!(plain.backends().get::<FogBackend>(&fog), Err(SceneError::BackendNotFound(_))));

    let previous = foggy.install_backend(Box::new(FogBackend { density: 0.9 }));
    assert!(previous.is_some());
    assert_eq!(foggy.backends().get::<FogBackend>(&fog).expect("replaced").density, 0.9);
}

fn fog_shader() -> ShaderDescriptor {
    ShaderDescriptor::new("fogged")
        .vertex_shader("attribute vec3 Vertex; uniform vec4 Fog; void main(void) { gl_Position = vec4(Vertex, 1.0) * Fog; }")
        .fragment_shader("void main(void) { gl_FragColor = vec4(1.0); }")
        .setter(UniformSlot::custom("fog"), |context, resolver, value| {
            let fog = value.and_then(UniformValue::as_vec4);
            if let (Some(location), Some(fog)) = (resolver.uniform(context, "Fog"), fog) {
                context.uniform4fv(location, fog);
            }
        })
}

#[test]
fn test_plugin_state_reaches_draws_in_its_subtree() {
    let root = node()
        .child(backend_state("fog", UniformValue::Float(0.8)).child(geometry(objects::cube())))
        .child(
            backend_state("fog", dynamic(|scope| Ok(UniformValue::Float(scope.get_number("haze")? as f32))))
                .child(geometry(objects::cube())),
        )
        .child(geometry(objects::cube()));
    let mut scene = build(
        SceneBuilder::new(root)
            .with_shader(fog_shader())
            .install_backend(Box::new(FogBackend { density: 0.1 })),
    );

    scene.set_data([("haze", 0.5)]).render().expect("render");

    let draws = scene.context().draws();
    assert_eq!(draws[0].vec4("Fog"), Some([0.8, 0.0, 0.0, 0.0]));
    assert_eq!(draws[1].vec4("Fog"), Some([0.5, 0.0, 0.0, 0.0]));
    assert_eq!(draws[2].vec4("Fog"), Some([0.1, 0.0, 0.0, 0.0]));
    let fog = scene.backends().get::<FogBackend>(&BackendKind::from_name("fog")).expect("installed");
    assert_eq!(fog.density, 0.1);
}

#[test]
fn test_state_node_on_built_in_backend_fails_at_the_node() {
    let root = node().child(backend_state("material", UniformValue::Float(1.0)).child(geometry(objects::cube())));
    let mut scene = build(SceneBuilder::new(root));

    let error = scene.render().err().expect("material takes no state values");
    assert!(matches!(error.root_cause(), SceneError::StateNotAccepted(BackendKind::Material)));
    assert_eq!(error.failing_node().map(|(_, kind)| kind), Some(NodeKind::State));
    assert!(scene.context().draws().is_empty());
}

#[test]
fn test_teardown_deletes_program_and_buffers() {
    let root = node().child(geometry(objects::cube())).child(geometry(objects::sphere(4, 6)));
    let mut scene = build(SceneBuilder::new(root));
    scene.render().expect("render");
    assert_eq!(scene.context().live_buffers(), 6);
    assert_eq!(scene.context().live_programs(), 1);
    assert_eq!(scene.context().live_shaders(), 0);

    let context = scene.into_context();

    assert_eq!(context.live_buffers(), 0);
    assert_eq!(context.live_programs(), 0);
    let deletions = context
        .calls()
        .iter()
        .filter(|call| matches!(call, ContextCall::DeleteBuffer(_) | ContextCall::DeleteProgram(_)))
        .count();
    assert_eq!(deletions, 7);
}

#[test]
fn test_released_scene_renders_again() {
    let root = node().child(geometry(objects::cube()));
    let mut scene = build(SceneBuilder::new(root));
    scene.render().expect("render");

    scene.release_resources();
    scene.render().expect("render after release");

    assert_eq!(scene.context().compile_count(), 4);
    assert_eq!(scene.context().live_buffers(), 3);
    assert_eq!(scene.context().live_programs(), 1);
    assert_eq!(scene.context().draws().len(), 2);
}

#[test]
fn test_teardown_after_context_loss_deletes_nothing() {
    let root = node().child(geometry(objects::cube()));
    let mut scene = build(SceneBuilder::new(root));
    scene.render().expect("render");

    scene.context_mut().lose_context();
    scene.context_mut().restore_context();
    scene.context_mut().clear_log();
    let context = scene.into_context();

    assert!(context.calls().is_empty());
}
