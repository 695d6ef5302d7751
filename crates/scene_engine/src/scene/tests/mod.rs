//! Traversal scenarios run against the recording context

mod traversal;

use crate::context::{DrawCall, RecordingContext};
use crate::foundation::math::{Mat4, Vec3};
use crate::scene::{Scene, SceneBuilder};

/// Build a scene, failing the test on error
fn build(builder: SceneBuilder) -> Scene<RecordingContext> {
    builder.build(RecordingContext::new()).expect("scene builds")
}

/// Translation part of a column-major transform
fn translation_of(matrix: &Mat4) -> Vec3 {
    Vec3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)])
}

/// Model matrix a draw was issued with
fn model_matrix(draw: &DrawCall) -> Mat4 {
    draw.matrix("MMatrix").expect("model matrix uploaded")
}
