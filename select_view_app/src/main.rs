//! Select-view demo application
//!
//! Builds one scene symbol (camera, two lights, a material and a sphere
//! standing in for the teapot) and instances it under three look-at nodes.
//! A selector driven by the `activeView` data variable picks which viewpoint
//! is drawn. Each render is recorded and its view matrix logged.
//!
//! Usage: `select_view [config.toml|config.ron]`

use scene_engine::foundation::logging;
use scene_engine::prelude::*;

/// Viewpoints selected by `activeView`
const EYES: [[f32; 3]; 3] = [[0.0, 0.0, 10.0], [10.0, 0.0, 0.0], [-5.0, 5.0, 5.0]];

fn the_scene() -> NodeSpec {
    let green = Rgb::new(0.6, 0.9, 0.6);
    let teapot = material(
        MaterialState::new(green)
            .with_specular_color(green)
            .with_specular(0.9)
            .with_shine(6.0),
    )
    .child(geometry(objects::sphere(16, 24)).label("teapot"));

    symbol("theScene").child(
        camera(Optics::perspective(65.0, 1.0, 0.1, 300.0)).child(
            lights(vec![
                LightSource::directional(Rgb::WHITE, Vec3::new(1.0, 1.0, 1.0)),
                LightSource::directional(Rgb::new(0.8, 0.8, 0.8), Vec3::new(-2.0, -1.0, 0.0)),
            ])
            .child(teapot),
        ),
    )
}

fn select_view() -> NodeSpec {
    let views = EYES
        .iter()
        .map(|&[x, y, z]| look_at(LookAtParams::eye(Xyz::new(x, y, z))).child(instance("theScene")));
    node().child(selector(dynamic(|scope| Ok(vec![scope.get_index("activeView")?]))).children(views))
}

fn load_config() -> Result<SceneConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            Ok(SceneConfig::load_from_file(&path)?)
        }
        None => Ok(SceneConfig::default().with_log_stats(true)),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_with_level(log::LevelFilter::Info);
    log::info!("Starting select-view demo");

    let config = load_config()?;
    let mut scene = SceneBuilder::new(select_view())
        .with_config(config)
        .define(the_scene())
        .build(RecordingContext::new())?;

    for view in 0..EYES.len() {
        scene.set_data([("activeView", view)]).render()?;

        let stats = scene.last_stats();
        for draw in scene.context_mut().take_draws() {
            let view_matrix = draw.matrix("VMatrix").unwrap_or_else(Mat4::identity);
            log::info!(
                "activeView {}: {} indices drawn, view matrix {:?}",
                view,
                draw.count,
                view_matrix.to_flat_array()
            );
        }
        log::info!(
            "activeView {}: {} nodes visited, {} compositions, {} memo hits",
            view,
            stats.nodes_visited,
            stats.compositions,
            stats.memo_hits
        );
    }

    log::info!("Select-view demo finished");
    Ok(())
}
