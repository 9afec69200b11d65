//! Frame Driver Tests
//!
//! Tests for:
//! - Fixed-step frames feeding controllers and the update pass
//! - Post-update sweeps of dropped buffers
//! - Sweep errors surfacing from the frame
//! - Settings loaded from JSON

use std::time::Duration;

use glam::Vec3;
use tessera::core::{ContextId, GpuHandle, TesseraError};
use tessera::resources::{
    BufferUsage, CacheMode, HandleDeleter, ResourceRegistry, ResourceSettings,
};
use tessera::scene::{FrameDriver, MeshData, NodeKey, Scene, SceneSettings};

const EPSILON: f32 = 1e-5;

#[derive(Default)]
struct CountingDeleter {
    deleted: Vec<(ContextId, u32)>,
}

impl HandleDeleter for CountingDeleter {
    fn delete_handles(&mut self, context: ContextId, handles: &[GpuHandle]) {
        self.deleted.extend(handles.iter().map(|h| (context, h.get())));
    }
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Update
// ============================================================================

#[test]
fn step_reports_frame_and_dt() -> anyhow::Result<()> {
    init_logger();
    let mut scene = Scene::new();
    let root = scene.create_group("root");
    let mut driver = FrameDriver::new(&SceneSettings::default());

    let report = driver.step(&mut scene, &[root], Duration::from_millis(500), None)?;
    assert_eq!(report.frame, 1);
    assert!((report.dt - 0.5).abs() < 1e-9);
    assert!(report.sweep.is_none());

    let report = driver.step(&mut scene, &[root], Duration::from_millis(500), None)?;
    assert_eq!(report.frame, 2);
    Ok(())
}

#[test]
fn controllers_drive_world_state_each_frame() -> anyhow::Result<()> {
    init_logger();
    let mut scene = Scene::new();
    let root = scene.create_group("root");
    let spinner = scene.add_mesh(root, "spinner", MeshData::default())?;
    scene.add_controller(spinner, |dt: f64, node: NodeKey, scene: &mut Scene| {
        let _ = scene.add_translation(node, Vec3::Y * dt as f32);
    })?;

    let mut driver = FrameDriver::new(&SceneSettings::default());
    for _ in 0..10 {
        driver.step(&mut scene, &[root], Duration::from_millis(100), None)?;
    }

    let y = scene.world_translation(spinner).map_or(f32::NAN, |t| t.y);
    assert!((y - 1.0).abs() < EPSILON, "expected y = 1, got {y}");
    Ok(())
}

// ============================================================================
// Resource sweeps
// ============================================================================

#[test]
fn dropped_mesh_buffers_are_swept_after_update() -> anyhow::Result<()> {
    init_logger();
    let registry = ResourceRegistry::with_settings(ResourceSettings::default());
    let contexts = registry.contexts().clone();
    let key = contexts.create_context("main", None)?;
    let context = contexts.get(key).expect("context exists");
    let mut deleter = CountingDeleter::default();
    contexts.make_current(key, &mut deleter)?;

    let mut scene = Scene::new();
    let root = scene.create_group("root");
    let vertices = registry.create_buffer_from(
        &[0.0f32, 0.0, 0.0, 1.0, 1.0, 1.0],
        BufferUsage::VERTEX,
        "vertices",
    );
    vertices.handles().put(context.identity(), 17)?;
    let mesh = scene.add_mesh(root, "mesh", MeshData::from_vertices(vertices))?;

    let mut driver = FrameDriver::new(&SceneSettings::default()).with_resources(registry.clone());
    let report = driver.step(&mut scene, &[root], Duration::from_millis(16), Some(&mut deleter))?;
    assert_eq!(report.sweep.map(|s| s.total()), Some(0));

    // Removing the mesh drops the last reference to its vertex buffer.
    scene.remove_node(mesh)?;
    let report = driver.step(&mut scene, &[root], Duration::from_millis(16), Some(&mut deleter))?;
    let sweep = report.sweep.expect("driver has a registry");
    assert_eq!(sweep.reclaimed_owners, 1);
    assert_eq!(sweep.immediate, 1);
    assert_eq!(deleter.deleted, vec![(context.id(), 17)]);
    assert!(scene.world_bound(root).is_none());

    let report = driver.step(&mut scene, &[root], Duration::from_millis(16), Some(&mut deleter))?;
    assert_eq!(report.sweep.map(|s| s.reclaimed_owners), Some(0));
    Ok(())
}

#[test]
fn sweep_error_fails_the_frame() {
    init_logger();
    let settings = ResourceSettings::default().with_cache_mode(CacheMode::SingleContext);
    let registry = ResourceRegistry::with_settings(settings);

    let mut scene = Scene::new();
    let root = scene.create_group("root");
    let mut driver = FrameDriver::new(&SceneSettings::default()).with_resources(registry);

    let result = driver.step(&mut scene, &[root], Duration::from_millis(16), None);
    assert_eq!(result.map(|r| r.frame), Err(TesseraError::NoCurrentContext));
    // The update itself still ran.
    assert_eq!(driver.updater().frame(), 1);
}

// ============================================================================
// Settings
// ============================================================================

#[test]
fn settings_load_from_json() -> anyhow::Result<()> {
    let scene: SceneSettings = serde_json::from_str(r#"{ "validate_bounds": false }"#)?;
    assert!(!scene.validate_bounds);
    assert_eq!(scene.initial_stack_capacity, SceneSettings::default().initial_stack_capacity);

    let resources: ResourceSettings = serde_json::from_str(r#"{ "task_budget": "one" }"#)?;
    assert_eq!(resources.cache_mode, CacheMode::MultiContext);
    assert_eq!(resources.task_budget, tessera::resources::TaskBudget::One);
    Ok(())
}
