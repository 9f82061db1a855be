//! Scene sync tests for tether_core
//!
//! These drive a [`Runtime`] with an [`InMemoryScene`] and inspect the
//! calls that reach a [`RecordingTransport`].

use glam::Vec3;
use std::collections::HashSet;
use tether_core::plugins::{METABALLS_OBJECT, METABALLS_PLUGIN, MESH_PLUGIN};
use tether_core::*;
use tether_interop::{ObjectKind, RecordingTransport, TransportCall};

fn cube_scene(objects: &[&str]) -> InMemoryScene {
    let mut scene = InMemoryScene::new();
    scene.add_mesh("CubeMesh", EvaluatedMesh::cube());
    for name in objects {
        scene.add_object(HostObject::mesh(*name, "CubeMesh"));
    }
    scene
}

fn started(transport: &RecordingTransport, scene: &mut InMemoryScene) -> Runtime {
    let mut runtime = Runtime::new(RuntimeConfig::default(), Box::new(transport.clone()));
    runtime.register_builtin_plugins(scene).unwrap();
    runtime.start(scene);
    runtime
}

fn is_evaluation_failure(error: &SyncError) -> bool {
    matches!(error, SyncError::EvaluationFailure { .. })
}

/// A duplicated object reuses the engine mesh until it gets its own modifiers
#[test]
fn test_duplicate_then_modify() {
    let transport = RecordingTransport::new();
    let mut scene = cube_scene(&["Cube"]);
    let mut runtime = started(&transport, &mut scene);

    assert_eq!(transport.added_objects(), vec!["Cube".to_string()]);
    assert_eq!(transport.mesh_pushes(), vec!["CubeMesh".to_string()]);
    let kind = transport.calls().into_iter().find_map(|call| match call {
        TransportCall::AddObjectToScene { object, kind, .. } if object == "Cube" => Some(kind),
        _ => None,
    });
    assert_eq!(kind, Some(ObjectKind::Mesh));

    // Duplicate shares the unmodified datablock
    transport.take_calls();
    scene.add_object(HostObject::mesh("Cube.001", "CubeMesh"));
    runtime.on_scene_update(&mut scene, &UpdateBatch::new());

    assert_eq!(transport.added_objects(), vec!["Cube.001".to_string()]);
    assert!(transport.mesh_pushes().is_empty());
    assert_eq!(scene.evaluation_count("Cube.001"), 0);

    // A modifier gives the duplicate its own identity
    transport.take_calls();
    let cube_evaluations = scene.evaluation_count("Cube");
    scene.add_modifier("Cube.001", Vec3::X);
    runtime.on_scene_update(&mut scene, &UpdateBatch::new().with(SceneUpdate::geometry("Cube.001")));

    let pushes = transport.mesh_pushes();
    assert_eq!(pushes.len(), 1);
    assert!(pushes[0].starts_with("Cube.001@"));
    assert_eq!(scene.evaluation_count("Cube"), cube_evaluations);
    assert!(transport.calls().iter().all(|call| !matches!(
        call,
        TransportCall::UpdateObjectProperties { object, .. } if object == "Cube"
    )));
}

/// Objects sharing a mesh are evaluated once per batch
#[test]
fn test_shared_mesh_evaluated_once() {
    let transport = RecordingTransport::new();
    let mut scene = cube_scene(&["Cube", "Cube.001", "Cube.002"]);
    let mut runtime = started(&transport, &mut scene);
    assert_eq!(transport.mesh_pushes(), vec!["CubeMesh".to_string()]);

    transport.take_calls();
    let before = scene.total_evaluations();
    let batch = UpdateBatch::new()
        .with(SceneUpdate::geometry("Cube"))
        .with(SceneUpdate::geometry("Cube.001"))
        .with(SceneUpdate::geometry("Cube.002"));
    runtime.on_scene_update(&mut scene, &batch);

    assert_eq!(transport.mesh_pushes(), vec!["CubeMesh".to_string()]);
    assert_eq!(scene.total_evaluations(), before + 1);
    assert_eq!(scene.last_preserve_flag(), Some(true));
}

/// Modified instances are evaluated separately
#[test]
fn test_modified_instances_evaluated_separately() {
    let transport = RecordingTransport::new();
    let mut scene = cube_scene(&["Cube", "Cube.001"]);
    scene.add_modifier("Cube", Vec3::Y);
    scene.add_modifier("Cube.001", Vec3::Z);
    let mut runtime = started(&transport, &mut scene);

    let pushes: HashSet<String> = transport.mesh_pushes().into_iter().collect();
    assert_eq!(pushes.len(), 2);
    assert!(pushes.iter().all(|identity| identity.contains('@')));

    transport.take_calls();
    let batch = UpdateBatch::new()
        .with(SceneUpdate::geometry("Cube"))
        .with(SceneUpdate::geometry("Cube.001"));
    runtime.on_scene_update(&mut scene, &batch);
    assert_eq!(transport.mesh_pushes().len(), 2);
}

/// A rename recreates the object and re-parents its children
#[test]
fn test_rename_reparents_children() {
    let transport = RecordingTransport::new();
    let mut scene = cube_scene(&["Parent"]);
    scene.add_object(HostObject::mesh("Child", "CubeMesh").with_parent("Parent"));
    let mut runtime = started(&transport, &mut scene);
    assert_eq!(runtime.objects().len(), 2);

    transport.take_calls();
    assert!(scene.rename_object("Parent", "Root"));
    runtime.on_scene_update(&mut scene, &UpdateBatch::new());

    assert_eq!(transport.removed_objects(), vec!["Parent".to_string()]);
    assert_eq!(transport.added_objects(), vec!["Root".to_string()]);
    assert!(transport.mesh_pushes().is_empty());

    let parent = transport.calls().into_iter().find_map(|call| match call {
        TransportCall::SetObjectTransform { object, transform } if object == "Child" => {
            Some(transform.parent.as_str())
        }
        _ => None,
    });
    assert_eq!(parent.as_deref(), Some("Root"));

    // The stale entry is gone once the batch ends
    assert!(runtime.find_object("Parent").is_none());
    assert!(runtime.find_object("Root").is_some_and(|o| o.is_valid()));
}

/// Removing a host object destroys its scene object exactly once
#[test]
fn test_remove_host_object() {
    let transport = RecordingTransport::new();
    let mut scene = cube_scene(&["Cube", "Other"]);
    let mut runtime = started(&transport, &mut scene);

    let cube = runtime.find_object("Cube").unwrap();
    transport.take_calls();
    scene.remove_object("Cube");
    runtime.on_scene_update(&mut scene, &UpdateBatch::new().with(SceneUpdate::transform("Cube")));
    runtime.on_scene_update(&mut scene, &UpdateBatch::new());

    assert_eq!(transport.removed_objects(), vec!["Cube".to_string()]);
    assert!(!cube.is_valid());
    assert!(runtime.find_object("Cube").is_none());
    assert_eq!(runtime.tracked_names(), &["Other".to_string()]);
}

/// Transform updates push the new location without touching geometry
#[test]
fn test_transform_update() {
    let transport = RecordingTransport::new();
    let mut scene = cube_scene(&["Cube"]);
    let mut runtime = started(&transport, &mut scene);

    transport.take_calls();
    scene.set_location("Cube", Vec3::new(1.0, 2.0, 3.0));
    runtime.on_scene_update(&mut scene, &UpdateBatch::new().with(SceneUpdate::transform("Cube")));

    assert_eq!(transport.transform_pushes(), vec!["Cube".to_string()]);
    assert!(transport.mesh_pushes().is_empty());
}

/// Material edits re-push the properties of every object using the material
#[test]
fn test_material_update() {
    let transport = RecordingTransport::new();
    let mut scene = cube_scene(&["Red", "Blue"]);
    scene.set_material("Red", Some("RedMat"));
    scene.set_material("Blue", Some("BlueMat"));
    let mut runtime = started(&transport, &mut scene);

    transport.take_calls();
    runtime.on_scene_update(&mut scene, &UpdateBatch::new().with(SceneUpdate::material("RedMat")));

    let updated: Vec<(String, String)> = transport
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            TransportCall::UpdateObjectProperties { object, material, .. } => Some((object, material)),
            _ => None,
        })
        .collect();
    assert_eq!(updated, vec![("Red".to_string(), "RedMat".to_string())]);
}

/// An object update without transform or geometry flags still re-pushes properties
#[test]
fn test_property_only_update() {
    let transport = RecordingTransport::new();
    let mut scene = cube_scene(&["Cube"]);
    scene.set_material("Cube", Some("Red"));
    let mut runtime = started(&transport, &mut scene);

    transport.take_calls();
    scene.set_material("Cube", Some("Blue"));
    runtime.on_scene_update(&mut scene, &UpdateBatch::new().with(SceneUpdate::properties("Cube")));

    let updated: Vec<(String, String)> = transport
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            TransportCall::UpdateObjectProperties { object, material, .. } => Some((object, material)),
            _ => None,
        })
        .collect();
    assert_eq!(updated, vec![("Cube".to_string(), "Blue".to_string())]);
    assert!(transport.transform_pushes().is_empty());
    assert!(transport.mesh_pushes().is_empty());
}

/// A host object recreated under a deleted object's name gets its geometry pushed
#[test]
fn test_recreated_object_repushes_geometry() {
    let transport = RecordingTransport::new();
    let mut scene = InMemoryScene::new();
    scene.add_mesh("TextA", EvaluatedMesh::cube());
    let mut text = HostObject::new("Text", HostObjectType::Font);
    text.mesh = Some("TextA".to_string());
    scene.add_object(text);
    let mut runtime = started(&transport, &mut scene);
    assert_eq!(transport.mesh_pushes().len(), 1);

    scene.remove_object("Text");
    runtime.on_scene_update(&mut scene, &UpdateBatch::new());

    let mut larger = EvaluatedMesh::cube();
    for vertex in &mut larger.vertices {
        vertex.co *= 2.0;
    }
    scene.add_mesh("TextB", larger);
    let mut text = HostObject::new("Text", HostObjectType::Font);
    text.mesh = Some("TextB".to_string());
    scene.add_object(text);
    transport.take_calls();
    runtime.on_scene_update(&mut scene, &UpdateBatch::new());

    assert_eq!(transport.added_objects(), vec!["Text".to_string()]);
    assert_eq!(transport.mesh_pushes().len(), 1);
    assert_eq!(scene.evaluation_count("Text"), 2);
}

/// Objects without a material report the default material
#[test]
fn test_default_material() {
    let transport = RecordingTransport::new();
    let mut scene = cube_scene(&["Cube"]);
    let _runtime = started(&transport, &mut scene);

    let material = transport.calls().into_iter().find_map(|call| match call {
        TransportCall::UpdateObjectProperties { material, .. } => Some(material),
        _ => None,
    });
    assert_eq!(material.as_deref(), Some(DEFAULT_MATERIAL));
}

/// The collection stays consistent with the host scene across random edits
#[test]
fn test_collection_matches_scene() {
    let transport = RecordingTransport::new();
    let mut scene = cube_scene(&["A", "B", "C"]);
    let mut runtime = started(&transport, &mut scene);

    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move |bound: usize| {
        seed = seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (seed >> 33) as usize % bound
    };

    for step in 0..60 {
        let names = scene.object_names();
        match next(3) {
            0 => scene.add_object(HostObject::mesh(format!("Obj{}", step), "CubeMesh")),
            1 if !names.is_empty() => {
                scene.remove_object(&names[next(names.len())]);
            }
            _ if !names.is_empty() => {
                scene.rename_object(&names[next(names.len())], &format!("Ren{}", step));
            }
            _ => scene.add_object(HostObject::mesh(format!("Obj{}", step), "CubeMesh")),
        }
        runtime.on_scene_update(&mut scene, &UpdateBatch::new());

        let objects = runtime.objects();
        assert!(objects.iter().all(SceneObject::is_valid));

        let host_names: HashSet<String> = objects
            .iter()
            .filter_map(|o| o.host_name().map(str::to_string))
            .collect();
        let scene_names: HashSet<String> = scene.object_names().into_iter().collect();
        assert_eq!(host_names, scene_names, "step {}", step);
        assert_eq!(objects.len(), scene_names.len());

        // Every add is matched by at most one remove
        let live = transport.count("AddObjectToScene") - transport.count("RemoveObjectFromScene");
        assert_eq!(live, objects.len(), "step {}", step);
    }
}

/// start and stop are idempotent
#[test]
fn test_start_stop_idempotent() {
    let transport = RecordingTransport::new();
    let mut scene = cube_scene(&["Cube"]);
    let mut runtime = started(&transport, &mut scene);

    let after_start = transport.calls().len();
    runtime.start(&mut scene);
    assert_eq!(transport.calls().len(), after_start);

    runtime.stop(&mut scene);
    let after_stop = transport.calls().len();
    runtime.stop(&mut scene);
    assert_eq!(transport.calls().len(), after_stop);
    assert!(!runtime.is_running());

    // A restart resyncs from scratch
    transport.take_calls();
    runtime.start(&mut scene);
    assert_eq!(transport.added_objects(), vec!["Cube".to_string()]);
    assert_eq!(transport.mesh_pushes(), vec!["CubeMesh".to_string()]);
}

/// Batches are ignored while stopped
#[test]
fn test_updates_ignored_when_stopped() {
    let transport = RecordingTransport::new();
    let mut scene = cube_scene(&["Cube"]);
    let mut runtime = Runtime::new(RuntimeConfig::default(), Box::new(transport.clone()));
    runtime.register_builtin_plugins(&mut scene).unwrap();

    runtime.on_scene_update(&mut scene, &UpdateBatch::new().with(SceneUpdate::geometry("Cube")));
    assert!(transport.calls().is_empty());
    assert!(runtime.objects().is_empty());
}

/// One failed evaluation does not stop the rest of the batch
#[test]
fn test_evaluation_failure_isolated() {
    let transport = RecordingTransport::new();
    let mut scene = cube_scene(&["Good"]);
    scene.add_mesh("BadMesh", EvaluatedMesh::cube());
    scene.add_object(HostObject::mesh("Bad", "BadMesh"));
    scene.fail_evaluation("Bad");
    let mut runtime = started(&transport, &mut scene);

    assert_eq!(transport.mesh_pushes(), vec!["CubeMesh".to_string()]);
    assert_eq!(runtime.last_report().count(is_evaluation_failure), 1);
    assert_eq!(runtime.objects().len(), 2);

    // The identity was never synced, so the next edit retries it
    transport.take_calls();
    scene.clear_failures();
    runtime.on_scene_update(&mut scene, &UpdateBatch::new().with(SceneUpdate::geometry("Bad")));
    assert_eq!(transport.mesh_pushes(), vec!["BadMesh".to_string()]);
    assert!(runtime.last_report().is_empty());
}

/// Transport call failures are reported, not fatal
#[test]
fn test_transport_failure_reported() {
    let transport = RecordingTransport::new();
    transport.fail_function("CopyMeshDataNative");
    let mut scene = cube_scene(&["Cube"]);
    let runtime = started(&transport, &mut scene);

    assert!(runtime.is_running());
    assert_eq!(runtime.objects().len(), 1);
    assert_eq!(runtime.last_report().count(|e| matches!(e, SyncError::Interop(_))), 1);
}

/// Metaballs follow the first Meta object and re-root when it goes away
#[test]
fn test_metaballs_reroot() {
    let transport = RecordingTransport::new();
    let mut scene = InMemoryScene::new();
    scene.add_object(HostObject::new("Ball", HostObjectType::Meta));
    scene.add_object(HostObject::new("Ball.001", HostObjectType::Meta));
    let mut runtime = started(&transport, &mut scene);

    let owned = runtime.plugin_objects(METABALLS_PLUGIN);
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].name(), METABALLS_OBJECT);
    assert_eq!(owned[0].host_name(), Some("Ball"));
    assert_eq!(transport.mesh_pushes(), vec![METABALLS_OBJECT.to_string()]);
    assert!(runtime.plugin_objects(MESH_PLUGIN).is_empty());

    transport.take_calls();
    scene.remove_object("Ball");
    runtime.on_scene_update(&mut scene, &UpdateBatch::new());

    let owned = runtime.plugin_objects(METABALLS_PLUGIN);
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].host_name(), Some("Ball.001"));
    assert_eq!(transport.removed_objects(), vec![METABALLS_OBJECT.to_string()]);
    assert_eq!(transport.added_objects(), vec![METABALLS_OBJECT.to_string()]);
    assert_eq!(transport.mesh_pushes(), vec![METABALLS_OBJECT.to_string()]);

    // Editing any element re-evaluates the combined surface
    transport.take_calls();
    runtime.on_scene_update(&mut scene, &UpdateBatch::new().with(SceneUpdate::geometry("Ball.001")));
    assert_eq!(transport.mesh_pushes(), vec![METABALLS_OBJECT.to_string()]);

    // Last element gone, nothing left to root on
    transport.take_calls();
    scene.remove_object("Ball.001");
    runtime.on_scene_update(&mut scene, &UpdateBatch::new());
    assert!(runtime.plugin_objects(METABALLS_PLUGIN).is_empty());
    assert_eq!(transport.removed_objects(), vec![METABALLS_OBJECT.to_string()]);
}
