//! Component runtime tests for tether_core

use std::cell::RefCell;
use std::rc::Rc;
use tether_core::*;
use tether_interop::{
    ComponentMessage, HostValue, ObjectKind, PropertyValue, RecordingTransport, TransportCall,
};

type Log = Rc<RefCell<Vec<String>>>;

struct Tracer {
    log: Log,
}

impl Tracer {
    fn push(&self, event: impl Into<String>) {
        self.log.borrow_mut().push(event.into());
    }
}

impl ComponentBehavior for Tracer {
    fn on_create(&mut self, ctx: &ComponentContext) -> Result<()> {
        self.push(format!("create {}", ctx.object));
        Ok(())
    }

    fn on_destroy(&mut self, _ctx: &ComponentContext) -> Result<()> {
        self.push("destroy");
        Ok(())
    }

    fn on_enable(&mut self, _ctx: &ComponentContext) -> Result<()> {
        self.push("enable");
        Ok(())
    }

    fn on_disable(&mut self, _ctx: &ComponentContext) -> Result<()> {
        self.push("disable");
        Ok(())
    }

    fn on_start(&mut self, _ctx: &ComponentContext) -> Result<()> {
        self.push("start");
        Ok(())
    }

    fn on_stop(&mut self, _ctx: &ComponentContext) -> Result<()> {
        self.push("stop");
        Ok(())
    }

    fn on_after_updates(&mut self, _ctx: &ComponentContext) -> Result<()> {
        self.push("after");
        Ok(())
    }

    fn on_message(&mut self, _ctx: &ComponentContext, payload: &[u8]) -> Result<()> {
        self.push(format!("message {}", String::from_utf8_lossy(payload)));
        Ok(())
    }

    fn on_property_changed(&mut self, ctx: &ComponentContext, name: &str, value: &PropertyValue) -> Result<()> {
        assert_eq!(ctx.property(name), Some(value));
        self.push(format!("property {}", name));
        Ok(())
    }
}

struct Failing;

impl ComponentBehavior for Failing {
    fn on_after_updates(&mut self, _ctx: &ComponentContext) -> Result<()> {
        Err(SyncError::custom("after updates failed"))
    }
}

fn traced_type(name: &str, log: &Log) -> ComponentType {
    let log = log.clone();
    ComponentType::new(name, move || Tracer { log: log.clone() })
}

fn is_light(object: &HostObject) -> bool {
    object.object_type == HostObjectType::Light
}

fn generated_mesh(_host: &dyn HostScene, object: &str) -> Option<String> {
    Some(format!("{}_gen", object))
}

fn scene() -> InMemoryScene {
    let mut scene = InMemoryScene::new();
    scene.add_mesh("CubeMesh", EvaluatedMesh::cube());
    scene.add_object(HostObject::mesh("Cube", "CubeMesh"));
    scene.add_object(HostObject::new("Lamp", HostObjectType::Light));
    scene
}

fn runtime(transport: &RecordingTransport, scene: &mut InMemoryScene) -> Runtime {
    let mut runtime = Runtime::new(RuntimeConfig::default(), Box::new(transport.clone()));
    runtime.register_builtin_plugins(scene).unwrap();
    runtime
}

fn added_components(transport: &RecordingTransport) -> Vec<(String, String, i32)> {
    transport
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            TransportCall::AddComponent(c) => Some((c.name.as_str(), c.target.as_str(), c.enabled)),
            _ => None,
        })
        .collect()
}

fn pushed_properties(transport: &RecordingTransport) -> Vec<(String, PropertyValue)> {
    transport
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            TransportCall::UpdateComponentProperty { property, .. } => {
                Some((property.name.as_str(), property.value().unwrap()))
            }
            _ => None,
        })
        .collect()
}

/// Autobind components attach to matching objects on start
#[test]
fn test_autobind_on_start() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    let log = Log::default();
    runtime
        .register_component(&mut scene, traced_type("Spotlight", &log).with_poll(is_light))
        .unwrap();
    assert!(transport.calls().is_empty());

    runtime.start(&mut scene);

    assert_eq!(runtime.components_on("Lamp"), vec!["Spotlight".to_string()]);
    assert!(runtime.components_on("Cube").is_empty());
    assert_eq!(
        added_components(&transport),
        vec![("Spotlight".to_string(), "Lamp".to_string(), 1)]
    );
    let lamp_kind = transport.calls().into_iter().find_map(|call| match call {
        TransportCall::AddObjectToScene { object, kind, .. } if object == "Lamp" => Some(kind),
        _ => None,
    });
    assert_eq!(lamp_kind, Some(ObjectKind::Custom(COMPONENT_OBJECT_KIND.to_string())));
    assert_eq!(scene.component_meta("Lamp"), vec![ComponentMeta::new("Spotlight", true)]);
    assert_eq!(*log.borrow(), vec!["enable", "create Lamp", "start"]);
}

/// Persisted metadata restores state and property values
#[test]
fn test_restore_from_meta() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut meta = ComponentMeta::new("Spinner", false);
    meta.set_property("speed", PropertyValue::Float(5.0));
    scene.set_component_meta("Cube", meta);

    let mut runtime = runtime(&transport, &mut scene);
    let ty = ComponentType::new("Spinner", || NoBehavior)
        .with_property("speed", PropertyValue::Float(1.0))
        .with_property("label", PropertyValue::String("spin".to_string()));
    runtime.register_component(&mut scene, ty).unwrap();
    runtime.start(&mut scene);

    assert_eq!(runtime.is_component_enabled("Cube", "Spinner"), Some(false));
    assert_eq!(
        runtime.component_property("Cube", "Spinner", "speed"),
        Some(PropertyValue::Float(5.0))
    );
    assert_eq!(
        runtime.component_property("Cube", "Spinner", "label"),
        Some(PropertyValue::String("spin".to_string()))
    );
    assert_eq!(
        added_components(&transport),
        vec![("Spinner".to_string(), "Cube".to_string(), 0)]
    );
    assert!(pushed_properties(&transport).contains(&("speed".to_string(), PropertyValue::Float(5.0))));

    // Plugin object and component share one engine object
    assert_eq!(transport.count("AddObjectToScene"), 1);
}

/// Every property type survives the trip to the engine and back
#[test]
fn test_property_round_trip() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);

    let values = vec![
        ("flag", PropertyValue::Bool(true)),
        ("count", PropertyValue::Int(-42)),
        ("speed", PropertyValue::Float(2.5)),
        ("label", PropertyValue::String("hello".to_string())),
        ("mode", PropertyValue::Enum("FAST".to_string())),
        ("tint", PropertyValue::Color([0.25, 0.5, 1.0])),
        ("offset", PropertyValue::Vec2([1.0, -1.0])),
        ("axis", PropertyValue::Vec3([0.0, 0.0, 1.0])),
        ("plane", PropertyValue::Vec4([1.0, 2.0, 3.0, 4.0])),
    ];
    let mut ty = ComponentType::new("Props", || NoBehavior);
    for (name, value) in &values {
        ty = ty.with_property(*name, PropertyValue::default_for(value.kind()));
    }
    runtime.register_component(&mut scene, ty).unwrap();
    runtime.start(&mut scene);
    runtime.add_component(&mut scene, "Cube", "Props").unwrap();

    transport.take_calls();
    for (name, value) in &values {
        runtime
            .set_component_property(&mut scene, "Cube", "Props", name, value.clone())
            .unwrap();
    }

    let expected: Vec<(String, PropertyValue)> = values
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();
    assert_eq!(pushed_properties(&transport), expected);

    let meta = scene.component_meta("Cube");
    for (name, value) in &values {
        assert_eq!(runtime.component_property("Cube", "Props", name).as_ref(), Some(value));
        assert_eq!(meta[0].property(name), Some(value));
    }
}

/// Host values are converted to the declared type or rejected
#[test]
fn test_property_conversion() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    let ty = ComponentType::new("Light", || NoBehavior)
        .with_property("intensity", PropertyValue::Float(1.0))
        .with_property("color", PropertyValue::Color([1.0; 3]))
        .with_property("mode", PropertyValue::Enum("POINT".to_string()));
    runtime.register_component(&mut scene, ty).unwrap();
    runtime.start(&mut scene);
    runtime.add_component(&mut scene, "Lamp", "Light").unwrap();

    // Widened or re-tagged to fit the declaration
    runtime.set_component_property(&mut scene, "Lamp", "Light", "intensity", 3i64).unwrap();
    runtime
        .set_component_property(&mut scene, "Lamp", "Light", "color", PropertyValue::Vec3([0.5, 0.5, 0.0]))
        .unwrap();
    runtime.set_component_property(&mut scene, "Lamp", "Light", "mode", "SPOT").unwrap();
    assert_eq!(
        runtime.component_property("Lamp", "Light", "intensity"),
        Some(PropertyValue::Float(3.0))
    );
    assert_eq!(
        runtime.component_property("Lamp", "Light", "color"),
        Some(PropertyValue::Color([0.5, 0.5, 0.0]))
    );
    assert_eq!(
        runtime.component_property("Lamp", "Light", "mode"),
        Some(PropertyValue::Enum("SPOT".to_string()))
    );

    // Nothing is pushed for values that cannot be represented
    transport.take_calls();
    let unsupported = runtime.set_component_property(
        &mut scene,
        "Lamp",
        "Light",
        "intensity",
        HostValue::Unsupported("PointerProperty".to_string()),
    );
    assert!(unsupported.unwrap_err().is_type_conversion());

    let too_wide = runtime.set_component_property(
        &mut scene,
        "Lamp",
        "Light",
        "color",
        HostValue::FloatVector(vec![1.0; 5]),
    );
    assert!(too_wide.unwrap_err().is_type_conversion());

    let mismatched = runtime.set_component_property(&mut scene, "Lamp", "Light", "intensity", true);
    assert!(mismatched.unwrap_err().is_type_conversion());

    let undeclared = runtime.set_component_property(&mut scene, "Lamp", "Light", "radius", 1.0f64);
    assert!(matches!(undeclared, Err(SyncError::PropertyNotFound { .. })));

    assert_eq!(transport.count("UpdateComponentProperty"), 0);
    assert_eq!(
        runtime.component_property("Lamp", "Light", "intensity"),
        Some(PropertyValue::Float(3.0))
    );
}

/// Changed properties notify the behavior after the push
#[test]
fn test_property_changed_callback() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    let log = Log::default();
    let ty = traced_type("Tracer", &log).with_property("speed", PropertyValue::Float(0.0));
    runtime.register_component(&mut scene, ty).unwrap();
    runtime.start(&mut scene);
    runtime.add_component(&mut scene, "Cube", "Tracer").unwrap();

    runtime.set_component_property(&mut scene, "Cube", "Tracer", "speed", 4.0f64).unwrap();
    assert_eq!(log.borrow().last().map(String::as_str), Some("property speed"));
}

/// Enabling and disabling runs callbacks once per change and persists
#[test]
fn test_enable_disable() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    let log = Log::default();
    runtime.register_component(&mut scene, traced_type("Tracer", &log)).unwrap();
    runtime.start(&mut scene);
    runtime.add_component(&mut scene, "Lamp", "Tracer").unwrap();

    log.borrow_mut().clear();
    transport.take_calls();
    runtime.set_component_enabled(&mut scene, "Lamp", "Tracer", false).unwrap();
    runtime.set_component_enabled(&mut scene, "Lamp", "Tracer", false).unwrap();

    assert_eq!(*log.borrow(), vec!["disable"]);
    assert_eq!(transport.count("UpdateComponent"), 1);
    assert_eq!(runtime.is_component_enabled("Lamp", "Tracer"), Some(false));
    assert!(!scene.component_meta("Lamp")[0].enabled);

    runtime.set_component_enabled(&mut scene, "Lamp", "Tracer", true).unwrap();
    assert_eq!(*log.borrow(), vec!["disable", "enable"]);
    assert!(scene.component_meta("Lamp")[0].enabled);
}

/// Destroying the last component withdraws its object
#[test]
fn test_destroy_component() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    let log = Log::default();
    runtime.register_component(&mut scene, traced_type("Tracer", &log)).unwrap();
    runtime.register_component(&mut scene, ComponentType::new("Tag", || NoBehavior)).unwrap();
    runtime.start(&mut scene);
    runtime.add_component(&mut scene, "Lamp", "Tracer").unwrap();
    runtime.add_component(&mut scene, "Lamp", "Tag").unwrap();
    assert_eq!(transport.added_objects(), vec!["Cube".to_string(), "Lamp".to_string()]);

    log.borrow_mut().clear();
    transport.take_calls();
    runtime.destroy_component(&mut scene, "Lamp", "Tracer").unwrap();

    assert_eq!(*log.borrow(), vec!["disable", "destroy"]);
    assert_eq!(transport.count("DestroyComponent"), 1);
    assert!(transport.removed_objects().is_empty());
    assert_eq!(scene.component_meta("Lamp"), vec![ComponentMeta::new("Tag", true)]);

    runtime.destroy_component(&mut scene, "Lamp", "Tag").unwrap();
    assert_eq!(transport.removed_objects(), vec!["Lamp".to_string()]);
    assert!(runtime.components_on("Lamp").is_empty());
    assert!(scene.component_meta("Lamp").is_empty());

    let missing = runtime.destroy_component(&mut scene, "Lamp", "Tag");
    assert!(matches!(missing, Err(SyncError::ComponentNotAttached { .. })));
}

/// Components on a plugin-owned object leave the scene object alone
#[test]
fn test_component_on_mesh_object() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    runtime.register_component(&mut scene, ComponentType::new("Tag", || NoBehavior)).unwrap();
    runtime.start(&mut scene);

    runtime.add_component(&mut scene, "Cube", "Tag").unwrap();
    runtime.destroy_component(&mut scene, "Cube", "Tag").unwrap();

    assert_eq!(transport.count("AddObjectToScene"), 1);
    assert!(transport.removed_objects().is_empty());
    assert!(runtime.find_object("Cube").is_some_and(|o| o.is_valid()));
}

/// Adding twice is a no-op
#[test]
fn test_add_idempotent() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    runtime.register_component(&mut scene, ComponentType::new("Tag", || NoBehavior)).unwrap();
    runtime.start(&mut scene);

    runtime.add_component(&mut scene, "Lamp", "Tag").unwrap();
    runtime.add_component(&mut scene, "Lamp", "Tag").unwrap();
    assert_eq!(transport.count("AddComponent"), 1);

    assert!(matches!(
        runtime.add_component(&mut scene, "Lamp", "Unknown"),
        Err(SyncError::ComponentNotFound(_))
    ));
    assert!(matches!(
        runtime.add_component(&mut scene, "Nowhere", "Tag"),
        Err(SyncError::ObjectNotFound(_))
    ));
}

/// A renamed object gets its components back under the new name
#[test]
fn test_rename_keeps_components() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    let log = Log::default();
    runtime.register_component(&mut scene, traced_type("Tracer", &log)).unwrap();
    runtime.start(&mut scene);
    runtime.add_component(&mut scene, "Lamp", "Tracer").unwrap();

    log.borrow_mut().clear();
    transport.take_calls();
    scene.rename_object("Lamp", "Spot");
    runtime.on_scene_update(&mut scene, &UpdateBatch::new());

    assert!(runtime.components_on("Lamp").is_empty());
    assert_eq!(runtime.components_on("Spot"), vec!["Tracer".to_string()]);
    assert_eq!(transport.removed_objects(), vec!["Lamp".to_string()]);
    assert_eq!(transport.added_objects(), vec!["Spot".to_string()]);
    assert_eq!(
        *log.borrow(),
        vec!["disable", "destroy", "enable", "create Spot", "after"]
    );
}

/// Unregistering keeps metadata so the type can be restored later
#[test]
fn test_unregister_and_restore() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    runtime.register_component(&mut scene, ComponentType::new("Tag", || NoBehavior)).unwrap();
    runtime.start(&mut scene);
    runtime.add_component(&mut scene, "Lamp", "Tag").unwrap();

    runtime.unregister_component(&mut scene, "Tag").unwrap();
    assert!(!runtime.is_component_registered("Tag"));
    assert!(runtime.components_on("Lamp").is_empty());
    assert_eq!(scene.component_meta("Lamp").len(), 1);
    assert_eq!(transport.removed_objects(), vec!["Lamp".to_string()]);

    runtime.register_component(&mut scene, ComponentType::new("Tag", || NoBehavior)).unwrap();
    assert_eq!(runtime.components_on("Lamp"), vec!["Tag".to_string()]);
    assert!(matches!(
        runtime.register_component(&mut scene, ComponentType::new("Tag", || NoBehavior)),
        Err(SyncError::DuplicateKey { .. })
    ));
}

/// Types already attached or persisted are not offered again
#[test]
fn test_available_components() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    runtime.register_component(&mut scene, ComponentType::new("Tag", || NoBehavior)).unwrap();
    runtime.register_component(&mut scene, ComponentType::new("Spinner", || NoBehavior)).unwrap();
    runtime.start(&mut scene);
    runtime.add_component(&mut scene, "Cube", "Tag").unwrap();

    assert_eq!(runtime.available_components(&scene, "Cube"), vec!["Spinner".to_string()]);
    assert_eq!(
        runtime.available_components(&scene, "Lamp"),
        vec!["Tag".to_string(), "Spinner".to_string()]
    );
}

/// Messages reach the addressed component; misaddressed ones are reported
#[test]
fn test_component_messages() {
    let transport = RecordingTransport::available();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    let log = Log::default();
    runtime.register_component(&mut scene, traced_type("Tracer", &log)).unwrap();
    runtime.start(&mut scene);
    runtime.add_component(&mut scene, "Cube", "Tracer").unwrap();

    transport
        .push_component_message(&ComponentMessage {
            target: "Cube".to_string(),
            id: "Tracer".to_string(),
            payload: b"ping".to_vec(),
        })
        .unwrap();
    runtime.on_tick(&mut scene);
    assert!(runtime.is_connected());
    assert!(log.borrow().contains(&"message ping".to_string()));

    transport
        .push_component_message(&ComponentMessage {
            target: "Lamp".to_string(),
            id: "Tracer".to_string(),
            payload: Vec::new(),
        })
        .unwrap();
    runtime.on_tick(&mut scene);
    assert_eq!(
        runtime
            .last_report()
            .count(|e| matches!(e, SyncError::ComponentNotAttached { .. })),
        1
    );
}

/// A failing component does not keep others from their callbacks
#[test]
fn test_component_failure_isolated() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    let log = Log::default();
    runtime.register_component(&mut scene, ComponentType::new("Failing", || Failing)).unwrap();
    runtime.register_component(&mut scene, traced_type("Tracer", &log)).unwrap();
    runtime.start(&mut scene);
    runtime.add_component(&mut scene, "Cube", "Failing").unwrap();
    runtime.add_component(&mut scene, "Cube", "Tracer").unwrap();

    log.borrow_mut().clear();
    runtime.on_scene_update(&mut scene, &UpdateBatch::new());

    assert_eq!(*log.borrow(), vec!["after"]);
    let report = runtime.last_report();
    assert_eq!(report.len(), 1);
    assert!(matches!(
        &report.errors()[0],
        SyncError::ComponentCallback { component, object, callback: "on_after_updates", .. }
            if component == "Failing" && object == "Cube"
    ));
}

/// Components with geometry push it under their own identity
#[test]
fn test_component_geometry() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    let ty = ComponentType::new("Generator", || NoBehavior).with_mesh_identity(generated_mesh);
    runtime.register_component(&mut scene, ty).unwrap();
    runtime.start(&mut scene);

    transport.take_calls();
    runtime.add_component(&mut scene, "Cube", "Generator").unwrap();
    assert_eq!(transport.mesh_pushes(), vec!["Cube_gen".to_string()]);
    let mesh = transport.calls().into_iter().find_map(|call| match call {
        TransportCall::AddComponent(c) => Some(c.mesh.as_str()),
        _ => None,
    });
    assert_eq!(mesh.as_deref(), Some("Cube_gen"));

    transport.take_calls();
    runtime.on_scene_update(&mut scene, &UpdateBatch::new().with(SceneUpdate::geometry("Cube")));
    let mut pushes = transport.mesh_pushes();
    pushes.sort();
    assert_eq!(pushes, vec!["CubeMesh".to_string(), "Cube_gen".to_string()]);
}

/// Stopping runs on_stop then tears instances down, keeping metadata
#[test]
fn test_stop_tears_down() {
    let transport = RecordingTransport::new();
    let mut scene = scene();
    let mut runtime = runtime(&transport, &mut scene);
    let log = Log::default();
    runtime.register_component(&mut scene, traced_type("Tracer", &log)).unwrap();
    runtime.start(&mut scene);
    runtime.add_component(&mut scene, "Lamp", "Tracer").unwrap();

    log.borrow_mut().clear();
    runtime.stop(&mut scene);

    assert_eq!(*log.borrow(), vec!["stop", "disable", "destroy"]);
    assert!(runtime.components_on("Lamp").is_empty());
    assert_eq!(scene.component_meta("Lamp").len(), 1);

    // Restart restores from metadata
    log.borrow_mut().clear();
    runtime.start(&mut scene);
    assert_eq!(runtime.components_on("Lamp"), vec!["Tracer".to_string()]);
    assert_eq!(*log.borrow(), vec!["enable", "create Lamp", "start"]);
}
