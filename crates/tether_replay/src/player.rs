//! Plays script steps against a runtime and an in-memory host scene

use crate::script::{Result, Script, ScriptError, Step};
use glam::Vec3;
use tether_core::{InMemoryScene, Runtime, RuntimeConfig, SceneUpdate, SyncError, UpdateBatch};
use tether_interop::{ComponentMessage, RecordingTransport, Transport};

pub struct Player {
    runtime: Runtime,
    scene: InMemoryScene,
    /// Handle on the engine side when replaying without a native bridge
    recording: Option<RecordingTransport>,
    /// Errors reported by the runtime across all steps
    reported: usize,
}

impl Player {
    pub fn new(
        config: RuntimeConfig,
        script: &Script,
        transport: Box<dyn Transport>,
        recording: Option<RecordingTransport>,
    ) -> Result<Self> {
        let mut scene = script.build_scene();
        let mut runtime = Runtime::new(config, transport);
        runtime.register_builtin_plugins(&mut scene)?;
        for ty in script.component_types() {
            runtime.register_component(&mut scene, ty)?;
        }

        Ok(Self {
            runtime,
            scene,
            recording,
            reported: 0,
        })
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn scene(&self) -> &InMemoryScene {
        &self.scene
    }

    pub fn recording(&self) -> Option<&RecordingTransport> {
        self.recording.as_ref()
    }

    /// Errors the runtime reported and isolated while playing
    pub fn reported_errors(&self) -> usize {
        self.reported
    }

    pub fn run(&mut self, steps: &[Step]) -> Result<()> {
        for (index, step) in steps.iter().enumerate() {
            log::debug!("Step {}: {}", index, step.action());
            self.apply(index, step)?;
        }
        Ok(())
    }

    fn apply(&mut self, index: usize, step: &Step) -> Result<()> {
        let action = step.action();
        if step.needs_recording() && self.recording.is_none() {
            return Err(ScriptError::NeedsRecording { index, action });
        }
        let wrap = |source: SyncError| ScriptError::Step { index, action, source };

        match step {
            Step::Start => {
                self.runtime.start(&mut self.scene);
                self.tally();
            }
            Step::Stop => {
                self.runtime.stop(&mut self.scene);
                self.tally();
            }
            Step::LoadPre => {
                self.runtime.on_load_pre(&mut self.scene);
                self.tally();
            }
            Step::Tick { count } => {
                for _ in 0..*count {
                    if self.runtime.on_tick(&mut self.scene).is_none() {
                        break;
                    }
                    self.tally();
                }
            }
            Step::EngineAvailable { available } => {
                if let Some(recording) = &self.recording {
                    recording.set_available(*available);
                }
            }
            Step::DropConnection => {
                if let Some(recording) = &self.recording {
                    recording.drop_connection();
                }
            }
            Step::AddObject { object } => {
                object.insert_into(&mut self.scene);
                self.update(UpdateBatch::new());
            }
            Step::RemoveObject { name } => {
                if self.scene.remove_object(name).is_none() {
                    log::warn!("Step {}: no host object '{}' to remove", index, name);
                }
                self.update(UpdateBatch::new());
            }
            Step::Rename { from, to } => {
                if !self.scene.rename_object(from, to) {
                    log::warn!("Step {}: cannot rename '{}' to '{}'", index, from, to);
                }
                self.update(UpdateBatch::new());
            }
            Step::Move { name, location } => {
                self.scene.set_location(name, Vec3::from(*location));
                self.update(UpdateBatch::new().with(SceneUpdate::transform(name.clone())));
            }
            Step::AddModifier { name, offset } => {
                self.scene.add_modifier(name, Vec3::from(*offset));
                self.update(UpdateBatch::new().with(SceneUpdate::geometry(name.clone())));
            }
            Step::ClearModifiers { name } => {
                self.scene.clear_modifiers(name);
                self.update(UpdateBatch::new().with(SceneUpdate::geometry(name.clone())));
            }
            Step::SetMaterial { name, material } => {
                self.scene.set_material(name, material.as_deref());
                self.update(UpdateBatch::new().with(SceneUpdate::properties(name.clone())));
            }
            Step::EditMaterial { material } => {
                self.update(UpdateBatch::new().with(SceneUpdate::material(material.clone())));
            }
            Step::AddComponent { object, component } => {
                self.runtime
                    .add_component(&mut self.scene, object, component)
                    .map_err(wrap)?;
                self.tally();
            }
            Step::DestroyComponent { object, component } => {
                self.runtime
                    .destroy_component(&mut self.scene, object, component)
                    .map_err(wrap)?;
                self.tally();
            }
            Step::EnableComponent {
                object,
                component,
                enabled,
            } => {
                self.runtime
                    .set_component_enabled(&mut self.scene, object, component, *enabled)
                    .map_err(wrap)?;
                self.tally();
            }
            Step::SetProperty {
                object,
                component,
                property,
                value,
            } => {
                self.runtime
                    .set_component_property(&mut self.scene, object, component, property, value.clone())
                    .map_err(wrap)?;
                self.tally();
            }
            Step::Message {
                object,
                component,
                payload,
            } => {
                if let Some(recording) = &self.recording {
                    recording.push_component_message(&ComponentMessage {
                        target: object.clone(),
                        id: component.clone(),
                        payload: payload.clone().into_bytes(),
                    })?;
                }
            }
        }
        Ok(())
    }

    fn update(&mut self, batch: UpdateBatch) {
        self.runtime.on_scene_update(&mut self.scene, &batch);
        self.tally();
    }

    fn tally(&mut self) {
        self.reported += self.runtime.last_report().len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::HostScene;
    use tether_interop::TransportCall;

    fn play(source: &str) -> (Player, RecordingTransport) {
        let script = Script::from_toml_str(source).unwrap();
        let recording = RecordingTransport::available();
        let mut player = Player::new(
            RuntimeConfig::default(),
            &script,
            Box::new(recording.clone()),
            Some(recording.clone()),
        )
        .unwrap();
        player.run(&script.steps).unwrap();
        (player, recording)
    }

    const SCENE: &str = r#"
[[meshes]]
name = "CubeMesh"

[[objects]]
name = "Cube"
mesh = "CubeMesh"

[[objects]]
name = "Lamp"
type = "light"

[[components]]
name = "Spotlight"
autobind = "light"
properties = [{ name = "intensity", default = { Float = 1.0 } }]
"#;

    #[test]
    fn test_start_pushes_scene() {
        let source = format!("{}\n[[steps]]\naction = \"start\"\n", SCENE);
        let (player, recording) = play(&source);

        assert!(player.runtime().is_running());
        assert_eq!(recording.added_objects().len(), 2);
        assert_eq!(recording.mesh_pushes(), vec!["CubeMesh".to_string()]);
        assert_eq!(player.runtime().components_on("Lamp"), vec!["Spotlight".to_string()]);
        assert_eq!(player.reported_errors(), 0);
    }

    #[test]
    fn test_edits_produce_batches() {
        let source = format!(
            r#"{}
[[steps]]
action = "start"

[[steps]]
action = "move"
name = "Cube"
location = [0, 0, 2]

[[steps]]
action = "rename"
from = "Cube"
to = "Box"

[[steps]]
action = "remove_object"
name = "Lamp"
"#,
            SCENE
        );
        let (player, recording) = play(&source);

        assert!(recording.transform_pushes().contains(&"Cube".to_string()));
        assert!(recording.removed_objects().contains(&"Cube".to_string()));
        assert!(recording.removed_objects().contains(&"Lamp".to_string()));
        assert!(player.scene().object("Box").is_some());
        assert!(player.runtime().find_object("Box").is_some());
        assert!(player.runtime().find_object("Lamp").is_none());
    }

    #[test]
    fn test_property_and_message() {
        let source = format!(
            r#"{}
[[steps]]
action = "start"

[[steps]]
action = "set_property"
object = "Lamp"
component = "Spotlight"
property = "intensity"
value = {{ Int = 3 }}

[[steps]]
action = "message"
object = "Lamp"
component = "Spotlight"
payload = "ping"

[[steps]]
action = "tick"
count = 2
"#,
            SCENE
        );
        let (player, recording) = play(&source);

        assert_eq!(
            player.runtime().component_property("Lamp", "Spotlight", "intensity"),
            Some(tether_interop::PropertyValue::Float(3.0))
        );
        let pushed = recording.calls().into_iter().any(|call| match call {
            TransportCall::UpdateComponentProperty { property, .. } => {
                property.name() == "intensity"
                    && property.value().ok() == Some(tether_interop::PropertyValue::Float(3.0))
            }
            _ => false,
        });
        assert!(pushed);
        assert!(player.runtime().is_connected());
    }

    #[test]
    fn test_connection_drop() {
        let source = format!(
            r#"{}
[[steps]]
action = "start"

[[steps]]
action = "tick"

[[steps]]
action = "drop_connection"

[[steps]]
action = "tick"
"#,
            SCENE
        );
        let (player, recording) = play(&source);

        assert!(player.runtime().is_running());
        assert!(!player.runtime().is_connected());
        assert!(recording
            .calls()
            .iter()
            .any(|call| matches!(call, TransportCall::Connect { .. })));
    }

    #[test]
    fn test_step_error_names_step() {
        let source = format!(
            r#"{}
[[steps]]
action = "start"

[[steps]]
action = "add_component"
object = "Cube"
component = "Missing"
"#,
            SCENE
        );
        let script = Script::from_toml_str(&source).unwrap();
        let recording = RecordingTransport::available();
        let mut player =
            Player::new(RuntimeConfig::default(), &script, Box::new(recording.clone()), None).unwrap();

        let result = player.run(&script.steps);
        assert!(matches!(
            result,
            Err(ScriptError::Step { index: 1, action: "add_component", .. })
        ));
    }

    #[test]
    fn test_engine_steps_need_recording() {
        let source = "[[steps]]\naction = \"drop_connection\"\n";
        let script = Script::from_toml_str(source).unwrap();
        let recording = RecordingTransport::new();
        let mut player =
            Player::new(RuntimeConfig::default(), &script, Box::new(recording), None).unwrap();

        assert!(matches!(
            player.run(&script.steps),
            Err(ScriptError::NeedsRecording { index: 0, .. })
        ));
    }
}
