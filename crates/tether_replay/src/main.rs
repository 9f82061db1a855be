//! Tether Replay
//!
//! Plays a scripted host session against the sync runtime and prints the
//! calls that reached the engine. Without a bridge library configured the
//! engine side is a recording transport, so sessions can be inspected with
//! no engine running.
//!
//! Run with: cargo run -p tether_replay -- session.toml
//!       or: cargo run -p tether_replay -- session.toml --config tether.toml

mod player;
mod script;

use player::Player;
use script::Script;
use std::path::PathBuf;
use std::process::ExitCode;
use tether_core::RuntimeConfig;
use tether_interop::{NativeTransport, RecordingTransport, Transport, TransportCall};

const USAGE: &str = "usage: tether-replay <script.toml> [--config <tether.toml>]";

struct Args {
    script: PathBuf,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut script = None;
    let mut config = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "--help" | "-h" => return Err(USAGE.to_string()),
            flag if flag.starts_with('-') => return Err(format!("Unknown flag: {}\n{}", flag, USAGE)),
            _ => {
                if script.is_some() {
                    return Err(format!("Unexpected argument: {}\n{}", arg, USAGE));
                }
                script = Some(PathBuf::from(&arg));
            }
        }
    }

    Ok(Args {
        script: script.ok_or(USAGE)?,
        config,
    })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => {
            let mut config = RuntimeConfig::default();
            config.apply_env();
            config
        }
    };
    let script = Script::load(&args.script)?;

    let (transport, recording): (Box<dyn Transport>, Option<RecordingTransport>) = match &config.bridge_library {
        Some(path) => {
            log::info!("Replaying against bridge library '{}'", path.display());
            (Box::new(NativeTransport::load(path)?), None)
        }
        None => {
            log::info!("No bridge library configured, recording engine calls");
            let recording = RecordingTransport::available();
            (Box::new(recording.clone()), Some(recording))
        }
    };

    let mut player = Player::new(config, &script, transport, recording)?;
    player.run(&script.steps)?;

    if let Some(recording) = player.recording() {
        for (index, call) in recording.calls().iter().enumerate() {
            println!("{:>4}  {}", index, describe(call));
        }
    }

    let runtime = player.runtime();
    log::info!(
        "Replay finished: {} steps, {} scene objects, connected: {}, reported errors: {}",
        script.steps.len(),
        runtime.objects().len(),
        runtime.is_connected(),
        player.reported_errors()
    );
    Ok(())
}

/// One line per call, without buffer contents
fn describe(call: &TransportCall) -> String {
    match call {
        TransportCall::Connect {
            connection_name,
            version,
        } => format!("Connect '{}' (host {})", connection_name, version),
        TransportCall::Disconnect => "Disconnect".to_string(),
        TransportCall::Clear => "Clear".to_string(),
        TransportCall::AddViewport(id) => format!("AddViewport {}", id),
        TransportCall::RemoveViewport(id) => format!("RemoveViewport {}", id),
        TransportCall::SetViewportCamera { viewport, camera } => format!(
            "SetViewportCamera {} ({}x{})",
            viewport, camera.width, camera.height
        ),
        TransportCall::AddObjectToScene {
            object,
            kind,
            transform,
        } => {
            let parent = transform.parent.as_str();
            if parent.is_empty() {
                format!("AddObjectToScene '{}' [{}]", object, kind)
            } else {
                format!("AddObjectToScene '{}' [{}] under '{}'", object, kind, parent)
            }
        }
        TransportCall::RemoveObjectFromScene(object) => format!("RemoveObjectFromScene '{}'", object),
        TransportCall::SetObjectTransform { object, transform } => {
            let p = transform.position;
            format!("SetObjectTransform '{}' at ({}, {}, {})", object, p.x, p.y, p.z)
        }
        TransportCall::UpdateObjectProperties {
            object,
            display_mode,
            mesh,
            material,
        } => format!(
            "UpdateObjectProperties '{}' mesh '{}' material '{}' display {}",
            object,
            mesh.as_deref().unwrap_or("-"),
            material,
            display_mode
        ),
        TransportCall::CopyMeshData { mesh, buffers } => format!(
            "CopyMeshData '{}': {} vertices, {} triangles, {} uv layers",
            mesh,
            buffers.vertices.len(),
            buffers.triangles.len(),
            buffers.uv_layer_count()
        ),
        TransportCall::AddComponent(c) => format!(
            "AddComponent {} on '{}' (enabled {})",
            c.name.as_str(),
            c.target.as_str(),
            c.enabled
        ),
        TransportCall::UpdateComponent(c) => format!(
            "UpdateComponent {} on '{}' (enabled {})",
            c.name.as_str(),
            c.target.as_str(),
            c.enabled
        ),
        TransportCall::DestroyComponent(c) => {
            format!("DestroyComponent {} on '{}'", c.name.as_str(), c.target.as_str())
        }
        TransportCall::UpdateComponentProperty { component, property } => match property.value() {
            Ok(value) => format!(
                "UpdateComponentProperty {} on '{}': {} = {:?}",
                component.name.as_str(),
                component.target.as_str(),
                property.name(),
                value
            ),
            Err(e) => format!("UpdateComponentProperty {}: {}", property.name(), e),
        },
    }
}
