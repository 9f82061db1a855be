//! Error types for the sync engine

use std::path::PathBuf;
use tether_interop::InteropError;
use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by the sync engine
///
/// Callback, evaluation and transport failures are contained to the unit
/// that raised them and collected into a [`crate::BatchReport`] rather than
/// aborting the surrounding update batch.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Name or host reference already present in a collection
    #[error("Duplicate key '{key}' in {collection}")]
    DuplicateKey {
        collection: &'static str,
        key: String,
    },

    /// Mesh evaluation produced no usable geometry
    #[error("Mesh evaluation failed for object '{object}' (mesh '{mesh}'): {reason}")]
    EvaluationFailure {
        object: String,
        mesh: String,
        reason: String,
    },

    /// A plugin callback returned an error
    #[error("Plugin '{plugin}' failed in {callback}{}: {message}", object_context(.object))]
    PluginCallback {
        plugin: String,
        callback: &'static str,
        object: Option<String>,
        message: String,
    },

    /// A component callback returned an error
    #[error("Component '{component}' on '{object}' failed in {callback}: {message}")]
    ComponentCallback {
        component: String,
        object: String,
        callback: &'static str,
        message: String,
    },

    /// Connection attempt failed, retried on the next tick
    #[error("Transport '{connection}' unavailable (status {status})")]
    TransportUnavailable {
        connection: String,
        status: i32,
    },

    /// Plugin is not enabled
    #[error("Plugin '{0}' is disabled")]
    PluginDisabled(String),

    /// Plugin is not registered
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// Component type is not registered
    #[error("Component type not registered: {0}")]
    ComponentNotFound(String),

    /// Component type is not attached to the object
    #[error("Object '{object}' has no component '{component}'")]
    ComponentNotAttached {
        component: String,
        object: String,
    },

    /// Component type does not declare the property
    #[error("Component '{component}' has no property '{property}'")]
    PropertyNotFound {
        component: String,
        property: String,
    },

    /// Host object lookup failed
    #[error("Host object not found: {0}")]
    ObjectNotFound(String),

    /// Operation requires a running runtime
    #[error("Runtime is not running")]
    NotRunning,

    /// Free-form failure raised by extension code
    #[error("{0}")]
    Custom(String),

    /// Interop error (marshaling, type conversion, bridge call)
    #[error("Interop error: {0}")]
    Interop(#[from] InteropError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

fn object_context(object: &Option<String>) -> String {
    match object {
        Some(name) => format!(" for '{}'", name),
        None => String::new(),
    }
}

impl SyncError {
    /// Create a free-form error for use in plugin and component callbacks
    pub fn custom(message: impl Into<String>) -> Self {
        SyncError::Custom(message.into())
    }

    /// Create a duplicate key error
    pub fn duplicate(collection: &'static str, key: impl Into<String>) -> Self {
        SyncError::DuplicateKey {
            collection,
            key: key.into(),
        }
    }

    /// Create an evaluation failure
    pub fn evaluation(
        object: impl Into<String>,
        mesh: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SyncError::EvaluationFailure {
            object: object.into(),
            mesh: mesh.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error raised inside a plugin callback
    pub fn plugin_callback(
        plugin: impl Into<String>,
        callback: &'static str,
        object: Option<&str>,
        source: &SyncError,
    ) -> Self {
        SyncError::PluginCallback {
            plugin: plugin.into(),
            callback,
            object: object.map(str::to_string),
            message: source.to_string(),
        }
    }

    /// Wrap an error raised inside a component callback
    pub fn component_callback(
        component: impl Into<String>,
        object: impl Into<String>,
        callback: &'static str,
        source: &SyncError,
    ) -> Self {
        SyncError::ComponentCallback {
            component: component.into(),
            object: object.into(),
            callback,
            message: source.to_string(),
        }
    }

    /// Check if this is a property type conversion failure
    pub fn is_type_conversion(&self) -> bool {
        matches!(self, SyncError::Interop(InteropError::TypeConversion { .. }))
    }
}

/// Errors loading a [`crate::RuntimeConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}
