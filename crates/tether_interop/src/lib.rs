//! # tether_interop - Bridge Wire Contract
//!
//! Everything that crosses the process boundary between the host scene and
//! the consuming engine: fixed-layout structs, property payloads, mesh
//! buffers, axis conversion, and the [`Transport`] function table.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │   tether_core   │────▶│    Transport    │
//! │  (sync engine)  │     │ (function table)│
//! └─────────────────┘     └────────┬────────┘
//!                                  │
//!                    ┌─────────────┴─────────────┐
//!                    ▼                           ▼
//!          ┌─────────────────┐         ┌─────────────────┐
//!          │ NativeTransport │         │RecordingTransport│
//!          │  (libloading)   │         │   (call log)    │
//!          └────────┬────────┘         └─────────────────┘
//!                   │
//!                   ▼
//!          ┌─────────────────┐
//!          │ bridge library  │ ◀── shared memory to the engine
//!          └─────────────────┘
//! ```
//!
//! ## Axis convention
//!
//! The host is right-handed Z-up and the engine is left-handed Y-up. The
//! [`convert`] module is the only place that swaps axes.

mod error;
mod ffi;
mod mesh;
mod native;
mod property;
mod recording;
mod transport;

pub mod convert;

pub use error::{InteropError, Result};
pub use ffi::{
    InteropCamera, InteropComponent, InteropComponentMessage, InteropMessage, InteropMessageHeader,
    InteropQuaternion, InteropString64, InteropTransform, InteropVector2, InteropVector3,
    InteropVector4, INTEROP_STRING_CAPACITY, RPC_COMPONENT_MESSAGE_ID,
};
pub use mesh::{
    InteropLoop, InteropLoopColor, InteropLoopTriangle, InteropVertex, MeshBuffers, MAX_UV_LAYERS,
};
pub use native::NativeTransport;
pub use property::{HostValue, InteropProperty, InteropPropertyPayload, PropertyKind, PropertyValue};
pub use recording::{RecordingTransport, TransportCall};
pub use transport::{ComponentMessage, ConnectStatus, InboundMessage, ObjectKind, RawMessage, Transport};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        ConnectStatus, InboundMessage, InteropError, InteropTransform, MeshBuffers, ObjectKind,
        PropertyKind, PropertyValue, RecordingTransport, Transport,
    };
}
