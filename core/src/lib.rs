//! graphwire-core
//!
//! Pure Rust object-graph wire protocol engine.
//! Identity-preserving, cycle-safe, version-negotiated binary encoding of
//! host object graphs. No FFI.

#![forbid(unsafe_code)]

// Shared and top level
pub mod constants;
pub mod types;
pub mod utils;
pub mod config;
pub mod io;

// Host object model and collaborator seams
pub mod model;
pub mod collab;

// Protocol layers
pub mod cache;
pub mod descriptor;
pub mod framing;

// Engines
pub mod encoder;
pub mod decoder;

pub mod telemetry;

use crate::collab::{Collaborators, ObjectInput, ObjectOutput};
use crate::config::EngineConfig;
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::model::Value;
use crate::types::Result;

/// Encode one root value as a complete session.
pub fn encode_to_vec(root: &Value, config: EngineConfig, collab: Collaborators) -> Result<Vec<u8>> {
    let mut enc = Encoder::new(Vec::new(), config, collab)?;
    enc.start()?;
    enc.write_object(root)?;
    enc.finish()?;
    Ok(enc.into_inner())
}

/// Decode one root value from a complete session.
pub fn decode_from_slice(bytes: &[u8], config: EngineConfig, collab: Collaborators) -> Result<Value> {
    let mut dec = Decoder::new(bytes, config, collab)?;
    dec.start()?;
    let v = dec.read_object()?;
    dec.finish()?;
    Ok(v)
}

// -----------------------------------------------------------------------------
// Prelude (Rust users)
// -----------------------------------------------------------------------------
pub mod prelude {
    pub use crate::collab::{
        Collaborators, Externalizable, Externalizer, FieldAccessor, FilterInfo, FilterStatus, Instantiator,
        ObjectInput, ObjectOutput, ObjectSubstitution, SerialHooks, TypeResolver, UnmarshallingFilter,
    };
    pub use crate::config::EngineConfig;
    pub use crate::constants::{Tag, DEFAULT_VERSION, MAX_VERSION, MIN_VERSION};
    pub use crate::decoder::Decoder;
    pub use crate::encoder::Encoder;
    pub use crate::model::{
        ArrayValue, CollectionValue, ComponentType, ContainerKind, DeclaredType, FieldDef, FieldKind, Instance,
        MapValue, Object, ObjectRef, PrimitiveKind, TypeDef, TypeRef, TypeRegistry, TypeVariant, Value,
    };
    pub use crate::telemetry::{SessionCounters, SessionSnapshot};
    pub use crate::types::{Result, ResultExt, WireError};
    pub use crate::{decode_from_slice, encode_to_vec};
}
