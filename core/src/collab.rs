//! collab.rs
//! Seams between the engines and host code.
//!
//! Consumed by the engines:
//! - `FieldAccessor`, `Instantiator`, `TypeResolver`, `ObjectSubstitution`,
//!   `UnmarshallingFilter`, bundled in `Collaborators`.
//! - Per-type logic: `SerialHooks`, `Externalizable`, `Externalizer`.
//!
//! Exposed by the engines to per-type logic:
//! - `ObjectOutput` (encoder side) and `ObjectInput` (decoder side).

use std::fmt;
use std::rc::Rc;

use crate::model::{Instance, Object, ObjectRef, PrimitiveKind, ProxyValue, TypeDef, TypeRef, TypeVariant, Value};
use crate::types::{Result, WireError};

// -----------------------------------------------------------------------------
// Engine surfaces handed to per-type logic
// -----------------------------------------------------------------------------

/// Encoder surface available inside a hook scope (and at top level).
pub trait ObjectOutput {
    fn write_bool(&mut self, v: bool) -> Result<()>;
    fn write_byte(&mut self, v: i8) -> Result<()>;
    fn write_char(&mut self, v: u16) -> Result<()>;
    fn write_short(&mut self, v: i16) -> Result<()>;
    fn write_int(&mut self, v: i32) -> Result<()>;
    fn write_long(&mut self, v: i64) -> Result<()>;
    fn write_float(&mut self, v: f32) -> Result<()>;
    fn write_double(&mut self, v: f64) -> Result<()>;
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
    /// u16 byte length + UTF-8.
    fn write_utf(&mut self, s: &str) -> Result<()>;

    /// Write a primitive wrapper as its raw payload.
    fn write_primitive(&mut self, v: &Value) -> Result<()> {
        match v {
            Value::Bool(b) => self.write_bool(*b),
            Value::Byte(b) => self.write_byte(*b),
            Value::Char(c) => self.write_char(*c),
            Value::Short(s) => self.write_short(*s),
            Value::Int(i) => self.write_int(*i),
            Value::Long(l) => self.write_long(*l),
            Value::Float(f) => self.write_float(*f),
            Value::Double(d) => self.write_double(*d),
            other => Err(WireError::NotEncodable(format!(
                "{} is not a primitive",
                other.kind_name()
            ))),
        }
    }

    fn write_object(&mut self, v: &Value) -> Result<()>;
    fn write_object_unshared(&mut self, v: &Value) -> Result<()>;

    /// Write the current hierarchy level's declared fields.
    /// Only valid inside `SerialHooks::write_object`.
    fn default_write_fields(&mut self) -> Result<()>;
}

/// Decoder surface available inside a hook scope (and at top level).
pub trait ObjectInput {
    fn read_bool(&mut self) -> Result<bool>;
    fn read_byte(&mut self) -> Result<i8>;
    fn read_char(&mut self) -> Result<u16>;
    fn read_short(&mut self) -> Result<i16>;
    fn read_int(&mut self) -> Result<i32>;
    fn read_long(&mut self) -> Result<i64>;
    fn read_float(&mut self) -> Result<f32>;
    fn read_double(&mut self) -> Result<f64>;
    fn read_fully(&mut self, buf: &mut [u8]) -> Result<()>;
    fn read_utf(&mut self) -> Result<String>;

    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<Value> {
        Ok(match kind {
            PrimitiveKind::Boolean => Value::Bool(self.read_bool()?),
            PrimitiveKind::Byte => Value::Byte(self.read_byte()?),
            PrimitiveKind::Char => Value::Char(self.read_char()?),
            PrimitiveKind::Short => Value::Short(self.read_short()?),
            PrimitiveKind::Int => Value::Int(self.read_int()?),
            PrimitiveKind::Long => Value::Long(self.read_long()?),
            PrimitiveKind::Float => Value::Float(self.read_float()?),
            PrimitiveKind::Double => Value::Double(self.read_double()?),
        })
    }

    fn read_object(&mut self) -> Result<Value>;
    fn read_object_unshared(&mut self) -> Result<Value>;

    /// Read the current hierarchy level's fields as advertised by the stream.
    /// Only valid inside `SerialHooks::read_object`.
    fn default_read_fields(&mut self) -> Result<()>;

    /// Bytes left in the current block segment (0 outside a hook scope).
    fn remaining(&self) -> usize;
    /// True once the current hook scope has no more data.
    fn end_of_scope(&mut self) -> Result<bool>;
    /// Skip everything up to the end of the current hook scope.
    fn skip_to_scope_end(&mut self) -> Result<()>;

    /// Queue `callback` to run once the current top-level read completes.
    /// Higher priorities run first; equal priorities run in registration order.
    fn register_validation(&mut self, callback: Box<dyn FnOnce() -> Result<()>>, priority: i32) -> Result<()>;
}

// -----------------------------------------------------------------------------
// Per-type logic
// -----------------------------------------------------------------------------

/// Custom logic for one auto-encoded hierarchy level.
pub trait SerialHooks {
    fn write_object(&self, out: &mut dyn ObjectOutput, obj: &ObjectRef) -> Result<()>;
    fn read_object(&self, input: &mut dyn ObjectInput, obj: &ObjectRef) -> Result<()>;
    /// Called when the stream carries no data for this level.
    fn read_object_no_data(&self, _obj: &ObjectRef) -> Result<()> {
        Ok(())
    }
}

/// Self-encoding type: writes and reads its own payload.
pub trait Externalizable {
    fn write_external(&self, out: &mut dyn ObjectOutput, obj: &ObjectRef) -> Result<()>;
    fn read_external(&self, input: &mut dyn ObjectInput, obj: &ObjectRef) -> Result<()>;
}

/// User-encoded type: an external codec writes the payload and constructs
/// the instance from it on read.
pub trait Externalizer {
    fn write_external(&self, out: &mut dyn ObjectOutput, obj: &ObjectRef) -> Result<()>;
    fn create_external(&self, ty: &TypeRef, input: &mut dyn ObjectInput) -> Result<ObjectRef>;
    /// Populate after the instance has been registered.
    fn read_external(&self, _input: &mut dyn ObjectInput, _obj: &ObjectRef) -> Result<()> {
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Collaborators
// -----------------------------------------------------------------------------

pub trait FieldAccessor {
    fn get(&self, obj: &ObjectRef, owner: &TypeDef, field: &str) -> Result<Value>;
    fn set(&self, obj: &ObjectRef, owner: &TypeDef, field: &str, value: Value) -> Result<()>;
}

pub trait Instantiator {
    fn new_instance(&self, ty: &TypeRef) -> Result<ObjectRef>;
}

pub trait TypeResolver {
    /// Name written to the stream for `ty`.
    fn name_of(&self, ty: &TypeDef) -> String {
        ty.name().to_string()
    }

    /// Local type for `name`. `fingerprint` is the stream's hint, when it carries one.
    fn resolve(&self, name: &str, fingerprint: Option<i64>) -> Option<TypeRef>;

    /// Local proxy type implementing exactly `interfaces`, in order.
    fn resolve_proxy(&self, interfaces: &[String]) -> Option<TypeRef>;
}

/// Value replacement before write / after read. The engine does not guard
/// against substitution chains that never settle.
pub trait ObjectSubstitution {
    fn before_write(&self, v: &Value) -> Result<Value> {
        Ok(v.clone())
    }

    fn after_read(&self, v: Value) -> Result<Value> {
        Ok(v)
    }
}

/// Facts about the object the decoder is about to materialize.
#[derive(Debug, Clone, Copy)]
pub struct FilterInfo<'a> {
    pub type_name: Option<&'a str>,
    pub array_length: Option<usize>,
    pub depth: usize,
    pub references: u64,
    pub stream_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStatus {
    Allowed,
    Rejected,
    Undecided,
}

pub trait UnmarshallingFilter {
    fn check(&self, info: &FilterInfo<'_>) -> FilterStatus;
}

/// Reads and writes `Object::Instance` field maps.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstanceAccessor;

impl FieldAccessor for InstanceAccessor {
    fn get(&self, obj: &ObjectRef, owner: &TypeDef, field: &str) -> Result<Value> {
        match &*obj.borrow() {
            Object::Instance(inst) => Ok(inst.get(owner.name(), field).cloned().unwrap_or_else(|| {
                owner.field(field).map(|f| f.kind.default_value()).unwrap_or_default()
            })),
            other => Err(WireError::NotEncodable(format!(
                "field {}.{} on non-instance {}",
                owner.name(),
                field,
                other.type_name()
            ))),
        }
    }

    fn set(&self, obj: &ObjectRef, owner: &TypeDef, field: &str, value: Value) -> Result<()> {
        match &mut *obj.borrow_mut() {
            Object::Instance(inst) => {
                inst.set(owner.name(), field, value);
                Ok(())
            }
            other => Err(WireError::CorruptStream(format!(
                "field {}.{} on non-instance {}",
                owner.name(),
                field,
                other.type_name()
            ))),
        }
    }
}

/// Allocates default-filled instances and handler-less proxies.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultInstantiator;

impl Instantiator for DefaultInstantiator {
    fn new_instance(&self, ty: &TypeRef) -> Result<ObjectRef> {
        match ty.variant() {
            TypeVariant::Serializable | TypeVariant::Externalizable | TypeVariant::Externalizer => {
                Ok(ObjectRef::new(Object::Instance(Instance::with_defaults(ty))))
            }
            TypeVariant::Proxy => Ok(ObjectRef::new(Object::Proxy(ProxyValue {
                ty: Rc::clone(ty),
                handler: Value::Null,
            }))),
            TypeVariant::Enum | TypeVariant::Plain => Err(WireError::UnresolvableType {
                name: format!("{} is not instantiable", ty.name()),
            }),
        }
    }
}

/// Everything an engine session consults besides the byte transport.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Rc<dyn TypeResolver>,
    pub accessor: Rc<dyn FieldAccessor>,
    pub instantiator: Rc<dyn Instantiator>,
    pub substitution: Option<Rc<dyn ObjectSubstitution>>,
    pub filter: Option<Rc<dyn UnmarshallingFilter>>,
}

impl Collaborators {
    pub fn new(resolver: Rc<dyn TypeResolver>) -> Self {
        Self {
            resolver,
            accessor: Rc::new(InstanceAccessor),
            instantiator: Rc::new(DefaultInstantiator),
            substitution: None,
            filter: None,
        }
    }

    pub fn with_accessor(mut self, accessor: Rc<dyn FieldAccessor>) -> Self {
        self.accessor = accessor;
        self
    }

    pub fn with_instantiator(mut self, instantiator: Rc<dyn Instantiator>) -> Self {
        self.instantiator = instantiator;
        self
    }

    pub fn with_substitution(mut self, substitution: Rc<dyn ObjectSubstitution>) -> Self {
        self.substitution = Some(substitution);
        self
    }

    pub fn with_filter(mut self, filter: Rc<dyn UnmarshallingFilter>) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("substitution", &self.substitution.is_some())
            .field("filter", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}
