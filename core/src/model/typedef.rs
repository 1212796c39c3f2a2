//! model/typedef.rs
//! Local type definitions: the host-side view of every type the engine can
//! encode or resolve while decoding.
//!
//! Types are shared as `TypeRef` and never mutated after `build()`.
//! Enum constants point back at their type weakly.

use std::fmt;
use std::rc::{Rc, Weak};

use crate::collab::{Externalizable, Externalizer, SerialHooks};
use crate::model::object::{EnumConstant, Object};
use crate::model::value::{ObjectRef, Value};
use crate::utils::structural_fingerprint;

pub type TypeRef = Rc<TypeDef>;

/// Encoding shape of a type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeVariant {
    /// Type known by name only; instances cannot be encoded.
    Plain,
    /// Automatically encoded, field by field, per hierarchy level.
    Serializable,
    /// Self-encoding: the type writes and reads its own payload.
    Externalizable,
    /// User-encoded: an external encoder writes the payload and constructs
    /// the instance on read.
    Externalizer,
    Enum,
    Proxy,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 8] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Byte,
        PrimitiveKind::Char,
        PrimitiveKind::Short,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
    ];

    /// Single-character signature code, used by fingerprints and field descriptors.
    pub const fn code(self) -> char {
        match self {
            PrimitiveKind::Boolean => 'Z',
            PrimitiveKind::Byte => 'B',
            PrimitiveKind::Char => 'C',
            PrimitiveKind::Short => 'S',
            PrimitiveKind::Int => 'I',
            PrimitiveKind::Long => 'J',
            PrimitiveKind::Float => 'F',
            PrimitiveKind::Double => 'D',
        }
    }

    pub fn from_code(code: u8) -> Option<PrimitiveKind> {
        PrimitiveKind::ALL.into_iter().find(|k| k.code() as u8 == code)
    }

    /// Encoded width in bytes.
    pub const fn width(self) -> usize {
        match self {
            PrimitiveKind::Boolean | PrimitiveKind::Byte => 1,
            PrimitiveKind::Char | PrimitiveKind::Short => 2,
            PrimitiveKind::Int | PrimitiveKind::Float => 4,
            PrimitiveKind::Long | PrimitiveKind::Double => 8,
        }
    }

    pub fn default_value(self) -> Value {
        match self {
            PrimitiveKind::Boolean => Value::Bool(false),
            PrimitiveKind::Byte => Value::Byte(0),
            PrimitiveKind::Char => Value::Char(0),
            PrimitiveKind::Short => Value::Short(0),
            PrimitiveKind::Int => Value::Int(0),
            PrimitiveKind::Long => Value::Long(0),
            PrimitiveKind::Float => Value::Float(0.0),
            PrimitiveKind::Double => Value::Double(0.0),
        }
    }

    /// Does `v` hold a wrapper of this kind?
    pub fn matches(self, v: &Value) -> bool {
        matches!(
            (self, v),
            (PrimitiveKind::Boolean, Value::Bool(_))
                | (PrimitiveKind::Byte, Value::Byte(_))
                | (PrimitiveKind::Char, Value::Char(_))
                | (PrimitiveKind::Short, Value::Short(_))
                | (PrimitiveKind::Int, Value::Int(_))
                | (PrimitiveKind::Long, Value::Long(_))
                | (PrimitiveKind::Float, Value::Float(_))
                | (PrimitiveKind::Double, Value::Double(_))
        )
    }
}

/// Declared type of a reference field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeclaredType {
    Any,
    String,
    /// Resolved through the session's type resolver when the descriptor is written.
    Named(Rc<str>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Primitive(PrimitiveKind),
    Reference(DeclaredType),
}

impl FieldKind {
    pub fn code(&self) -> char {
        match self {
            FieldKind::Primitive(k) => k.code(),
            FieldKind::Reference(_) => 'L',
        }
    }

    pub fn default_value(&self) -> Value {
        match self {
            FieldKind::Primitive(k) => k.default_value(),
            FieldKind::Reference(_) => Value::Null,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub name: Rc<str>,
    pub kind: FieldKind,
    pub unshared: bool,
}

impl FieldDef {
    pub fn primitive(name: &str, kind: PrimitiveKind) -> Self {
        Self { name: Rc::from(name), kind: FieldKind::Primitive(kind), unshared: false }
    }

    pub fn reference(name: &str) -> Self {
        Self { name: Rc::from(name), kind: FieldKind::Reference(DeclaredType::Any), unshared: false }
    }

    pub fn string(name: &str) -> Self {
        Self { name: Rc::from(name), kind: FieldKind::Reference(DeclaredType::String), unshared: false }
    }

    pub fn typed(name: &str, type_name: &str) -> Self {
        Self {
            name: Rc::from(name),
            kind: FieldKind::Reference(DeclaredType::Named(Rc::from(type_name))),
            unshared: false,
        }
    }

    /// Mark the field as written and read unshared.
    pub fn unshared(mut self) -> Self {
        self.unshared = true;
        self
    }
}

pub struct TypeDef {
    name: String,
    variant: TypeVariant,
    fields: Vec<FieldDef>,
    super_type: Option<TypeRef>,
    fingerprint: i64,
    hooks: Option<Rc<dyn SerialHooks>>,
    externalizable: Option<Rc<dyn Externalizable>>,
    externalizer: Option<Rc<dyn Externalizer>>,
    enum_constants: Vec<ObjectRef>,
    interfaces: Vec<String>,
}

impl TypeDef {
    /// Auto-encoded type.
    pub fn serializable(name: &str) -> TypeBuilder {
        TypeBuilder::new(name, TypeVariant::Serializable)
    }

    /// Self-encoding type.
    pub fn externalizable(name: &str, codec: Rc<dyn Externalizable>) -> TypeBuilder {
        let mut b = TypeBuilder::new(name, TypeVariant::Externalizable);
        b.externalizable = Some(codec);
        b
    }

    /// User-encoded type.
    pub fn externalized(name: &str, codec: Rc<dyn Externalizer>) -> TypeBuilder {
        let mut b = TypeBuilder::new(name, TypeVariant::Externalizer);
        b.externalizer = Some(codec);
        b
    }

    pub fn plain(name: &str) -> TypeRef {
        TypeBuilder::new(name, TypeVariant::Plain).build()
    }

    /// Enum type with its canonical constants, in ordinal order.
    pub fn enumeration(name: &str, constants: &[&str]) -> TypeRef {
        let fingerprint = structural_fingerprint(name, constants.iter().map(|c| (*c, 'E')));
        Rc::new_cyclic(|weak: &Weak<TypeDef>| TypeDef {
            name: name.to_string(),
            variant: TypeVariant::Enum,
            fields: Vec::new(),
            super_type: None,
            fingerprint,
            hooks: None,
            externalizable: None,
            externalizer: None,
            enum_constants: constants
                .iter()
                .enumerate()
                .map(|(ordinal, c)| {
                    ObjectRef::new(Object::Enum(EnumConstant {
                        ty: weak.clone(),
                        name: Rc::from(*c),
                        ordinal: ordinal as u32,
                    }))
                })
                .collect(),
            interfaces: Vec::new(),
        })
    }

    /// Dynamic-proxy type implementing `interfaces`, in declaration order.
    pub fn proxy(interfaces: &[&str]) -> TypeRef {
        let mut b = TypeBuilder::new(&format!("$Proxy[{}]", interfaces.join(",")), TypeVariant::Proxy);
        b.interfaces = interfaces.iter().map(|s| s.to_string()).collect();
        b.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> TypeVariant {
        self.variant
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn super_type(&self) -> Option<&TypeRef> {
        self.super_type.as_ref()
    }

    pub fn fingerprint(&self) -> i64 {
        self.fingerprint
    }

    pub fn hooks(&self) -> Option<&Rc<dyn SerialHooks>> {
        self.hooks.as_ref()
    }

    pub fn externalizable_codec(&self) -> Option<&Rc<dyn Externalizable>> {
        self.externalizable.as_ref()
    }

    pub fn externalizer(&self) -> Option<&Rc<dyn Externalizer>> {
        self.externalizer.as_ref()
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn enum_constants(&self) -> &[ObjectRef] {
        &self.enum_constants
    }

    pub fn enum_constant(&self, name: &str) -> Option<ObjectRef> {
        self.enum_constants
            .iter()
            .find(|c| matches!(&*c.borrow(), Object::Enum(e) if &*e.name == name))
            .cloned()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| &*f.name == name)
    }

    pub fn is_serializable(&self) -> bool {
        self.variant == TypeVariant::Serializable
    }

    /// Auto-encoded hierarchy levels, root first, ending with `ty` itself.
    /// The chain stops at the first ancestor that is not auto-encoded.
    pub fn serial_chain(ty: &TypeRef) -> Vec<TypeRef> {
        let mut chain = Vec::new();
        let mut cur = Some(ty);
        while let Some(t) = cur {
            if !t.is_serializable() {
                break;
            }
            chain.push(Rc::clone(t));
            cur = t.super_type.as_ref();
        }
        chain.reverse();
        chain
    }

    /// Nearest auto-encoded ancestor.
    pub fn serial_super(&self) -> Option<&TypeRef> {
        self.super_type.as_ref().filter(|s| s.is_serializable())
    }
}

impl fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDef")
            .field("name", &self.name)
            .field("variant", &self.variant)
            .field("fields", &self.fields.len())
            .field("super", &self.super_type.as_ref().map(|s| s.name.clone()))
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

pub struct TypeBuilder {
    name: String,
    variant: TypeVariant,
    fields: Vec<FieldDef>,
    super_type: Option<TypeRef>,
    fingerprint: Option<i64>,
    hooks: Option<Rc<dyn SerialHooks>>,
    externalizable: Option<Rc<dyn Externalizable>>,
    externalizer: Option<Rc<dyn Externalizer>>,
    interfaces: Vec<String>,
}

impl TypeBuilder {
    fn new(name: &str, variant: TypeVariant) -> Self {
        Self {
            name: name.to_string(),
            variant,
            fields: Vec::new(),
            super_type: None,
            fingerprint: None,
            hooks: None,
            externalizable: None,
            externalizer: None,
            interfaces: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn prim(self, name: &str, kind: PrimitiveKind) -> Self {
        self.field(FieldDef::primitive(name, kind))
    }

    pub fn reference(self, name: &str) -> Self {
        self.field(FieldDef::reference(name))
    }

    pub fn extends(mut self, parent: &TypeRef) -> Self {
        self.super_type = Some(Rc::clone(parent));
        self
    }

    /// Pin the compatibility fingerprint instead of deriving it from the layout.
    pub fn fingerprint(mut self, fingerprint: i64) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Custom per-level write/read logic.
    pub fn hooks(mut self, hooks: Rc<dyn SerialHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn build(self) -> TypeRef {
        let fingerprint = self.fingerprint.unwrap_or_else(|| {
            structural_fingerprint(&self.name, self.fields.iter().map(|f| (&*f.name, f.kind.code())))
        });
        Rc::new(TypeDef {
            name: self.name,
            variant: self.variant,
            fields: self.fields,
            super_type: self.super_type,
            fingerprint,
            hooks: self.hooks,
            externalizable: self.externalizable,
            externalizer: self.externalizer,
            enum_constants: Vec::new(),
            interfaces: self.interfaces,
        })
    }
}
