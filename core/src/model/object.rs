//! model/object.rs
//! Object node payloads: arrays, containers, enum constants, proxies and
//! instances of user types.

use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use crate::constants::Tag;
use crate::model::typedef::{PrimitiveKind, TypeDef, TypeRef};
use crate::model::value::Value;

/// Element type of an object array.
#[derive(Clone, Debug)]
pub enum ComponentType {
    /// Only valid as the innermost component of a nested array type.
    Primitive(PrimitiveKind),
    Any,
    String,
    Type(TypeRef),
    Array(Box<ComponentType>),
}

impl ComponentType {
    pub fn name(&self) -> String {
        match self {
            ComponentType::Primitive(k) => format!("{:?}", k).to_lowercase(),
            ComponentType::Any => "Object".into(),
            ComponentType::String => "String".into(),
            ComponentType::Type(t) => t.name().to_string(),
            ComponentType::Array(inner) => format!("{}[]", inner.name()),
        }
    }

    fn same_shape(&self, other: &ComponentType) -> bool {
        match (self, other) {
            (ComponentType::Primitive(a), ComponentType::Primitive(b)) => a == b,
            (ComponentType::Any, ComponentType::Any) => true,
            (ComponentType::String, ComponentType::String) => true,
            (ComponentType::Type(a), ComponentType::Type(b)) => a.name() == b.name(),
            (ComponentType::Array(a), ComponentType::Array(b)) => a.same_shape(b),
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ArrayValue {
    Boolean(Vec<bool>),
    Byte(Vec<i8>),
    Char(Vec<u16>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Object { component: ComponentType, elements: Vec<Value> },
}

impl ArrayValue {
    pub fn len(&self) -> usize {
        match self {
            ArrayValue::Boolean(v) => v.len(),
            ArrayValue::Byte(v) => v.len(),
            ArrayValue::Char(v) => v.len(),
            ArrayValue::Short(v) => v.len(),
            ArrayValue::Int(v) => v.len(),
            ArrayValue::Long(v) => v.len(),
            ArrayValue::Float(v) => v.len(),
            ArrayValue::Double(v) => v.len(),
            ArrayValue::Object { elements, .. } => elements.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type as it appears in the array's descriptor.
    pub fn component(&self) -> ComponentType {
        match self {
            ArrayValue::Boolean(_) => ComponentType::Primitive(PrimitiveKind::Boolean),
            ArrayValue::Byte(_) => ComponentType::Primitive(PrimitiveKind::Byte),
            ArrayValue::Char(_) => ComponentType::Primitive(PrimitiveKind::Char),
            ArrayValue::Short(_) => ComponentType::Primitive(PrimitiveKind::Short),
            ArrayValue::Int(_) => ComponentType::Primitive(PrimitiveKind::Int),
            ArrayValue::Long(_) => ComponentType::Primitive(PrimitiveKind::Long),
            ArrayValue::Float(_) => ComponentType::Primitive(PrimitiveKind::Float),
            ArrayValue::Double(_) => ComponentType::Primitive(PrimitiveKind::Double),
            ArrayValue::Object { component, .. } => component.clone(),
        }
    }
}

/// Known container shapes with dedicated wire shortcuts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    ArrayList,
    LinkedList,
    HashSet,
    LinkedHashSet,
    TreeSet,
    HashMap,
    LinkedHashMap,
    TreeMap,
    IdentityHashMap,
}

impl ContainerKind {
    pub fn is_map(self) -> bool {
        matches!(
            self,
            ContainerKind::HashMap
                | ContainerKind::LinkedHashMap
                | ContainerKind::TreeMap
                | ContainerKind::IdentityHashMap
        )
    }

    /// Sorted variants carry a comparator value ahead of their contents.
    pub fn is_sorted(self) -> bool {
        matches!(self, ContainerKind::TreeSet | ContainerKind::TreeMap)
    }

    pub fn tag(self) -> Tag {
        match self {
            ContainerKind::ArrayList => Tag::CcArrayList,
            ContainerKind::LinkedList => Tag::CcLinkedList,
            ContainerKind::HashSet => Tag::CcHashSet,
            ContainerKind::LinkedHashSet => Tag::CcLinkedHashSet,
            ContainerKind::TreeSet => Tag::CcTreeSet,
            ContainerKind::HashMap => Tag::CcHashMap,
            ContainerKind::LinkedHashMap => Tag::CcLinkedHashMap,
            ContainerKind::TreeMap => Tag::CcTreeMap,
            ContainerKind::IdentityHashMap => Tag::CcIdentityHashMap,
        }
    }

    pub fn from_tag(tag: Tag) -> Option<ContainerKind> {
        Some(match tag {
            Tag::CcArrayList => ContainerKind::ArrayList,
            Tag::CcLinkedList => ContainerKind::LinkedList,
            Tag::CcHashSet => ContainerKind::HashSet,
            Tag::CcLinkedHashSet => ContainerKind::LinkedHashSet,
            Tag::CcTreeSet => ContainerKind::TreeSet,
            Tag::CcHashMap => ContainerKind::HashMap,
            Tag::CcLinkedHashMap => ContainerKind::LinkedHashMap,
            Tag::CcTreeMap => ContainerKind::TreeMap,
            Tag::CcIdentityHashMap => ContainerKind::IdentityHashMap,
            _ => return None,
        })
    }
}

/// Sequence or set container. `elements` is iteration order.
#[derive(Clone, Debug)]
pub struct CollectionValue {
    pub kind: ContainerKind,
    pub comparator: Value,
    pub elements: Vec<Value>,
}

/// Map container. `entries` is iteration order.
#[derive(Clone, Debug)]
pub struct MapValue {
    pub kind: ContainerKind,
    pub comparator: Value,
    pub entries: Vec<(Value, Value)>,
}

#[derive(Clone, Debug)]
pub struct EnumConstant {
    pub ty: Weak<TypeDef>,
    pub name: Rc<str>,
    pub ordinal: u32,
}

#[derive(Clone, Debug)]
pub struct ProxyValue {
    pub ty: TypeRef,
    pub handler: Value,
}

/// Instance of a user type. Field values are keyed by declaring level, then
/// by field name, so same-named fields at different levels do not collide.
#[derive(Clone, Debug)]
pub struct Instance {
    pub ty: TypeRef,
    levels: HashMap<String, HashMap<String, Value>>,
}

impl Instance {
    pub fn new(ty: &TypeRef) -> Self {
        Self { ty: Rc::clone(ty), levels: HashMap::new() }
    }

    /// Every declared field along the hierarchy set to its default.
    pub fn with_defaults(ty: &TypeRef) -> Self {
        let mut inst = Self::new(ty);
        let mut cur = Some(ty);
        while let Some(t) = cur {
            for f in t.fields() {
                inst.set(t.name(), &f.name, f.kind.default_value());
            }
            cur = t.super_type();
        }
        inst
    }

    /// Builder-style `set_field`.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set_field(field, value.into());
        self
    }

    pub fn get(&self, owner: &str, field: &str) -> Option<&Value> {
        self.levels.get(owner).and_then(|m| m.get(field))
    }

    pub fn set(&mut self, owner: &str, field: &str, value: Value) {
        self.levels
            .entry(owner.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    /// Look a field up by name, nearest declaring level first.
    pub fn field(&self, name: &str) -> Option<&Value> {
        let mut cur = Some(&self.ty);
        while let Some(t) = cur {
            if t.field(name).is_some() {
                return self.get(t.name(), name);
            }
            cur = t.super_type();
        }
        None
    }

    /// Set a field on the nearest level that declares it (the leaf if none does).
    pub fn set_field(&mut self, name: &str, value: Value) {
        let mut cur = Some(&self.ty);
        while let Some(t) = cur {
            if t.field(name).is_some() {
                let owner = t.name().to_string();
                self.set(&owner, name, value);
                return;
            }
            cur = t.super_type();
        }
        let leaf = self.ty.name().to_string();
        self.set(&leaf, name, value);
    }

    fn deep_eq_in(&self, other: &Instance, seen: &mut HashSet<(usize, usize)>) -> bool {
        if self.ty.name() != other.ty.name() {
            return false;
        }
        let levels: HashSet<&String> = self.levels.keys().chain(other.levels.keys()).collect();
        levels.into_iter().all(|owner| {
            let a = self.levels.get(owner);
            let b = other.levels.get(owner);
            let names: HashSet<&String> = a
                .into_iter()
                .flat_map(|m| m.keys())
                .chain(b.into_iter().flat_map(|m| m.keys()))
                .collect();
            names.into_iter().all(|n| {
                let x = a.and_then(|m| m.get(n)).unwrap_or(&Value::Null);
                let y = b.and_then(|m| m.get(n)).unwrap_or(&Value::Null);
                x.deep_eq_in(y, seen)
            })
        })
    }
}

#[derive(Clone, Debug)]
pub enum Object {
    Array(ArrayValue),
    Collection(CollectionValue),
    Map(MapValue),
    Enum(EnumConstant),
    Proxy(ProxyValue),
    Instance(Instance),
}

impl Object {
    pub fn type_name(&self) -> String {
        match self {
            Object::Array(a) => format!("{}[]", a.component().name()),
            Object::Collection(c) => format!("{:?}", c.kind),
            Object::Map(m) => format!("{:?}", m.kind),
            Object::Enum(e) => e
                .ty
                .upgrade()
                .map(|t| t.name().to_string())
                .unwrap_or_else(|| "<enum>".into()),
            Object::Proxy(p) => p.ty.name().to_string(),
            Object::Instance(i) => i.ty.name().to_string(),
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Object::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_instance_mut(&mut self) -> Option<&mut Instance> {
        match self {
            Object::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub(crate) fn deep_eq_in(&self, other: &Object, seen: &mut HashSet<(usize, usize)>) -> bool {
        fn all_eq(a: &[Value], b: &[Value], seen: &mut HashSet<(usize, usize)>) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.deep_eq_in(y, seen))
        }
        fn bits<T: Copy, B: PartialEq>(a: &[T], b: &[T], f: impl Fn(T) -> B) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| f(*x) == f(*y))
        }
        match (self, other) {
            (Object::Array(a), Object::Array(b)) => match (a, b) {
                (ArrayValue::Boolean(x), ArrayValue::Boolean(y)) => x == y,
                (ArrayValue::Byte(x), ArrayValue::Byte(y)) => x == y,
                (ArrayValue::Char(x), ArrayValue::Char(y)) => x == y,
                (ArrayValue::Short(x), ArrayValue::Short(y)) => x == y,
                (ArrayValue::Int(x), ArrayValue::Int(y)) => x == y,
                (ArrayValue::Long(x), ArrayValue::Long(y)) => x == y,
                (ArrayValue::Float(x), ArrayValue::Float(y)) => bits(x, y, f32::to_bits),
                (ArrayValue::Double(x), ArrayValue::Double(y)) => bits(x, y, f64::to_bits),
                (
                    ArrayValue::Object { component: ca, elements: ea },
                    ArrayValue::Object { component: cb, elements: eb },
                ) => ca.same_shape(cb) && all_eq(ea, eb, seen),
                _ => false,
            },
            (Object::Collection(a), Object::Collection(b)) => {
                a.kind == b.kind
                    && a.comparator.deep_eq_in(&b.comparator, seen)
                    && all_eq(&a.elements, &b.elements, seen)
            }
            (Object::Map(a), Object::Map(b)) => {
                a.kind == b.kind
                    && a.comparator.deep_eq_in(&b.comparator, seen)
                    && a.entries.len() == b.entries.len()
                    && a.entries.iter().zip(&b.entries).all(|((ka, va), (kb, vb))| {
                        ka.deep_eq_in(kb, seen) && va.deep_eq_in(vb, seen)
                    })
            }
            (Object::Enum(a), Object::Enum(b)) => {
                let owner = |e: &EnumConstant| e.ty.upgrade().map(|t| t.name().to_string());
                a.name == b.name && owner(a) == owner(b)
            }
            (Object::Proxy(a), Object::Proxy(b)) => {
                a.ty.interfaces() == b.ty.interfaces() && a.handler.deep_eq_in(&b.handler, seen)
            }
            (Object::Instance(a), Object::Instance(b)) => a.deep_eq_in(b, seen),
            _ => false,
        }
    }
}
