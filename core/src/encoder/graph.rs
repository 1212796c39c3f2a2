//! encoder/graph.rs
//! Graph walk: one record per value, back-references for repeats.
//!
//! Per value:
//!   1. null and primitive wrappers are written inline, never cached;
//!   2. a cached value (unless unshared) becomes a back-reference;
//!   3. the substitution hook may swap the value, restarting at 1;
//!   4. a new record is emitted, registered before its children;
//!   5. a substituted original is aliased to the final slot.

use std::io::Write;
use std::rc::Rc;

use byteorder::{BigEndian, ByteOrder};
use tracing::trace;

use crate::cache::BackRef;
use crate::collab::SerialHooks;
use crate::constants::{SizeClass, Tag, VERSION_CONTAINERS};
use crate::encoder::{Encoder, HookFrame};
use crate::model::{
    ArrayValue, ComponentType, ContainerKind, FieldKind, Object, ObjectRef, PrimitiveKind, TypeDef, TypeRef, TypeVariant,
    Value,
};
use crate::types::{Result, ResultExt, WireError};
use crate::utils::{encode_size, size_class};

impl<W: Write> Encoder<W> {
    /// Write `v` as a nested record, leaving block mode for its duration.
    pub(crate) fn write_value(&mut self, v: &Value, unshared: bool) -> Result<()> {
        self.ensure_started()?;
        let was_active = self.blocks.suspend(&mut self.out, self.config.version, &mut self.counters)?;
        self.depth += 1;
        let r = if self.depth > self.config.max_depth {
            Err(depth_exceeded(self.config.max_depth))
        } else {
            self.write_value_inner(v, unshared)
        };
        self.depth -= 1;
        self.blocks.resume(was_active);
        r
    }

    fn write_value_inner(&mut self, original: &Value, unshared: bool) -> Result<()> {
        let mut cur = original.clone();
        loop {
            if self.write_inline(&cur)? {
                return Ok(());
            }
            if !unshared {
                if let Some(index) = cur.identity().and_then(|k| self.instances.lookup(k)) {
                    self.write_back_ref(index)?;
                    self.alias_original(original, &cur, index, unshared);
                    return Ok(());
                }
            }
            let Some(sub) = self.collab.substitution.clone() else { break };
            let replaced = sub.before_write(&cur)?;
            if replaced.same(&cur) {
                break;
            }
            trace!(from = cur.kind_name(), to = replaced.kind_name(), "value substituted before write");
            cur = replaced;
        }
        let index = self.write_new(&cur, unshared)?;
        self.alias_original(original, &cur, index, unshared);
        Ok(())
    }

    fn alias_original(&mut self, original: &Value, written: &Value, index: u32, unshared: bool) {
        if unshared || original.same(written) {
            return;
        }
        if let Some(key) = original.identity() {
            self.instances.alias(key, index, original.clone());
        }
    }

    /// Null and wrappers. Returns false for values that need a record.
    fn write_inline(&mut self, v: &Value) -> Result<bool> {
        let out = &mut self.out;
        match v {
            Value::Null => out.put_tag(Tag::Null)?,
            Value::Bool(true) => out.put_tag(Tag::BooleanObjectTrue)?,
            Value::Bool(false) => out.put_tag(Tag::BooleanObjectFalse)?,
            Value::Byte(b) => {
                out.put_tag(Tag::ByteObject)?;
                out.put_u8(*b as u8)?;
            }
            Value::Char(c) => {
                out.put_tag(Tag::CharObject)?;
                out.put_u16(*c)?;
            }
            Value::Short(s) => {
                out.put_tag(Tag::ShortObject)?;
                out.put_u16(*s as u16)?;
            }
            Value::Int(i) => {
                out.put_tag(Tag::IntObject)?;
                out.put_i32(*i)?;
            }
            Value::Long(l) => {
                out.put_tag(Tag::LongObject)?;
                out.put_i64(*l)?;
            }
            Value::Float(f) => {
                out.put_tag(Tag::FloatObject)?;
                out.put_u32(f.to_bits())?;
            }
            Value::Double(d) => {
                out.put_tag(Tag::DoubleObject)?;
                out.put_i64(d.to_bits() as i64)?;
            }
            Value::Str(_) | Value::Object(_) => return Ok(false),
        }
        Ok(true)
    }

    fn write_back_ref(&mut self, index: u32) -> Result<()> {
        let r = BackRef::select(index, self.instances.len());
        match r {
            BackRef::Near(b) => {
                self.out.put_tag(Tag::RepeatObjectNear)?;
                self.out.put_u8(b)?;
            }
            BackRef::Nearish(v) => {
                self.out.put_tag(Tag::RepeatObjectNearish)?;
                self.out.put_u16(v)?;
            }
            BackRef::Far(i) => {
                self.out.put_tag(Tag::RepeatObjectFar)?;
                self.out.put_u32(i)?;
            }
        }
        self.counters.add_back_ref(r);
        Ok(())
    }

    /// Take the next instance slot for `v`. Unshared values keep the slot but
    /// are never addressable, not even from their own children.
    fn register(&mut self, v: &Value, unshared: bool) -> u32 {
        self.counters.new_objects += 1;
        let key = v.identity().unwrap_or_default();
        let index = self.instances.push(key, v.clone());
        if unshared {
            self.instances.invalidate(key);
        }
        index
    }

    fn write_new(&mut self, v: &Value, unshared: bool) -> Result<u32> {
        match v {
            Value::Str(s) => {
                let index = self.register(v, unshared);
                let bytes = s.as_bytes();
                let class = size_class(bytes.len());
                let mut head = vec![Tag::string_tag(class).byte()];
                encode_size(class, bytes.len(), &mut head)?;
                self.out.put(&head)?;
                self.out.put(bytes)?;
                Ok(index)
            }
            Value::Object(o) => self.write_object_record(v, o, unshared).context(|| format!("writing {}", o.type_name())),
            other => Err(WireError::NotEncodable(format!("{} needs no record", other.kind_name()))),
        }
    }

    fn write_object_record(&mut self, v: &Value, o: &ObjectRef, unshared: bool) -> Result<u32> {
        match Shape::of(o)? {
            Shape::PrimArray => self.write_primitive_array(v, o, unshared),
            Shape::ObjArray(component, elements) => self.write_object_array(v, &component, &elements, unshared),
            Shape::Collection(kind, comparator, elements) => {
                self.write_collection(v, kind, &comparator, &elements, unshared)
            }
            Shape::Map(kind, comparator, entries) => self.write_map(v, kind, &comparator, &entries, unshared),
            Shape::Enum(ty, name) => {
                self.put_new_object_tag(unshared)?;
                self.write_type_descriptor(&ty)?;
                let index = self.register(v, unshared);
                self.put_utf(&name)?;
                Ok(index)
            }
            Shape::Proxy(ty, handler) => {
                self.put_new_object_tag(unshared)?;
                self.write_type_descriptor(&ty)?;
                let index = self.register(v, unshared);
                self.write_value(&handler, false).context(|| "proxy handler")?;
                Ok(index)
            }
            Shape::Instance(ty) => self.write_instance(v, o, &ty, unshared),
        }
    }

    fn write_object_array(
        &mut self,
        v: &Value,
        component: &ComponentType,
        elements: &[Value],
        unshared: bool,
    ) -> Result<u32> {
        let index = self.begin_container(v, elements.len(), unshared, Tag::array_tag)?;
        self.write_component_type(component)?;
        for (i, e) in elements.iter().enumerate() {
            self.write_value(e, false).context(|| format!("element [{}]", i))?;
        }
        Ok(index)
    }

    fn write_collection(
        &mut self,
        v: &Value,
        kind: ContainerKind,
        comparator: &Value,
        elements: &[Value],
        unshared: bool,
    ) -> Result<u32> {
        self.require_containers()?;
        let index = self.begin_container(v, elements.len(), unshared, Tag::collection_tag)?;
        self.out.put_tag(kind.tag())?;
        if kind.is_sorted() {
            self.write_value(comparator, false).context(|| "comparator")?;
        }
        for (i, e) in elements.iter().enumerate() {
            self.write_value(e, false).context(|| format!("element [{}]", i))?;
        }
        Ok(index)
    }

    fn write_map(
        &mut self,
        v: &Value,
        kind: ContainerKind,
        comparator: &Value,
        entries: &[(Value, Value)],
        unshared: bool,
    ) -> Result<u32> {
        self.require_containers()?;
        let index = self.begin_container(v, entries.len(), unshared, Tag::collection_tag)?;
        self.out.put_tag(kind.tag())?;
        if kind.is_sorted() {
            self.write_value(comparator, false).context(|| "comparator")?;
        }
        for (i, (k, val)) in entries.iter().enumerate() {
            self.write_value(k, false).context(|| format!("entry [{}] key", i))?;
            self.write_value(val, false).context(|| format!("entry [{}] value", i))?;
        }
        Ok(index)
    }

    fn require_containers(&self) -> Result<()> {
        if self.config.version < VERSION_CONTAINERS {
            return Err(WireError::NotEncodable(format!(
                "containers require protocol version {}",
                VERSION_CONTAINERS
            )));
        }
        Ok(())
    }

    fn put_new_object_tag(&mut self, unshared: bool) -> Result<()> {
        self.out.put_tag(if unshared { Tag::NewObjectUnshared } else { Tag::NewObject })
    }

    /// Tag + registration + length prefix shared by arrays and containers.
    fn begin_container(
        &mut self,
        v: &Value,
        len: usize,
        unshared: bool,
        tag_for: fn(SizeClass, bool) -> Tag,
    ) -> Result<u32> {
        let class = size_class(len);
        let mut head = vec![tag_for(class, unshared).byte()];
        encode_size(class, len, &mut head)?;
        self.out.put(&head)?;
        Ok(self.register(v, unshared))
    }

    fn write_primitive_array(&mut self, v: &Value, o: &ObjectRef, unshared: bool) -> Result<u32> {
        let (len, component, payload) = match &*o.borrow() {
            Object::Array(a) => (a.len(), a.component(), primitive_payload(a)),
            _ => return Err(WireError::NotEncodable("not an array".into())),
        };
        let index = self.begin_container(v, len, unshared, Tag::array_tag)?;
        self.write_component_type(&component)?;
        self.out.put(&payload)?;
        Ok(index)
    }

    fn write_instance(&mut self, v: &Value, o: &ObjectRef, ty: &TypeRef, unshared: bool) -> Result<u32> {
        match ty.variant() {
            TypeVariant::Serializable => self.write_serial(v, o, ty, unshared),
            TypeVariant::Externalizable => {
                let codec = ty.externalizable_codec().cloned().ok_or_else(|| no_codec(ty, "self-encoding logic"))?;
                self.write_user_encoded(v, ty, unshared, |enc| codec.write_external(enc, o))
            }
            TypeVariant::Externalizer => {
                let codec = ty.externalizer().cloned().ok_or_else(|| no_codec(ty, "external encoder"))?;
                self.write_user_encoded(v, ty, unshared, |enc| codec.write_external(enc, o))
            }
            TypeVariant::Plain | TypeVariant::Enum | TypeVariant::Proxy => Err(WireError::NotEncodable(
                format!("instances of {} ({:?}) are not encodable", ty.name(), ty.variant()),
            )),
        }
    }

    fn write_serial(&mut self, v: &Value, o: &ObjectRef, ty: &TypeRef, unshared: bool) -> Result<u32> {
        self.put_new_object_tag(unshared)?;
        self.write_type_descriptor(ty)?;
        let index = self.register(v, unshared);
        for level in TypeDef::serial_chain(ty) {
            match level.hooks().cloned() {
                Some(hooks) => self.write_hooked_level(o, level, hooks)?,
                None => self.write_fields(o, &level)?,
            }
        }
        Ok(index)
    }

    fn write_hooked_level(&mut self, o: &ObjectRef, level: TypeRef, hooks: Rc<dyn SerialHooks>) -> Result<()> {
        self.blocks.enter()?;
        let saved = self.frame.replace(HookFrame { obj: o.clone(), level: Rc::clone(&level) });
        let r = hooks.write_object(self, o);
        self.frame = saved;
        r.context(|| format!("write hook of {}", level.name()))?;
        self.blocks.exit(&mut self.out, self.config.version, &mut self.counters)
    }

    /// User-encoded instance: descriptor, slot, then one hook scope for `body`.
    fn write_user_encoded(
        &mut self,
        v: &Value,
        ty: &TypeRef,
        unshared: bool,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<u32> {
        self.put_new_object_tag(unshared)?;
        self.write_type_descriptor(ty)?;
        let index = self.register(v, unshared);
        self.blocks.enter()?;
        let saved = self.frame.take();
        let r = body(self);
        self.frame = saved;
        r?;
        self.blocks.exit(&mut self.out, self.config.version, &mut self.counters)?;
        Ok(index)
    }

    /// Declared fields of one level, in declaration order.
    pub(crate) fn write_fields(&mut self, o: &ObjectRef, level: &TypeRef) -> Result<()> {
        let accessor = Rc::clone(&self.collab.accessor);
        for f in level.fields() {
            let value = accessor.get(o, level, &f.name)?;
            let r = match &f.kind {
                FieldKind::Primitive(k) if !k.matches(&value) => Err(kind_mismatch(*k, &value)),
                FieldKind::Primitive(_) => crate::collab::ObjectOutput::write_primitive(self, &value),
                FieldKind::Reference(_) => self.write_value(&value, f.unshared),
            };
            r.context(|| format!("field {}.{}", level.name(), f.name))?;
        }
        Ok(())
    }

    pub(crate) fn put_utf(&mut self, s: &str) -> Result<()> {
        let len = u16::try_from(s.len())
            .map_err(|_| WireError::NotEncodable(format!("UTF string of {} bytes exceeds 65535", s.len())))?;
        self.out.put_u16(len)?;
        self.out.put(s.as_bytes())
    }
}

/// What a record needs from an object, copied out so children are written
/// without holding a borrow of it.
enum Shape {
    PrimArray,
    ObjArray(ComponentType, Box<[Value]>),
    Collection(ContainerKind, Value, Box<[Value]>),
    Map(ContainerKind, Value, Box<[(Value, Value)]>),
    Enum(TypeRef, Rc<str>),
    Proxy(TypeRef, Value),
    Instance(TypeRef),
}

impl Shape {
    #[inline(never)]
    fn of(o: &ObjectRef) -> Result<Shape> {
        Ok(match &*o.borrow() {
            Object::Array(ArrayValue::Object { component, elements }) => {
                if let ComponentType::Primitive(k) = component {
                    return Err(WireError::NotEncodable(format!("object array with primitive component {:?}", k)));
                }
                Shape::ObjArray(component.clone(), elements.as_slice().into())
            }
            Object::Array(_) => Shape::PrimArray,
            Object::Collection(c) => {
                if c.kind.is_map() {
                    return Err(WireError::NotEncodable(format!("{:?} is a map kind", c.kind)));
                }
                Shape::Collection(c.kind, c.comparator.clone(), c.elements.as_slice().into())
            }
            Object::Map(m) => {
                if !m.kind.is_map() {
                    return Err(WireError::NotEncodable(format!("{:?} is not a map kind", m.kind)));
                }
                Shape::Map(m.kind, m.comparator.clone(), m.entries.as_slice().into())
            }
            Object::Enum(e) => {
                let ty = e.ty.upgrade().ok_or_else(|| {
                    WireError::NotEncodable(format!("enum constant {} outlived its type", e.name))
                })?;
                Shape::Enum(ty, Rc::clone(&e.name))
            }
            Object::Proxy(p) => Shape::Proxy(Rc::clone(&p.ty), p.handler.clone()),
            Object::Instance(i) => Shape::Instance(Rc::clone(&i.ty)),
        })
    }
}

#[cold]
fn depth_exceeded(max_depth: usize) -> WireError {
    WireError::NotEncodable(format!("graph nesting exceeds max_depth {}", max_depth))
}

#[cold]
fn kind_mismatch(expected: PrimitiveKind, found: &Value) -> WireError {
    WireError::NotEncodable(format!("expected {:?}, found {}", expected, found.kind_name()))
}

#[cold]
fn no_codec(ty: &TypeRef, what: &str) -> WireError {
    WireError::NotEncodable(format!("{} has no {}", ty.name(), what))
}

fn primitive_payload(a: &ArrayValue) -> Vec<u8> {
    fn pack<T: Copy>(vals: &[T], width: usize, put: impl Fn(&mut [u8], T)) -> Vec<u8> {
        let mut buf = vec![0u8; vals.len() * width];
        for (chunk, v) in buf.chunks_exact_mut(width).zip(vals) {
            put(chunk, *v);
        }
        buf
    }
    match a {
        ArrayValue::Boolean(v) => v.iter().map(|b| *b as u8).collect(),
        ArrayValue::Byte(v) => v.iter().map(|b| *b as u8).collect(),
        ArrayValue::Char(v) => pack(v, 2, BigEndian::write_u16),
        ArrayValue::Short(v) => pack(v, 2, BigEndian::write_i16),
        ArrayValue::Int(v) => pack(v, 4, BigEndian::write_i32),
        ArrayValue::Long(v) => pack(v, 8, BigEndian::write_i64),
        ArrayValue::Float(v) => pack(v, 4, BigEndian::write_f32),
        ArrayValue::Double(v) => pack(v, 8, BigEndian::write_f64),
        ArrayValue::Object { .. } => Vec::new(),
    }
}
