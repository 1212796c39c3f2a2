//! decoder/graph.rs
//! Graph reconstruction: the mirror of `encoder::graph`.
//!
//! Invariants:
//! - A new instance takes its cache slot before any child is read, so
//!   cyclic children can back-reference it.
//! - Unshared records occupy a slot that can never be back-referenced.
//! - User-encoded instances hold a pending slot until `create_external`
//!   returns.
//! - Hook scopes are always drained before control returns to the caller.

use std::io::Read;
use std::rc::Rc;

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, warn};

use crate::collab::{FilterInfo, FilterStatus, ObjectInput};
use crate::constants::{SizeClass, Tag};
use crate::decoder::{Decoder, ReadFrame};
use crate::descriptor::{ClassDescriptor, DescriptorKind, DescriptorRef, FieldDescKind, Level};
use crate::framing::BlockNext;
use crate::model::{
    ArrayValue, CollectionValue, ComponentType, ContainerKind, MapValue, Object, ObjectRef, PrimitiveKind, Value,
};
use crate::types::{Result, ResultExt, WireError};
use crate::utils::{large_len, medium_len, small_len};

impl<R: Read> Decoder<R> {
    /// Entry point for `read_object*`: runs validations after a top-level read.
    pub(crate) fn read_root(&mut self, expect_unshared: bool) -> Result<Value> {
        self.ensure_started()?;
        let top = self.depth == 0;
        let r = self.read_value(Some(expect_unshared));
        if !top {
            return r;
        }
        match r {
            Ok(v) => {
                self.validations.run()?;
                Ok(v)
            }
            Err(e) => {
                self.validations.clear();
                Err(e)
            }
        }
    }

    /// Read one record. `expect` is the caller's shared/unshared expectation;
    /// `None` accepts whatever the stream says.
    pub(crate) fn read_value(&mut self, expect: Option<bool>) -> Result<Value> {
        let saved = if self.blocks.is_raw() {
            None
        } else {
            match self.blocks.advance(&mut self.input, self.version, &mut self.counters)? {
                BlockNext::Data(n) => {
                    return Err(WireError::CorruptStream(format!(
                        "object read with {} unread block bytes",
                        n
                    )))
                }
                BlockNext::End => return Err(WireError::NoMoreHookData),
                BlockNext::Object => Some(self.blocks.suspend()),
            }
        };
        self.depth += 1;
        let r = if self.depth > self.config.max_depth {
            Err(depth_exceeded(self.config.max_depth))
        } else {
            self.read_value_inner(expect)
        };
        self.depth -= 1;
        if let Some(s) = saved {
            self.blocks.restore(s);
        }
        r
    }

    fn read_value_inner(&mut self, expect: Option<bool>) -> Result<Value> {
        loop {
            let tag = self.input.read_tag(self.version)?;
            return match tag {
                Tag::Null => Ok(Value::Null),
                Tag::RepeatObjectNear | Tag::RepeatObjectNearish | Tag::RepeatObjectFar => self.read_repeat(tag, expect),
                Tag::ClearInstanceCache | Tag::ClearClassCache => {
                    self.read_cache_clear(tag)?;
                    continue;
                }
                Tag::NewObject | Tag::NewObjectUnshared => {
                    let unshared = unshared_for(expect, tag == Tag::NewObjectUnshared)?;
                    self.read_new_object(unshared)
                }
                t => self.read_sized(t, expect),
            };
        }
    }

    fn read_repeat(&mut self, tag: Tag, expect: Option<bool>) -> Result<Value> {
        if expect == Some(true) {
            return Err(WireError::SharedUnsharedMismatch(
                "back-reference where an unshared object was expected".into(),
            ));
        }
        let r = self.read_back_ref(tag)?;
        let index = r.resolve(self.instances.len())?;
        let v = self.instances.get(index)?.clone();
        self.counters.add_back_ref(r);
        Ok(v)
    }

    fn read_cache_clear(&mut self, tag: Tag) -> Result<()> {
        if self.depth != 1 {
            return Err(WireError::CorruptStream(format!("{:?} inside an object graph", tag)));
        }
        if tag == Tag::ClearClassCache {
            self.clear_types();
        } else {
            self.clear_instances();
        }
        Ok(())
    }

    /// Inline primitive wrappers; anything else is not an object here.
    fn read_wrapper(&mut self, tag: Tag) -> Result<Value> {
        Ok(match tag {
            Tag::BooleanObjectTrue => Value::Bool(true),
            Tag::BooleanObjectFalse => Value::Bool(false),
            Tag::ByteObject => Value::Byte(self.input.read_u8()? as i8),
            Tag::CharObject => Value::Char(self.input.read_u16()?),
            Tag::ShortObject => Value::Short(self.input.read_u16()? as i16),
            Tag::IntObject => Value::Int(self.input.read_i32()?),
            Tag::LongObject => Value::Long(self.input.read_i64()?),
            Tag::FloatObject => Value::Float(f32::from_bits(self.input.read_u32()?)),
            Tag::DoubleObject => Value::Double(f64::from_bits(self.input.read_i64()? as u64)),
            t => {
                return Err(WireError::CorruptStream(format!(
                    "unexpected {:?} where an object was expected",
                    t
                )))
            }
        })
    }

    /// Strings, arrays and containers carry their size class in the tag;
    /// every other tag must be a wrapper.
    fn read_sized(&mut self, tag: Tag, expect: Option<bool>) -> Result<Value> {
        if let Some(class) = tag.string_class() {
            self.read_string(class, expect.unwrap_or(false))
        } else if let Some((class, flag)) = tag.array_class() {
            self.read_array(class, unshared_for(expect, flag)?)
        } else if let Some((class, flag)) = tag.collection_class() {
            self.read_collection(class, unshared_for(expect, flag)?)
        } else {
            self.read_wrapper(tag)
        }
    }

    fn register(&mut self, v: &Value, unshared: bool) -> u32 {
        self.counters.new_objects += 1;
        if unshared {
            self.instances.push_unshared()
        } else {
            self.instances.push(v.clone())
        }
    }

    /// Apply the read-side substitution; a shared slot follows the replacement.
    fn finish_new(&mut self, index: u32, v: Value, unshared: bool) -> Result<Value> {
        let Some(sub) = self.collab.substitution.clone() else { return Ok(v) };
        let replaced = sub.after_read(v.clone())?;
        if !unshared && !replaced.same(&v) {
            self.instances.set(index, replaced.clone())?;
        }
        Ok(replaced)
    }

    fn read_size(&mut self, class: SizeClass) -> Result<usize> {
        match class {
            SizeClass::Empty => Ok(0),
            SizeClass::Small => Ok(small_len(self.input.read_u8()?)),
            SizeClass::Medium => Ok(medium_len(self.input.read_u16()?)),
            SizeClass::Large => large_len(self.input.read_i32()?),
        }
    }

    fn check_filter(&mut self, type_name: Option<&str>, array_length: Option<usize>) -> Result<()> {
        let Some(filter) = self.collab.filter.clone() else { return Ok(()) };
        let info = FilterInfo {
            type_name,
            array_length,
            depth: self.depth,
            references: self.instances.len() as u64,
            stream_bytes: self.input.bytes_read(),
        };
        if filter.check(&info) == FilterStatus::Rejected {
            warn!(ty = ?type_name, len = ?array_length, depth = self.depth, "rejected by unmarshalling filter");
            return Err(WireError::FilteredOut(format!(
                "{} rejected by filter",
                type_name.unwrap_or("object")
            )));
        }
        Ok(())
    }

    fn unresolvable(&self, desc: &ClassDescriptor) -> Result<Value> {
        self.unresolvable_named(desc.name.clone())
    }

    fn unresolvable_named(&self, name: String) -> Result<Value> {
        if self.config.skip_unresolvable {
            debug!(ty = %name, "skipping object of unresolvable type");
            Ok(Value::Null)
        } else {
            Err(WireError::UnresolvableType { name })
        }
    }

    fn read_string(&mut self, class: SizeClass, unshared: bool) -> Result<Value> {
        let len = self.read_size(class)?;
        let bytes = self.input.read_vec(len)?;
        let s = String::from_utf8(bytes)
            .map_err(|e| WireError::CorruptStream(format!("invalid UTF-8 in string: {}", e)))?;
        let v = Value::Str(Rc::from(s));
        let index = self.register(&v, unshared);
        self.finish_new(index, v, unshared)
    }

    fn component_of(&self, d: &DescriptorRef) -> Result<ComponentType> {
        let d = d.get()?;
        Ok(match d.kind {
            DescriptorKind::Primitive(k) => ComponentType::Primitive(k),
            DescriptorKind::Object => ComponentType::Any,
            DescriptorKind::String => ComponentType::String,
            DescriptorKind::Array => {
                let inner = d
                    .component
                    .as_ref()
                    .ok_or_else(|| WireError::CorruptStream("array type without component".into()))?;
                ComponentType::Array(Box::new(self.component_of(inner)?))
            }
            DescriptorKind::Gap => {
                return Err(WireError::CorruptStream("gap descriptor used as a type".into()))
            }
            _ => match &d.local {
                Some(t) => ComponentType::Type(Rc::clone(t)),
                None if self.config.skip_unresolvable => ComponentType::Any,
                None => return Err(WireError::UnresolvableType { name: d.name.clone() }),
            },
        })
    }

    fn read_array(&mut self, class: SizeClass, unshared: bool) -> Result<Value> {
        let len = self.read_size(class)?;
        let ctag = self.input.read_tag(self.version)?;
        let cdesc = self
            .read_type_descriptor(ctag)?
            .ok_or_else(|| WireError::CorruptStream("null array component type".into()))?;
        let component = self.component_of(&cdesc)?;
        self.check_filter(Some(&format!("{}[]", component.name())), Some(len))?;

        if let ComponentType::Primitive(k) = component {
            let total = len
                .checked_mul(k.width())
                .ok_or_else(|| WireError::CorruptStream(format!("array length {} overflows", len)))?;
            let bytes = self.input.read_vec(total)?;
            let v = Value::object(Object::Array(primitive_array(k, &bytes)));
            let index = self.register(&v, unshared);
            return self.finish_new(index, v, unshared);
        }

        let o = ObjectRef::new(Object::Array(ArrayValue::Object {
            component,
            elements: Vec::with_capacity(len.min(1024)),
        }));
        let v = Value::Object(o.clone());
        let index = self.register(&v, unshared);
        for i in 0..len {
            let e = self.read_value(Some(false)).context(|| format!("element [{}]", i))?;
            if let Object::Array(ArrayValue::Object { elements, .. }) = &mut *o.borrow_mut() {
                elements.push(e);
            }
        }
        self.finish_new(index, v, unshared)
    }

    fn read_collection(&mut self, class: SizeClass, unshared: bool) -> Result<Value> {
        let len = self.read_size(class)?;
        let ktag = self.input.read_tag(self.version)?;
        let kind = ContainerKind::from_tag(ktag)
            .ok_or_else(|| WireError::CorruptStream(format!("{:?} is not a container kind", ktag)))?;
        self.check_filter(Some(&format!("{:?}", kind)), Some(len))?;

        let cap = len.min(1024);
        let o = ObjectRef::new(if kind.is_map() {
            Object::Map(MapValue { kind, comparator: Value::Null, entries: Vec::with_capacity(cap) })
        } else {
            Object::Collection(CollectionValue { kind, comparator: Value::Null, elements: Vec::with_capacity(cap) })
        });
        let v = Value::Object(o.clone());
        let index = self.register(&v, unshared);

        if kind.is_sorted() {
            let c = self.read_value(Some(false)).context(|| "comparator")?;
            match &mut *o.borrow_mut() {
                Object::Map(m) => m.comparator = c,
                Object::Collection(cv) => cv.comparator = c,
                _ => {}
            }
        }
        for i in 0..len {
            if kind.is_map() {
                let k = self.read_value(Some(false)).context(|| format!("entry [{}] key", i))?;
                let val = self.read_value(Some(false)).context(|| format!("entry [{}] value", i))?;
                if let Object::Map(m) = &mut *o.borrow_mut() {
                    m.entries.push((k, val));
                }
            } else {
                let e = self.read_value(Some(false)).context(|| format!("element [{}]", i))?;
                if let Object::Collection(cv) = &mut *o.borrow_mut() {
                    cv.elements.push(e);
                }
            }
        }
        self.finish_new(index, v, unshared)
    }

    fn read_new_object(&mut self, unshared: bool) -> Result<Value> {
        let dtag = self.input.read_tag(self.version)?;
        let dref = self
            .read_type_descriptor(dtag)?
            .ok_or_else(|| WireError::CorruptStream("null type descriptor for new object".into()))?;
        let desc = Rc::clone(dref.get()?);
        self.read_new_object_of(&desc, unshared)
            .context(|| format!("reading {}", desc.name))
    }

    fn read_new_object_of(&mut self, desc: &Rc<ClassDescriptor>, unshared: bool) -> Result<Value> {
        match desc.kind {
            DescriptorKind::Enum => self.read_enum(desc, unshared),
            DescriptorKind::Proxy => self.read_proxy(desc, unshared),
            DescriptorKind::Serializable | DescriptorKind::WriteObject => self.read_serial(desc, unshared),
            DescriptorKind::Externalizable => self.read_externalizable(desc, unshared),
            DescriptorKind::Externalizer => self.read_externalizer(desc, unshared),
            DescriptorKind::Plain => Err(WireError::CorruptStream(format!(
                "plain type {} carries no instance data",
                desc.name
            ))),
            other => Err(WireError::CorruptStream(format!(
                "{:?} descriptor cannot introduce a new object",
                other
            ))),
        }
    }

    fn read_enum(&mut self, desc: &ClassDescriptor, unshared: bool) -> Result<Value> {
        let constant = self.input_utf()?;
        let v = match desc.local.as_ref().map(|t| t.enum_constant(&constant)) {
            Some(Some(c)) => Value::Object(c),
            Some(None) => {
                debug!(ty = %desc.name, constant = %constant, "enum constant unknown locally");
                self.unresolvable_named(format!("{}.{}", desc.name, constant))?
            }
            None => self.unresolvable(desc)?,
        };
        let index = self.register(&v, unshared);
        self.finish_new(index, v, unshared)
    }

    fn read_proxy(&mut self, desc: &ClassDescriptor, unshared: bool) -> Result<Value> {
        self.check_filter(Some(&desc.name), None)?;
        let Some(ty) = desc.local.clone() else {
            self.unresolvable(desc)?;
            self.register(&Value::Null, unshared);
            self.read_value(Some(false))?;
            return Ok(Value::Null);
        };
        let o = self.collab.instantiator.new_instance(&ty)?;
        let v = Value::Object(o.clone());
        let index = self.register(&v, unshared);
        let handler = self.read_value(Some(false)).context(|| "proxy handler")?;
        match &mut *o.borrow_mut() {
            Object::Proxy(p) => p.handler = handler,
            other => {
                return Err(WireError::CorruptStream(format!(
                    "instantiator returned {} for a proxy type",
                    other.type_name()
                )))
            }
        }
        self.finish_new(index, v, unshared)
    }

    fn read_serial(&mut self, desc: &Rc<ClassDescriptor>, unshared: bool) -> Result<Value> {
        self.check_filter(Some(&desc.name), None)?;
        let plan = self.level_plan(desc)?;
        let Some(ty) = desc.local.clone() else {
            self.unresolvable(desc)?;
            self.register(&Value::Null, unshared);
            for level in plan.iter() {
                self.read_level(None, level)?;
            }
            return Ok(Value::Null);
        };
        let o = self.collab.instantiator.new_instance(&ty)?;
        let v = Value::Object(o.clone());
        let index = self.register(&v, unshared);
        for level in plan.iter() {
            self.read_level(Some(&o), level)?;
        }
        self.finish_new(index, v, unshared)
    }

    fn read_externalizable(&mut self, desc: &ClassDescriptor, unshared: bool) -> Result<Value> {
        self.check_filter(Some(&desc.name), None)?;
        let codec = desc.local.as_ref().and_then(|t| t.externalizable_codec().cloned());
        let (Some(ty), Some(codec)) = (desc.local.clone(), codec) else {
            return self.skip_user_encoded(desc, unshared);
        };
        let o = self.collab.instantiator.new_instance(&ty)?;
        let v = Value::Object(o.clone());
        let index = self.register(&v, unshared);
        self.with_scope(|d| codec.read_external(d, &o))?;
        self.finish_new(index, v, unshared)
    }

    fn read_externalizer(&mut self, desc: &ClassDescriptor, unshared: bool) -> Result<Value> {
        self.check_filter(Some(&desc.name), None)?;
        let codec = desc.local.as_ref().and_then(|t| t.externalizer().cloned());
        let (Some(ty), Some(codec)) = (desc.local.clone(), codec) else {
            return self.skip_user_encoded(desc, unshared);
        };
        self.counters.new_objects += 1;
        let index = self.instances.reserve();
        let o = self.with_scope(|d| {
            let o = codec.create_external(&ty, d)?;
            if unshared {
                d.instances.mark_unshared(index);
            } else {
                d.instances.set(index, Value::Object(o.clone()))?;
            }
            codec.read_external(d, &o)?;
            Ok(o)
        })?;
        self.finish_new(index, Value::Object(o), unshared)
    }

    fn skip_user_encoded(&mut self, desc: &ClassDescriptor, unshared: bool) -> Result<Value> {
        self.unresolvable(desc)?;
        self.register(&Value::Null, unshared);
        self.with_scope(|_| Ok(()))?;
        Ok(Value::Null)
    }

    /// Run `f` inside a fresh hook scope, then drain whatever it left unread.
    pub(crate) fn with_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.blocks.enter();
        let frame = self.frame.take();
        let r = f(self).and_then(|v| {
            self.drain_scope()?;
            Ok(v)
        });
        self.frame = frame;
        self.blocks.restore(saved);
        r
    }

    /// Skip remaining segments and nested objects up to the scope end marker.
    pub(crate) fn drain_scope(&mut self) -> Result<()> {
        let mut skipped = 0usize;
        let mut objects = 0usize;
        loop {
            match self.blocks.advance(&mut self.input, self.version, &mut self.counters)? {
                BlockNext::Data(n) => {
                    self.blocks.skip_data(&mut self.input, n)?;
                    skipped += n;
                }
                BlockNext::Object => {
                    self.read_value(None)?;
                    objects += 1;
                }
                BlockNext::End => break,
            }
        }
        if skipped > 0 || objects > 0 {
            self.counters.drained_bytes += skipped as u64;
            debug!(skipped, objects, "drained unread hook data");
        }
        Ok(())
    }

    fn read_level(&mut self, obj: Option<&ObjectRef>, level: &Level) -> Result<()> {
        let hooks = level.local.as_ref().and_then(|t| t.hooks().cloned());
        match level.desc.kind {
            DescriptorKind::Gap => {
                if let (Some(h), Some(o)) = (hooks, obj) {
                    h.read_object_no_data(o)
                        .context(|| format!("no-data hook of {}", level.desc.name))?;
                }
                Ok(())
            }
            DescriptorKind::Serializable => self.read_fields(obj, level),
            DescriptorKind::WriteObject => {
                let obj = obj.cloned();
                self.with_scope(|d| match (&hooks, &obj) {
                    (Some(h), Some(o)) => {
                        let saved = d.frame.replace(ReadFrame { obj: o.clone(), level: level.clone() });
                        let r = h.read_object(d, o);
                        d.frame = saved;
                        r
                    }
                    (None, Some(_)) if level.local.is_some() => d.read_fields(obj.as_ref(), level),
                    _ => Ok(()),
                })
                .context(|| format!("read hook of {}", level.desc.name))
            }
            other => Err(WireError::CorruptStream(format!("{:?} is not a hierarchy level", other))),
        }
    }

    /// Fields of one level in stream order; unmatched fields are discarded.
    pub(crate) fn read_fields(&mut self, obj: Option<&ObjectRef>, level: &Level) -> Result<()> {
        let accessor = Rc::clone(&self.collab.accessor);
        for (i, f) in level.desc.fields.iter().enumerate() {
            let value = match &f.kind {
                FieldDescKind::Primitive(k) => self.read_primitive(*k),
                FieldDescKind::Reference(_) => self.read_value(Some(f.unshared)),
            }
            .context(|| format!("field {}.{}", level.desc.name, f.name))?;
            let target = level.targets.get(i).copied().flatten();
            match (obj, &level.local, target) {
                (Some(o), Some(local), Some(_)) => accessor
                    .set(o, local, &f.name, value)
                    .context(|| format!("field {}.{}", level.desc.name, f.name))?,
                (_, Some(_), None) => {
                    debug!(ty = %level.desc.name, field = %f.name, "stream field unknown locally; discarded")
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cold]
fn depth_exceeded(max_depth: usize) -> WireError {
    WireError::FilteredOut(format!("nesting exceeds max_depth {}", max_depth))
}

fn unshared_for(expect: Option<bool>, flag: bool) -> Result<bool> {
    match expect {
        Some(e) if e != flag => Err(WireError::SharedUnsharedMismatch(format!(
            "stream record is {}, caller expected {}",
            if flag { "unshared" } else { "shared" },
            if e { "unshared" } else { "shared" }
        ))),
        _ => Ok(flag),
    }
}

fn primitive_array(kind: PrimitiveKind, b: &[u8]) -> ArrayValue {
    let w = kind.width();
    match kind {
        PrimitiveKind::Boolean => ArrayValue::Boolean(b.iter().map(|x| *x != 0).collect()),
        PrimitiveKind::Byte => ArrayValue::Byte(b.iter().map(|x| *x as i8).collect()),
        PrimitiveKind::Char => ArrayValue::Char(b.chunks_exact(w).map(BigEndian::read_u16).collect()),
        PrimitiveKind::Short => ArrayValue::Short(b.chunks_exact(w).map(BigEndian::read_i16).collect()),
        PrimitiveKind::Int => ArrayValue::Int(b.chunks_exact(w).map(BigEndian::read_i32).collect()),
        PrimitiveKind::Long => ArrayValue::Long(b.chunks_exact(w).map(BigEndian::read_i64).collect()),
        PrimitiveKind::Float => ArrayValue::Float(b.chunks_exact(w).map(BigEndian::read_f32).collect()),
        PrimitiveKind::Double => ArrayValue::Double(b.chunks_exact(w).map(BigEndian::read_f64).collect()),
    }
}
