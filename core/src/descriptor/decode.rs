//! descriptor/decode.rs
//! Type descriptor resolution on the decode side.
//!
//! Each new descriptor reserves its cache slot with an unfilled
//! `DescriptorRef` before the body is read, and fills it once the body and
//! super chain are complete. Names the resolver does not know produce
//! placeholder descriptors (`local == None`) so their data can be skipped.

use std::io::Read;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::cache::{BackRef, SlotCache};
use crate::constants::{Tag, VERSION_SPLIT_TYPE_CACHE};
use crate::decoder::Decoder;
use crate::descriptor::types::{
    build_level_plan, ClassDescriptor, DescriptorKind, DescriptorRef, FieldDescKind, FieldDescriptor,
    FieldFlags, Level,
};
use crate::model::{PrimitiveKind, TypeRef, TypeVariant};
use crate::types::{Result, ResultExt, WireError};
use crate::utils::fmt_bytes;

impl<R: Read> Decoder<R> {
    /// Read the descriptor introduced by `tag`. `Null` yields `None`.
    pub(crate) fn read_type_descriptor(&mut self, tag: Tag) -> Result<Option<DescriptorRef>> {
        let serial_split = self.version >= VERSION_SPLIT_TYPE_CACHE;
        let d = match tag {
            Tag::Null => return Ok(None),
            Tag::RepeatClassNear | Tag::RepeatClassNearish | Tag::RepeatClassFar => {
                let r = self.read_back_ref(tag)?;
                let d = lookup_descriptor(&self.classes, r)?;
                self.counters.descriptor_back_refs += 1;
                d
            }
            Tag::RepeatSerialClassNear | Tag::RepeatSerialClassNearish | Tag::RepeatSerialClassFar => {
                let r = self.read_back_ref(tag)?;
                let d = lookup_descriptor(&self.serial_classes, r)?;
                self.counters.descriptor_back_refs += 1;
                d
            }
            Tag::ObjectClass | Tag::StringClass => self.predefined(tag)?,
            t if crate::descriptor::types::prim_from_tag(t).is_some() => self.predefined(t)?,
            Tag::ArrayTypeClass => {
                let inner_tag = self.input.read_tag(self.version)?;
                let inner = self
                    .read_type_descriptor(inner_tag)?
                    .ok_or_else(|| WireError::CorruptStream("null array component type".into()))?;
                let name = match inner.get() {
                    Ok(d) => format!("{}[]", d.name),
                    Err(_) => "[]".to_string(),
                };
                let mut d = ClassDescriptor::new(name, DescriptorKind::Array);
                d.component = Some(inner);
                DescriptorRef::resolved(d)
            }
            Tag::PlainClass => self.read_named(DescriptorKind::Plain, false, false)?,
            Tag::EnumTypeClass => self.read_named(DescriptorKind::Enum, false, false)?,
            Tag::ExternalizerClass => self.read_named(DescriptorKind::Externalizer, false, false)?,
            Tag::ExternalizableClass => self.read_named(DescriptorKind::Externalizable, true, false)?,
            Tag::SerializableClass => self.read_named(DescriptorKind::Serializable, true, serial_split)?,
            Tag::WriteObjectClass => self.read_named(DescriptorKind::WriteObject, true, serial_split)?,
            Tag::ProxyClass => self.read_proxy_descriptor()?,
            other => {
                return Err(WireError::CorruptStream(format!(
                    "expected a type descriptor, found {:?}",
                    other
                )))
            }
        };
        Ok(Some(d))
    }

    fn predefined(&self, tag: Tag) -> Result<DescriptorRef> {
        ClassDescriptor::predefined(tag)
            .map(DescriptorRef::resolved)
            .ok_or_else(|| WireError::CorruptStream(format!("{:?} is not a predefined type", tag)))
    }

    fn reserve_descriptor(&mut self, serial: bool) -> DescriptorRef {
        let cell = DescriptorRef::pending();
        if serial {
            self.serial_classes.push(cell.clone());
        } else {
            self.classes.push(cell.clone());
        }
        self.counters.new_descriptors += 1;
        cell
    }

    fn read_named(&mut self, kind: DescriptorKind, fingerprinted: bool, serial_cache: bool) -> Result<DescriptorRef> {
        let cell = self.reserve_descriptor(serial_cache);
        let name = self.input_utf()?;
        let mut d = ClassDescriptor::new(name, kind);
        if fingerprinted {
            d.fingerprint = Some(self.input.read_i64()?);
        }
        if kind.is_serial() {
            let name = d.name.clone();
            self.read_serial_body(&mut d).context(|| format!("descriptor {}", name))?;
        }
        d.local = self.resolve_local(&d);
        if d.is_placeholder() {
            debug!(ty = %d.name, kind = ?kind, "type not resolvable locally; using placeholder");
        }
        cell.fill(d)?;
        Ok(cell)
    }

    fn read_serial_body(&mut self, d: &mut ClassDescriptor) -> Result<()> {
        let count = self.input.read_u16()? as usize;
        d.fields.reserve(count.min(1024));
        for _ in 0..count {
            let raw_flags = self.input.read_u8()?;
            let flags = FieldFlags::from_bits(raw_flags)
                .ok_or_else(|| WireError::CorruptStream(format!("unknown field flags 0x{:02x}", raw_flags)))?;
            let code = self.input.read_u8()?;
            let name: Rc<str> = Rc::from(self.input_utf()?);
            let kind = if code == b'L' {
                let t = self.input.read_tag(self.version)?;
                let decl = self
                    .read_type_descriptor(t)
                    .context(|| format!("declared type of {}", name))?
                    .ok_or_else(|| WireError::CorruptStream(format!("null declared type for {}", name)))?;
                FieldDescKind::Reference(decl)
            } else {
                let k = PrimitiveKind::from_code(code).ok_or_else(|| {
                    WireError::CorruptStream(format!("unknown field kind 0x{:02x} for {}", code, name))
                })?;
                FieldDescKind::Primitive(k)
            };
            d.fields.push(FieldDescriptor { name, kind, unshared: flags.contains(FieldFlags::UNSHARED) });
        }
        let super_tag = self.input.read_tag(self.version)?;
        let sup = self.read_type_descriptor(super_tag).context(|| "super-descriptor")?;
        if let Some(s) = &sup {
            if let Ok(sd) = s.get() {
                if !sd.kind.is_serial() {
                    return Err(WireError::CorruptStream(format!(
                        "super-descriptor {} is not auto-encoded",
                        sd.name
                    )));
                }
            }
        }
        d.super_desc = sup;
        Ok(())
    }

    fn read_proxy_descriptor(&mut self) -> Result<DescriptorRef> {
        let cell = self.reserve_descriptor(false);
        let count = self.input.read_u16()? as usize;
        let mut interfaces = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            interfaces.push(self.input_utf()?);
        }
        let mut d = ClassDescriptor::new(format!("$Proxy[{}]", interfaces.join(",")), DescriptorKind::Proxy);
        d.local = self.collab.resolver.resolve_proxy(&interfaces);
        if d.local.is_none() {
            debug!(interfaces = ?interfaces, "proxy interfaces not resolvable locally");
        }
        d.interfaces = interfaces;
        cell.fill(d)?;
        Ok(cell)
    }

    /// Local type for a named descriptor, if the resolver knows one of a
    /// matching variant.
    fn resolve_local(&self, d: &ClassDescriptor) -> Option<TypeRef> {
        let local = self.collab.resolver.resolve(&d.name, d.fingerprint)?;
        let expected = match d.kind {
            DescriptorKind::Plain => None,
            DescriptorKind::Serializable | DescriptorKind::WriteObject => Some(TypeVariant::Serializable),
            DescriptorKind::Externalizable => Some(TypeVariant::Externalizable),
            DescriptorKind::Externalizer => Some(TypeVariant::Externalizer),
            DescriptorKind::Enum => Some(TypeVariant::Enum),
            _ => None,
        };
        if let Some(v) = expected {
            if local.variant() != v {
                warn!(ty = %d.name, stream = ?d.kind, local = ?local.variant(), "local type variant differs from stream");
                return None;
            }
        }
        if let Some(fp) = d.fingerprint {
            if fp != local.fingerprint() {
                debug!(ty = %d.name, stream = fp, local = local.fingerprint(), "fingerprint mismatch; matching fields by name");
            }
        }
        Some(local)
    }

    /// Read plan for `leaf`, memoized per descriptor.
    pub(crate) fn level_plan(&mut self, leaf: &Rc<ClassDescriptor>) -> Result<Rc<[Level]>> {
        let key = Rc::as_ptr(leaf) as usize;
        if let Some(plan) = self.plans.get(&key) {
            return Ok(Rc::clone(plan));
        }
        let plan: Rc<[Level]> = build_level_plan(leaf)?.into();
        self.plans.insert(key, Rc::clone(&plan));
        Ok(plan)
    }

    pub(crate) fn read_back_ref(&mut self, tag: Tag) -> Result<BackRef> {
        Ok(match tag {
            Tag::RepeatObjectNear | Tag::RepeatClassNear | Tag::RepeatSerialClassNear => {
                BackRef::Near(self.input.read_u8()?)
            }
            Tag::RepeatObjectNearish | Tag::RepeatClassNearish | Tag::RepeatSerialClassNearish => {
                BackRef::Nearish(self.input.read_u16()?)
            }
            Tag::RepeatObjectFar | Tag::RepeatClassFar | Tag::RepeatSerialClassFar => {
                BackRef::Far(self.input.read_u32()?)
            }
            other => return Err(WireError::CorruptStream(format!("{:?} is not a back-reference", other))),
        })
    }

    /// u16-length-prefixed UTF-8 read straight from the stream.
    pub(crate) fn input_utf(&mut self) -> Result<String> {
        let len = self.input.read_u16()? as usize;
        let bytes = self.input.read_vec(len)?;
        String::from_utf8(bytes).map_err(|e| {
            WireError::CorruptStream(format!("invalid UTF-8 {}: {}", fmt_bytes(e.as_bytes()), e.utf8_error()))
        })
    }
}

fn lookup_descriptor(cache: &SlotCache<DescriptorRef>, r: BackRef) -> Result<DescriptorRef> {
    let index = r.resolve(cache.len())?;
    cache.get(index).cloned()
}
