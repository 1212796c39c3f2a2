//! descriptor/encode.rs
//! Type descriptor emission.
//!
//! Layout per tag (after the tag byte):
//!   PlainClass / EnumTypeClass / ExternalizerClass : utf name
//!   ExternalizableClass                            : utf name, i64 fingerprint
//!   SerializableClass / WriteObjectClass           : utf name, i64 fingerprint,
//!       u16 field count, fields, super descriptor (or Null)
//!   ProxyClass                                     : u16 count, utf interface names
//!   ArrayTypeClass                                 : component descriptor
//! Field entry: u8 flags, u8 kind code, utf name, and for references ('L')
//! the declared type's descriptor.
//!
//! A descriptor takes its cache slot when its tag is written, before its
//! body, so self-referential field types resolve to a back-reference.

use std::io::Write;
use std::rc::Rc;

use tracing::trace;

use crate::cache::BackRef;
use crate::constants::{Tag, VERSION_SPLIT_TYPE_CACHE};
use crate::descriptor::types::{prim_tag, FieldFlags};
use crate::encoder::Encoder;
use crate::model::{ComponentType, DeclaredType, FieldKind, TypeRef, TypeVariant};
use crate::types::{Result, ResultExt, WireError};

impl<W: Write> Encoder<W> {
    /// Descriptor for `ty`, or a back-reference if already written.
    pub(crate) fn write_type_descriptor(&mut self, ty: &TypeRef) -> Result<()> {
        let split = self.config.version >= VERSION_SPLIT_TYPE_CACHE && ty.is_serializable();
        let key = Rc::as_ptr(ty) as *const u8 as usize;
        let cache = if split { &mut self.serial_classes } else { &mut self.classes };

        if let Some(index) = cache.lookup(key) {
            let r = BackRef::select(index, cache.len());
            let (near, nearish, far) = if split {
                (Tag::RepeatSerialClassNear, Tag::RepeatSerialClassNearish, Tag::RepeatSerialClassFar)
            } else {
                (Tag::RepeatClassNear, Tag::RepeatClassNearish, Tag::RepeatClassFar)
            };
            match r {
                BackRef::Near(b) => {
                    self.out.put_tag(near)?;
                    self.out.put_u8(b)?;
                }
                BackRef::Nearish(v) => {
                    self.out.put_tag(nearish)?;
                    self.out.put_u16(v)?;
                }
                BackRef::Far(i) => {
                    self.out.put_tag(far)?;
                    self.out.put_u32(i)?;
                }
            }
            self.counters.descriptor_back_refs += 1;
            return Ok(());
        }

        cache.push(key, Rc::clone(ty));
        self.counters.new_descriptors += 1;
        let name = self.collab.resolver.name_of(ty);
        trace!(ty = %name, variant = ?ty.variant(), "new type descriptor");

        match ty.variant() {
            TypeVariant::Plain => {
                self.out.put_tag(Tag::PlainClass)?;
                self.put_utf(&name)
            }
            TypeVariant::Enum => {
                self.out.put_tag(Tag::EnumTypeClass)?;
                self.put_utf(&name)
            }
            TypeVariant::Externalizer => {
                self.out.put_tag(Tag::ExternalizerClass)?;
                self.put_utf(&name)
            }
            TypeVariant::Externalizable => {
                self.out.put_tag(Tag::ExternalizableClass)?;
                self.put_utf(&name)?;
                self.out.put_i64(ty.fingerprint())
            }
            TypeVariant::Proxy => {
                self.out.put_tag(Tag::ProxyClass)?;
                let interfaces = ty.interfaces();
                let count = u16::try_from(interfaces.len())
                    .map_err(|_| WireError::NotEncodable("too many proxy interfaces".into()))?;
                self.out.put_u16(count)?;
                for i in interfaces {
                    self.put_utf(i)?;
                }
                Ok(())
            }
            TypeVariant::Serializable => self
                .write_serial_descriptor(ty, &name)
                .context(|| format!("descriptor {}", name)),
        }
    }

    fn write_serial_descriptor(&mut self, ty: &TypeRef, name: &str) -> Result<()> {
        let tag = if ty.hooks().is_some() { Tag::WriteObjectClass } else { Tag::SerializableClass };
        self.out.put_tag(tag)?;
        self.put_utf(name)?;
        self.out.put_i64(ty.fingerprint())?;
        let count = u16::try_from(ty.fields().len())
            .map_err(|_| WireError::NotEncodable("more than 65535 fields".into()))?;
        self.out.put_u16(count)?;
        for f in ty.fields() {
            let mut flags = FieldFlags::empty();
            flags.set(FieldFlags::UNSHARED, f.unshared);
            self.out.put_u8(flags.bits())?;
            self.out.put_u8(f.kind.code() as u8)?;
            self.put_utf(&f.name)?;
            if let FieldKind::Reference(decl) = &f.kind {
                self.write_declared_type(decl)
                    .context(|| format!("declared type of {}", f.name))?;
            }
        }
        match ty.serial_super() {
            Some(parent) => self.write_type_descriptor(parent),
            None => self.out.put_tag(Tag::Null),
        }
    }

    fn write_declared_type(&mut self, decl: &DeclaredType) -> Result<()> {
        match decl {
            DeclaredType::Any => self.out.put_tag(Tag::ObjectClass),
            DeclaredType::String => self.out.put_tag(Tag::StringClass),
            DeclaredType::Named(n) => match self.collab.resolver.resolve(n, None) {
                Some(t) => self.write_type_descriptor(&t),
                None => {
                    trace!(ty = %n, "declared field type unknown to resolver; writing Object");
                    self.out.put_tag(Tag::ObjectClass)
                }
            },
        }
    }

    /// Element type of an array.
    pub(crate) fn write_component_type(&mut self, c: &ComponentType) -> Result<()> {
        match c {
            ComponentType::Primitive(k) => self.out.put_tag(prim_tag(*k)),
            ComponentType::Any => self.out.put_tag(Tag::ObjectClass),
            ComponentType::String => self.out.put_tag(Tag::StringClass),
            ComponentType::Type(t) => self.write_type_descriptor(t),
            ComponentType::Array(inner) => {
                self.out.put_tag(Tag::ArrayTypeClass)?;
                self.write_component_type(inner)
            }
        }
    }
}
