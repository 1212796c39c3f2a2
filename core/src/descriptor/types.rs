//! descriptor/types.rs
//! Stream-side type descriptors and the per-level read plan.
//!
//! Design notes:
//! - A descriptor is registered in the type sequence before its body is
//!   read, through a `DescriptorRef` whose cell is filled exactly once when
//!   the body is complete. Back-references into a descriptor still being
//!   read (self-referential field types) hold the unfilled cell.
//! - `local` is `None` for placeholders: layout known, type unresolved.
//! - Levels are matched to the local hierarchy by type name. Stream levels
//!   with no local counterpart are read and discarded; local levels absent
//!   from the stream become gaps.

use std::cell::OnceCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use tracing::debug;

use crate::constants::{field_flags, Tag};
use crate::model::{FieldKind, PrimitiveKind, TypeDef, TypeRef};
use crate::types::{Result, WireError};

/// Longest super-descriptor chain accepted from a stream.
pub const MAX_CHAIN_LEN: usize = 512;

bitflags! {
    /// Per-field flag byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FieldFlags: u8 {
        const UNSHARED = field_flags::UNSHARED;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Plain,
    Serializable,
    /// Auto-encoded level whose data lives in a hook scope.
    WriteObject,
    Externalizable,
    Externalizer,
    Enum,
    Proxy,
    Array,
    Object,
    String,
    Primitive(PrimitiveKind),
    /// Local level with no data in the stream.
    Gap,
}

impl DescriptorKind {
    pub fn is_serial(self) -> bool {
        matches!(self, DescriptorKind::Serializable | DescriptorKind::WriteObject)
    }
}

pub fn prim_tag(kind: PrimitiveKind) -> Tag {
    match kind {
        PrimitiveKind::Boolean => Tag::PrimBoolean,
        PrimitiveKind::Byte => Tag::PrimByte,
        PrimitiveKind::Char => Tag::PrimChar,
        PrimitiveKind::Short => Tag::PrimShort,
        PrimitiveKind::Int => Tag::PrimInt,
        PrimitiveKind::Long => Tag::PrimLong,
        PrimitiveKind::Float => Tag::PrimFloat,
        PrimitiveKind::Double => Tag::PrimDouble,
    }
}

pub fn prim_from_tag(tag: Tag) -> Option<PrimitiveKind> {
    Some(match tag {
        Tag::PrimBoolean => PrimitiveKind::Boolean,
        Tag::PrimByte => PrimitiveKind::Byte,
        Tag::PrimChar => PrimitiveKind::Char,
        Tag::PrimShort => PrimitiveKind::Short,
        Tag::PrimInt => PrimitiveKind::Int,
        Tag::PrimLong => PrimitiveKind::Long,
        Tag::PrimFloat => PrimitiveKind::Float,
        Tag::PrimDouble => PrimitiveKind::Double,
        _ => return None,
    })
}

#[derive(Debug, Clone)]
pub enum FieldDescKind {
    Primitive(PrimitiveKind),
    /// Declared type of the field as advertised by the stream.
    Reference(DescriptorRef),
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: Rc<str>,
    pub kind: FieldDescKind,
    pub unshared: bool,
}

impl FieldDescriptor {
    /// Does the stream field carry a value the local field can hold?
    pub fn compatible_with(&self, local: &FieldKind) -> bool {
        match (&self.kind, local) {
            (FieldDescKind::Primitive(a), FieldKind::Primitive(b)) => a == b,
            (FieldDescKind::Reference(_), FieldKind::Reference(_)) => true,
            _ => false,
        }
    }
}

pub struct ClassDescriptor {
    pub name: String,
    pub kind: DescriptorKind,
    pub fingerprint: Option<i64>,
    pub fields: Vec<FieldDescriptor>,
    pub super_desc: Option<DescriptorRef>,
    pub interfaces: Vec<String>,
    pub component: Option<DescriptorRef>,
    pub local: Option<TypeRef>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>, kind: DescriptorKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fingerprint: None,
            fields: Vec::new(),
            super_desc: None,
            interfaces: Vec::new(),
            component: None,
            local: None,
        }
    }

    /// Descriptor for a tag with no body (`ObjectClass`, `StringClass`, primitives).
    pub fn predefined(tag: Tag) -> Option<Self> {
        let (name, kind) = match tag {
            Tag::ObjectClass => ("Object".to_string(), DescriptorKind::Object),
            Tag::StringClass => ("String".to_string(), DescriptorKind::String),
            t => {
                let k = prim_from_tag(t)?;
                (format!("{:?}", k).to_lowercase(), DescriptorKind::Primitive(k))
            }
        };
        Some(Self::new(name, kind))
    }

    pub fn gap(local: &TypeRef) -> Self {
        let mut d = Self::new(local.name(), DescriptorKind::Gap);
        d.local = Some(Rc::clone(local));
        d
    }

    pub fn is_placeholder(&self) -> bool {
        self.local.is_none()
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("fingerprint", &self.fingerprint)
            .field("fields", &self.fields.iter().map(|f| &*f.name).collect::<Vec<_>>())
            .field("resolved", &self.local.is_some())
            .finish()
    }
}

/// Forward-declarable handle to a descriptor.
#[derive(Clone, Default)]
pub struct DescriptorRef(Rc<OnceCell<Rc<ClassDescriptor>>>);

impl DescriptorRef {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn resolved(desc: ClassDescriptor) -> Self {
        let r = Self::pending();
        let _ = r.0.set(Rc::new(desc));
        r
    }

    pub fn fill(&self, desc: ClassDescriptor) -> Result<()> {
        self.0
            .set(Rc::new(desc))
            .map_err(|d| WireError::CorruptStream(format!("descriptor {} resolved twice", d.name)))
    }

    pub fn get(&self) -> Result<&Rc<ClassDescriptor>> {
        self.0
            .get()
            .ok_or_else(|| WireError::CorruptStream("descriptor used before it was resolved".into()))
    }
}

impl fmt::Debug for DescriptorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(d) => write!(f, "DescriptorRef({})", d.name),
            None => f.write_str("DescriptorRef(<pending>)"),
        }
    }
}

/// One hierarchy level to read, root first.
#[derive(Debug, Clone)]
pub struct Level {
    pub desc: Rc<ClassDescriptor>,
    /// Local level receiving the data; `None` means read and discard.
    pub local: Option<TypeRef>,
    /// For each stream field, the index of the matching local field.
    pub targets: Vec<Option<usize>>,
}

fn match_fields(desc: &ClassDescriptor, local: Option<&TypeRef>) -> Vec<Option<usize>> {
    desc.fields
        .iter()
        .map(|f| {
            let local = local?;
            let (i, lf) = local.fields().iter().enumerate().find(|(_, lf)| lf.name == f.name)?;
            if f.compatible_with(&lf.kind) {
                Some(i)
            } else {
                debug!(
                    ty = %desc.name,
                    field = %f.name,
                    "stream field kind differs from local field; discarding"
                );
                None
            }
        })
        .collect()
}

/// Stream descriptors from the root level down to `leaf`.
pub fn stream_chain(leaf: &Rc<ClassDescriptor>) -> Result<Vec<Rc<ClassDescriptor>>> {
    let mut chain = vec![Rc::clone(leaf)];
    let mut seen = HashSet::new();
    seen.insert(Rc::as_ptr(leaf));
    let mut cur = leaf.super_desc.clone();
    while let Some(r) = cur {
        let d = Rc::clone(r.get()?);
        if !d.kind.is_serial() {
            return Err(WireError::CorruptStream(format!(
                "super-descriptor {} of {} is not auto-encoded",
                d.name, leaf.name
            )));
        }
        if !seen.insert(Rc::as_ptr(&d)) || chain.len() >= MAX_CHAIN_LEN {
            return Err(WireError::CorruptStream(format!(
                "cyclic or overlong super-descriptor chain at {}",
                d.name
            )));
        }
        cur = d.super_desc.clone();
        chain.push(d);
    }
    chain.reverse();
    Ok(chain)
}

/// Match the stream's levels for `leaf` against the local hierarchy.
///
/// Every local level missing from the stream gets its own gap entry, placed
/// before the next matched level, so gaps appear in local root-first order.
pub fn build_level_plan(leaf: &Rc<ClassDescriptor>) -> Result<Vec<Level>> {
    let streamed = stream_chain(leaf)?;
    let local_chain = leaf.local.as_ref().map(TypeDef::serial_chain).unwrap_or_default();

    let mut plan = Vec::with_capacity(streamed.len().max(local_chain.len()));
    let mut next_local = 0;
    for sd in streamed {
        let pos = local_chain[next_local..]
            .iter()
            .position(|t| t.name() == sd.name)
            .map(|p| p + next_local);
        match pos {
            Some(pos) => {
                for t in &local_chain[next_local..pos] {
                    plan.push(gap_level(t));
                }
                let local = Rc::clone(&local_chain[pos]);
                let targets = match_fields(&sd, Some(&local));
                plan.push(Level { desc: sd, local: Some(local), targets });
                next_local = pos + 1;
            }
            None => {
                if leaf.local.is_some() {
                    debug!(ty = %sd.name, "stream level has no local counterpart; discarding");
                }
                let targets = vec![None; sd.fields.len()];
                plan.push(Level { desc: sd, local: None, targets });
            }
        }
    }
    for t in &local_chain[next_local..] {
        plan.push(gap_level(t));
    }
    Ok(plan)
}

fn gap_level(local: &TypeRef) -> Level {
    Level {
        desc: Rc::new(ClassDescriptor::gap(local)),
        local: Some(Rc::clone(local)),
        targets: Vec::new(),
    }
}
