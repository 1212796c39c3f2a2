//! constants.rs
//! Protocol table: version bounds, tag bytes and size-class limits.
//!
//! Design notes:
//! - Tag values are append-only. A byte is never reassigned once released.
//! - Every tag carries the first protocol version that defines it; decoders
//!   reject tags newer than the negotiated session version.
//! - All multi-byte integers on the wire are big-endian.

use num_enum::TryFromPrimitive;

use crate::types::{Result, WireError};

/// Oldest protocol version a decoder will accept.
pub const MIN_VERSION: u8 = 2;
/// Newest protocol version this engine speaks.
pub const MAX_VERSION: u8 = 4;
/// Default version written by encoders.
pub const DEFAULT_VERSION: u8 = MAX_VERSION;

/// First version carrying the known-container shortcuts and empty block segments.
pub const VERSION_CONTAINERS: u8 = 3;
/// First version with a separate type sequence for auto-encoded descriptors.
pub const VERSION_SPLIT_TYPE_CACHE: u8 = 4;

/// Default hook-scope buffer flush threshold (bytes).
pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024;
/// Upper bound for the hook-scope buffer.
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;
/// Default recursion limit for a single top-level call. Each level costs
/// several stack frames, so this stays within a 2 MiB thread stack unoptimized.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Largest length carried by a "small" size class (1-byte prefix, 0 means 256).
pub const SMALL_LIMIT: usize = 0x100;
/// Largest length carried by a "medium" size class (2-byte prefix, 0 means 65536).
pub const MEDIUM_LIMIT: usize = 0x1_0000;

/// Back-reference deltas at or above this value use the 1-byte form.
pub const NEAR_MIN_DELTA: i64 = -0x100;
/// Back-reference deltas at or above this value use the 2-byte form.
pub const NEARISH_MIN_DELTA: i64 = -0x1_0000;

/// Field descriptor flag bits.
pub mod field_flags {
    pub const UNSHARED: u8 = 0x01;
}

/// Tag bytes. `0x00` is never a valid tag.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum Tag {
    Null                    = 0x01,
    RepeatObjectFar         = 0x02,
    RepeatObjectNear        = 0x03,
    RepeatObjectNearish     = 0x04,
    NewObject               = 0x05,
    NewObjectUnshared       = 0x06,
    RepeatClassFar          = 0x07,
    RepeatClassNear         = 0x08,
    RepeatClassNearish      = 0x09,
    PlainClass              = 0x0a,
    ProxyClass              = 0x0b,
    SerializableClass       = 0x0c,
    ExternalizableClass     = 0x0d,
    ExternalizerClass       = 0x0e,
    EnumTypeClass           = 0x0f,
    ArrayTypeClass          = 0x10,
    WriteObjectClass        = 0x11,
    ObjectClass             = 0x12,
    StringClass             = 0x13,
    PrimBoolean             = 0x14,
    PrimByte                = 0x15,
    PrimChar                = 0x16,
    PrimShort               = 0x17,
    PrimInt                 = 0x18,
    PrimLong                = 0x19,
    PrimFloat               = 0x1a,
    PrimDouble              = 0x1b,
    StartBlockSmall         = 0x1c,
    StartBlockMedium        = 0x1d,
    StartBlockLarge         = 0x1e,
    EndBlockData            = 0x1f,
    ClearClassCache         = 0x20,
    ClearInstanceCache      = 0x21,
    BooleanObjectTrue       = 0x22,
    BooleanObjectFalse      = 0x23,
    ByteObject              = 0x24,
    CharObject              = 0x25,
    ShortObject             = 0x26,
    IntObject               = 0x27,
    LongObject              = 0x28,
    FloatObject             = 0x29,
    DoubleObject            = 0x2a,
    StringEmpty             = 0x2b,
    StringSmall             = 0x2c,
    StringMedium            = 0x2d,
    StringLarge             = 0x2e,
    ArrayEmpty              = 0x2f,
    ArraySmall              = 0x30,
    ArrayMedium             = 0x31,
    ArrayLarge              = 0x32,
    ArrayEmptyUnshared      = 0x33,
    ArraySmallUnshared      = 0x34,
    ArrayMediumUnshared     = 0x35,
    ArrayLargeUnshared      = 0x36,
    // --- v3 ---
    CollectionEmpty         = 0x37,
    CollectionSmall         = 0x38,
    CollectionMedium        = 0x39,
    CollectionLarge         = 0x3a,
    CollectionEmptyUnshared = 0x3b,
    CollectionSmallUnshared = 0x3c,
    CollectionMediumUnshared = 0x3d,
    CollectionLargeUnshared = 0x3e,
    CcArrayList             = 0x3f,
    CcLinkedList            = 0x40,
    CcHashSet               = 0x41,
    CcLinkedHashSet         = 0x42,
    CcTreeSet               = 0x43,
    CcHashMap               = 0x44,
    CcLinkedHashMap         = 0x45,
    CcTreeMap               = 0x46,
    CcIdentityHashMap       = 0x47,
    StartBlockEmpty         = 0x48,
    // --- v4 ---
    RepeatSerialClassFar    = 0x49,
    RepeatSerialClassNear   = 0x4a,
    RepeatSerialClassNearish = 0x4b,
}

/// Size class of a length-prefixed run (blocks, strings, arrays, containers).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SizeClass {
    Empty,
    Small,
    Medium,
    Large,
}

impl Tag {
    /// First protocol version in which this tag is defined.
    pub const fn min_version(self) -> u8 {
        let b = self as u8;
        if b >= Tag::RepeatSerialClassFar as u8 {
            VERSION_SPLIT_TYPE_CACHE
        } else if b >= Tag::CollectionEmpty as u8 {
            VERSION_CONTAINERS
        } else {
            MIN_VERSION
        }
    }

    /// Decode a tag byte, rejecting bytes not defined for `version`.
    pub fn decode(raw: u8, version: u8) -> Result<Tag> {
        let tag = Tag::try_from_primitive(raw)
            .map_err(|_| WireError::CorruptStream(format!("unknown tag 0x{:02x}", raw)))?;
        if tag.min_version() > version {
            return Err(WireError::CorruptStream(format!(
                "tag {:?} requires protocol version {}, session is version {}",
                tag,
                tag.min_version(),
                version
            )));
        }
        Ok(tag)
    }

    /// Byte value on the wire.
    #[inline(always)]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Size class selected by a string tag.
    pub fn string_class(self) -> Option<SizeClass> {
        match self {
            Tag::StringEmpty => Some(SizeClass::Empty),
            Tag::StringSmall => Some(SizeClass::Small),
            Tag::StringMedium => Some(SizeClass::Medium),
            Tag::StringLarge => Some(SizeClass::Large),
            _ => None,
        }
    }

    /// Size class and unshared flag selected by an array tag.
    pub fn array_class(self) -> Option<(SizeClass, bool)> {
        match self {
            Tag::ArrayEmpty => Some((SizeClass::Empty, false)),
            Tag::ArraySmall => Some((SizeClass::Small, false)),
            Tag::ArrayMedium => Some((SizeClass::Medium, false)),
            Tag::ArrayLarge => Some((SizeClass::Large, false)),
            Tag::ArrayEmptyUnshared => Some((SizeClass::Empty, true)),
            Tag::ArraySmallUnshared => Some((SizeClass::Small, true)),
            Tag::ArrayMediumUnshared => Some((SizeClass::Medium, true)),
            Tag::ArrayLargeUnshared => Some((SizeClass::Large, true)),
            _ => None,
        }
    }

    /// Size class and unshared flag selected by a container tag.
    pub fn collection_class(self) -> Option<(SizeClass, bool)> {
        match self {
            Tag::CollectionEmpty => Some((SizeClass::Empty, false)),
            Tag::CollectionSmall => Some((SizeClass::Small, false)),
            Tag::CollectionMedium => Some((SizeClass::Medium, false)),
            Tag::CollectionLarge => Some((SizeClass::Large, false)),
            Tag::CollectionEmptyUnshared => Some((SizeClass::Empty, true)),
            Tag::CollectionSmallUnshared => Some((SizeClass::Small, true)),
            Tag::CollectionMediumUnshared => Some((SizeClass::Medium, true)),
            Tag::CollectionLargeUnshared => Some((SizeClass::Large, true)),
            _ => None,
        }
    }

    /// Size class of a block segment header tag.
    pub fn block_class(self) -> Option<SizeClass> {
        match self {
            Tag::StartBlockEmpty => Some(SizeClass::Empty),
            Tag::StartBlockSmall => Some(SizeClass::Small),
            Tag::StartBlockMedium => Some(SizeClass::Medium),
            Tag::StartBlockLarge => Some(SizeClass::Large),
            _ => None,
        }
    }

    pub const fn string_tag(class: SizeClass) -> Tag {
        match class {
            SizeClass::Empty => Tag::StringEmpty,
            SizeClass::Small => Tag::StringSmall,
            SizeClass::Medium => Tag::StringMedium,
            SizeClass::Large => Tag::StringLarge,
        }
    }

    pub const fn array_tag(class: SizeClass, unshared: bool) -> Tag {
        match (class, unshared) {
            (SizeClass::Empty, false) => Tag::ArrayEmpty,
            (SizeClass::Small, false) => Tag::ArraySmall,
            (SizeClass::Medium, false) => Tag::ArrayMedium,
            (SizeClass::Large, false) => Tag::ArrayLarge,
            (SizeClass::Empty, true) => Tag::ArrayEmptyUnshared,
            (SizeClass::Small, true) => Tag::ArraySmallUnshared,
            (SizeClass::Medium, true) => Tag::ArrayMediumUnshared,
            (SizeClass::Large, true) => Tag::ArrayLargeUnshared,
        }
    }

    pub const fn collection_tag(class: SizeClass, unshared: bool) -> Tag {
        match (class, unshared) {
            (SizeClass::Empty, false) => Tag::CollectionEmpty,
            (SizeClass::Small, false) => Tag::CollectionSmall,
            (SizeClass::Medium, false) => Tag::CollectionMedium,
            (SizeClass::Large, false) => Tag::CollectionLarge,
            (SizeClass::Empty, true) => Tag::CollectionEmptyUnshared,
            (SizeClass::Small, true) => Tag::CollectionSmallUnshared,
            (SizeClass::Medium, true) => Tag::CollectionMediumUnshared,
            (SizeClass::Large, true) => Tag::CollectionLargeUnshared,
        }
    }

    pub const fn block_tag(class: SizeClass) -> Tag {
        match class {
            SizeClass::Empty => Tag::StartBlockEmpty,
            SizeClass::Small => Tag::StartBlockSmall,
            SizeClass::Medium => Tag::StartBlockMedium,
            SizeClass::Large => Tag::StartBlockLarge,
        }
    }
}

/// Verify a session version byte.
pub fn verify_version(raw: u8) -> Result<u8> {
    if !(MIN_VERSION..=MAX_VERSION).contains(&raw) {
        return Err(WireError::CorruptStream(format!(
            "unsupported protocol version {} (supported {}..={})",
            raw, MIN_VERSION, MAX_VERSION
        )));
    }
    Ok(raw)
}
