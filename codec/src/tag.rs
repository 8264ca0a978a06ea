//! Wire tags and their classification.
//!
//! Every encoded value starts with a one-byte tag that selects the value
//! family and, for the fix forms, embeds the value or length itself. The
//! assignments are the well-known msgpack ones and are fixed for wire
//! compatibility.

/// Nil.
pub const TAG_NIL: u8 = 0xc0;
/// Permanently invalid tag; its appearance kills the stream.
pub const TAG_INVALID: u8 = 0xc1;
/// Boolean false.
pub const TAG_FALSE: u8 = 0xc2;
/// Boolean true.
pub const TAG_TRUE: u8 = 0xc3;
/// Binary blob, 8/16/32-bit length prefix.
pub const TAG_BIN8: u8 = 0xc4;
pub const TAG_BIN16: u8 = 0xc5;
pub const TAG_BIN32: u8 = 0xc6;
/// Extension, 8/16/32-bit length prefix followed by a type byte.
pub const TAG_EXT8: u8 = 0xc7;
pub const TAG_EXT16: u8 = 0xc8;
pub const TAG_EXT32: u8 = 0xc9;
/// IEEE-754 floats, bit-for-bit big-endian.
pub const TAG_F32: u8 = 0xca;
pub const TAG_F64: u8 = 0xcb;
/// Unsigned integers, 8/16/32/64-bit big-endian payload.
pub const TAG_U8: u8 = 0xcc;
pub const TAG_U16: u8 = 0xcd;
pub const TAG_U32: u8 = 0xce;
pub const TAG_U64: u8 = 0xcf;
/// Signed integers, 8/16/32/64-bit big-endian payload.
pub const TAG_I8: u8 = 0xd0;
pub const TAG_I16: u8 = 0xd1;
pub const TAG_I32: u8 = 0xd2;
pub const TAG_I64: u8 = 0xd3;
/// Extensions with a fixed payload of 1/2/4/8/16 bytes.
pub const TAG_FIXEXT1: u8 = 0xd4;
pub const TAG_FIXEXT2: u8 = 0xd5;
pub const TAG_FIXEXT4: u8 = 0xd6;
pub const TAG_FIXEXT8: u8 = 0xd7;
pub const TAG_FIXEXT16: u8 = 0xd8;
/// Strings, 8/16/32-bit length prefix.
pub const TAG_STR8: u8 = 0xd9;
pub const TAG_STR16: u8 = 0xda;
pub const TAG_STR32: u8 = 0xdb;
/// Arrays, 16/32-bit element count.
pub const TAG_ARR16: u8 = 0xdc;
pub const TAG_ARR32: u8 = 0xdd;
/// Maps, 16/32-bit pair count.
pub const TAG_MAP16: u8 = 0xde;
pub const TAG_MAP32: u8 = 0xdf;

/// Base tag of fix maps; the pair count 0..16 lives in the low nibble.
pub const FIXMAP_BASE: u8 = 0x80;
/// Base tag of fix arrays; the element count 0..16 lives in the low nibble.
pub const FIXARR_BASE: u8 = 0x90;
/// Base tag of fix strings; the length 0..32 lives in the low five bits.
pub const FIXSTR_BASE: u8 = 0xa0;
/// Largest value embeddable in a positive fixint tag.
pub const FIXUINT_MAX: u64 = 0x7f;
/// Smallest value embeddable in a negative fixint tag.
pub const FIXINT_MIN: i64 = -32;
/// Largest length embeddable in a fixstr tag.
pub const FIXSTR_MAX: usize = 31;
/// Largest count embeddable in a fixarr/fixmap tag.
pub const FIXCOL_MAX: usize = 15;

/// Value family selected by a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    Nil = 0,
    Bool,
    Uint,
    Int,
    F32,
    F64,
    Str,
    Bin,
    Arr,
    Map,
    Ext,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Nil => "nil",
            Kind::Bool => "bool",
            Kind::Uint => "uint",
            Kind::Int => "int",
            Kind::F32 => "float32",
            Kind::F64 => "float64",
            Kind::Str => "str",
            Kind::Bin => "bin",
            Kind::Arr => "array",
            Kind::Map => "map",
            Kind::Ext => "ext",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Bitmask over value families, used as a reader's acceptance filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSet(u32);

impl KindSet {
    pub const NONE: KindSet = KindSet(0);
    pub const ANY: KindSet = KindSet(u32::MAX);
    /// Either integer family.
    pub const ANY_INT: KindSet = KindSet::of(Kind::Uint).with(Kind::Int);
    /// Either float family.
    pub const ANY_FLOAT: KindSet = KindSet::of(Kind::F32).with(Kind::F64);
    /// Any numeric family.
    pub const ANY_NUM: KindSet = KindSet::ANY_INT.union(KindSet::ANY_FLOAT);

    pub const fn of(kind: Kind) -> KindSet {
        KindSet(1 << kind as u32)
    }

    pub const fn with(self, kind: Kind) -> KindSet {
        KindSet(self.0 | 1 << kind as u32)
    }

    pub const fn union(self, other: KindSet) -> KindSet {
        KindSet(self.0 | other.0)
    }

    pub const fn contains(self, kind: Kind) -> bool {
        self.0 & (1 << kind as u32) != 0
    }
}

impl std::ops::BitOr for KindSet {
    type Output = KindSet;

    fn bitor(self, rhs: KindSet) -> KindSet {
        self.union(rhs)
    }
}

/// Classifies a tag byte. `None` for the permanently invalid 0xc1.
pub fn kind_of(tag: u8) -> Option<Kind> {
    Some(match tag {
        0x00..=0x7f => Kind::Uint,
        0x80..=0x8f => Kind::Map,
        0x90..=0x9f => Kind::Arr,
        0xa0..=0xbf => Kind::Str,
        TAG_NIL => Kind::Nil,
        TAG_INVALID => return None,
        TAG_FALSE | TAG_TRUE => Kind::Bool,
        TAG_BIN8..=TAG_BIN32 => Kind::Bin,
        TAG_EXT8..=TAG_EXT32 => Kind::Ext,
        TAG_F32 => Kind::F32,
        TAG_F64 => Kind::F64,
        TAG_U8..=TAG_U64 => Kind::Uint,
        TAG_I8..=TAG_I64 => Kind::Int,
        TAG_FIXEXT1..=TAG_FIXEXT16 => Kind::Ext,
        TAG_STR8..=TAG_STR32 => Kind::Str,
        TAG_ARR16 | TAG_ARR32 => Kind::Arr,
        TAG_MAP16 | TAG_MAP32 => Kind::Map,
        0xe0..=0xff => Kind::Int,
    })
}

/// Per-tag structure used by the skip path: how many bytes the value spans
/// and how many child items it introduces, without interpreting the payload.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TagInfo {
    /// Bytes before the variable payload, tag included. For tags that embed
    /// their whole payload (fix forms, scalars, fixext) this is the entire
    /// object.
    pub(crate) header: u8,
    /// Width in bytes of the big-endian length field at offset 1 (0 if
    /// none).
    pub(crate) len_width: u8,
    /// The length field counts payload bytes following the header.
    pub(crate) len_is_payload: bool,
    /// Child items embedded in the tag itself (fix arrays and maps).
    pub(crate) fixed_children: u8,
    /// Child items per length unit (1 for arrays, 2 for maps).
    pub(crate) len_child_mult: u8,
}

const fn info(
    header: u8,
    len_width: u8,
    len_is_payload: bool,
    fixed_children: u8,
    len_child_mult: u8,
) -> TagInfo {
    TagInfo {
        header,
        len_width,
        len_is_payload,
        fixed_children,
        len_child_mult,
    }
}

pub(crate) const TAG_INFO: [TagInfo; 256] = {
    let mut table = [info(1, 0, false, 0, 0); 256];
    let mut i = FIXMAP_BASE;
    while i <= 0x8f {
        table[i as usize] = info(1, 0, false, (i - FIXMAP_BASE) * 2, 0);
        i += 1;
    }
    let mut i = FIXARR_BASE;
    while i <= 0x9f {
        table[i as usize] = info(1, 0, false, i - FIXARR_BASE, 0);
        i += 1;
    }
    let mut i = FIXSTR_BASE;
    while i <= 0xbf {
        table[i as usize] = info(1 + (i - FIXSTR_BASE), 0, false, 0, 0);
        i += 1;
    }
    table[TAG_BIN8 as usize] = info(2, 1, true, 0, 0);
    table[TAG_BIN16 as usize] = info(3, 2, true, 0, 0);
    table[TAG_BIN32 as usize] = info(5, 4, true, 0, 0);
    table[TAG_EXT8 as usize] = info(3, 1, true, 0, 0);
    table[TAG_EXT16 as usize] = info(4, 2, true, 0, 0);
    table[TAG_EXT32 as usize] = info(6, 4, true, 0, 0);
    table[TAG_F32 as usize] = info(5, 0, false, 0, 0);
    table[TAG_F64 as usize] = info(9, 0, false, 0, 0);
    table[TAG_U8 as usize] = info(2, 0, false, 0, 0);
    table[TAG_U16 as usize] = info(3, 0, false, 0, 0);
    table[TAG_U32 as usize] = info(5, 0, false, 0, 0);
    table[TAG_U64 as usize] = info(9, 0, false, 0, 0);
    table[TAG_I8 as usize] = info(2, 0, false, 0, 0);
    table[TAG_I16 as usize] = info(3, 0, false, 0, 0);
    table[TAG_I32 as usize] = info(5, 0, false, 0, 0);
    table[TAG_I64 as usize] = info(9, 0, false, 0, 0);
    table[TAG_FIXEXT1 as usize] = info(3, 0, false, 0, 0);
    table[TAG_FIXEXT2 as usize] = info(4, 0, false, 0, 0);
    table[TAG_FIXEXT4 as usize] = info(6, 0, false, 0, 0);
    table[TAG_FIXEXT8 as usize] = info(10, 0, false, 0, 0);
    table[TAG_FIXEXT16 as usize] = info(18, 0, false, 0, 0);
    table[TAG_STR8 as usize] = info(2, 1, true, 0, 0);
    table[TAG_STR16 as usize] = info(3, 2, true, 0, 0);
    table[TAG_STR32 as usize] = info(5, 4, true, 0, 0);
    table[TAG_ARR16 as usize] = info(3, 2, false, 0, 1);
    table[TAG_ARR32 as usize] = info(5, 4, false, 0, 1);
    table[TAG_MAP16 as usize] = info(3, 2, false, 0, 2);
    table[TAG_MAP32 as usize] = info(5, 4, false, 0, 2);
    table
};
