//! Stream encoder.
//!
//! [`Enc`] writes tag-prefixed values straight into a segmented
//! [`Buffer`], always choosing the smallest wire form that covers the
//! value. Three layers build on each other: raw primitives (`put_tag`,
//! `put_number`, `put_data`), per-family emitters (`add_uint`, `add_str`,
//! `add_arr`, …) and the shape-dispatched [`Enc::add`] driven by the
//! [`Encode`] trait.
//!
//! Values that need a non-default family or width are wrapped in a
//! specifier before being passed to [`Enc::add`]: [`as_str`], [`as_bin`],
//! [`as_arr`], [`as_map`], [`as_ext`], [`as_raw`], [`as_fixed`] and
//! [`Reserve`].
//!
//! A failed compound emit (array or map) truncates the buffer back to
//! where the compound began, so an error never leaves half a collection in
//! the stream.

use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;

use buffer::{BlockAlloc, Buffer, HeapAlloc, Mark};
use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{DefaultErrorHandler, EncodeError, EncodeResult, ErrorHandler};
use crate::tag::*;

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width scalar that can follow a tag byte as a big-endian payload.
pub trait WireNumber: sealed::Sealed + Copy {
    #[doc(hidden)]
    fn put<const N: usize, A: BlockAlloc<N>>(
        self,
        tag: u8,
        buf: &mut Buffer<N, A>,
    ) -> EncodeResult<()>;
}

macro_rules! wire_number {
    ($($ty:ty),+) => {$(
        impl sealed::Sealed for $ty {}
        impl WireNumber for $ty {
            fn put<const N: usize, A: BlockAlloc<N>>(
                self,
                tag: u8,
                buf: &mut Buffer<N, A>,
            ) -> EncodeResult<()> {
                let be = self.to_be_bytes();
                let mut frame = [0u8; 9];
                frame[0] = tag;
                frame[1..1 + be.len()].copy_from_slice(&be);
                buf.write_back(&frame[..1 + be.len()])?;
                Ok(())
            }
        }
    )+};
}

wire_number!(u8, u16, u32, u64, i8, i16, i32, i64);

impl sealed::Sealed for f32 {}
impl WireNumber for f32 {
    fn put<const N: usize, A: BlockAlloc<N>>(
        self,
        tag: u8,
        buf: &mut Buffer<N, A>,
    ) -> EncodeResult<()> {
        self.to_bits().put(tag, buf)
    }
}

impl sealed::Sealed for f64 {}
impl WireNumber for f64 {
    fn put<const N: usize, A: BlockAlloc<N>>(
        self,
        tag: u8,
        buf: &mut Buffer<N, A>,
    ) -> EncodeResult<()> {
        self.to_bits().put(tag, buf)
    }
}

/// Encoder over a segmented buffer.
pub struct Enc<'b, const N: usize, A: BlockAlloc<N> = HeapAlloc, H: ErrorHandler = DefaultErrorHandler>
{
    buf: &'b mut Buffer<N, A>,
    handler: H,
}

impl<'b, const N: usize, A: BlockAlloc<N>> Enc<'b, N, A> {
    /// Creates an encoder with the default overflow handler.
    pub fn new(buf: &'b mut Buffer<N, A>) -> Self {
        Self {
            buf,
            handler: DefaultErrorHandler,
        }
    }
}

impl<'b, const N: usize, A: BlockAlloc<N>, H: ErrorHandler> Enc<'b, N, A, H> {
    /// Creates an encoder with a caller-supplied overflow handler.
    pub fn with_handler(buf: &'b mut Buffer<N, A>, handler: H) -> Self {
        Self { buf, handler }
    }

    /// The underlying buffer.
    pub fn buffer(&mut self) -> &mut Buffer<N, A> {
        self.buf
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    /// Writes a bare tag byte.
    pub fn put_tag(&mut self, tag: u8) -> EncodeResult<()> {
        self.buf.write_back(&[tag])?;
        Ok(())
    }

    /// Writes a tag byte followed by the big-endian payload of `value`.
    pub fn put_number<T: WireNumber>(&mut self, tag: u8, value: T) -> EncodeResult<()> {
        value.put(tag, self.buf)
    }

    /// Writes a tag byte followed by raw payload bytes.
    pub fn put_data(&mut self, tag: u8, data: &[u8]) -> EncodeResult<()> {
        self.put_tag(tag)?;
        self.buf.write_back(data)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Family emitters
    // ------------------------------------------------------------------

    pub fn add_nil(&mut self) -> EncodeResult<()> {
        self.put_tag(TAG_NIL)
    }

    pub fn add_bool(&mut self, v: bool) -> EncodeResult<()> {
        self.put_tag(if v { TAG_TRUE } else { TAG_FALSE })
    }

    /// Emits an unsigned integer in its smallest covering form.
    pub fn add_uint(&mut self, v: u64) -> EncodeResult<()> {
        if v <= FIXUINT_MAX {
            self.put_tag(v as u8)
        } else if v <= u8::MAX as u64 {
            self.put_number(TAG_U8, v as u8)
        } else if v <= u16::MAX as u64 {
            self.put_number(TAG_U16, v as u16)
        } else if v <= u32::MAX as u64 {
            self.put_number(TAG_U32, v as u32)
        } else {
            self.put_number(TAG_U64, v)
        }
    }

    /// Emits a signed integer; non-negative values take the unsigned forms.
    pub fn add_int(&mut self, v: i64) -> EncodeResult<()> {
        if v >= 0 {
            return self.add_uint(v as u64);
        }
        if v >= FIXINT_MIN {
            self.put_tag(v as u8)
        } else if v >= i8::MIN as i64 {
            self.put_number(TAG_I8, v as i8)
        } else if v >= i16::MIN as i64 {
            self.put_number(TAG_I16, v as i16)
        } else if v >= i32::MIN as i64 {
            self.put_number(TAG_I32, v as i32)
        } else {
            self.put_number(TAG_I64, v)
        }
    }

    pub fn add_f32(&mut self, v: f32) -> EncodeResult<()> {
        self.put_number(TAG_F32, v)
    }

    pub fn add_f64(&mut self, v: f64) -> EncodeResult<()> {
        self.put_number(TAG_F64, v)
    }

    /// Emits a string header and payload.
    pub fn add_str(&mut self, s: &[u8]) -> EncodeResult<()> {
        let len = self.check_size(s.len())?;
        if s.len() <= FIXSTR_MAX {
            self.put_tag(FIXSTR_BASE + len as u8)?;
        } else if len <= u8::MAX as u32 {
            self.put_number(TAG_STR8, len as u8)?;
        } else if len <= u16::MAX as u32 {
            self.put_number(TAG_STR16, len as u16)?;
        } else {
            self.put_number(TAG_STR32, len)?;
        }
        self.buf.write_back(s)?;
        Ok(())
    }

    /// Emits a binary header and payload.
    pub fn add_bin(&mut self, b: &[u8]) -> EncodeResult<()> {
        let len = self.check_size(b.len())?;
        if len <= u8::MAX as u32 {
            self.put_number(TAG_BIN8, len as u8)?;
        } else if len <= u16::MAX as u32 {
            self.put_number(TAG_BIN16, len as u16)?;
        } else {
            self.put_number(TAG_BIN32, len)?;
        }
        self.buf.write_back(b)?;
        Ok(())
    }

    /// Emits an array header; the caller emits `count` values after it.
    pub fn add_arr(&mut self, count: usize) -> EncodeResult<()> {
        let count = self.check_size(count)?;
        if count as usize <= FIXCOL_MAX {
            self.put_tag(FIXARR_BASE + count as u8)
        } else if count <= u16::MAX as u32 {
            self.put_number(TAG_ARR16, count as u16)
        } else {
            self.put_number(TAG_ARR32, count)
        }
    }

    /// Emits a map header; the caller emits `count` key/value pairs after
    /// it.
    pub fn add_map(&mut self, count: usize) -> EncodeResult<()> {
        let count = self.check_size(count)?;
        if count as usize <= FIXCOL_MAX {
            self.put_tag(FIXMAP_BASE + count as u8)
        } else if count <= u16::MAX as u32 {
            self.put_number(TAG_MAP16, count as u16)
        } else {
            self.put_number(TAG_MAP32, count)
        }
    }

    /// Emits an extension value with an application type byte.
    pub fn add_ext(&mut self, ext_type: i8, data: &[u8]) -> EncodeResult<()> {
        let len = self.check_size(data.len())?;
        match len {
            1 => self.put_tag(TAG_FIXEXT1)?,
            2 => self.put_tag(TAG_FIXEXT2)?,
            4 => self.put_tag(TAG_FIXEXT4)?,
            8 => self.put_tag(TAG_FIXEXT8)?,
            16 => self.put_tag(TAG_FIXEXT16)?,
            len if len <= u8::MAX as u32 => self.put_number(TAG_EXT8, len as u8)?,
            len if len <= u16::MAX as u32 => self.put_number(TAG_EXT16, len as u16)?,
            len => self.put_number(TAG_EXT32, len)?,
        }
        self.buf.write_back(&[ext_type as u8])?;
        self.buf.write_back(data)?;
        Ok(())
    }

    /// Copies bytes that are already valid encoded data into the stream.
    pub fn add_raw(&mut self, data: &[u8]) -> EncodeResult<()> {
        self.buf.write_back(data)?;
        Ok(())
    }

    /// Advances the stream by `n` unwritten bytes and returns a mark at
    /// their start for later back-patching. The caller releases the mark.
    pub fn reserve(&mut self, n: usize) -> EncodeResult<Mark> {
        Ok(self.buf.append_back(n)?)
    }

    /// Encodes one value, dispatching on its shape.
    pub fn add<T: Encode + ?Sized>(&mut self, value: &T) -> EncodeResult<()> {
        value.encode(self)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Validates a length or count against the largest wire form.
    fn check_size(&mut self, size: usize) -> EncodeResult<u32> {
        if size > u32::MAX as usize {
            self.handler.size_overflow(size as u64, u32::MAX as u64);
            return Err(EncodeError::SizeOverflow {
                size: size as u64,
                limit: u32::MAX as u64,
            });
        }
        Ok(size as u32)
    }

    /// Runs a compound emit; on error the buffer is truncated back to where
    /// the compound began.
    pub(crate) fn with_rollback<F>(&mut self, f: F) -> EncodeResult<()>
    where
        F: FnOnce(&mut Self) -> EncodeResult<()>,
    {
        let start = self.buf.end();
        let result = f(self);
        if result.is_err() {
            let trailing = self.buf.remaining_from(&start);
            debug!(trailing, "rolling back partial compound emit");
            self.buf.drop_back(trailing);
        }
        self.buf.release_mark(start);
        result
    }
}

// ----------------------------------------------------------------------
// Shape-dispatched encoding
// ----------------------------------------------------------------------

/// A value the encoder can emit via [`Enc::add`].
pub trait Encode {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()>;
}

/// A flat run of encodable elements: the body of an array, or the
/// alternating keys and values of a map.
pub trait EncodeSeq {
    fn seq_len(&self) -> usize;

    fn encode_items<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()>;
}

fn encode_as_arr<S, const N: usize, A, H>(seq: &S, enc: &mut Enc<'_, N, A, H>) -> EncodeResult<()>
where
    S: EncodeSeq + ?Sized,
    A: BlockAlloc<N>,
    H: ErrorHandler,
{
    enc.with_rollback(|e| {
        e.add_arr(seq.seq_len())?;
        seq.encode_items(e)
    })
}

fn encode_as_map<S, const N: usize, A, H>(seq: &S, enc: &mut Enc<'_, N, A, H>) -> EncodeResult<()>
where
    S: EncodeSeq + ?Sized,
    A: BlockAlloc<N>,
    H: ErrorHandler,
{
    debug_assert!(
        seq.seq_len() % 2 == 0,
        "map emit needs an even number of elements"
    );
    enc.with_rollback(|e| {
        e.add_map(seq.seq_len() / 2)?;
        seq.encode_items(e)
    })
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        (**self).encode(enc)
    }
}

impl Encode for () {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.add_nil()
    }
}

impl Encode for bool {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.add_bool(*self)
    }
}

macro_rules! encode_uint {
    ($($ty:ty),+) => {$(
        impl Encode for $ty {
            fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
                &self,
                enc: &mut Enc<'_, N, A, H>,
            ) -> EncodeResult<()> {
                enc.add_uint(*self as u64)
            }
        }
    )+};
}

macro_rules! encode_int {
    ($($ty:ty),+) => {$(
        impl Encode for $ty {
            fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
                &self,
                enc: &mut Enc<'_, N, A, H>,
            ) -> EncodeResult<()> {
                enc.add_int(*self as i64)
            }
        }
    )+};
}

encode_uint!(u8, u16, u32, u64, usize);
encode_int!(i8, i16, i32, i64, isize);

impl Encode for f32 {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.add_f32(*self)
    }
}

impl Encode for f64 {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.add_f64(*self)
    }
}

impl Encode for str {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.add_str(self.as_bytes())
    }
}

impl Encode for String {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.add_str(self.as_bytes())
    }
}

impl Encode for Bytes {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.add_bin(self)
    }
}

impl Encode for BytesMut {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.add_bin(self)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        match self {
            Some(v) => v.encode(enc),
            None => enc.add_nil(),
        }
    }
}

impl<T: Encode> EncodeSeq for [T] {
    fn seq_len(&self) -> usize {
        self.len()
    }

    fn encode_items<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        for item in self {
            item.encode(enc)?;
        }
        Ok(())
    }
}

impl<T: Encode> Encode for [T] {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        encode_as_arr(self, enc)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        encode_as_arr(self.as_slice(), enc)
    }
}

impl<T: Encode, const K: usize> Encode for [T; K] {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        encode_as_arr(self.as_slice(), enc)
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.with_rollback(|e| {
            e.add_map(self.len())?;
            for (k, v) in self {
                k.encode(e)?;
                v.encode(e)?;
            }
            Ok(())
        })
    }
}

impl<K: Encode, V: Encode, S> Encode for HashMap<K, V, S> {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.with_rollback(|e| {
            e.add_map(self.len())?;
            for (k, v) in self {
                k.encode(e)?;
                v.encode(e)?;
            }
            Ok(())
        })
    }
}

macro_rules! encode_tuple {
    ($len:expr; $($name:ident : $idx:tt),+) => {
        impl<$($name: Encode),+> EncodeSeq for ($($name,)+) {
            fn seq_len(&self) -> usize {
                $len
            }

            fn encode_items<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
                &self,
                enc: &mut Enc<'_, N, A, H>,
            ) -> EncodeResult<()> {
                $(self.$idx.encode(enc)?;)+
                Ok(())
            }
        }

        impl<$($name: Encode),+> Encode for ($($name,)+) {
            fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
                &self,
                enc: &mut Enc<'_, N, A, H>,
            ) -> EncodeResult<()> {
                encode_as_arr(self, enc)
            }
        }
    };
}

encode_tuple!(1; T0:0);
encode_tuple!(2; T0:0, T1:1);
encode_tuple!(3; T0:0, T1:1, T2:2);
encode_tuple!(4; T0:0, T1:1, T2:2, T3:3);
encode_tuple!(5; T0:0, T1:1, T2:2, T3:3, T4:4);
encode_tuple!(6; T0:0, T1:1, T2:2, T3:3, T4:4, T5:5);
encode_tuple!(7; T0:0, T1:1, T2:2, T3:3, T4:4, T5:5, T6:6);
encode_tuple!(8; T0:0, T1:1, T2:2, T3:3, T4:4, T5:5, T6:6, T7:7);
encode_tuple!(9; T0:0, T1:1, T2:2, T3:3, T4:4, T5:5, T6:6, T7:7, T8:8);
encode_tuple!(10; T0:0, T1:1, T2:2, T3:3, T4:4, T5:5, T6:6, T7:7, T8:8, T9:9);
encode_tuple!(11; T0:0, T1:1, T2:2, T3:3, T4:4, T5:5, T6:6, T7:7, T8:8, T9:9, T10:10);
encode_tuple!(12; T0:0, T1:1, T2:2, T3:3, T4:4, T5:5, T6:6, T7:7, T8:8, T9:9, T10:10, T11:11);

// ----------------------------------------------------------------------
// Specifiers
// ----------------------------------------------------------------------

/// Forces the wrapped byte-like value to emit as a string.
pub struct AsStr<T>(pub T);

/// Forces the wrapped byte-like value to emit as binary.
pub struct AsBin<T>(pub T);

/// Forces the wrapped element run to emit as an array.
pub struct AsArr<T>(pub T);

/// Forces the wrapped element run to emit as a map of alternating keys and
/// values.
pub struct AsMap<T>(pub T);

/// Emits the wrapped bytes as an extension value of the given type.
pub struct AsExt<T>(pub i8, pub T);

/// The wrapped bytes are already valid encoded data; they are copied into
/// the stream verbatim.
pub struct AsRaw<T>(pub T);

/// Skips `n` bytes of the stream without writing them.
pub struct Reserve(pub usize);

/// Wraps a byte-like value so it emits as a string.
pub fn as_str<T: AsRef<[u8]>>(value: T) -> AsStr<T> {
    AsStr(value)
}

/// Wraps a byte-like value so it emits as binary.
pub fn as_bin<T: AsRef<[u8]>>(value: T) -> AsBin<T> {
    AsBin(value)
}

/// Wraps an element run so it emits as an array.
pub fn as_arr<T: EncodeSeq>(value: T) -> AsArr<T> {
    AsArr(value)
}

/// Wraps an element run so it emits as a map.
pub fn as_map<T: EncodeSeq>(value: T) -> AsMap<T> {
    AsMap(value)
}

/// Wraps bytes so they emit as an extension value of type `ext_type`.
pub fn as_ext<T: AsRef<[u8]>>(ext_type: i8, value: T) -> AsExt<T> {
    AsExt(ext_type, value)
}

/// Wraps already-encoded bytes for verbatim insertion.
pub fn as_raw<T: AsRef<[u8]>>(value: T) -> AsRaw<T> {
    AsRaw(value)
}

impl<T: AsRef<[u8]>> Encode for AsStr<T> {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.add_str(self.0.as_ref())
    }
}

impl<T: AsRef<[u8]>> Encode for AsBin<T> {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.add_bin(self.0.as_ref())
    }
}

impl<T: EncodeSeq> Encode for AsArr<T> {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        encode_as_arr(&self.0, enc)
    }
}

impl<T: EncodeSeq> Encode for AsMap<T> {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        encode_as_map(&self.0, enc)
    }
}

impl<T: AsRef<[u8]>> Encode for AsExt<T> {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.add_ext(self.0, self.1.as_ref())
    }
}

impl<T: AsRef<[u8]>> Encode for AsRaw<T> {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.add_raw(self.0.as_ref())
    }
}

impl Encode for Reserve {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        enc.buf.advance_back(self.0)?;
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Forced widths
// ----------------------------------------------------------------------

/// Forces a specific wire width for an integer-like value.
///
/// `as_fixed::<u8, _>(1)` emits `CC 01`; `as_fixed::<u64, _>(1)` emits
/// `CF 00 00 00 00 00 00 00 01`; `as_fixed::<(), _>(1)` embeds the value in
/// the tag byte itself.
pub struct AsFixed<W, T> {
    pub value: T,
    width: PhantomData<W>,
}

/// Wraps a value with a forced wire width `W`. `W = ()` means the
/// tag-embedded fix form.
pub fn as_fixed<W: FixedWidth, T: Copy + Into<i128>>(value: T) -> AsFixed<W, T> {
    AsFixed {
        value,
        width: PhantomData,
    }
}

/// A width that integer-like values can be forced into.
pub trait FixedWidth: sealed::Sealed {
    #[doc(hidden)]
    fn emit<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        enc: &mut Enc<'_, N, A, H>,
        value: i128,
    ) -> EncodeResult<()>;
}

macro_rules! fixed_width {
    ($($ty:ty => $tag:expr),+) => {$(
        impl FixedWidth for $ty {
            fn emit<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
                enc: &mut Enc<'_, N, A, H>,
                value: i128,
            ) -> EncodeResult<()> {
                let min = <$ty>::MIN as i128;
                let max = <$ty>::MAX as i128;
                if !(min..=max).contains(&value) && enc.handler.fixed_overflow(value, max) {
                    return Err(EncodeError::FixedOverflow { value, limit: max });
                }
                enc.put_number($tag, value as $ty)
            }
        }
    )+};
}

fixed_width!(
    u8 => TAG_U8,
    u16 => TAG_U16,
    u32 => TAG_U32,
    u64 => TAG_U64,
    i8 => TAG_I8,
    i16 => TAG_I16,
    i32 => TAG_I32,
    i64 => TAG_I64
);

impl sealed::Sealed for () {}
impl FixedWidth for () {
    fn emit<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        enc: &mut Enc<'_, N, A, H>,
        value: i128,
    ) -> EncodeResult<()> {
        let limit = FIXUINT_MAX as i128;
        if !((FIXINT_MIN as i128)..=limit).contains(&value)
            && enc.handler.fixed_overflow(value, limit)
        {
            return Err(EncodeError::FixedOverflow { value, limit });
        }
        enc.put_tag(value as u8)
    }
}

impl<W: FixedWidth, T: Copy + Into<i128>> Encode for AsFixed<W, T> {
    fn encode<const N: usize, A: BlockAlloc<N>, H: ErrorHandler>(
        &self,
        enc: &mut Enc<'_, N, A, H>,
    ) -> EncodeResult<()> {
        W::emit(enc, self.value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLK: usize = 64;

    fn encoded<F>(f: F) -> Vec<u8>
    where
        F: FnOnce(&mut Enc<'_, BLK>) -> EncodeResult<()>,
    {
        let mut buf: Buffer<BLK> = Buffer::new();
        let mut enc = Enc::new(&mut buf);
        f(&mut enc).unwrap();
        let begin = buf.begin();
        let mut out = vec![0; buf.remaining_from(&begin)];
        buf.get(&begin, &mut out);
        buf.release_mark(begin);
        out
    }

    #[test]
    fn should_emit_fix_scalars_in_single_bytes() {
        let bytes = encoded(|e| {
            e.add(&0u8)?;
            e.add(&127u8)?;
            e.add(&-1i8)?;
            e.add(&-32i8)?;
            e.add(&true)?;
            e.add(&false)?;
            e.add(&())
        });
        assert_eq!(bytes, [0x00, 0x7f, 0xff, 0xe0, 0xc3, 0xc2, 0xc0]);
    }

    #[test]
    fn should_select_smallest_uint_form() {
        assert_eq!(encoded(|e| e.add(&200u64)), [0xcc, 0xc8]);
        assert_eq!(encoded(|e| e.add(&2000u64)), [0xcd, 0x07, 0xd0]);
        assert_eq!(
            encoded(|e| e.add(&4_000_000_000u64)),
            [0xce, 0xee, 0x6b, 0x28, 0x00]
        );
        assert_eq!(
            encoded(|e| e.add(&(u32::MAX as u64 + 1))),
            [0xcf, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn should_select_smallest_int_form() {
        assert_eq!(encoded(|e| e.add(&-33i64)), [0xd0, 0xdf]);
        assert_eq!(encoded(|e| e.add(&-200i64)), [0xd1, 0xff, 0x38]);
        assert_eq!(
            encoded(|e| e.add(&-40_000i64)),
            [0xd2, 0xff, 0xff, 0x63, 0xc0]
        );
        // Non-negative signed integers use the unsigned forms.
        assert_eq!(encoded(|e| e.add(&5i64)), [0x05]);
        assert_eq!(encoded(|e| e.add(&200i64)), [0xcc, 0xc8]);
    }

    #[test]
    fn should_emit_fixstr_and_str8() {
        assert_eq!(encoded(|e| e.add("aaa")), [0xa3, b'a', b'a', b'a']);

        let long = "a".repeat(40);
        let bytes = encoded(|e| e.add(long.as_str()));
        assert_eq!(&bytes[..2], &[0xd9, 0x28]);
        assert_eq!(bytes.len(), 42);
    }

    #[test]
    fn should_emit_bin_with_length_prefix() {
        let bytes = encoded(|e| e.add(&as_bin(&[1u8, 2, 3][..])));
        assert_eq!(bytes, [0xc4, 0x03, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn should_emit_floats_bit_for_bit() {
        assert_eq!(
            encoded(|e| e.add(&1.0f64)),
            [0xcb, 0x3f, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(encoded(|e| e.add(&2.0f32)), [0xca, 0x40, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn should_emit_heterogeneous_tuple_as_array() {
        let bytes = encoded(|e| e.add(&(1.0f64, 2.0f32, "test", (), false)));
        let expected = [
            0x95, 0xcb, 0x3f, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xca, 0x40, 0x00, 0x00,
            0x00, 0xa4, b't', b'e', b's', b't', 0xc0, 0xc2,
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn should_emit_map_with_nested_array() {
        let bytes = encoded(|e| {
            e.add(&as_map((
                10u8,
                true,
                11u8,
                "val",
                12u8,
                as_arr((1u8, 2u8, 3u8)),
            )))
        });
        let expected = [
            0x83, 0x0a, 0xc3, 0x0b, 0xa3, b'v', b'a', b'l', 0x0c, 0x93, 0x01, 0x02, 0x03,
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn should_force_widths_with_as_fixed() {
        assert_eq!(encoded(|e| e.add(&as_fixed::<u8, _>(1u8))), [0xcc, 0x01]);
        assert_eq!(
            encoded(|e| e.add(&as_fixed::<u64, _>(1u8))),
            [0xcf, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]
        );
        assert_eq!(encoded(|e| e.add(&as_fixed::<(), _>(1u8))), [0x01]);
        // Out-of-range values truncate under the default handler.
        assert_eq!(encoded(|e| e.add(&as_fixed::<u8, _>(300u32))), [0xcc, 0x2c]);
    }

    #[test]
    fn should_fail_fixed_overflow_with_fatal_handler() {
        struct Deny;
        impl ErrorHandler for Deny {
            fn fixed_overflow(&mut self, _value: i128, _limit: i128) -> bool {
                true
            }
        }

        let mut buf: Buffer<BLK> = Buffer::new();
        let mut enc = Enc::with_handler(&mut buf, Deny);
        let err = enc.add(&as_fixed::<u8, _>(300u32)).unwrap_err();
        assert!(matches!(err, EncodeError::FixedOverflow { .. }));
    }

    #[test]
    fn should_emit_ext_fixed_and_prefixed() {
        assert_eq!(
            encoded(|e| e.add(&as_ext(7, &[0xAB][..]))),
            [0xd4, 0x07, 0xab]
        );
        assert_eq!(
            encoded(|e| e.add(&as_ext(-1, &[1u8, 2, 4][..]))),
            [0xc7, 0x03, 0xff, 0x01, 0x02, 0x04]
        );
    }

    #[test]
    fn should_splice_raw_and_reserved_bytes() {
        let bytes = encoded(|e| {
            e.add(&as_raw(&[0x92u8, 0x01][..]))?;
            e.add(&2u8)
        });
        assert_eq!(bytes, [0x92, 0x01, 0x02]);

        let mut buf: Buffer<BLK> = Buffer::new();
        let mut enc = Enc::new(&mut buf);
        let patch = enc.reserve(1).unwrap();
        enc.add(&7u8).unwrap();
        enc.buffer().set(&patch, &[0x91]);
        enc.buffer().release_mark(patch);
        let begin = buf.begin();
        let mut out = [0u8; 2];
        buf.get(&begin, &mut out);
        assert_eq!(out, [0x91, 0x07]);
        buf.release_mark(begin);
    }

    #[test]
    fn should_roll_back_failed_compound_emit() {
        use buffer::CappedAlloc;

        // Room for one block only: the nested blob cannot fit.
        let mut buf: Buffer<BLK, CappedAlloc> = Buffer::with_alloc(CappedAlloc::new(1));
        let mut enc = Enc::new(&mut buf);
        enc.add(&1u8).unwrap();

        let big = vec![0x55u8; 4 * BLK];
        let err = enc.add(&(2u8, as_bin(big.as_slice()))).unwrap_err();
        assert!(matches!(err, EncodeError::Alloc(_)));

        // The stream holds exactly what was complete before the compound.
        let begin = buf.begin();
        let mut out = vec![0; buf.remaining_from(&begin)];
        buf.get(&begin, &mut out);
        assert_eq!(out, [0x01]);
        buf.release_mark(begin);
    }

    #[test]
    fn should_encode_options_and_maps() {
        let none: Option<u8> = None;
        assert_eq!(encoded(|e| e.add(&none)), [0xc0]);
        assert_eq!(encoded(|e| e.add(&Some(3u8))), [0x03]);

        let mut map = std::collections::BTreeMap::new();
        map.insert(1u8, "a");
        map.insert(2u8, "b");
        assert_eq!(
            encoded(|e| e.add(&map)),
            [0x82, 0x01, 0xa1, b'a', 0x02, 0xa1, b'b']
        );
    }
}
