//! Streaming decoder.
//!
//! [`Dec`] walks a tag-prefixed stream held in a segmented [`Buffer`],
//! delivering every value to a [`Reader`] as a typed [`Item`] callback. The
//! decoder owns a registered cursor mark and consumes one complete
//! top-level value per [`Dec::read`] call, descending into arrays and maps
//! up to the configured depth.
//!
//! The root reader is passed to each `read` call, so its state stays in the
//! caller's hands. A reader that receives an array or map header may
//! install child readers for the elements through the [`ReadCtx`]; levels
//! without an installed reader inherit the nearest enclosing one. Aborting
//! mid-message fast-forwards over the remaining children using the per-tag
//! span table, without interpreting them.
//!
//! A value split by the end of the buffer is never half-delivered:
//! [`Dec::read`] returns [`ReadStatus::NeedMore`] and re-parses once more
//! bytes have been appended.

use buffer::{BlockAlloc, Buffer, HeapAlloc, Mark};
use bytes::{Bytes, BytesMut};

use crate::config::DecodeConfig;
use crate::error::ReadStatus;
use crate::tag::{Kind, KindSet, TAG_INFO, TAG_INVALID};
use crate::value::{ArrValue, BinValue, ExtValue, Item, MapValue, StrValue};

/// Callback object receiving decoded values.
///
/// `value` is called once per decoded value, with blob payloads addressed
/// relative to the value start (copy them out through the context). The
/// remaining hooks fire on the corresponding decode faults and default to
/// no-ops.
pub trait Reader<const N: usize, A: BlockAlloc<N> = HeapAlloc> {
    /// Families this reader accepts. Anything else triggers
    /// [`Reader::wrong_type`] and aborts the message.
    fn valid_kinds(&self) -> KindSet {
        KindSet::ANY
    }

    /// One decoded value.
    fn value(&mut self, ctx: &mut ReadCtx<'_, N, A>, item: Item);

    /// A value of an unaccepted family was encountered.
    fn wrong_type(&mut self, expected: KindSet, got: Kind) {
        let _ = (expected, got);
    }

    /// Collection nesting exceeded the configured maximum.
    fn max_depth_reached(&mut self) {}

    /// The stream is malformed beyond recovery.
    fn bad_msgpack(&mut self) {}
}

/// Discards every value; useful as the root when skipping.
impl<const N: usize, A: BlockAlloc<N>> Reader<N, A> for () {
    fn value(&mut self, _ctx: &mut ReadCtx<'_, N, A>, _item: Item) {}
}

/// Per-callback window the decoder hands to a reader.
pub struct ReadCtx<'a, const N: usize, A: BlockAlloc<N> = HeapAlloc> {
    buf: &'a Buffer<N, A>,
    at: &'a Mark,
    commands: &'a mut Commands<N, A>,
}

impl<const N: usize, A: BlockAlloc<N>> ReadCtx<'_, N, A> {
    /// Copies payload bytes, addressed relative to the current value start.
    pub fn data(&self, offset: u32, out: &mut [u8]) {
        self.buf.get_at(self.at, offset as usize, out);
    }

    /// Copies payload bytes into a fresh [`Bytes`].
    pub fn bytes(&self, offset: u32, len: u32) -> Bytes {
        let mut out = BytesMut::zeroed(len as usize);
        self.buf.get_at(self.at, offset as usize, &mut out);
        out.freeze()
    }

    /// Installs a reader for the children of the collection just delivered
    /// (or for the following values at the current level). `second` selects
    /// the map-value slot; map keys and array elements use the first slot.
    pub fn set_reader(&mut self, second: bool, reader: Box<dyn Reader<N, A>>) {
        self.commands.set[second as usize] = Some(reader);
    }

    /// Aborts the current message: the remaining children of every open
    /// collection are skipped and the read finishes with
    /// [`ReadStatus::Aborted`].
    pub fn abort_and_skip(&mut self) {
        self.commands.abort = true;
    }

    /// Kills the decoder for good; the read finishes with
    /// [`ReadStatus::Aborted`] and every later read repeats it.
    pub fn abandon(&mut self) {
        self.commands.abandon = true;
    }
}

struct Commands<const N: usize, A: BlockAlloc<N>> {
    set: [Option<Box<dyn Reader<N, A>>>; 2],
    abort: bool,
    abandon: bool,
}

impl<const N: usize, A: BlockAlloc<N>> Commands<N, A> {
    fn new() -> Self {
        Self {
            set: [None, None],
            abort: false,
            abandon: false,
        }
    }
}

enum State<const N: usize, A: BlockAlloc<N>> {
    /// No reader installed; the nearest enclosing one is used.
    Inherit,
    /// Installed reader for this slot.
    Own(Box<dyn Reader<N, A>>),
    /// Fast-forward without delivering values.
    Skip,
}

struct Level<const N: usize, A: BlockAlloc<N>> {
    /// Values still expected at this nesting level.
    countdown: u64,
    /// 1 for maps (alternate key/value slots by countdown parity), else 0.
    mask: u64,
    states: [State<N, A>; 2],
}

impl<const N: usize, A: BlockAlloc<N>> Level<N, A> {
    fn new() -> Self {
        Self {
            countdown: 0,
            mask: 0,
            states: [State::Inherit, State::Inherit],
        }
    }
}

#[derive(Clone, Copy)]
struct Enter {
    children: u64,
    mask: u64,
}

#[derive(Clone, Copy)]
struct ParsedValue {
    item: Item,
    consumed: usize,
    enter: Option<Enter>,
}

enum Parse {
    NeedMore,
    Bad,
    Value(ParsedValue),
}

enum Step {
    Done,
    NeedMore,
    Dead,
}

enum Resolved {
    Root,
    Own(usize, usize),
    Skip,
}

/// Streaming decoder over a segmented buffer.
///
/// Holds a registered cursor mark in the buffer; call [`Dec::finish`] to
/// deregister it when done (the slot is otherwise reclaimed only when the
/// buffer is dropped).
pub struct Dec<const N: usize, A: BlockAlloc<N> = HeapAlloc> {
    levels: Vec<Level<N, A>>,
    depth: usize,
    cursor: Mark,
    /// Values to fast-forward after an abort, across all unwound levels.
    skipping: u64,
    dead: bool,
    pending: Option<ReadStatus>,
}

impl<const N: usize, A: BlockAlloc<N>> Dec<N, A> {
    /// Creates a decoder with its cursor at the start of the buffer.
    pub fn new(buf: &mut Buffer<N, A>) -> Self {
        Self::with_config(buf, DecodeConfig::default())
    }

    /// Creates a decoder with an explicit configuration.
    pub fn with_config(buf: &mut Buffer<N, A>, config: DecodeConfig) -> Self {
        let depth = config.max_depth.max(1);
        Self {
            levels: (0..depth).map(|_| Level::new()).collect(),
            depth: 0,
            cursor: buf.begin(),
            skipping: 0,
            dead: false,
            pending: None,
        }
    }

    /// The cursor mark: the position of the next undelivered byte.
    pub fn position(&self) -> &Mark {
        &self.cursor
    }

    /// Moves the cursor to another mark's position.
    pub fn set_position(&mut self, buf: &mut Buffer<N, A>, to: &Mark) {
        let fresh = buf.clone_mark(to);
        let old = std::mem::replace(&mut self.cursor, fresh);
        buf.release_mark(old);
    }

    /// Installs a reader at the current nesting level. `second` selects the
    /// map-value slot.
    pub fn set_reader(&mut self, second: bool, reader: Box<dyn Reader<N, A>>) {
        self.levels[self.depth].states[second as usize] = State::Own(reader);
    }

    /// Puts the current nesting level into skip mode: values are
    /// fast-forwarded instead of delivered.
    pub fn skip(&mut self) {
        self.levels[self.depth].states = [State::Skip, State::Skip];
    }

    /// Skips one complete value, children included.
    pub fn skip_next(&mut self, buf: &mut Buffer<N, A>) -> ReadStatus {
        self.skip();
        self.read(buf, &mut ())
    }

    /// Deregisters the cursor mark.
    pub fn finish(self, buf: &mut Buffer<N, A>) {
        buf.release_mark(self.cursor);
    }

    /// Decodes one complete top-level value, delivering callbacks to
    /// `root` (or to readers installed deeper). Returns
    /// [`ReadStatus::NeedMore`] without consuming anything if the value is
    /// not complete in the buffer yet.
    pub fn read(&mut self, buf: &mut Buffer<N, A>, root: &mut dyn Reader<N, A>) -> ReadStatus {
        if self.dead {
            return self.pending.unwrap_or(ReadStatus::BadMsgpack);
        }
        if self.depth == 0 && self.levels[0].countdown == 0 && self.skipping == 0 {
            self.levels[0].countdown = 1;
            self.pending = None;
        }
        loop {
            if !buf.has(&self.cursor, 1) {
                return ReadStatus::NeedMore;
            }
            let step = if self.skipping > 0 {
                self.drain_step(buf)
            } else {
                self.step(buf, root)
            };
            match step {
                Step::NeedMore => return ReadStatus::NeedMore,
                Step::Dead => return self.pending.unwrap_or(ReadStatus::BadMsgpack),
                Step::Done => {}
            }
            if self.dead {
                return self.pending.unwrap_or(ReadStatus::BadMsgpack);
            }
            if self.skipping > 0 {
                continue;
            }
            while self.levels[self.depth].countdown == 0 {
                self.levels[self.depth].states = [State::Inherit, State::Inherit];
                if self.depth == 0 {
                    return self.pending.take().unwrap_or(ReadStatus::Success);
                }
                self.depth -= 1;
            }
        }
    }

    // ------------------------------------------------------------------
    // One value
    // ------------------------------------------------------------------

    fn step(&mut self, buf: &mut Buffer<N, A>, root: &mut dyn Reader<N, A>) -> Step {
        let tag = self.peek_u8(buf, 0);
        match self.resolve_state() {
            Resolved::Skip => match self.skip_span(buf, tag) {
                Parse::NeedMore => Step::NeedMore,
                Parse::Bad => self.kill(),
                Parse::Value(v) => {
                    let level = &mut self.levels[self.depth];
                    level.countdown -= 1;
                    level.countdown += v.enter.map_or(0, |e| e.children);
                    buf.advance(&self.cursor, v.consumed);
                    Step::Done
                }
            },
            Resolved::Root => {
                let (step, commands) = self.dispatch(buf, tag, root);
                if let Some(commands) = commands {
                    self.apply(commands);
                }
                step
            }
            Resolved::Own(li, si) => {
                let mut reader = match std::mem::replace(
                    &mut self.levels[li].states[si],
                    State::Inherit,
                ) {
                    State::Own(reader) => reader,
                    _ => unreachable!("resolved state is not owned"),
                };
                let (step, commands) = self.dispatch(buf, tag, reader.as_mut());
                self.levels[li].states[si] = State::Own(reader);
                // Applied after the reader is back in its slot, so a reader
                // replacing itself is not clobbered by the restore.
                if let Some(commands) = commands {
                    self.apply(commands);
                }
                step
            }
        }
    }

    fn dispatch(
        &mut self,
        buf: &mut Buffer<N, A>,
        tag: u8,
        reader: &mut dyn Reader<N, A>,
    ) -> (Step, Option<Commands<N, A>>) {
        let parsed = match self.parse_value(buf, tag) {
            Parse::NeedMore => return (Step::NeedMore, None),
            Parse::Bad => {
                reader.bad_msgpack();
                return (self.kill(), None);
            }
            Parse::Value(v) => v,
        };
        self.levels[self.depth].countdown -= 1;

        let kind = parsed.item.kind();
        let expected = reader.valid_kinds();
        if !expected.contains(kind) {
            reader.wrong_type(expected, kind);
            self.abort(
                ReadStatus::WrongType,
                parsed.enter.map_or(0, |e| e.children),
            );
            buf.advance(&self.cursor, parsed.consumed);
            return (Step::Done, None);
        }

        if let Some(enter) = parsed.enter {
            if self.depth + 1 >= self.levels.len() {
                reader.max_depth_reached();
                self.abort(ReadStatus::MaxDepthReached, enter.children);
                buf.advance(&self.cursor, parsed.consumed);
                return (Step::Done, None);
            }
            self.depth += 1;
            let level = &mut self.levels[self.depth];
            level.countdown = enter.children;
            level.mask = enter.mask;
            level.states = [State::Inherit, State::Inherit];
        }

        let mut commands = Commands::new();
        {
            let mut ctx = ReadCtx {
                buf,
                at: &self.cursor,
                commands: &mut commands,
            };
            reader.value(&mut ctx, parsed.item);
        }
        buf.advance(&self.cursor, parsed.consumed);
        (Step::Done, Some(commands))
    }

    fn drain_step(&mut self, buf: &mut Buffer<N, A>) -> Step {
        let tag = self.peek_u8(buf, 0);
        match self.skip_span(buf, tag) {
            Parse::NeedMore => Step::NeedMore,
            Parse::Bad => self.kill(),
            Parse::Value(v) => {
                self.skipping -= 1;
                self.skipping += v.enter.map_or(0, |e| e.children);
                buf.advance(&self.cursor, v.consumed);
                Step::Done
            }
        }
    }

    fn apply(&mut self, commands: Commands<N, A>) {
        let Commands {
            set,
            abort,
            abandon,
        } = commands;
        for (slot, reader) in set.into_iter().enumerate() {
            if let Some(reader) = reader {
                self.levels[self.depth].states[slot] = State::Own(reader);
            }
        }
        if abandon {
            self.dead = true;
            if self.pending.is_none() {
                self.pending = Some(ReadStatus::Aborted);
            }
        } else if abort {
            self.abort(ReadStatus::Aborted, 0);
        }
    }

    /// Unwinds every open level into the skip counter and records the
    /// first error of the message.
    fn abort(&mut self, status: ReadStatus, extra: u64) {
        let mut total = extra;
        while self.depth > 0 {
            total += self.levels[self.depth].countdown;
            self.levels[self.depth].countdown = 0;
            self.levels[self.depth].states = [State::Inherit, State::Inherit];
            self.depth -= 1;
        }
        self.skipping += total;
        if self.pending.is_none() {
            self.pending = Some(status);
        }
    }

    fn kill(&mut self) -> Step {
        self.dead = true;
        self.pending = Some(ReadStatus::BadMsgpack);
        Step::Dead
    }

    fn resolve_state(&self) -> Resolved {
        let mut li = self.depth;
        loop {
            let level = &self.levels[li];
            let si = (level.countdown & level.mask) as usize;
            match &level.states[si] {
                State::Own(_) => return Resolved::Own(li, si),
                State::Skip => return Resolved::Skip,
                State::Inherit => {
                    if li == 0 {
                        return Resolved::Root;
                    }
                    li -= 1;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Parsing
    // ------------------------------------------------------------------

    /// Span of one value per the tag table, without interpreting payloads.
    fn skip_span(&self, buf: &Buffer<N, A>, tag: u8) -> Parse {
        if tag == TAG_INVALID {
            return Parse::Bad;
        }
        let info = &TAG_INFO[tag as usize];
        if !buf.has(&self.cursor, info.header as usize) {
            return Parse::NeedMore;
        }
        let len = match info.len_width {
            0 => 0,
            width => self.be_uint(buf, 1, width as usize),
        };
        let consumed = info.header as usize
            + if info.len_is_payload {
                len as usize
            } else {
                0
            };
        if info.len_is_payload && !buf.has(&self.cursor, consumed) {
            return Parse::NeedMore;
        }
        let children = info.fixed_children as u64 + len * info.len_child_mult as u64;
        Parse::Value(ParsedValue {
            item: Item::Nil,
            consumed,
            enter: (children > 0).then_some(Enter { children, mask: 0 }),
        })
    }

    fn parse_value(&self, buf: &Buffer<N, A>, tag: u8) -> Parse {
        let scalar = |item, consumed| {
            Parse::Value(ParsedValue {
                item,
                consumed,
                enter: None,
            })
        };
        match tag {
            0x00..=0x7f => scalar(Item::Uint(tag as u64), 1),
            0x80..=0x8f => {
                let pairs = (tag - 0x80) as u32;
                self.enter_map(1, pairs)
            }
            0x90..=0x9f => {
                let count = (tag - 0x90) as u32;
                self.enter_arr(1, count)
            }
            0xa0..=0xbf => {
                let size = (tag - 0xa0) as u32;
                self.blob(buf, 1, size, |offset, size| {
                    Item::Str(StrValue { offset, size })
                })
            }
            0xc0 => scalar(Item::Nil, 1),
            TAG_INVALID => Parse::Bad,
            0xc2 => scalar(Item::Bool(false), 1),
            0xc3 => scalar(Item::Bool(true), 1),
            0xc4..=0xc6 => {
                let width = 1usize << (tag - 0xc4);
                if !buf.has(&self.cursor, 1 + width) {
                    return Parse::NeedMore;
                }
                let size = self.be_uint(buf, 1, width) as u32;
                self.blob(buf, 1 + width as u32, size, |offset, size| {
                    Item::Bin(BinValue { offset, size })
                })
            }
            0xc7..=0xc9 => {
                let width = 1usize << (tag - 0xc7);
                let header = 2 + width;
                if !buf.has(&self.cursor, header) {
                    return Parse::NeedMore;
                }
                let size = self.be_uint(buf, 1, width) as u32;
                if !buf.has(&self.cursor, header + size as usize) {
                    return Parse::NeedMore;
                }
                let ext_type = self.peek_u8(buf, 1 + width) as i8;
                scalar(
                    Item::Ext(ExtValue {
                        ext_type,
                        offset: header as u32,
                        size,
                    }),
                    header + size as usize,
                )
            }
            0xca => {
                if !buf.has(&self.cursor, 5) {
                    return Parse::NeedMore;
                }
                let bits = self.be_uint(buf, 1, 4) as u32;
                scalar(Item::F32(f32::from_bits(bits)), 5)
            }
            0xcb => {
                if !buf.has(&self.cursor, 9) {
                    return Parse::NeedMore;
                }
                let bits = self.be_uint(buf, 1, 8);
                scalar(Item::F64(f64::from_bits(bits)), 9)
            }
            0xcc..=0xcf => {
                let width = 1usize << (tag - 0xcc);
                if !buf.has(&self.cursor, 1 + width) {
                    return Parse::NeedMore;
                }
                scalar(Item::Uint(self.be_uint(buf, 1, width)), 1 + width)
            }
            0xd0..=0xd3 => {
                let width = 1usize << (tag - 0xd0);
                if !buf.has(&self.cursor, 1 + width) {
                    return Parse::NeedMore;
                }
                let raw = self.be_uint(buf, 1, width);
                let value = match width {
                    1 => raw as u8 as i8 as i64,
                    2 => raw as u16 as i16 as i64,
                    4 => raw as u32 as i32 as i64,
                    _ => raw as i64,
                };
                scalar(Item::Int(value), 1 + width)
            }
            0xd4..=0xd8 => {
                let size = 1u32 << (tag - 0xd4);
                if !buf.has(&self.cursor, 2 + size as usize) {
                    return Parse::NeedMore;
                }
                let ext_type = self.peek_u8(buf, 1) as i8;
                scalar(
                    Item::Ext(ExtValue {
                        ext_type,
                        offset: 2,
                        size,
                    }),
                    2 + size as usize,
                )
            }
            0xd9..=0xdb => {
                let width = 1usize << (tag - 0xd9);
                if !buf.has(&self.cursor, 1 + width) {
                    return Parse::NeedMore;
                }
                let size = self.be_uint(buf, 1, width) as u32;
                self.blob(buf, 1 + width as u32, size, |offset, size| {
                    Item::Str(StrValue { offset, size })
                })
            }
            0xdc | 0xdd => {
                let width = 2usize << (tag - 0xdc);
                if !buf.has(&self.cursor, 1 + width) {
                    return Parse::NeedMore;
                }
                let count = self.be_uint(buf, 1, width) as u32;
                self.enter_arr(1 + width as u32, count)
            }
            0xde | 0xdf => {
                let width = 2usize << (tag - 0xde);
                if !buf.has(&self.cursor, 1 + width) {
                    return Parse::NeedMore;
                }
                let pairs = self.be_uint(buf, 1, width) as u32;
                self.enter_map(1 + width as u32, pairs)
            }
            0xe0..=0xff => scalar(Item::Int(tag as i8 as i64), 1),
        }
    }

    fn blob(
        &self,
        buf: &Buffer<N, A>,
        offset: u32,
        size: u32,
        make: impl FnOnce(u32, u32) -> Item,
    ) -> Parse {
        let consumed = offset as usize + size as usize;
        if !buf.has(&self.cursor, consumed) {
            return Parse::NeedMore;
        }
        Parse::Value(ParsedValue {
            item: make(offset, size),
            consumed,
            enter: None,
        })
    }

    fn enter_arr(&self, offset: u32, count: u32) -> Parse {
        Parse::Value(ParsedValue {
            item: Item::Arr(ArrValue {
                offset,
                size: count,
            }),
            consumed: offset as usize,
            enter: Some(Enter {
                children: count as u64,
                mask: 0,
            }),
        })
    }

    fn enter_map(&self, offset: u32, pairs: u32) -> Parse {
        Parse::Value(ParsedValue {
            item: Item::Map(MapValue {
                offset,
                size: pairs,
            }),
            consumed: offset as usize,
            enter: Some(Enter {
                children: 2 * pairs as u64,
                mask: 1,
            }),
        })
    }

    fn peek_u8(&self, buf: &Buffer<N, A>, offset: usize) -> u8 {
        let mut byte = [0u8; 1];
        buf.get_at(&self.cursor, offset, &mut byte);
        byte[0]
    }

    fn be_uint(&self, buf: &Buffer<N, A>, offset: usize, width: usize) -> u64 {
        let mut raw = [0u8; 8];
        buf.get_at(&self.cursor, offset, &mut raw[..width]);
        raw[..width].iter().fold(0u64, |acc, b| acc << 8 | *b as u64)
    }
}

// ----------------------------------------------------------------------
// Stock readers
// ----------------------------------------------------------------------

/// A scalar target type a stock reader can fill from an [`Item`].
///
/// Narrower integer targets truncate, matching a plain integer cast.
pub trait FromItem: Sized {
    fn kinds() -> KindSet;
    fn from_item(item: &Item) -> Option<Self>;
}

macro_rules! from_item_uint {
    ($($ty:ty),+) => {$(
        impl FromItem for $ty {
            fn kinds() -> KindSet {
                KindSet::of(Kind::Uint)
            }

            fn from_item(item: &Item) -> Option<Self> {
                match item {
                    Item::Uint(v) => Some(*v as $ty),
                    _ => None,
                }
            }
        }
    )+};
}

macro_rules! from_item_int {
    ($($ty:ty),+) => {$(
        impl FromItem for $ty {
            fn kinds() -> KindSet {
                KindSet::ANY_INT
            }

            fn from_item(item: &Item) -> Option<Self> {
                match item {
                    Item::Uint(v) => Some(*v as $ty),
                    Item::Int(v) => Some(*v as $ty),
                    _ => None,
                }
            }
        }
    )+};
}

from_item_uint!(u8, u16, u32, u64);
from_item_int!(i8, i16, i32, i64);

impl FromItem for bool {
    fn kinds() -> KindSet {
        KindSet::of(Kind::Bool)
    }

    fn from_item(item: &Item) -> Option<Self> {
        match item {
            Item::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromItem for f32 {
    fn kinds() -> KindSet {
        KindSet::of(Kind::F32)
    }

    fn from_item(item: &Item) -> Option<Self> {
        match item {
            Item::F32(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromItem for f64 {
    fn kinds() -> KindSet {
        KindSet::ANY_FLOAT
    }

    fn from_item(item: &Item) -> Option<Self> {
        match item {
            Item::F32(v) => Some(*v as f64),
            Item::F64(v) => Some(*v),
            _ => None,
        }
    }
}

/// Reads a single scalar into `value`.
#[derive(Debug, Default)]
pub struct ScalarReader<T> {
    pub value: Option<T>,
}

impl<T> ScalarReader<T> {
    pub fn new() -> Self {
        Self { value: None }
    }
}

impl<const N: usize, A: BlockAlloc<N>, T: FromItem> Reader<N, A> for ScalarReader<T> {
    fn valid_kinds(&self) -> KindSet {
        T::kinds()
    }

    fn value(&mut self, _ctx: &mut ReadCtx<'_, N, A>, item: Item) {
        self.value = T::from_item(&item);
    }
}

/// Copies a string payload out, up to a caller-set bound.
#[derive(Debug)]
pub struct StrCopyReader {
    /// Copied bytes, clipped to `max`.
    pub data: Vec<u8>,
    /// Full payload size, even when clipped.
    pub total: usize,
    max: usize,
}

impl StrCopyReader {
    pub fn new(max: usize) -> Self {
        Self {
            data: Vec::new(),
            total: 0,
            max,
        }
    }
}

impl<const N: usize, A: BlockAlloc<N>> Reader<N, A> for StrCopyReader {
    fn valid_kinds(&self) -> KindSet {
        KindSet::of(Kind::Str)
    }

    fn value(&mut self, ctx: &mut ReadCtx<'_, N, A>, item: Item) {
        let Item::Str(s) = item else {
            return;
        };
        self.total = s.size as usize;
        let take = self.total.min(self.max);
        self.data = vec![0; take];
        ctx.data(s.offset, &mut self.data);
    }
}

/// Collects a flat array of scalars, relying on level inheritance: the
/// array header and each element arrive at this same reader.
#[derive(Debug, Default)]
pub struct ArrayReader<T> {
    /// Element count announced by the array header.
    pub expected: Option<u32>,
    pub items: Vec<T>,
}

impl<T> ArrayReader<T> {
    pub fn new() -> Self {
        Self {
            expected: None,
            items: Vec::new(),
        }
    }
}

impl<const N: usize, A: BlockAlloc<N>, T: FromItem> Reader<N, A> for ArrayReader<T> {
    fn valid_kinds(&self) -> KindSet {
        T::kinds().with(Kind::Arr)
    }

    fn value(&mut self, _ctx: &mut ReadCtx<'_, N, A>, item: Item) {
        if let Item::Arr(v) = item {
            self.expected = Some(v.size);
            self.items.reserve(v.size as usize);
            return;
        }
        if let Some(v) = T::from_item(&item) {
            self.items.push(v);
        }
    }
}
