//! Tag-prefixed binary codec over the segmented buffer.
//!
//! The encoder serializes values straight into a [`buffer::Buffer`],
//! picking the smallest wire form per value; the decoder streams values
//! back out through typed reader callbacks without copying payloads it is
//! not asked for. The wire format is the well-known msgpack tag assignment,
//! big-endian throughout.
//!
//! ```
//! use buffer::Buffer;
//! use codec::{as_map, Dec, Enc, ReadStatus, ScalarReader};
//!
//! let mut buf: Buffer<1024> = Buffer::new();
//! let mut enc = Enc::new(&mut buf);
//! enc.add(&as_map((0u8, 1u8, 1u8, 1234u64)))?;
//! enc.add(&42u64)?;
//!
//! let mut dec = Dec::new(&mut buf);
//! assert_eq!(dec.skip_next(&mut buf), ReadStatus::Success);
//! let mut reader = ScalarReader::<u64>::new();
//! assert_eq!(dec.read(&mut buf, &mut reader), ReadStatus::Success);
//! assert_eq!(reader.value, Some(42));
//! dec.finish(&mut buf);
//! # Ok::<(), codec::EncodeError>(())
//! ```

mod config;
mod dec;
mod enc;
mod error;
pub mod tag;
mod value;

pub use crate::config::DecodeConfig;
pub use crate::dec::{
    ArrayReader, Dec, FromItem, ReadCtx, Reader, ScalarReader, StrCopyReader,
};
pub use crate::enc::{
    as_arr, as_bin, as_ext, as_fixed, as_map, as_raw, as_str, AsArr, AsBin, AsExt, AsFixed, AsMap,
    AsRaw, AsStr, Enc, Encode, EncodeSeq, FixedWidth, Reserve, WireNumber,
};
pub use crate::error::{
    DefaultErrorHandler, EncodeError, EncodeResult, ErrorHandler, ReadStatus,
};
pub use crate::tag::{kind_of, Kind, KindSet};
pub use crate::value::{ArrValue, BinValue, ExtValue, Item, MapValue, StrValue};
