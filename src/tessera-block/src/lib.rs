//! Local block transformation engine for Tessera.
//!
//! A [`Block`] is one concrete, in-memory piece of a table: either a frame
//! (an Arrow [`RecordBatch`](arrow_array::RecordBatch)) or a sequence of
//! labels (a single Arrow array with a length but no columns). This crate
//! knows how to slice, concatenate, copy, introspect and serialize blocks and
//! how to apply a [`BlockFn`] to one. It knows nothing about where blocks
//! live; that is the substrate's concern.

#![allow(clippy::cast_possible_truncation)] // Row positions fit in u32 take indices
#![allow(clippy::cast_possible_wrap)] // Lengths are far below isize::MAX
#![allow(clippy::cast_sign_loss)] // Sign is checked before casting slice bounds

mod block;
mod dense;
mod params;
mod selector;
mod transport;

pub use block::{Axis, Block, BlockData};
pub use dense::DenseMatrix;
pub use params::{block_fn, BlockFn, Params, SerializedParams};
pub use selector::{Selector, Slice};
pub use transport::BlockTransport;
