//! # Multi-part message reassembly.
//!
//! Segments of one logical message share a [`MessageKey`] (sender address +
//! reference number) and carry their position in [`SegmentInfo`]. The
//! [`SegmentReassembler`] buffers them until all `total` positions are held,
//! then hands back the payloads in index order.
//!
//! Delivery may be out of order, duplicated or interleaved across senders:
//!
//! ```text
//! ingest(2/3) → Incomplete        {2}
//! ingest(1/3) → Incomplete        {1,2}
//! ingest(2/3) → Incomplete        {1,2}   (overwrites 2)
//! ingest(3/3) → Complete([1,2,3]) {}      (assembly removed)
//! ```

mod reassembler;
mod segment;

pub use reassembler::{Reassembly, SegmentReassembler};
pub use segment::{MessageKey, SegmentInfo};
