//! Buffer Module
//!
//! Owners of the flat byte buffer the map lives in.
//!
//! ## Responsibilities
//! - Supply the backing bytes
//! - Grow and shrink capacity within `[min, max]`
//! - Publish the growth and shrinkage thresholds the map checks against
//!
//! ## Implementations
//! - `FixedBufferManager`: heap buffer of a fixed size
//! - `DirectBufferManager`: anonymous memory map outside the allocator heap
//! - `MappedBufferManager`: file-backed memory map, file length == capacity

mod direct;
mod fixed;
mod mapped;
mod policy;

pub use direct::DirectBufferManager;
pub use fixed::FixedBufferManager;
pub use mapped::MappedBufferManager;
pub use policy::CapacityPolicy;

use crate::error::Result;

/// Supplies and resizes the buffer a map is built on
///
/// Resizing keeps the common prefix of the old and new buffer intact; bytes
/// beyond the old capacity are unspecified.
pub trait BufferManager {
    /// The current buffer; its length is the capacity
    fn buffer(&self) -> &[u8];

    fn buffer_mut(&mut self) -> &mut [u8];

    fn capacity(&self) -> usize {
        self.buffer().len()
    }

    fn min_capacity(&self) -> usize;

    fn max_capacity(&self) -> usize;

    /// Used bytes above which the buffer should grow
    fn growth_threshold(&self) -> usize;

    /// Used bytes below which the buffer should shrink
    fn shrinkage_threshold(&self) -> usize;

    /// Grow until `required` bytes fit under the growth threshold
    ///
    /// Fails with `OutOfMemory` if `required` exceeds the maximum capacity.
    fn grow(&mut self, required: usize) -> Result<()>;

    /// Shrink toward the minimum capacity while `required` stays below the
    /// shrinkage threshold
    fn shrink(&mut self, required: usize) -> Result<()>;
}

impl<B: BufferManager + ?Sized> BufferManager for Box<B> {
    fn buffer(&self) -> &[u8] {
        (**self).buffer()
    }

    fn buffer_mut(&mut self) -> &mut [u8] {
        (**self).buffer_mut()
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn min_capacity(&self) -> usize {
        (**self).min_capacity()
    }

    fn max_capacity(&self) -> usize {
        (**self).max_capacity()
    }

    fn growth_threshold(&self) -> usize {
        (**self).growth_threshold()
    }

    fn shrinkage_threshold(&self) -> usize {
        (**self).shrinkage_threshold()
    }

    fn grow(&mut self, required: usize) -> Result<()> {
        (**self).grow(required)
    }

    fn shrink(&mut self, required: usize) -> Result<()> {
        (**self).shrink(required)
    }
}
