//! Size-code classification
//!
//! Maps a block length to one of `MAX_SIZE_CODES` log2-spaced classes.
//!
//! ```text
//!   length        code
//!   0..63         0
//!   64..127       1
//!   128..255      2
//!   ...
//!   2^30..        25
//! ```

use super::{MAX_SIZE_CODES, MIN_SPLIT};

/// Granularity of the smallest size class (64 bytes)
const SIZE_CODE_SHIFT: u32 = MIN_SPLIT.trailing_zeros();

/// Determine the free-list index for a block of `length` bytes
///
/// The code is the number of significant bits left after discarding the
/// six low-order bits, so each class covers twice the range of the one
/// before it.
pub fn calculate_size_code(length: u32) -> usize {
    let nibble = length >> SIZE_CODE_SHIFT;
    let code = (u32::BITS - nibble.leading_zeros()) as usize;
    code.min(MAX_SIZE_CODES - 1)
}
