//! # bufmap
//!
//! A hash map of binary keys to binary values stored entirely inside one
//! flat byte buffer:
//! - Heap, anonymous-mmap and file-mmap buffers that grow and shrink
//! - Segregated free lists with block split and merge
//! - Incremental rehash and incremental compaction to bound the cost of
//!   any single operation
//! - Restore from an existing buffer (e.g. a reopened mapped file)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 SharedBinaryMap (Mutex)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      BinaryMap                              │
//! │   hash directory · free lists · compaction · block cache    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  Block (header/key/value, dirty tracked)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   BufferManager                             │
//! │        Fixed (Vec) · Direct (anon mmap) · Mapped (file)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod binary;
pub mod block;
pub mod buffer;
pub mod map;
pub mod sync;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use binary::Binary;
pub use buffer::{BufferManager, DirectBufferManager, FixedBufferManager, MappedBufferManager};
pub use config::{BufferConfig, Config};
pub use error::{BufMapError, Result};
pub use map::{BinaryMap, MapStats};
pub use sync::SharedBinaryMap;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of bufmap
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
