//! Structural self-check, dump and statistics
//!
//! `check` reads block headers straight from the buffer so it never
//! disturbs the handle cache it is also validating.

use std::collections::HashMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::binary::hash_bytes;
use crate::block::{calculate_size_code, read_binary, BlockHeader, BlockType, MAX_SIZE_CODES, MIN_ENTRY, MIN_FREE, NIL, OFFSET_KEY};
use crate::buffer::BufferManager;
use crate::error::{BufMapError, Result};

use super::hash::BUCKET_COUNTS;
use super::BinaryMap;

/// Bytes per row of the hex dump
const DUMP_ROW: usize = 32;

/// Snapshot of map counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapStats {
    pub entries: usize,
    pub key_bytes: usize,
    pub value_bytes: usize,
    pub capacity: usize,
    pub used_capacity: usize,
    pub free_capacity: usize,
    pub bucket_count: usize,
    pub bucket_level: usize,
    pub modulo: u32,
    pub previous_modulo: u32,
    pub rehashing: bool,
    pub strict: bool,
}

/// A block as seen by the checker
struct Scanned {
    header: BlockHeader,
    length: u32,
}

impl<M: BufferManager> BinaryMap<M> {
    pub fn stats(&self) -> MapStats {
        MapStats {
            entries: self.entries,
            key_bytes: self.key_bytes,
            value_bytes: self.value_bytes,
            capacity: self.capacity(),
            used_capacity: self.used_capacity(),
            free_capacity: self.free_capacity(),
            bucket_count: self.bucket_count(),
            bucket_level: self.bucket_level,
            modulo: self.modulo,
            previous_modulo: self.prev_modulo,
            rehashing: self.is_rehashing(),
            strict: self.config.strict,
        }
    }

    // =========================================================================
    // Check
    // =========================================================================

    /// Validate every structural invariant of the map
    ///
    /// `desc` names the point of the check (e.g. "after put()") and prefixes
    /// the `Corrupt` message when something is wrong.
    pub fn check(&self, desc: &str) -> Result<()> {
        self.check_inner().map_err(|e| match e {
            BufMapError::Corrupt(msg) | BufMapError::IllegalState(msg) => {
                BufMapError::Corrupt(format!("{}: {}", desc, msg))
            }
            other => other,
        })
    }

    fn check_inner(&self) -> Result<()> {
        if self.cache.open_count() != 0 {
            return corrupt(format!("open blocks at offsets {}", format_offsets(&self.cache.open_offsets())));
        }

        self.check_directory()?;
        let blocks = self.check_block_chain()?;
        self.check_free_lists(&blocks)?;
        self.check_buckets(&blocks)?;

        if self.next_compact != NIL && !blocks.contains_key(&self.next_compact) {
            return corrupt(format!("compaction cursor {} is not a block offset", self.next_compact));
        }
        Ok(())
    }

    fn check_directory(&self) -> Result<()> {
        if self.bucket_level >= BUCKET_COUNTS.len() || self.modulo != BUCKET_COUNTS[self.bucket_level] {
            return corrupt(format!(
                "modulo {} does not match bucket level {}",
                self.modulo, self.bucket_level
            ));
        }

        let expected = self.modulo.max(self.prev_modulo) as usize;
        if self.buckets.len() != expected {
            return corrupt(format!(
                "bucket count {} but modulo={} previous modulo={}",
                self.buckets.len(),
                self.modulo,
                self.prev_modulo
            ));
        }

        if self.is_rehashing() {
            if self.next_rehash >= self.prev_modulo {
                return corrupt(format!(
                    "rehash cursor {} is outside previous modulo {}",
                    self.next_rehash, self.prev_modulo
                ));
            }
        } else if self.next_rehash != NIL {
            return corrupt(format!("rehash cursor {} set while not rehashing", self.next_rehash));
        }
        Ok(())
    }

    /// Walk the block chain in offset order; returns every block by offset
    fn check_block_chain(&self) -> Result<HashMap<u32, Scanned>> {
        let buffer = self.manager.buffer();
        let capacity = self.capacity_u32();

        let mut blocks = HashMap::new();
        let (mut entries, mut key_bytes, mut value_bytes) = (0usize, 0usize, 0usize);
        let mut prev = NIL;
        let mut prev_free = false;
        let mut of = 0;

        while of != NIL {
            if of >= capacity {
                return corrupt(format!("block offset {} is outside capacity {}", of, capacity));
            }

            let header = BlockHeader::read(buffer, of)?;
            if header.prev_block != prev {
                return corrupt(format!(
                    "block at offset {} has previous offset {} but follows {}",
                    of, header.prev_block, prev
                ));
            }
            if header.next_block != NIL && (header.next_block <= of || header.next_block >= capacity) {
                return corrupt(format!(
                    "block at offset {} has next offset {} out of order",
                    of, header.next_block
                ));
            }

            let end = if header.next_block == NIL { capacity } else { header.next_block };
            let length = end - of;
            let free = header.block_type == BlockType::Free;

            if free {
                if prev_free {
                    return corrupt(format!("two contiguous free blocks found at {} and {}", prev, of));
                }
                if length < MIN_FREE {
                    return corrupt(format!("free block at offset {} is only {} bytes", of, length));
                }
                if self.config.strict {
                    check_fill(buffer, of + MIN_FREE, end, of)?;
                }
            } else {
                let tight = MIN_ENTRY as u64 + header.key_len as u64 + header.value_len as u64;
                if tight > length as u64 {
                    return corrupt(format!(
                        "entry at offset {} needs {} bytes but spans {}",
                        of, tight, length
                    ));
                }
                let key = read_binary(buffer, of + OFFSET_KEY)?;
                if hash_bytes(&key) != header.hash {
                    return corrupt(format!(
                        "entry at offset {} stores hash {} but its key hashes to {}",
                        of,
                        header.hash,
                        hash_bytes(&key)
                    ));
                }
                if self.config.strict {
                    check_fill(buffer, of + tight as u32, end, of)?;
                }
                entries += 1;
                key_bytes += header.key_len as usize;
                value_bytes += header.value_len as usize;
            }

            prev_free = free;
            prev = of;
            of = header.next_block;
            blocks.insert(prev, Scanned { header, length });
        }

        if prev != self.last_block {
            return corrupt(format!("last block is at {} but recorded at {}", prev, self.last_block));
        }

        if (entries, key_bytes, value_bytes) != (self.entries, self.key_bytes, self.value_bytes) {
            return corrupt(format!(
                "found {} entries ({} key bytes, {} value bytes) but counted {} ({}, {})",
                entries, key_bytes, value_bytes, self.entries, self.key_bytes, self.value_bytes
            ));
        }

        Ok(blocks)
    }

    fn check_free_lists(&self, blocks: &HashMap<u32, Scanned>) -> Result<()> {
        let mut listed = 0;
        for (code, &head) in self.free_lists.iter().enumerate() {
            let mut prev = NIL;
            let mut of = head;
            while of != NIL {
                let block = lookup(blocks, of, "free list")?;
                if block.header.block_type != BlockType::Free {
                    return corrupt(format!("free list {} holds non-free block at {}", code, of));
                }
                if block.header.prev_node != prev {
                    return corrupt(format!(
                        "free block at {} has previous node {} but follows {}",
                        of, block.header.prev_node, prev
                    ));
                }
                let actual = calculate_size_code(block.length);
                if actual != code {
                    return corrupt(format!(
                        "free block at {} of {} bytes has size code {} but is on list {}",
                        of, block.length, actual, code
                    ));
                }

                listed += 1;
                if listed > blocks.len() {
                    return corrupt(format!("free list {} loops", code));
                }
                prev = of;
                of = block.header.next_node;
            }
        }

        let free = blocks
            .values()
            .filter(|b| b.header.block_type == BlockType::Free)
            .count();
        if listed != free {
            return corrupt(format!("{} free blocks but {} on the free lists", free, listed));
        }
        Ok(())
    }

    fn check_buckets(&self, blocks: &HashMap<u32, Scanned>) -> Result<()> {
        let mut listed = 0;
        for (bucket, &head) in self.buckets.iter().enumerate() {
            let mut prev = NIL;
            let mut of = head;
            while of != NIL {
                let block = lookup(blocks, of, "bucket")?;
                if block.header.block_type != BlockType::Entry {
                    return corrupt(format!("bucket {} holds non-entry block at {}", bucket, of));
                }
                if block.header.prev_node != prev {
                    return corrupt(format!(
                        "entry at {} has previous node {} but follows {}",
                        of, block.header.prev_node, prev
                    ));
                }
                let hash = block.header.hash;
                let current = self.calculate_bucket(hash);
                let previous = self.calculate_previous_bucket(hash);
                if bucket != current && !(self.is_rehashing() && bucket == previous) {
                    return corrupt(format!(
                        "entry at {} with hash {} is in bucket {} instead of {}",
                        of, hash, bucket, current
                    ));
                }

                listed += 1;
                if listed > blocks.len() {
                    return corrupt(format!("bucket {} loops", bucket));
                }
                prev = of;
                of = block.header.next_node;
            }
        }

        if listed != self.entries {
            return corrupt(format!("{} entries but {} in the buckets", self.entries, listed));
        }
        Ok(())
    }

    // =========================================================================
    // Dump
    // =========================================================================

    /// Counters, buffer contents and list heads as text
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let stats = self.stats();

        let _ = writeln!(out, "BinaryMap");
        let _ = writeln!(
            out,
            "  entries={} key_bytes={} value_bytes={}",
            stats.entries, stats.key_bytes, stats.value_bytes
        );
        let _ = writeln!(
            out,
            "  capacity={} used={} free={}",
            stats.capacity, stats.used_capacity, stats.free_capacity
        );
        let _ = writeln!(
            out,
            "  level={} modulo={} previous_modulo={} next_rehash={}",
            stats.bucket_level,
            stats.modulo,
            stats.previous_modulo,
            format_offset(self.next_rehash)
        );
        let _ = writeln!(
            out,
            "  next_compact={} last_block={} strict={}",
            format_offset(self.next_compact),
            self.last_block,
            stats.strict
        );

        let _ = writeln!(out, "Buffer:");
        for (row, chunk) in self.manager.buffer().chunks(DUMP_ROW).enumerate() {
            let _ = writeln!(out, "  {:08x}: {}", row * DUMP_ROW, hex::encode(chunk));
        }

        let _ = writeln!(out, "Buckets: {}", format_offsets(&self.buckets));
        let _ = writeln!(out, "Free lists: {}", format_offsets(&self.free_lists[..MAX_SIZE_CODES]));
        out
    }
}

fn corrupt<T>(msg: String) -> Result<T> {
    Err(BufMapError::Corrupt(msg))
}

fn lookup<'a>(blocks: &'a HashMap<u32, Scanned>, of: u32, list: &str) -> Result<&'a Scanned> {
    blocks
        .get(&of)
        .ok_or_else(|| BufMapError::Corrupt(format!("{} references {} which is not a block", list, of)))
}

/// Every byte of `[from, to)` must be the fill byte
fn check_fill(buffer: &[u8], from: u32, to: u32, block: u32) -> Result<()> {
    let range = buffer.get(from as usize..to as usize).unwrap_or(&[]);
    match range.iter().position(|&b| b != 0) {
        Some(i) => corrupt(format!(
            "block at offset {} has non-fill byte at offset {}",
            block,
            from as usize + i
        )),
        None => Ok(()),
    }
}

fn format_offset(of: u32) -> String {
    if of == NIL {
        "nil".to_string()
    } else {
        of.to_string()
    }
}

fn format_offsets(offsets: &[u32]) -> String {
    let items: Vec<String> = offsets.iter().map(|&of| format_offset(of)).collect();
    format!("[{}]", items.join(", "))
}
