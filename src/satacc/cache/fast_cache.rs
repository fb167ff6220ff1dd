use serde::{Deserialize, Serialize};

use super::{get_bit_lens, get_set_number_from_addr, AccessResult};

/// a set-associative tag array with fifo replacement, it allocates on miss
#[derive(Debug)]
pub struct FastCache {
    pub cache_config: CacheConfig,
    sets: Vec<Set>,
    set_bit_len: u64,
    block_bit_len: u64,
    channel_bit_len: u64,
}
#[derive(Debug, Clone, Default)]
struct Set {
    lines: Vec<u64>,
    replace_ptr: usize,
}
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[repr(C)]
pub struct CacheConfig {
    pub sets: u64,
    pub associativity: u64,
    pub block_size: u64,
    /// the address bits above the block offset used to pick a channel or bank
    pub channels: u64,
    pub alway_hit: bool,
}

impl FastCache {
    pub fn new(cache_config: &CacheConfig) -> Self {
        FastCache {
            cache_config: cache_config.clone(),
            sets: vec![Set::default(); cache_config.sets as usize],
            set_bit_len: get_bit_lens(cache_config.sets),
            block_bit_len: get_bit_lens(cache_config.block_size),
            channel_bit_len: get_bit_lens(cache_config.channels),
        }
    }

    pub fn access(&mut self, addr: u64) -> AccessResult {
        let (set_number, tag) = get_set_number_from_addr(
            addr,
            self.set_bit_len,
            self.block_bit_len,
            self.channel_bit_len,
        );
        if self.cache_config.alway_hit {
            return AccessResult::Hit(tag);
        }
        let associativity = self.cache_config.associativity as usize;
        let set = &mut self.sets[set_number as usize];
        if set.lines.contains(&tag) {
            return AccessResult::Hit(tag);
        }
        if set.lines.len() < associativity {
            set.lines.push(tag);
        } else {
            set.lines[set.replace_ptr] = tag;
            set.replace_ptr = (set.replace_ptr + 1) % associativity;
        }
        AccessResult::Miss(tag)
    }
}
