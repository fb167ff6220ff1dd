use std::collections::{BTreeMap, VecDeque};

use enum_as_inner::EnumAsInner;

use crate::sim::SimSender;

use super::{icnt::IcntMsgWrapper, waiting_task::WaitingTask, MemReq, SataccStatus};

mod cache_with_dram;
mod cache_with_fix_time;
mod fast_cache;
mod private_cache;

pub use cache_with_dram::{CacheWithDram, DramBankConfig};
pub use cache_with_fix_time::CacheWithFixTime;
pub use fast_cache::{CacheConfig, FastCache};
pub use private_cache::{PrivateCache, PrivateCachePorts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheId {
    L3Cache,
    PrivateCache(usize),
}

#[derive(Debug, EnumAsInner)]
pub enum AccessResult {
    Hit(u64),
    Miss(u64),
}

/// Get the len in bits of a power of two.
fn get_bit_lens(size: u64) -> u64 {
    size.max(1).trailing_zeros() as u64
}

/// return the index of the set and the tag
fn get_set_number_from_addr(
    addr: u64,
    set_bit_len: u64,
    block_bit_len: u64,
    channel_bit_len: u64,
) -> (u64, u64) {
    let set_number = (addr >> (block_bit_len + channel_bit_len)) & ((1 << set_bit_len) - 1);
    let tag = addr & !((1 << block_bit_len) - 1);
    (set_number, tag)
}

#[derive(Debug)]
enum OnGoing {
    Hit { accepted: usize, req: MemReq },
    Fill(u64),
}

/// Tag array plus MSHR shared by every cache model.
///
/// Requests to a block that is still being filled wait in `tag_to_reqs`
/// and are released together when the fill arrives.
#[derive(Debug)]
struct CacheCore {
    fast_cache: FastCache,
    on_going_reqs: WaitingTask<OnGoing>,
    tag_to_reqs: BTreeMap<u64, Vec<(usize, MemReq)>>,
    ready_reqs: VecDeque<MemReq>,
    hit_latency: usize,
    /// the cost charged to a miss in the statistics
    miss_charge: usize,
    cache_id: CacheId,
}

impl CacheCore {
    fn new(config: &CacheConfig, hit_latency: usize, miss_charge: usize, cache_id: CacheId) -> Self {
        CacheCore {
            fast_cache: FastCache::new(config),
            on_going_reqs: WaitingTask::new(),
            tag_to_reqs: BTreeMap::new(),
            ready_reqs: VecDeque::new(),
            hit_latency,
            miss_charge,
            cache_id,
        }
    }

    /// look the request up, return the tag when a new miss must be fetched
    fn accept(
        &mut self,
        req: MemReq,
        shared_status: &mut SataccStatus,
        current_cycle: usize,
    ) -> Option<u64> {
        match self.fast_cache.access(req.addr) {
            AccessResult::Hit(tag) => {
                shared_status
                    .statistics
                    .record_access(self.cache_id, true, self.hit_latency);
                match self.tag_to_reqs.get_mut(&tag) {
                    // the line is allocated but still being filled
                    Some(waiting) => waiting.push((current_cycle, req)),
                    None => self.on_going_reqs.push(
                        OnGoing::Hit {
                            accepted: current_cycle,
                            req,
                        },
                        current_cycle + self.hit_latency,
                    ),
                }
                None
            }
            AccessResult::Miss(tag) => {
                shared_status
                    .statistics
                    .record_access(self.cache_id, false, self.miss_charge);
                match self.tag_to_reqs.get_mut(&tag) {
                    Some(waiting) => {
                        waiting.push((current_cycle, req));
                        None
                    }
                    None => {
                        self.tag_to_reqs.insert(tag, vec![(current_cycle, req)]);
                        Some(tag)
                    }
                }
            }
        }
    }

    fn schedule_fill(&mut self, tag: u64, ready_cycle: usize) {
        self.on_going_reqs.push(OnGoing::Fill(tag), ready_cycle);
    }

    /// move every request whose data is ready to the output queue
    fn collect_ready(&mut self, shared_status: &mut SataccStatus, current_cycle: usize) -> bool {
        let mut updated = false;
        while let Some((ready_cycle, on_going)) = self.on_going_reqs.pop_ready(current_cycle) {
            updated = true;
            match on_going {
                OnGoing::Hit { accepted, req } => {
                    shared_status
                        .statistics
                        .record_latency(self.cache_id, ready_cycle - accepted);
                    self.ready_reqs.push_back(req);
                }
                OnGoing::Fill(tag) => {
                    for (accepted, req) in self.tag_to_reqs.remove(&tag).unwrap_or_default() {
                        shared_status
                            .statistics
                            .record_latency(self.cache_id, ready_cycle - accepted);
                        self.ready_reqs.push_back(req);
                    }
                }
            }
        }
        updated
    }

    /// send ready requests until the port is full
    fn send_ready(
        &mut self,
        out_port: &SimSender<IcntMsgWrapper<MemReq>>,
        target: impl Fn(&MemReq) -> usize,
        current_cycle: usize,
    ) -> bool {
        let mut updated = false;
        while let Some(req) = self.ready_reqs.pop_front() {
            let mem_target_port = target(&req);
            tracing::debug!(
                cache = ?self.cache_id,
                id = req.id,
                mem_target_port,
                "send req back at cycle: {current_cycle}"
            );
            match out_port.send(IcntMsgWrapper {
                msg: req,
                mem_target_port,
            }) {
                Ok(()) => updated = true,
                Err(blocked) => {
                    self.ready_reqs.push_front(blocked.msg);
                    break;
                }
            }
        }
        updated
    }

    fn is_busy(&self) -> bool {
        !self.on_going_reqs.is_empty() || !self.ready_reqs.is_empty() || !self.tag_to_reqs.is_empty()
    }

    fn waiting_timed_event(&self, current_cycle: usize) -> bool {
        self.on_going_reqs.any_leaving_after(current_cycle)
    }
}
