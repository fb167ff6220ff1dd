use std::collections::VecDeque;

use crate::{
    satacc::{icnt::IcntMsgWrapper, mem_partition, MemLayout, MemReq, SataccStatus},
    sim::{SimComponent, SimReciver, SimSender},
};

use super::{CacheConfig, CacheCore, CacheId};

/// The ports of a private cache inside a watcher interface.
pub struct PrivateCachePorts {
    /// lookups from the watcher and the clause units
    pub req_in: SimReciver<IcntMsgWrapper<MemReq>>,
    /// answered lookups, dispatched by the interface
    pub resp_out: SimSender<IcntMsgWrapper<MemReq>>,
    /// misses to the l3 over the memory icnt
    pub mem_out: SimSender<IcntMsgWrapper<MemReq>>,
    /// fills coming back from the l3
    pub fill_in: SimReciver<IcntMsgWrapper<MemReq>>,
}

/// the l1 cache of one watcher interface
///
/// a miss is forwarded to the l3 bank owning the block, later lookups of the
/// same block wait in the mshr until the fill arrives
pub struct PrivateCache {
    core: CacheCore,
    ports: PrivateCachePorts,
    miss_queue: VecDeque<MemReq>,
    accept_per_cycle: Option<usize>,
    watcher_pe_id: usize,
    layout: MemLayout,
}

impl PrivateCache {
    pub fn new(
        config: &CacheConfig,
        ports: PrivateCachePorts,
        hit_latency: usize,
        miss_charge: usize,
        accept_per_cycle: Option<usize>,
        watcher_pe_id: usize,
        layout: MemLayout,
    ) -> Self {
        PrivateCache {
            core: CacheCore::new(
                config,
                hit_latency,
                miss_charge,
                CacheId::PrivateCache(watcher_pe_id),
            ),
            ports,
            miss_queue: VecDeque::new(),
            accept_per_cycle,
            watcher_pe_id,
            layout,
        }
    }
}

impl SimComponent for PrivateCache {
    type SharedStatus = SataccStatus;
    fn update(
        &mut self,
        shared_status: &mut Self::SharedStatus,
        current_cycle: usize,
    ) -> (bool, bool) {
        let mut updated = false;
        let limit = self.accept_per_cycle.unwrap_or(usize::MAX);
        let mut accepted = 0;
        while accepted < limit {
            let Some(IcntMsgWrapper { msg, .. }) = self.ports.req_in.recv() else {
                break;
            };
            let req_type = msg.req_type;
            if let Some(tag) = self.core.accept(msg, shared_status, current_cycle) {
                let mem_id = mem_partition(tag, self.layout.mems);
                self.miss_queue.push_back(MemReq {
                    addr: tag,
                    id: shared_status.next_mem_id(),
                    source_port: self.watcher_pe_id,
                    mem_id,
                    is_write: false,
                    req_type,
                });
            }
            accepted += 1;
            updated = true;
        }

        while let Some(req) = self.miss_queue.pop_front() {
            let mem_target_port = self.layout.bank_port(req.mem_id);
            match self.ports.mem_out.send(IcntMsgWrapper {
                msg: req,
                mem_target_port,
            }) {
                Ok(()) => updated = true,
                Err(blocked) => {
                    tracing::debug!(
                        watcher_pe_id = self.watcher_pe_id,
                        "private cache cannot send miss at cycle: {current_cycle}"
                    );
                    self.miss_queue.push_front(blocked.msg);
                    break;
                }
            }
        }

        while let Some(IcntMsgWrapper { msg, .. }) = self.ports.fill_in.recv() {
            self.core.schedule_fill(msg.addr, current_cycle);
            updated = true;
        }

        updated |= self.core.collect_ready(shared_status, current_cycle);
        updated |= self
            .core
            .send_ready(&self.ports.resp_out, |_| 0, current_cycle);

        let busy = self.core.is_busy()
            || !self.miss_queue.is_empty()
            || !self.ports.req_in.is_empty()
            || !self.ports.fill_in.is_empty();
        updated |= self.core.waiting_timed_event(current_cycle);
        (busy, updated)
    }
}

#[cfg(test)]
mod test {
    use crate::{
        config::Config,
        satacc::{cache::test_helper::read_req, MemReqType},
        sim::{ChannelBuilder, SimRunner},
        test_utils,
    };

    use super::*;

    #[test]
    fn test_private_cache_miss_and_fill() {
        test_utils::init();
        let channel_builder = ChannelBuilder::new();
        let (req_sender, req_in) = channel_builder.sim_channel(8);
        let (resp_out, resp_receiver) = channel_builder.sim_channel(8);
        let (mem_out, mem_receiver) = channel_builder.sim_channel(8);
        let (fill_sender, fill_in) = channel_builder.sim_channel(8);
        let cache = PrivateCache::new(
            &CacheConfig {
                sets: 4,
                associativity: 2,
                block_size: 64,
                channels: 1,
                alway_hit: false,
            },
            PrivateCachePorts {
                req_in,
                resp_out,
                mem_out,
                fill_in,
            },
            1,
            16,
            None,
            1,
            MemLayout {
                total_watchers: 2,
                mems: 4,
            },
        );
        let mut sim_runner = SimRunner::new(cache, SataccStatus::new(&Config::default()));
        let mut blocker = read_req(7, 0x100, 1);
        blocker.req_type = MemReqType::WatcherReadBlocker;
        let mut same_block = read_req(8, 0x104, 1);
        same_block.req_type = MemReqType::WatcherReadBlocker;
        for req in [blocker, same_block] {
            req_sender
                .send(IcntMsgWrapper {
                    msg: req,
                    mem_target_port: 0,
                })
                .unwrap();
        }
        // the first lookup misses, the second waits on the mshr
        // nothing feeds the fill port yet, so the runner reports a stall
        sim_runner.run().unwrap_err();
        let miss = mem_receiver.recv().unwrap();
        assert!(mem_receiver.recv().is_none());
        assert_eq!(miss.msg.addr, 0x100);
        assert_eq!(miss.msg.source_port, 1);
        assert_eq!(miss.mem_target_port, 2 + mem_partition(0x100, 4));
        assert!(resp_receiver.is_empty());

        fill_sender.send(miss).unwrap();
        sim_runner.run().unwrap();
        let first = resp_receiver.recv().unwrap();
        let second = resp_receiver.recv().unwrap();
        assert_eq!((first.msg.id, second.msg.id), (7, 8));

        let stat = &sim_runner.get_shared_status().statistics.private_cache_statistics[1];
        assert_eq!(stat.cache_misses, 1);
        assert_eq!(stat.cache_hits, 1);
        assert_eq!(stat.charged_cycles, 16 + 1);
    }
}
