use std::collections::VecDeque;

use crate::{
    config::WriterConfig,
    sim::{InOutPort, SimComponent, SimReciver},
};

use super::{icnt::IcntMsgWrapper, MemLayout, MemReq, MemReqType, SataccStatus, WriteBackReq};

/// # Writer
/// the write-back buffer in front of the l3
/// - requests come from the clause units through the watcher to writer icnt
/// - a full buffer leaves the request in the icnt, that's the only backpressure
/// - each cycle the oldest `merge_width` entries retire, entries of one clause line become one write
pub struct Writer {
    req_in: SimReciver<IcntMsgWrapper<WriteBackReq>>,
    mem_port: InOutPort<IcntMsgWrapper<MemReq>>,
    entries: VecDeque<WriteBackReq>,
    capacity: usize,
    merge_width: usize,
    layout: MemLayout,
    /// writes sent to the l3 and not acknowledged yet
    on_going_writes: usize,
}

impl Writer {
    pub fn new(
        req_in: SimReciver<IcntMsgWrapper<WriteBackReq>>,
        mem_port: InOutPort<IcntMsgWrapper<MemReq>>,
        config: &WriterConfig,
        layout: MemLayout,
    ) -> Self {
        Writer {
            req_in,
            mem_port,
            entries: VecDeque::new(),
            capacity: config.num_writer_entry,
            merge_width: config.num_writer_merge,
            layout,
            on_going_writes: 0,
        }
    }

    /// retire the oldest entries, return how many left the buffer
    ///
    /// entries are walked in fifo order, an entry merges into an earlier write of the
    /// same step only when both clause id and address match. The walk stops at the
    /// first write that cannot be sent, so nothing retires ahead of an older entry.
    fn retire(&mut self, context: &mut SataccStatus, current_cycle: usize) -> usize {
        let step_len = self.entries.len().min(self.merge_width);
        // (clause id, addr) written in this step
        let mut written: Vec<(usize, u64)> = Vec::with_capacity(step_len);
        let mut retired = 0;
        while retired < step_len {
            let Some(entry) = self.entries.front() else {
                break;
            };
            let key = (entry.clause_id, entry.addr);
            if written.contains(&key) {
                context.statistics.writer_statistics.merged += 1;
            } else {
                let req = self.layout.l3_req(
                    context,
                    entry.addr,
                    self.layout.writer_port(),
                    MemReqType::WriterWrite,
                    true,
                );
                if self.mem_port.out_port.send(req).is_err() {
                    tracing::debug!(
                        clause_id = key.0,
                        "writer cannot send the write at cycle: {current_cycle}"
                    );
                    break;
                }
                context.statistics.writer_statistics.writes_issued += 1;
                self.on_going_writes += 1;
                written.push(key);
            }
            self.entries.pop_front();
            retired += 1;
        }
        retired
    }
}

impl SimComponent for Writer {
    type SharedStatus = SataccStatus;
    fn update(&mut self, context: &mut Self::SharedStatus, current_cycle: usize) -> (bool, bool) {
        let mut updated = false;

        let retired = self.retire(context, current_cycle);
        if retired > 0 {
            updated = true;
            let stat = &mut context.statistics.writer_statistics;
            stat.retired += retired;
            stat.max_retired_per_step = stat.max_retired_per_step.max(retired);
        }

        while self.entries.len() < self.capacity {
            let Some(IcntMsgWrapper { msg, .. }) = self.req_in.recv() else {
                break;
            };
            tracing::debug!(
                clause_id = msg.clause_id,
                watcher_pe_id = msg.watcher_pe_id,
                "writer admit at cycle: {current_cycle}"
            );
            self.entries.push_back(msg);
            context.statistics.writer_statistics.admitted += 1;
            updated = true;
        }
        let stat = &mut context.statistics.writer_statistics;
        stat.max_occupancy = stat.max_occupancy.max(self.entries.len());
        if !self.req_in.is_empty() {
            stat.blocked_cycles += 1;
        }

        while self.mem_port.in_port.recv().is_some() {
            self.on_going_writes = self.on_going_writes.saturating_sub(1);
            context.statistics.writer_statistics.acks += 1;
            updated = true;
        }

        let busy = !self.entries.is_empty() || !self.req_in.is_empty() || self.on_going_writes > 0;
        (busy, updated)
    }
}
