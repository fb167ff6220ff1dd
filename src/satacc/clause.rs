use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::{
    satacc::MemReqType,
    sim::{InOutPort, SimComponent, SimReciver, SimSender},
};

use super::{
    icnt::IcntMsgWrapper, satacc_minisat_task::ClauseTask, MemLayout, MemReq, SataccStatus,
    WriteBackReq,
};

struct ClauseValueTracker {
    clause_task: ClauseTask,
    waiting_to_send_reqs: VecDeque<IcntMsgWrapper<MemReq>>,
    unfinished_req_id: BTreeSet<usize>,
}

impl ClauseValueTracker {
    fn is_finished(&self) -> bool {
        self.waiting_to_send_reqs.is_empty() && self.unfinished_req_id.is_empty()
    }
}

pub struct ClausePorts {
    pub clause_task_in: SimReciver<IcntMsgWrapper<ClauseTask>>,
    /// the out port goes to the memory icnt, the in port is fed by the interface
    pub mem_icnt_port: InOutPort<IcntMsgWrapper<MemReq>>,
    /// the out port goes to the private cache, the in port is fed by the interface
    pub private_cache_port: InOutPort<IcntMsgWrapper<MemReq>>,
    pub writer_sender: SimSender<IcntMsgWrapper<WriteBackReq>>,
}

/// # ClauseUnit
/// reads a clause from the l3, reads its literal values through the private cache,
/// spends the processing time on it and asks the writer to write it back
pub struct ClauseUnit {
    watcher_pe_id: usize,
    clause_pe_id: usize,
    layout: MemLayout,
    /// the writer node of the watcher to writer icnt
    writer_target: usize,
    clause_task_in: SimReciver<IcntMsgWrapper<ClauseTask>>,
    mem_icnt_port: InOutPort<IcntMsgWrapper<MemReq>>,
    private_cache_port: InOutPort<IcntMsgWrapper<MemReq>>,
    writer_sender: SimSender<IcntMsgWrapper<WriteBackReq>>,
    clause_data_ready_queue: VecDeque<ClauseTask>,
    clause_value_ready_queue: VecDeque<ClauseTask>,
    current_processing_task: Option<(usize, ClauseTask)>,
    current_reading_value_task: Option<ClauseValueTracker>,
    write_back_queue: VecDeque<WriteBackReq>,

    mem_req_id_to_clause_task: BTreeMap<usize, ClauseTask>,
}
enum BusyReason {
    NoTask,
    WaitingL1,
    WaitingL3,
    SendingL1,
    SendingL3,
    SendingWriter,
}
impl ClauseUnit {
    pub fn new(
        ports: ClausePorts,
        layout: MemLayout,
        watcher_pe_id: usize,
        clause_pe_id: usize,
    ) -> Self {
        ClauseUnit {
            clause_task_in: ports.clause_task_in,
            mem_icnt_port: ports.mem_icnt_port,
            private_cache_port: ports.private_cache_port,
            writer_sender: ports.writer_sender,
            clause_data_ready_queue: VecDeque::new(),
            clause_value_ready_queue: VecDeque::new(),
            current_processing_task: None,
            watcher_pe_id,
            clause_pe_id,
            layout,
            writer_target: layout.total_watchers,
            current_reading_value_task: None,
            write_back_queue: VecDeque::new(),
            mem_req_id_to_clause_task: BTreeMap::new(),
        }
    }

    fn is_busy(&self) -> bool {
        !self.clause_data_ready_queue.is_empty()
            || !self.clause_value_ready_queue.is_empty()
            || self.current_processing_task.is_some()
            || self.current_reading_value_task.is_some()
            || !self.write_back_queue.is_empty()
            || !self.mem_req_id_to_clause_task.is_empty()
            || !self.clause_task_in.is_empty()
            || !self.mem_icnt_port.in_port.is_empty()
            || !self.private_cache_port.in_port.is_empty()
    }

    /// a processed clause either asks for a write back or is done
    fn finish_processing(&mut self, context: &mut SataccStatus, task: ClauseTask) {
        match task.clause_data {
            Some(clause_data) if !clause_data.clause_value_addr.is_empty() => {
                self.write_back_queue.push_back(WriteBackReq {
                    clause_id: clause_data.clause_id,
                    addr: clause_data.clause_addr,
                    watcher_pe_id: self.watcher_pe_id,
                });
            }
            _ => context.finish_single_watcher_task(),
        }
    }
}

impl SimComponent for ClauseUnit {
    type SharedStatus = SataccStatus;
    fn update(&mut self, context: &mut Self::SharedStatus, current_cycle: usize) -> (bool, bool) {
        let mut updated = false;
        // first read the clause data
        let mut busy_reason = BusyReason::NoTask;
        if let Some(task) = self.clause_task_in.recv() {
            tracing::debug!(
                watcher_pe_id = self.watcher_pe_id,
                clause_pe_id = self.clause_pe_id,
                "clause unit receive task at cycle: {current_cycle}"
            );
            match task.msg.clause_data.as_ref().map(|clause_data| {
                clause_data.get_clause_data_task(
                    context,
                    &self.layout,
                    self.watcher_pe_id,
                    self.clause_pe_id,
                )
            }) {
                Some(mem_req) => {
                    let id = mem_req.msg.id;
                    match self.mem_icnt_port.out_port.send(mem_req) {
                        Ok(()) => {
                            self.mem_req_id_to_clause_task.insert(id, task.msg);
                            context.statistics.clause_statistics[self.watcher_pe_id]
                                .single_clause[self.clause_pe_id]
                                .total_clause_received += 1;
                            updated = true;
                        }
                        Err(_) => {
                            // cannot send to cache now
                            // just ret the task so we don't need the target port
                            self.clause_task_in.ret(task);
                            busy_reason = BusyReason::SendingL3;
                        }
                    }
                }
                None => {
                    tracing::error!("clause unit received a watcher without clause");
                    context.finish_single_watcher_task();
                    updated = true;
                }
            }
        }
        // try get a task to start to read the clause value
        if self.current_reading_value_task.is_none() {
            if let Some(task) = self.clause_data_ready_queue.pop_front() {
                updated = true;
                let mem_reqs = task
                    .clause_data
                    .as_ref()
                    .map(|clause_data| {
                        clause_data.get_read_clause_value_task(
                            context,
                            self.watcher_pe_id,
                            self.clause_pe_id,
                        )
                    })
                    .unwrap_or_default();
                context.statistics.clause_statistics[self.watcher_pe_id].single_clause
                    [self.clause_pe_id]
                    .total_value_read += mem_reqs.len();
                if mem_reqs.is_empty() {
                    self.clause_value_ready_queue.push_back(task);
                } else {
                    self.current_reading_value_task = Some(ClauseValueTracker {
                        clause_task: task,
                        waiting_to_send_reqs: mem_reqs.into_iter().collect(),
                        unfinished_req_id: BTreeSet::new(),
                    });
                }
            }
        }
        // process the clause value task
        if let Some(reqs) = self.current_reading_value_task.as_mut() {
            if let Some(req) = reqs.waiting_to_send_reqs.pop_front() {
                let id = req.msg.id;
                match self.private_cache_port.out_port.send(req) {
                    Ok(()) => {
                        updated = true;
                        reqs.unfinished_req_id.insert(id);
                    }
                    Err(req) => {
                        reqs.waiting_to_send_reqs.push_front(req);
                        busy_reason = BusyReason::SendingL1;
                    }
                }
            }
        }

        // then update current process task
        if let Some((finished_cycle, task)) = self.current_processing_task.take() {
            updated = true;
            if finished_cycle > current_cycle {
                self.current_processing_task = Some((finished_cycle, task));
            } else {
                tracing::debug!(
                    watcher_pe_id = self.watcher_pe_id,
                    clause_pe_id = self.clause_pe_id,
                    "clause unit finished task at cycle: {current_cycle}"
                );
                self.finish_processing(context, task);
            }
        }
        // then process the value ready task
        if self.current_processing_task.is_none() {
            if let Some(task) = self.clause_value_ready_queue.pop_front() {
                let process_time = task
                    .clause_data
                    .as_ref()
                    .map_or(0, |clause_data| clause_data.clause_processing_time);
                updated = true;
                self.current_processing_task = Some((current_cycle + process_time, task));
            }
        }
        // ask the writer to write the clause back
        if let Some(write_back) = self.write_back_queue.pop_front() {
            match self.writer_sender.send(IcntMsgWrapper {
                msg: write_back,
                mem_target_port: self.writer_target,
            }) {
                Ok(()) => {
                    context.statistics.clause_statistics[self.watcher_pe_id].single_clause
                        [self.clause_pe_id]
                        .total_write_back += 1;
                    context.finish_single_watcher_task();
                    updated = true;
                }
                Err(blocked) => {
                    self.write_back_queue.push_front(blocked.msg);
                    busy_reason = BusyReason::SendingWriter;
                }
            }
        }
        // process memory ret
        if let Some(mem_req) = self.mem_icnt_port.in_port.recv() {
            updated = true;
            let id = mem_req.msg.id;
            match (
                mem_req.msg.req_type,
                self.mem_req_id_to_clause_task.remove(&id),
            ) {
                (MemReqType::ClauseReadData(_), Some(clause_task)) => {
                    self.clause_data_ready_queue.push_back(clause_task);
                }
                (req_type, _) => {
                    tracing::error!("clause unit got unexpected memory return {req_type:?} id {id}");
                }
            }
        }
        // process private cache ret
        if let Some(mem_req) = self.private_cache_port.in_port.recv() {
            updated = true;
            let id = mem_req.msg.id;
            let all_values_ready = match self.current_reading_value_task.as_mut() {
                Some(tracker) if tracker.unfinished_req_id.contains(&id) => {
                    tracker.unfinished_req_id.remove(&id);
                    tracker.is_finished()
                }
                _ => {
                    tracing::error!("clause unit got unexpected value return id {id}");
                    false
                }
            };
            if all_values_ready {
                if let Some(tracker) = self.current_reading_value_task.take() {
                    self.clause_value_ready_queue
                        .push_back(tracker.clause_task);
                }
            }
        }

        let busy = self.is_busy();
        let stat = &mut context.statistics.clause_statistics[self.watcher_pe_id].single_clause
            [self.clause_pe_id];
        match updated {
            true => {
                stat.busy_cycle += 1;
            }
            false => {
                stat.idle_cycle += 1;
                // some l3 req in flight
                if !self.mem_req_id_to_clause_task.is_empty() {
                    busy_reason = BusyReason::WaitingL3;
                }
                // some private cache inflight
                if let Some(tracker) = &self.current_reading_value_task {
                    if !tracker.unfinished_req_id.is_empty() {
                        busy_reason = BusyReason::WaitingL1;
                    }
                }
                let idle_stat = &mut stat.idle_stat;
                match busy_reason {
                    BusyReason::NoTask => idle_stat.idle_no_task += 1,
                    BusyReason::WaitingL1 => idle_stat.idle_wating_l1 += 1,
                    BusyReason::WaitingL3 => idle_stat.idle_wating_l3 += 1,
                    BusyReason::SendingL1 => idle_stat.idle_send_l1 += 1,
                    BusyReason::SendingL3 => idle_stat.idle_send_l3 += 1,
                    BusyReason::SendingWriter => idle_stat.idle_send_writer += 1,
                }
            }
        }
        (busy, updated)
    }
}
