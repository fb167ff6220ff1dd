use std::collections::{BTreeMap, VecDeque};

use crate::{
    satacc::MemReqType,
    sim::{InOutPort, SimComponent, SimReciver, SimSender},
};

use super::{
    icnt::IcntMsgWrapper,
    satacc_minisat_task::{ClauseTask, WatcherTask},
    MemLayout, MemReq, SataccStatus,
};

/// the most requests of one kind a watcher keeps in flight
const MAX_ONGOING_REQS: usize = 256;
/// a watcher need 2 cycle to test if it's time to read the clause
const WATCHER_CHECK_CYCLES: usize = 2;

/// where a watcher sends the clauses it has to read
pub enum ClauseDelivery {
    /// the clause units of the same interface, indexed by the inner clause id
    Direct(Vec<SimSender<IcntMsgWrapper<ClauseTask>>>),
    /// the watcher to clause icnt, the target is the interface owning the clause
    Icnt(SimSender<IcntMsgWrapper<ClauseTask>>),
}

pub struct Watcher {
    watcher_task_receiver: SimReciver<WatcherTask>,
    clause_delivery: ClauseDelivery,
    /// the out port goes to the memory icnt, the in port is fed by the interface
    mem_port: InOutPort<IcntMsgWrapper<MemReq>>,
    private_cache_sender: SimSender<IcntMsgWrapper<MemReq>>,
    private_cache_receiver: SimReciver<IcntMsgWrapper<MemReq>>,
    meta_finished_queue: VecDeque<WatcherTask>,
    data_finished_queue: VecDeque<WatcherTask>,
    single_watcher_task_queue: VecDeque<ClauseTask>,
    single_watcher_value_finished_queue: VecDeque<ClauseTask>,
    single_watcher_process_finished_queue: VecDeque<ClauseTask>,
    current_processing_task: Option<(usize, ClauseTask)>,
    layout: MemLayout,
    n_clauses: usize,
    watcher_pe_id: usize,
    single_watcher: bool,
    mem_req_id_to_watcher_task: BTreeMap<usize, WatcherTask>,
    mem_req_id_to_clause_task: BTreeMap<usize, ClauseTask>,
    total_ongoing_meta_mem_reqs: usize,
    total_ongoing_data_mem_reqs: usize,
    total_blocker_requests_ongoing: usize,
}

pub struct WatcherPorts {
    pub watcher_task_receiver: SimReciver<WatcherTask>,
    pub clause_delivery: ClauseDelivery,
    pub mem_port: InOutPort<IcntMsgWrapper<MemReq>>,
    pub private_cache_sender: SimSender<IcntMsgWrapper<MemReq>>,
    pub private_cache_receiver: SimReciver<IcntMsgWrapper<MemReq>>,
}

impl Watcher {
    pub fn new(
        ports: WatcherPorts,
        layout: MemLayout,
        n_clauses: usize,
        watcher_pe_id: usize,
        single_watcher: bool,
    ) -> Self {
        let WatcherPorts {
            watcher_task_receiver,
            clause_delivery,
            mem_port,
            private_cache_sender,
            private_cache_receiver,
        } = ports;
        Watcher {
            watcher_task_receiver,
            clause_delivery,
            mem_port,
            private_cache_sender,
            private_cache_receiver,
            meta_finished_queue: VecDeque::new(),
            data_finished_queue: VecDeque::new(),
            single_watcher_task_queue: VecDeque::new(),
            single_watcher_value_finished_queue: VecDeque::new(),
            single_watcher_process_finished_queue: VecDeque::new(),
            current_processing_task: None,
            layout,
            n_clauses,
            watcher_pe_id,
            single_watcher,
            mem_req_id_to_watcher_task: BTreeMap::new(),
            mem_req_id_to_clause_task: BTreeMap::new(),
            total_ongoing_meta_mem_reqs: 0,
            total_ongoing_data_mem_reqs: 0,
            total_blocker_requests_ongoing: 0,
        }
    }

    /// send the clause task to the unit owning the clause, give it back when blocked
    fn send_clause(&self, clause_task: ClauseTask) -> Result<(), ClauseTask> {
        match &self.clause_delivery {
            ClauseDelivery::Direct(senders) => {
                let inner_id = clause_task
                    .get_inner_clause_pe_id(self.n_clauses)
                    .unwrap_or_default();
                senders[inner_id]
                    .send(IcntMsgWrapper {
                        msg: clause_task,
                        mem_target_port: self.watcher_pe_id,
                    })
                    .map_err(|blocked| blocked.msg)
            }
            ClauseDelivery::Icnt(sender) => {
                let global_id = clause_task
                    .get_global_clause_pe_id(self.layout.total_watchers * self.n_clauses)
                    .unwrap_or_default();
                sender
                    .send(IcntMsgWrapper {
                        msg: clause_task,
                        mem_target_port: global_id / self.n_clauses,
                    })
                    .map_err(|blocked| blocked.msg)
            }
        }
    }

    fn is_busy(&self) -> bool {
        !self.meta_finished_queue.is_empty()
            || !self.data_finished_queue.is_empty()
            || !self.single_watcher_task_queue.is_empty()
            || !self.single_watcher_value_finished_queue.is_empty()
            || !self.single_watcher_process_finished_queue.is_empty()
            || self.current_processing_task.is_some()
            || !self.mem_req_id_to_watcher_task.is_empty()
            || !self.mem_req_id_to_clause_task.is_empty()
            || !self.watcher_task_receiver.is_empty()
            || !self.mem_port.in_port.is_empty()
            || !self.private_cache_receiver.is_empty()
    }
}
#[derive(Debug)]
enum IdleReason {
    NoTask,
    CannotSendL3Cache,
    CannotSendPrivateCache,
    CannotSendClause,
    WaitingL3Ret,
    WaitingL1Ret,
}
impl SimComponent for Watcher {
    type SharedStatus = SataccStatus;
    fn update(&mut self, context: &mut Self::SharedStatus, current_cycle: usize) -> (bool, bool) {
        let mut updated = false;
        let mut reason = IdleReason::NoTask;
        // first check the new arrived watcher tasks
        if self.total_ongoing_meta_mem_reqs < MAX_ONGOING_REQS
            && self.meta_finished_queue.len() < MAX_ONGOING_REQS
        {
            if let Some(watcher_task) = self.watcher_task_receiver.recv() {
                match watcher_task.get_meta_data_task(context, &self.layout, self.watcher_pe_id) {
                    // an implicit watcher list has no metadata to read
                    None => {
                        context.statistics.watcher_statistics[self.watcher_pe_id]
                            .total_assignments += 1;
                        self.meta_finished_queue.push_back(watcher_task);
                        updated = true;
                    }
                    Some(mem_meta_task) => {
                        let id = mem_meta_task.msg.id;
                        match self.mem_port.out_port.send(mem_meta_task) {
                            Ok(()) => {
                                tracing::debug!(
                                    watcher_pe_id = self.watcher_pe_id,
                                    "watcher receive task at cycle: {current_cycle}"
                                );
                                context.statistics.watcher_statistics[self.watcher_pe_id]
                                    .total_assignments += 1;
                                self.mem_req_id_to_watcher_task.insert(id, watcher_task);
                                self.total_ongoing_meta_mem_reqs += 1;
                                updated = true;
                            }
                            Err(_) => {
                                tracing::debug!("cannot send meta data request to cache now");
                                self.watcher_task_receiver.ret(watcher_task);
                                reason = IdleReason::CannotSendL3Cache;
                            }
                        }
                    }
                }
            }
        }
        // then check the tasks that finihed the meta data read
        if self.total_ongoing_data_mem_reqs < MAX_ONGOING_REQS
            && self.data_finished_queue.len() < MAX_ONGOING_REQS
        {
            if let Some(watcher_task) = self.meta_finished_queue.pop_front() {
                match watcher_task.get_watcher_data_task(context, &self.layout, self.watcher_pe_id)
                {
                    None => {
                        self.data_finished_queue.push_back(watcher_task);
                        updated = true;
                    }
                    Some(mem_watcher_task) => {
                        let id = mem_watcher_task.msg.id;
                        match self.mem_port.out_port.send(mem_watcher_task) {
                            Ok(()) => {
                                self.mem_req_id_to_watcher_task.insert(id, watcher_task);
                                self.total_ongoing_data_mem_reqs += 1;
                                updated = true;
                            }
                            Err(_) => {
                                tracing::debug!("cannot send watcher data request to cache now");
                                self.meta_finished_queue.push_front(watcher_task);
                                reason = IdleReason::CannotSendL3Cache;
                            }
                        }
                    }
                }
            }
        }

        // then check the tasks that finished the watcher list read
        if self.single_watcher_task_queue.len() < MAX_ONGOING_REQS {
            if let Some(watcher_task) = self.data_finished_queue.pop_front() {
                updated = true;
                let single_watcher_tasks = watcher_task.into_sub_single_watcher_task();
                context.statistics.watcher_statistics[self.watcher_pe_id].total_watchers +=
                    single_watcher_tasks.len();
                self.single_watcher_task_queue.extend(single_watcher_tasks);
                context.finish_watcher_list();
            }
        }

        // then read the blockers through the private cache
        let may_issue = !self.single_watcher || context.in_flight_ops == 0;
        if may_issue
            && self.total_blocker_requests_ongoing < MAX_ONGOING_REQS
            && self.single_watcher_value_finished_queue.len() < MAX_ONGOING_REQS
        {
            if let Some(single_task) = self.single_watcher_task_queue.pop_front() {
                let blocker_req = single_task.get_blocker_req(context, self.watcher_pe_id);
                let id = blocker_req.msg.id;
                match self.private_cache_sender.send(blocker_req) {
                    Ok(()) => {
                        context.start_single_watcher_task();
                        self.mem_req_id_to_clause_task.insert(id, single_task);
                        self.total_blocker_requests_ongoing += 1;
                        updated = true;
                    }
                    Err(_) => {
                        tracing::debug!("cannot send blocker request to private cache now");
                        self.single_watcher_task_queue.push_front(single_task);
                        reason = IdleReason::CannotSendPrivateCache;
                    }
                }
            }
        }

        // update current processing task
        if self.single_watcher_process_finished_queue.len() < MAX_ONGOING_REQS {
            if let Some((finished_cycle, single_task)) = self.current_processing_task.take() {
                updated = true;
                if finished_cycle > current_cycle {
                    // not finished yet
                    self.current_processing_task = Some((finished_cycle, single_task));
                } else {
                    self.single_watcher_process_finished_queue
                        .push_back(single_task);
                }
            }
        }

        // process the watcher
        if self.current_processing_task.is_none() {
            if let Some(single_task) = self.single_watcher_value_finished_queue.pop_front() {
                updated = true;
                self.current_processing_task =
                    Some((current_cycle + WATCHER_CHECK_CYCLES, single_task));
            }
        }

        // then send the task to clause unit
        if let Some(single_task) = self.single_watcher_process_finished_queue.pop_front() {
            if single_task.have_to_read_clause() {
                match self.send_clause(single_task) {
                    Ok(()) => {
                        updated = true;
                        context.statistics.watcher_statistics[self.watcher_pe_id]
                            .total_clauses_sent += 1;
                    }
                    Err(clause_task) => {
                        tracing::debug!("cannot send clause to clause unit now");
                        self.single_watcher_process_finished_queue
                            .push_front(clause_task);
                        reason = IdleReason::CannotSendClause;
                    }
                }
            } else {
                // the blocker satisfied the watcher, no clause to read
                context.finish_single_watcher_task();
                updated = true;
            }
        }

        // get the global memory return
        if let Some(mem_req) = self.mem_port.in_port.recv() {
            updated = true;
            let id = mem_req.msg.id;
            match (
                mem_req.msg.req_type,
                self.mem_req_id_to_watcher_task.remove(&id),
            ) {
                (MemReqType::WatcherReadMetaData, Some(watcher_task)) => {
                    self.meta_finished_queue.push_back(watcher_task);
                    self.total_ongoing_meta_mem_reqs -= 1;
                }
                (MemReqType::WatcherReadData, Some(watcher_task)) => {
                    self.data_finished_queue.push_back(watcher_task);
                    self.total_ongoing_data_mem_reqs -= 1;
                }
                (req_type, _) => {
                    tracing::error!(
                        watcher_pe_id = self.watcher_pe_id,
                        "unexpected memory return {req_type:?} id {id}"
                    );
                }
            }
        }
        // get the private cache return
        if let Some(mem_req) = self.private_cache_receiver.recv() {
            updated = true;
            let id = mem_req.msg.id;
            match self.mem_req_id_to_clause_task.remove(&id) {
                Some(single_task) => {
                    self.total_blocker_requests_ongoing -= 1;
                    self.single_watcher_value_finished_queue
                        .push_back(single_task);
                }
                None => {
                    tracing::error!(
                        watcher_pe_id = self.watcher_pe_id,
                        "unexpected private cache return id {id}"
                    );
                }
            }
        }

        let busy = self.is_busy();
        let stat = &mut context.statistics.watcher_statistics[self.watcher_pe_id];
        match updated {
            true => {
                stat.busy_cycle += 1;
            }
            false => {
                if !self.mem_req_id_to_clause_task.is_empty() {
                    reason = IdleReason::WaitingL1Ret;
                }
                if !self.mem_req_id_to_watcher_task.is_empty() {
                    reason = IdleReason::WaitingL3Ret;
                }
                stat.idle_cycle += 1;
                let idle_stat = &mut stat.idle_stat;
                match reason {
                    IdleReason::NoTask => idle_stat.idle_no_task += 1,
                    IdleReason::CannotSendL3Cache => idle_stat.idle_send_l3 += 1,
                    IdleReason::CannotSendPrivateCache => idle_stat.idle_send_l1 += 1,
                    IdleReason::CannotSendClause => idle_stat.idle_send_clause += 1,
                    IdleReason::WaitingL3Ret => idle_stat.idle_wating_l3 += 1,
                    IdleReason::WaitingL1Ret => idle_stat.idle_wating_l1 += 1,
                }
            }
        }
        if busy && !updated {
            tracing::debug!(
                "watcher is busy but not updated at cycle: {current_cycle}, idle reason: {reason:?}"
            );
        }
        (busy, updated)
    }
}
