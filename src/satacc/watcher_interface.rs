use crate::{
    config::{Config, WatcherToClauseType},
    sim::{ChannelBuilder, InOutPort, SimComponent, SimReciver, SimSender},
};

use super::{
    cache::{PrivateCache, PrivateCachePorts},
    clause::{ClausePorts, ClauseUnit},
    icnt::IcntMsgWrapper,
    satacc_minisat_task::{ClauseTask, WatcherTask},
    watcher::{ClauseDelivery, Watcher, WatcherPorts},
    MemLayout, MemReq, MemReqType, SataccStatus, WriteBackReq,
};

/// the ports connecting one interface to the rest of the accelerator
pub struct WatcherInterfacePorts {
    pub mem_icnt: InOutPort<IcntMsgWrapper<MemReq>>,
    pub clause_icnt: InOutPort<IcntMsgWrapper<ClauseTask>>,
    pub writer_sender: SimSender<IcntMsgWrapper<WriteBackReq>>,
    pub watcher_task_in: SimReciver<WatcherTask>,
}

/// # WatcherInterface
/// one node of the accelerator: a watcher, its clause units and their private cache
pub struct WatcherInterface {
    /// the interface for receiving mem responses
    mem_icnt_interface_receiver: SimReciver<IcntMsgWrapper<MemReq>>,
    /// the watcher process unit
    watcher: Watcher,
    /// the clause process unit
    clauses: Vec<ClauseUnit>,
    /// clause tasks sent by other watcher interfaces
    task_icnt_receiver: SimReciver<IcntMsgWrapper<ClauseTask>>,

    // internal ports
    watcher_mem_sender: SimSender<IcntMsgWrapper<MemReq>>,
    clause_mem_senders: Vec<SimSender<IcntMsgWrapper<MemReq>>>,
    watcher_private_cache_sender: SimSender<IcntMsgWrapper<MemReq>>,
    clause_private_cache_senders: Vec<SimSender<IcntMsgWrapper<MemReq>>>,
    clause_task_senders: Vec<SimSender<IcntMsgWrapper<ClauseTask>>>,

    // private cache
    private_cache: PrivateCache,
    private_cache_fill_sender: SimSender<IcntMsgWrapper<MemReq>>,
    private_cache_out_receiver: SimReciver<IcntMsgWrapper<MemReq>>,
    num_clauses_per_watcher: usize,
    watcher_pe_id: usize,
}

/// forward `msg` or give it back to the queue it came from
fn forward<T>(sender: &SimSender<T>, receiver: &SimReciver<T>, msg: T) -> bool {
    match sender.send(msg) {
        Ok(()) => true,
        Err(msg) => {
            receiver.ret(msg);
            false
        }
    }
}

impl WatcherInterface {
    pub fn new(
        ports: WatcherInterfacePorts,
        channel_builder: &ChannelBuilder,
        config: &Config,
        watcher_pe_id: usize,
    ) -> Self {
        let queue_size = config.channel_size;
        let num_clauses_per_watcher = config.n_clauses;
        let layout = MemLayout::new(config);
        let WatcherInterfacePorts {
            mem_icnt,
            clause_icnt,
            writer_sender,
            watcher_task_in,
        } = ports;

        let (watcher_mem_sender, watcher_mem_receiver) = channel_builder.sim_channel(queue_size);
        let (private_cache_in_sender, private_cache_in_receiver) =
            channel_builder.sim_channel(queue_size);
        let (private_cache_out_sender, private_cache_out_receiver) =
            channel_builder.sim_channel(queue_size);
        let (private_cache_fill_sender, private_cache_fill_receiver) =
            channel_builder.sim_channel(queue_size);
        let (watcher_private_cache_sender, watcher_private_cache_receiver) =
            channel_builder.sim_channel(queue_size);

        let mut clause_task_senders = vec![];
        let mut clause_mem_senders = vec![];
        let mut clause_private_cache_senders = vec![];
        let clauses = (0..num_clauses_per_watcher)
            .map(|clause_pe_id| {
                let (clause_task_sender, clause_task_receiver) =
                    channel_builder.sim_channel(queue_size);
                let (clause_mem_sender, clause_mem_receiver) =
                    channel_builder.sim_channel(queue_size);
                let (clause_private_cache_sender, clause_private_cache_receiver) =
                    channel_builder.sim_channel(queue_size);
                clause_task_senders.push(clause_task_sender);
                clause_mem_senders.push(clause_mem_sender);
                clause_private_cache_senders.push(clause_private_cache_sender);
                ClauseUnit::new(
                    ClausePorts {
                        clause_task_in: clause_task_receiver,
                        mem_icnt_port: InOutPort {
                            in_port: clause_mem_receiver,
                            out_port: mem_icnt.out_port.clone(),
                        },
                        private_cache_port: InOutPort {
                            in_port: clause_private_cache_receiver,
                            out_port: private_cache_in_sender.clone(),
                        },
                        writer_sender: writer_sender.clone(),
                    },
                    layout,
                    watcher_pe_id,
                    clause_pe_id,
                )
            })
            .collect::<Vec<_>>();

        let clause_delivery = match config.watcher_to_clause_type {
            WatcherToClauseType::Streight => ClauseDelivery::Direct(clause_task_senders.clone()),
            WatcherToClauseType::Icnt => ClauseDelivery::Icnt(clause_icnt.out_port.clone()),
        };
        let watcher = Watcher::new(
            WatcherPorts {
                watcher_task_receiver: watcher_task_in,
                clause_delivery,
                mem_port: InOutPort {
                    in_port: watcher_mem_receiver,
                    out_port: mem_icnt.out_port.clone(),
                },
                private_cache_sender: private_cache_in_sender,
                private_cache_receiver: watcher_private_cache_receiver,
            },
            layout,
            num_clauses_per_watcher,
            watcher_pe_id,
            config.scheduling.single_watcher,
        );

        let memory = &config.memory;
        let accept_per_cycle = if memory.private_cache_config.alway_hit {
            None
        } else {
            Some(memory.multi_port)
        };
        let private_cache = PrivateCache::new(
            &memory.private_cache_config,
            PrivateCachePorts {
                req_in: private_cache_in_receiver,
                resp_out: private_cache_out_sender,
                mem_out: mem_icnt.out_port,
                fill_in: private_cache_fill_receiver,
            },
            memory.l1_hit_latency,
            memory.l1_hit_latency + memory.l3_hit_latency,
            accept_per_cycle,
            watcher_pe_id,
            layout,
        );

        Self {
            mem_icnt_interface_receiver: mem_icnt.in_port,
            watcher,
            clauses,
            task_icnt_receiver: clause_icnt.in_port,
            watcher_mem_sender,
            clause_mem_senders,
            clause_task_senders,
            private_cache,
            private_cache_fill_sender,
            private_cache_out_receiver,
            watcher_private_cache_sender,
            clause_private_cache_senders,
            num_clauses_per_watcher,
            watcher_pe_id,
        }
    }
}

impl SimComponent for WatcherInterface {
    type SharedStatus = SataccStatus;
    fn update(
        &mut self,
        shared_status: &mut Self::SharedStatus,
        current_cycle: usize,
    ) -> (bool, bool) {
        let mut updated = false;
        // receive the clause task
        if let Some(clause_task) = self.task_icnt_receiver.recv() {
            let id = clause_task
                .msg
                .get_inner_clause_pe_id(self.num_clauses_per_watcher)
                .unwrap_or_default();
            if forward(
                &self.clause_task_senders[id],
                &self.task_icnt_receiver,
                clause_task,
            ) {
                tracing::debug!(
                    watcher_pe_id = self.watcher_pe_id,
                    "send task to clause {id} at cycle: {current_cycle}"
                );
                updated = true;
            }
        }
        if let Some(mem_req) = self.mem_icnt_interface_receiver.recv() {
            let sender = match mem_req.msg.req_type {
                MemReqType::ClauseReadData(clause_inner_id) => {
                    Some(&self.clause_mem_senders[clause_inner_id])
                }
                MemReqType::WatcherReadMetaData | MemReqType::WatcherReadData => {
                    Some(&self.watcher_mem_sender)
                }
                // the fill of a private cache miss
                MemReqType::ClauseReadValue(_) | MemReqType::WatcherReadBlocker => {
                    Some(&self.private_cache_fill_sender)
                }
                MemReqType::WriterWrite => None,
            };
            match sender {
                Some(sender) => {
                    updated |= forward(sender, &self.mem_icnt_interface_receiver, mem_req);
                }
                None => {
                    tracing::error!(
                        watcher_pe_id = self.watcher_pe_id,
                        "watcher interface got a writer ack, id {}",
                        mem_req.msg.id
                    );
                    updated = true;
                }
            }
        }
        // recv the private cache, it should contains clause value and watcher
        if let Some(mem_req) = self.private_cache_out_receiver.recv() {
            let msg_id = mem_req.msg.id;
            let sender = match mem_req.msg.req_type {
                MemReqType::ClauseReadValue(clause_inner_id) => {
                    Some(&self.clause_private_cache_senders[clause_inner_id])
                }
                MemReqType::WatcherReadBlocker => Some(&self.watcher_private_cache_sender),
                _ => None,
            };
            match sender {
                Some(sender) => {
                    if forward(sender, &self.private_cache_out_receiver, mem_req) {
                        tracing::debug!(
                            watcher_pe_id = self.watcher_pe_id,
                            "private cache return id {msg_id} at cycle: {current_cycle}"
                        );
                        updated = true;
                    }
                }
                None => {
                    tracing::error!(
                        watcher_pe_id = self.watcher_pe_id,
                        "private cache returned an l3 only request, id {msg_id}"
                    );
                    updated = true;
                }
            }
        }
        let (c_busy, c_update) = (
            &mut self.watcher,
            &mut self.clauses,
            &mut self.private_cache,
        )
            .update(shared_status, current_cycle);
        let busy = c_busy
            || !self.task_icnt_receiver.is_empty()
            || !self.mem_icnt_interface_receiver.is_empty()
            || !self.private_cache_out_receiver.is_empty();
        let updated = updated || c_update;
        if busy && !updated {
            tracing::debug!("watcher interface is busy but not updated at cycle: {current_cycle}");
        }
        (busy, updated)
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use crate::{
        config::{Config, WatcherToClauseType},
        satacc::{
            icnt::IcntMsgWrapper,
            satacc_minisat_task::{ClauseData, ClauseTask, WatcherTask},
            watcher_interface::{WatcherInterface, WatcherInterfacePorts},
            MemReq, MemReqType, SataccStatus, WriteBackReq,
        },
        sim::{ChannelBuilder, InOutPort, SimReciver, SimRunner, SimSender},
        test_utils,
    };

    struct Harness {
        icnt_port_base: InOutPort<IcntMsgWrapper<MemReq>>,
        task_port_base: InOutPort<IcntMsgWrapper<ClauseTask>>,
        watcher_task_sender: SimSender<WatcherTask>,
        writer_in: SimReciver<IcntMsgWrapper<WriteBackReq>>,
        sim_runner: SimRunner<WatcherInterface, SataccStatus>,
    }

    impl Harness {
        /// answer every pending memory request, return their types
        fn echo_memory(&self) -> Vec<MemReqType> {
            let mut req_types = vec![];
            while let Some(req) = self.icnt_port_base.in_port.recv() {
                req_types.push(req.msg.req_type);
                self.icnt_port_base.out_port.send(req).unwrap();
            }
            req_types
        }
    }

    fn build(watcher_to_clause_type: WatcherToClauseType) -> Harness {
        test_utils::init();
        let channel_builder = ChannelBuilder::new();
        let (icnt_port_base, mem_icnt) = channel_builder.in_out_port(10);
        let (task_port_base, clause_icnt) = channel_builder.in_out_port(10);
        let (watcher_task_sender, watcher_task_in) = channel_builder.sim_channel(10);
        let (writer_sender, writer_in) = channel_builder.sim_channel(10);
        let mut config = Config::default();
        config.watcher_to_clause_type = watcher_to_clause_type;
        config.n_watchers = 1;
        config.n_clauses = 2;
        config.mems = 2;
        config.channel_size = 10;
        let watcher_interface = WatcherInterface::new(
            WatcherInterfacePorts {
                mem_icnt,
                clause_icnt,
                writer_sender,
                watcher_task_in,
            },
            &channel_builder,
            &config,
            0,
        );
        Harness {
            icnt_port_base,
            task_port_base,
            watcher_task_sender,
            writer_in,
            sim_runner: SimRunner::new(watcher_interface, SataccStatus::new(&config)),
        }
    }

    fn watcher_task(single_watcher_tasks: VecDeque<ClauseTask>) -> WatcherTask {
        WatcherTask {
            meta_data_addr: Some(0),
            watcher_addr: Some(64),
            watcher_id: 0,
            single_watcher_tasks,
        }
    }

    fn clause_task() -> ClauseTask {
        ClauseTask {
            watcher_id: 0,
            blocker_addr: 0x1000,
            clause_data: Some(ClauseData {
                clause_id: 1,
                clause_addr: 0x2000,
                clause_processing_time: 10,
                clause_value_addr: vec![200, 300],
            }),
        }
    }

    #[test]
    fn test_watcher_interface() {
        let mut harness = build(WatcherToClauseType::Streight);
        harness
            .watcher_task_sender
            .send(watcher_task(VecDeque::new()))
            .unwrap();
        harness.sim_runner.run().unwrap_err();
        assert_eq!(harness.echo_memory(), vec![MemReqType::WatcherReadMetaData]);
        harness.sim_runner.run().unwrap_err();
        assert_eq!(harness.echo_memory(), vec![MemReqType::WatcherReadData]);
        harness.sim_runner.run().unwrap();
        // because there are no clause in this watcher task, so no blocker request will be sent!
        assert!(harness.icnt_port_base.in_port.recv().is_none());
    }

    #[test]
    fn test_watcher_interface_watcher_with_clause() {
        let mut harness = build(WatcherToClauseType::Streight);
        harness
            .watcher_task_sender
            .send(watcher_task([clause_task()].into()))
            .unwrap();
        harness.sim_runner.run().unwrap_err();
        assert_eq!(harness.echo_memory(), vec![MemReqType::WatcherReadMetaData]);
        harness.sim_runner.run().unwrap_err();
        assert_eq!(harness.echo_memory(), vec![MemReqType::WatcherReadData]);
        // the blocker misses in the private cache
        harness.sim_runner.run().unwrap_err();
        assert_eq!(harness.echo_memory(), vec![MemReqType::WatcherReadBlocker]);
        // the clause goes straight to clause unit 1
        harness.sim_runner.run().unwrap_err();
        assert_eq!(harness.echo_memory(), vec![MemReqType::ClauseReadData(1)]);
        harness.sim_runner.run().unwrap_err();
        assert_eq!(
            harness.echo_memory(),
            vec![MemReqType::ClauseReadValue(1), MemReqType::ClauseReadValue(1)]
        );
        harness.sim_runner.run().unwrap();
        assert!(harness.task_port_base.in_port.is_empty());
        let write_back = harness.writer_in.recv().unwrap();
        assert_eq!(write_back.msg.clause_id, 1);
        assert_eq!(write_back.mem_target_port, 1);

        let stat = &harness.sim_runner.get_shared_status().statistics;
        assert_eq!(stat.private_cache_statistics[0].cache_misses, 3);
        assert_eq!(stat.clause_statistics[0].single_clause[1].total_write_back, 1);
    }

    #[test]
    fn test_watcher_interface_watcher_with_clause_read_clause_datas() {
        let mut harness = build(WatcherToClauseType::Icnt);
        harness
            .watcher_task_sender
            .send(watcher_task([clause_task()].into()))
            .unwrap();
        harness.sim_runner.run().unwrap_err();
        harness.echo_memory();
        harness.sim_runner.run().unwrap_err();
        harness.echo_memory();
        harness.sim_runner.run().unwrap_err();
        assert_eq!(harness.echo_memory(), vec![MemReqType::WatcherReadBlocker]);
        harness.sim_runner.run().unwrap();
        // the clause travels through the clause icnt
        let req = harness.task_port_base.in_port.recv().unwrap();
        assert_eq!(req.mem_target_port, 0);
        harness.task_port_base.out_port.send(req).unwrap();
        harness.sim_runner.run().unwrap_err();
        assert_eq!(harness.echo_memory(), vec![MemReqType::ClauseReadData(1)]);
        harness.sim_runner.run().unwrap_err();
        harness.echo_memory();
        harness.sim_runner.run().unwrap();
        assert!(harness.writer_in.recv().is_some());
    }
}
