use crate::sim::{SimComponent, SimReciver, SimSender};

use super::{
    satacc_minisat_task::{SingleRoundTask, WatcherTask},
    SataccStatus,
};

/// the task sender, which will send tasks to the watcher list unit
pub struct Trail {
    task_receiver: SimReciver<SingleRoundTask>,
    watcher_sender: Vec<SimSender<WatcherTask>>,
    current_working_task: Option<SingleRoundTask>,
    total_watcher: usize,
    /// keep the submission order
    seq: bool,
    /// dispatch a watcher list only when nothing else is in flight
    single_watcher: bool,
}
impl Trail {
    pub fn new(
        watcher_sender: Vec<SimSender<WatcherTask>>,
        task_receiver: SimReciver<SingleRoundTask>,
        total_watcher: usize,
        seq: bool,
        single_watcher: bool,
    ) -> Self {
        Trail {
            watcher_sender,
            task_receiver,
            current_working_task: None,
            total_watcher,
            seq,
            single_watcher,
        }
    }
}

impl SimComponent for Trail {
    type SharedStatus = SataccStatus;
    fn update(
        &mut self,
        shared_status: &mut Self::SharedStatus,
        current_cycle: usize,
    ) -> (bool, bool) {
        let mut busy = self.current_working_task.is_some();
        let mut updated = false;
        // update current running task
        if let Some(current_task) = self.current_working_task.as_mut() {
            if self.single_watcher && shared_status.pending_work > 0 {
                tracing::debug!("trail waits for the running watcher list at cycle: {current_cycle}");
            } else if let Some(watcher_task) = current_task.pop_next_task() {
                let watcher_unit_id = watcher_task.get_watcher_pe_id(self.total_watcher);
                let operations = watcher_task.single_watcher_tasks.len();
                match self.watcher_sender[watcher_unit_id].send(watcher_task) {
                    Ok(()) => {
                        shared_status.start_watcher_list(operations);
                        updated = true;
                    }
                    Err(watcher_task) => {
                        current_task.ret_task(watcher_task);
                        tracing::debug!("send task to watcher {watcher_unit_id} failed");
                    }
                }
            } else {
                // no more tasks, finish the current task
                updated = true;
                self.current_working_task = None;
            }
        }
        // get new task
        if self.current_working_task.is_none() {
            if let Some(mut single_round_task) = self.task_receiver.recv() {
                // a new round begin, update the statistics
                shared_status
                    .statistics
                    .update_single_round_task(&single_round_task);
                if !self.seq {
                    single_round_task.sort_by_watcher();
                }
                self.current_working_task = Some(single_round_task);
                busy = true;
                updated = true;
            }
        }
        if busy && !updated {
            tracing::debug!("trail is busy but not updated at cycle: {current_cycle}");
        }
        (busy, updated)
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use crate::{config::Config, sim::ChannelBuilder, test_utils};

    use super::*;

    fn watcher_list(watcher_id: usize, addr: u64) -> WatcherTask {
        WatcherTask {
            meta_data_addr: Some(addr),
            watcher_addr: None,
            watcher_id,
            single_watcher_tasks: VecDeque::new(),
        }
    }

    fn dispatch_order(seq: bool) -> Vec<(usize, Option<u64>)> {
        let channel_builder = ChannelBuilder::new();
        let (senders, receivers) = channel_builder.sim_channel_array(8, 2);
        let (round_sender, round_receiver) = channel_builder.sim_channel(1);
        let mut trail = Trail::new(senders, round_receiver, 2, seq, false);
        let mut context = SataccStatus::new(&Config::default());
        let mut round = SingleRoundTask::default();
        for (watcher_id, addr) in [(3, 0), (0, 1), (2, 2)] {
            round.assignments.push_back(watcher_list(watcher_id, addr));
        }
        round_sender.send(round).unwrap();
        for cycle in 0..5 {
            trail.update(&mut context, cycle);
        }
        assert_eq!(context.statistics.total_rounds, 1);
        assert_eq!(context.pending_work, 3);
        // both 2 and 3 belong to watcher unit 1
        let mut order = vec![];
        for receiver in receivers {
            while let Some(task) = receiver.recv() {
                order.push((task.watcher_id, task.meta_data_addr));
            }
        }
        order
    }

    #[test]
    fn test_sorted_dispatch() {
        test_utils::init();
        assert_eq!(
            dispatch_order(false),
            vec![(0, Some(1)), (2, Some(2)), (3, Some(0))]
        );
        assert_eq!(
            dispatch_order(true),
            vec![(0, Some(1)), (3, Some(0)), (2, Some(2))]
        );
    }

    #[test]
    fn test_single_watcher_waits() {
        test_utils::init();
        let channel_builder = ChannelBuilder::new();
        let (senders, receivers) = channel_builder.sim_channel_array(8, 1);
        let (round_sender, round_receiver) = channel_builder.sim_channel(1);
        let mut trail = Trail::new(senders, round_receiver, 1, false, true);
        let mut context = SataccStatus::new(&Config::default());
        let mut round = SingleRoundTask::default();
        round.assignments.push_back(watcher_list(0, 0));
        round.assignments.push_back(watcher_list(1, 64));
        round_sender.send(round).unwrap();

        trail.update(&mut context, 0);
        trail.update(&mut context, 1);
        assert_eq!(receivers[0].len(), 1);
        // the first list is still pending
        assert_eq!(trail.update(&mut context, 2), (true, false));
        assert_eq!(receivers[0].len(), 1);
        context.finish_watcher_list();
        trail.update(&mut context, 3);
        assert_eq!(receivers[0].len(), 2);
    }
}
