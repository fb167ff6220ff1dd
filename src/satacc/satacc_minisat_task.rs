use std::collections::{BTreeSet, VecDeque};

use crate::error::{TaskError, TaskResult};

use super::{
    icnt::IcntMsgWrapper,
    simulator::{RoundReport, Simulator},
    MemLayout, MemReq, MemReqType, SataccStatus,
};

/// Gives the simulator the next round nobody executed yet.
pub trait RoundSource {
    fn next_round(&mut self) -> Option<SingleRoundTask>;
}

/// # SataccMinisatTask
/// the full task of the whole SAT solver
/// - it contains many decisions in [`SingleRoundTask`]
/// - only the last round can be open, operations are appended to it
#[derive(Debug, Default)]
pub struct SataccMinisatTask {
    decisions: VecDeque<SingleRoundTask>,
    round_open: bool,
    /// clause ids of the open round
    live_clauses: BTreeSet<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Conflict,
    NoConflict,
}

/// # SingleRoundTask
/// the task for a single decisions that made by the softwares
/// - it contains many assignments represented by [`WatcherTask`]
#[derive(Debug, Default)]
pub struct SingleRoundTask {
    pub assignments: VecDeque<WatcherTask>,
    pub outcome: Option<RoundOutcome>,
}

impl SingleRoundTask {
    pub fn pop_next_task(&mut self) -> Option<WatcherTask> {
        self.assignments.pop_front()
    }
    pub fn ret_task(&mut self, task: WatcherTask) {
        self.assignments.push_front(task);
    }
    /// order the watcher lists by watcher id, lists of one watcher keep their order
    pub fn sort_by_watcher(&mut self) {
        self.assignments
            .make_contiguous()
            .sort_by_key(|watcher_task| watcher_task.watcher_id);
    }
    pub fn get_statistics(&self) -> SingleRoundStatistics {
        let mut stat = SingleRoundStatistics::default();
        for watcher_task in self.assignments.iter() {
            stat.total_assignments += 1;
            for clause_task in watcher_task.single_watcher_tasks.iter() {
                stat.total_watchers += 1;
                if clause_task.clause_data.is_some() {
                    stat.total_clauses += 1;
                }
            }
        }
        stat
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SingleRoundStatistics {
    pub total_assignments: usize,
    /// the watcher operations
    pub total_watchers: usize,
    /// the watcher operations that read a clause
    pub total_clauses: usize,
}

/// # WatcherTask
/// the task for a single assignment that made by the softwares
/// - a assignment should have a watcher list, it contains many watchers:[`ClauseTask`]
/// - each watcher have a blocker and a Clause task:[`ClauseTask`]
/// - a list created implicitly for a lone watcher operation has no metadata or list to read
#[derive(Debug, Default)]
pub struct WatcherTask {
    /// the watcher list meta data addr
    pub meta_data_addr: Option<u64>,
    /// the watcher list value
    pub watcher_addr: Option<u64>,
    /// the assign literal
    pub watcher_id: usize,
    /// the watchers to be processed
    pub single_watcher_tasks: VecDeque<ClauseTask>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClauseData {
    pub clause_id: usize,
    pub clause_addr: u64,
    pub clause_processing_time: usize,
    /// literal values the clause unit reads, a non empty list makes the clause write back
    pub clause_value_addr: Vec<u64>,
}

/// # ClauseTask
/// the single watcher that related to a clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClauseTask {
    pub watcher_id: usize,
    pub blocker_addr: u64,
    pub clause_data: Option<ClauseData>,
}

impl ClauseTask {
    pub fn get_watcher_pe_id(&self, total_watchers: usize) -> usize {
        self.watcher_id / 2 % total_watchers
    }
    /// the blocker is read through the private cache of the watcher
    pub fn get_blocker_req(
        &self,
        context: &mut SataccStatus,
        watcher_pe_id: usize,
    ) -> IcntMsgWrapper<MemReq> {
        IcntMsgWrapper {
            msg: MemReq {
                addr: self.blocker_addr,
                id: context.next_mem_id(),
                source_port: watcher_pe_id,
                mem_id: 0,
                is_write: false,
                req_type: MemReqType::WatcherReadBlocker,
            },
            mem_target_port: 0,
        }
    }
    pub fn have_to_read_clause(&self) -> bool {
        self.clause_data.is_some()
    }
    /// the clause unit of the whole accelerator serving this clause
    pub fn get_global_clause_pe_id(&self, total_clause_units: usize) -> Option<usize> {
        self.clause_data
            .as_ref()
            .map(|clause_data| clause_data.clause_id % total_clause_units)
    }
    /// the clause unit inside the serving watcher interface
    pub fn get_inner_clause_pe_id(&self, num_clause_per_watcher: usize) -> Option<usize> {
        self.clause_data
            .as_ref()
            .map(|clause_data| clause_data.clause_id % num_clause_per_watcher)
    }
}

impl ClauseData {
    pub fn get_clause_data_task(
        &self,
        context: &mut SataccStatus,
        layout: &MemLayout,
        watcher_pe_id: usize,
        clause_pe_id: usize,
    ) -> IcntMsgWrapper<MemReq> {
        layout.l3_req(
            context,
            self.clause_addr,
            watcher_pe_id,
            MemReqType::ClauseReadData(clause_pe_id),
            false,
        )
    }
    /// the value reads go to the private cache
    pub fn get_read_clause_value_task(
        &self,
        context: &mut SataccStatus,
        watcher_pe_id: usize,
        clause_pe_id: usize,
    ) -> Vec<IcntMsgWrapper<MemReq>> {
        self.clause_value_addr
            .iter()
            .map(|&addr| IcntMsgWrapper {
                msg: MemReq {
                    addr,
                    id: context.next_mem_id(),
                    source_port: watcher_pe_id,
                    mem_id: 0,
                    is_write: false,
                    req_type: MemReqType::ClauseReadValue(clause_pe_id),
                },
                mem_target_port: 0,
            })
            .collect()
    }
}

impl WatcherTask {
    pub fn get_watcher_pe_id(&self, total_watchers: usize) -> usize {
        (self.watcher_id / 2) % total_watchers
    }
    pub fn get_meta_data_task(
        &self,
        context: &mut SataccStatus,
        layout: &MemLayout,
        watcher_pe_id: usize,
    ) -> Option<IcntMsgWrapper<MemReq>> {
        self.meta_data_addr.map(|addr| {
            layout.l3_req(
                context,
                addr,
                watcher_pe_id,
                MemReqType::WatcherReadMetaData,
                false,
            )
        })
    }
    pub fn get_watcher_data_task(
        &self,
        context: &mut SataccStatus,
        layout: &MemLayout,
        watcher_pe_id: usize,
    ) -> Option<IcntMsgWrapper<MemReq>> {
        self.watcher_addr.map(|addr| {
            layout.l3_req(
                context,
                addr,
                watcher_pe_id,
                MemReqType::WatcherReadData,
                false,
            )
        })
    }
    pub fn into_sub_single_watcher_task(self) -> VecDeque<ClauseTask> {
        self.single_watcher_tasks
    }
}

impl SataccMinisatTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn is_round_open(&self) -> bool {
        self.round_open
    }

    pub fn rounds(&self) -> impl Iterator<Item = &SingleRoundTask> {
        self.decisions.iter()
    }

    fn open_round(&mut self) -> TaskResult<&mut SingleRoundTask> {
        if !self.round_open {
            return Err(TaskError::InvalidRoundState("no round is open"));
        }
        self.decisions
            .back_mut()
            .ok_or(TaskError::InvalidRoundState("no round is open"))
    }

    /// the watcher list new single watcher operations attach to
    fn current_watcher_list(&mut self, watcher_id: usize) -> TaskResult<&mut WatcherTask> {
        let round = self.open_round()?;
        if round.assignments.is_empty() {
            round.assignments.push_back(WatcherTask {
                meta_data_addr: None,
                watcher_addr: None,
                watcher_id,
                single_watcher_tasks: VecDeque::new(),
            });
        }
        round
            .assignments
            .back_mut()
            .ok_or(TaskError::InvalidRoundState("no round is open"))
    }

    pub fn start_new_round(&mut self) -> TaskResult<()> {
        if self.round_open {
            return Err(TaskError::InvalidRoundState(
                "the previous round is still open",
            ));
        }
        self.decisions.push_back(SingleRoundTask::default());
        self.round_open = true;
        self.live_clauses.clear();
        Ok(())
    }

    /// close the open round with its outcome
    pub fn end_round(&mut self, conflict: bool) -> TaskResult<()> {
        let round = self.open_round()?;
        round.outcome = Some(if conflict {
            RoundOutcome::Conflict
        } else {
            RoundOutcome::NoConflict
        });
        self.round_open = false;
        self.live_clauses.clear();
        Ok(())
    }

    pub fn add_watcher_task(
        &mut self,
        meta_data_addr: u64,
        watcher_addr: u64,
        watcher_id: usize,
    ) -> TaskResult<()> {
        self.open_round()?.assignments.push_back(WatcherTask {
            meta_data_addr: Some(meta_data_addr),
            watcher_addr: Some(watcher_addr),
            watcher_id,
            single_watcher_tasks: VecDeque::new(),
        });
        Ok(())
    }

    pub fn add_single_watcher_task_no_clause(
        &mut self,
        blocker_addr: u64,
        watcher_id: usize,
    ) -> TaskResult<()> {
        self.current_watcher_list(watcher_id)?
            .single_watcher_tasks
            .push_back(ClauseTask {
                blocker_addr,
                watcher_id,
                clause_data: None,
            });
        Ok(())
    }

    pub fn add_single_watcher_task(
        &mut self,
        blocker_addr: u64,
        clause_addr: u64,
        clause_id: usize,
        processing_time: usize,
        watcher_id: usize,
    ) -> TaskResult<()> {
        self.open_round()?;
        if self.live_clauses.contains(&clause_id) {
            return Err(TaskError::ClauseIdCollision { clause_id });
        }
        self.current_watcher_list(watcher_id)?
            .single_watcher_tasks
            .push_back(ClauseTask {
                blocker_addr,
                watcher_id,
                clause_data: Some(ClauseData {
                    clause_id,
                    clause_addr,
                    clause_processing_time: processing_time,
                    clause_value_addr: Vec::new(),
                }),
            });
        self.live_clauses.insert(clause_id);
        Ok(())
    }

    /// bind a literal value address to a clause of the open round
    pub fn add_single_watcher_clause_value_addr(
        &mut self,
        value_addr: u64,
        clause_id: usize,
    ) -> TaskResult<()> {
        self.open_round()?;
        if !self.live_clauses.contains(&clause_id) {
            return Err(TaskError::UnknownClause { clause_id });
        }
        let clause_data = self
            .open_round()?
            .assignments
            .iter_mut()
            .rev()
            .flat_map(|watcher_task| watcher_task.single_watcher_tasks.iter_mut().rev())
            .filter_map(|clause_task| clause_task.clause_data.as_mut())
            .find(|clause_data| clause_data.clause_id == clause_id)
            .ok_or(TaskError::UnknownClause { clause_id })?;
        clause_data.clause_value_addr.push(value_addr);
        Ok(())
    }

    /// execute the next round on `simulator`, the task stays usable
    pub fn run_one_round(&mut self, simulator: &mut Simulator) -> eyre::Result<Option<RoundReport>> {
        simulator.run_one_round(self)
    }

    /// execute every remaining round, the task is gone afterwards
    pub fn run_to_completion(self, simulator: &mut Simulator) -> eyre::Result<()> {
        simulator.run_full(self)
    }
}

impl RoundSource for SataccMinisatTask {
    fn next_round(&mut self) -> Option<SingleRoundTask> {
        let round = self.decisions.pop_front()?;
        if self.decisions.is_empty() && self.round_open {
            // the open round is submitted, nothing can be appended to it anymore
            self.round_open = false;
            self.live_clauses.clear();
        }
        Some(round)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_round_state() {
        let mut task = SataccMinisatTask::new();
        assert_eq!(
            task.add_watcher_task(0, 64, 1),
            Err(TaskError::InvalidRoundState("no round is open"))
        );
        assert!(task.end_round(false).is_err());
        task.start_new_round().unwrap();
        assert!(task.start_new_round().is_err());
        task.add_watcher_task(0, 64, 1).unwrap();
        task.end_round(true).unwrap();
        assert!(task.add_single_watcher_task_no_clause(0, 1).is_err());
        task.start_new_round().unwrap();
        assert_eq!(task.len(), 2);
        let outcomes: Vec<_> = task.rounds().map(|round| round.outcome).collect();
        assert_eq!(outcomes, vec![Some(RoundOutcome::Conflict), None]);
    }

    #[test]
    fn test_clause_id_collision() {
        let mut task = SataccMinisatTask::new();
        task.start_new_round().unwrap();
        task.add_watcher_task(0, 64, 4).unwrap();
        task.add_single_watcher_task(128, 256, 7, 3, 4).unwrap();
        assert_eq!(
            task.add_single_watcher_task(192, 512, 7, 3, 4),
            Err(TaskError::ClauseIdCollision { clause_id: 7 })
        );
        // the failed call left the round unchanged
        let stat = task.rounds().next().unwrap().get_statistics();
        assert_eq!(stat.total_watchers, 1);

        // a new round has a fresh live set
        task.end_round(false).unwrap();
        task.start_new_round().unwrap();
        task.add_single_watcher_task(192, 512, 7, 3, 4).unwrap();
    }

    #[test]
    fn test_clause_value_addr() {
        let mut task = SataccMinisatTask::new();
        task.start_new_round().unwrap();
        task.add_watcher_task(0, 64, 2).unwrap();
        task.add_single_watcher_task(128, 256, 1, 3, 2).unwrap();
        task.add_single_watcher_task(129, 320, 2, 3, 2).unwrap();
        task.add_single_watcher_clause_value_addr(1024, 1).unwrap();
        task.add_single_watcher_clause_value_addr(1088, 1).unwrap();
        assert_eq!(
            task.add_single_watcher_clause_value_addr(1024, 9),
            Err(TaskError::UnknownClause { clause_id: 9 })
        );
        let round = task.rounds().next().unwrap();
        let clauses = &round.assignments[0].single_watcher_tasks;
        let first = clauses[0].clause_data.as_ref().unwrap();
        assert_eq!(first.clause_value_addr, vec![1024, 1088]);
        assert!(clauses[1]
            .clause_data
            .as_ref()
            .unwrap()
            .clause_value_addr
            .is_empty());
    }

    #[test]
    fn test_implicit_watcher_list() {
        let mut task = SataccMinisatTask::new();
        task.start_new_round().unwrap();
        task.add_single_watcher_task_no_clause(64, 5).unwrap();
        task.add_single_watcher_task_no_clause(128, 5).unwrap();
        let round = task.rounds().next().unwrap();
        assert_eq!(round.assignments.len(), 1);
        let list = &round.assignments[0];
        assert_eq!(list.meta_data_addr, None);
        assert_eq!(list.watcher_addr, None);
        assert_eq!(list.single_watcher_tasks.len(), 2);
        assert_eq!(list.get_watcher_pe_id(2), 0);
    }

    #[test]
    fn test_next_round_submits_open_round() {
        let mut task = SataccMinisatTask::new();
        task.start_new_round().unwrap();
        task.add_watcher_task(0, 64, 1).unwrap();
        task.end_round(false).unwrap();
        task.start_new_round().unwrap();
        task.add_single_watcher_task(0, 64, 3, 1, 1).unwrap();

        let first = task.next_round().unwrap();
        assert_eq!(first.outcome, Some(RoundOutcome::NoConflict));
        // the second round is still open
        assert!(task.is_round_open());
        task.add_single_watcher_task_no_clause(0, 1).unwrap();

        let second = task.next_round().unwrap();
        assert_eq!(second.get_statistics().total_watchers, 2);
        assert!(!task.is_round_open());
        assert!(task.add_single_watcher_task_no_clause(0, 1).is_err());
        assert!(task.next_round().is_none());
        task.start_new_round().unwrap();
    }

    #[test]
    fn test_sort_by_watcher() {
        let mut round = SingleRoundTask::default();
        for (watcher_id, addr) in [(3, 0), (1, 1), (3, 2), (0, 3)] {
            round.assignments.push_back(WatcherTask {
                meta_data_addr: Some(addr),
                watcher_addr: None,
                watcher_id,
                single_watcher_tasks: VecDeque::new(),
            });
        }
        round.sort_by_watcher();
        let order: Vec<_> = round
            .assignments
            .iter()
            .map(|task| (task.watcher_id, task.meta_data_addr))
            .collect();
        assert_eq!(
            order,
            vec![(0, Some(3)), (1, Some(1)), (3, Some(0)), (3, Some(2))]
        );
    }
}
