//! Preset-driven DRAM timing model.
//!
//! Each channel tracks the open row of every bank and services at most
//! `multi_port` requests at once; the rest wait in a bounded queue. Latency
//! of a request depends on the row-buffer state of its bank:
//!
//! | bank state     | cost                          |
//! |----------------|-------------------------------|
//! | row hit        | `t_cas + t_burst`             |
//! | no open row    | `t_rcd + t_cas + t_burst`     |
//! | row conflict   | `t_rp + t_rcd + t_cas + t_burst` |
//!
//! A write keeps its bank busy for another `t_wr` cycles.
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{statistics::DramStatistics, waiting_task::WaitingTask};

/// the device family of a dram preset
#[repr(C)]
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum DramType {
    DDR,
    LPDDR,
    GDDR,
    HBM,
    WideIO,
    /// non-volatile memories
    NVM,
}

/// named timing profiles of real memory devices
#[repr(C)]
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum DramPreset {
    ALDRAM,
    DDR3,
    DDR4,
    DSARP,
    GDDR5,
    HBM,
    LPDDR3,
    LPDDR4,
    PCM,
    SALP,
    STTMRAM,
    TLDRAM,
    WideIO,
    WideIO2,
}

/// timing constants in accelerator cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DramTiming {
    pub t_cas: usize,
    pub t_rcd: usize,
    pub t_rp: usize,
    pub t_burst: usize,
    pub t_wr: usize,
    pub banks: usize,
    pub row_bytes: u64,
}

impl DramPreset {
    pub fn family(self) -> DramType {
        match self {
            DramPreset::DDR3
            | DramPreset::DDR4
            | DramPreset::ALDRAM
            | DramPreset::SALP
            | DramPreset::DSARP
            | DramPreset::TLDRAM => DramType::DDR,
            DramPreset::LPDDR3 | DramPreset::LPDDR4 => DramType::LPDDR,
            DramPreset::GDDR5 => DramType::GDDR,
            DramPreset::HBM => DramType::HBM,
            DramPreset::WideIO | DramPreset::WideIO2 => DramType::WideIO,
            DramPreset::PCM | DramPreset::STTMRAM => DramType::NVM,
        }
    }

    pub fn timing(self) -> DramTiming {
        let (t_cas, t_rcd, t_rp, t_burst, t_wr, banks, row_bytes) = match self {
            DramPreset::DDR3 => (11, 11, 11, 4, 12, 8, 8192),
            // DDR3 with timings tuned to the actual operating temperature
            DramPreset::ALDRAM => (9, 8, 8, 4, 10, 8, 8192),
            // DDR3 with subarrays exposed as independent banks
            DramPreset::SALP => (11, 11, 11, 4, 12, 64, 8192),
            DramPreset::DSARP => (11, 11, 11, 4, 12, 16, 8192),
            // DDR3 near segment of a tiered bitline
            DramPreset::TLDRAM => (8, 7, 8, 4, 12, 8, 8192),
            DramPreset::DDR4 => (16, 16, 16, 4, 18, 16, 8192),
            DramPreset::LPDDR3 => (12, 15, 15, 4, 15, 8, 4096),
            DramPreset::LPDDR4 => (20, 18, 18, 8, 18, 8, 4096),
            DramPreset::GDDR5 => (18, 18, 18, 2, 18, 16, 2048),
            DramPreset::HBM => (7, 7, 7, 2, 8, 16, 2048),
            DramPreset::WideIO => (6, 6, 6, 4, 6, 4, 4096),
            DramPreset::WideIO2 => (8, 10, 10, 4, 10, 8, 4096),
            DramPreset::PCM => (12, 60, 4, 4, 150, 8, 1024),
            DramPreset::STTMRAM => (11, 20, 5, 4, 10, 8, 4096),
        };
        DramTiming {
            t_cas,
            t_rcd,
            t_rp,
            t_burst,
            t_wr,
            banks,
            row_bytes,
        }
    }
}

const LINE_BITS: u64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowState {
    Hit,
    Closed,
    Conflict,
}

#[derive(Debug, Clone, Default)]
struct Bank {
    open_row: Option<u64>,
    ready_cycle: usize,
}

#[derive(Debug)]
struct DramReq {
    addr: u64,
    is_write: bool,
}

#[derive(Debug)]
struct DramChannel {
    banks: Vec<Bank>,
    queue: VecDeque<DramReq>,
    in_service: WaitingTask<u64>,
}

/// The dram behind the shared cache.
///
/// The interface follows the usual memory-simulator loop: check
/// [`DramModel::available`], [`DramModel::send`], then [`DramModel::tick`]
/// once per cycle and drain finished addresses with [`DramModel::pop`].
#[derive(Debug)]
pub struct DramModel {
    timing: DramTiming,
    channels: Vec<DramChannel>,
    /// lines are interleaved over this many models before reaching this one
    interleave: u64,
    multi_port: usize,
    queue_size: usize,
    finished: VecDeque<u64>,
}

impl DramModel {
    pub fn new(
        preset: DramPreset,
        n_channels: usize,
        interleave: usize,
        multi_port: usize,
        queue_size: usize,
    ) -> Self {
        let timing = preset.timing();
        let channels = (0..n_channels)
            .map(|_| DramChannel {
                banks: vec![Bank::default(); timing.banks],
                queue: VecDeque::with_capacity(queue_size),
                in_service: WaitingTask::new(),
            })
            .collect();
        DramModel {
            timing,
            channels,
            interleave: interleave.max(1) as u64,
            multi_port,
            queue_size,
            finished: VecDeque::new(),
        }
    }

    /// split the address into (channel, bank, row)
    fn map_addr(&self, addr: u64) -> (usize, usize, u64) {
        let line = (addr >> LINE_BITS) / self.interleave;
        let n_channels = self.channels.len() as u64;
        let channel = (line % n_channels) as usize;
        let rest = line / n_channels;
        let bank = (rest % self.timing.banks as u64) as usize;
        let lines_per_row = (self.timing.row_bytes >> LINE_BITS).max(1);
        let row = rest / self.timing.banks as u64 / lines_per_row;
        (channel, bank, row)
    }

    pub fn available(&self, addr: u64) -> bool {
        let (channel, _, _) = self.map_addr(addr);
        self.channels[channel].queue.len() < self.queue_size
    }

    /// queue a request, give it back if the channel queue is full
    pub fn send(&mut self, addr: u64, is_write: bool) -> Result<(), u64> {
        if !self.available(addr) {
            return Err(addr);
        }
        let (channel, _, _) = self.map_addr(addr);
        self.channels[channel]
            .queue
            .push_back(DramReq { addr, is_write });
        Ok(())
    }

    /// start queued requests on free ports and collect the finished ones
    pub fn tick(&mut self, current_cycle: usize, stat: &mut DramStatistics) {
        for channel_id in 0..self.channels.len() {
            while self.channels[channel_id].in_service.len() < self.multi_port {
                let Some(req) = self.channels[channel_id].queue.pop_front() else {
                    break;
                };
                let (_, bank_id, row) = self.map_addr(req.addr);
                let timing = self.timing;
                let bank = &mut self.channels[channel_id].banks[bank_id];
                let state = match bank.open_row {
                    Some(open_row) if open_row == row => RowState::Hit,
                    Some(_) => RowState::Conflict,
                    None => RowState::Closed,
                };
                let access = match state {
                    RowState::Hit => timing.t_cas,
                    RowState::Closed => timing.t_rcd + timing.t_cas,
                    RowState::Conflict => timing.t_rp + timing.t_rcd + timing.t_cas,
                } + timing.t_burst;
                let start = bank.ready_cycle.max(current_cycle);
                let done = start + access;
                bank.open_row = Some(row);
                bank.ready_cycle = if req.is_write { done + timing.t_wr } else { done };

                stat.total_requests += 1;
                if req.is_write {
                    stat.writes += 1;
                } else {
                    stat.reads += 1;
                }
                match state {
                    RowState::Hit => stat.row_hits += 1,
                    RowState::Closed => stat.row_misses += 1,
                    RowState::Conflict => stat.row_conflicts += 1,
                }
                stat.total_dram_cycles += done - current_cycle;
                tracing::debug!(
                    addr = req.addr,
                    channel_id,
                    bank_id,
                    ?state,
                    done,
                    "dram request started"
                );
                self.channels[channel_id].in_service.push(req.addr, done);
            }
            while let Some((_, addr)) = self.channels[channel_id].in_service.pop_ready(current_cycle)
            {
                self.finished.push_back(addr);
            }
        }
    }

    pub fn ret_available(&self) -> bool {
        !self.finished.is_empty()
    }

    pub fn pop(&mut self) -> Option<u64> {
        self.finished.pop_front()
    }

    pub fn is_busy(&self) -> bool {
        !self.finished.is_empty()
            || self
                .channels
                .iter()
                .any(|channel| !channel.queue.is_empty() || !channel.in_service.is_empty())
    }
}
