//! C entry points for embedding the simulator into the solver.
//!
//! Every object crosses the boundary as an opaque `Box` pointer. Calls that
//! take ownership release the pointer they are given, the caller must not
//! touch it again. Null pointers are refused with an error log.
use std::{ffi::CStr, ptr::null_mut};

use libc::c_char;

use crate::{
    config::Config,
    init_tracing,
    satacc::{SataccMinisatTask, Simulator},
    satstat::SatStat,
};

const STATISTICS_FILE: &str = "statistics.json";
const SATSTAT_FILE: &str = "satstat.json";
const CYCLE_FILE: &str = "cycle.json";

macro_rules! deref_or_return {
    ($ptr:expr, $ret:expr) => {
        match $ptr.as_mut() {
            Some(value) => value,
            None => {
                tracing::error!("{} is null", stringify!($ptr));
                return $ret;
            }
        }
    };
}

fn path_from_c(path: *const c_char) -> Option<String> {
    if path.is_null() {
        tracing::error!("path is null");
        return None;
    }
    // SAFETY: the caller passes a nul terminated string
    match unsafe { CStr::from_ptr(path) }.to_str() {
        Ok(path) => Some(path.to_string()),
        Err(e) => {
            tracing::error!("path is not utf-8: {e}");
            None
        }
    }
}

fn log_task_error<E: std::fmt::Display>(result: Result<(), E>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("{e}");
            false
        }
    }
}

// config

/// load and validate a toml config, null when it fails
#[no_mangle]
pub unsafe extern "C" fn config_from_file(path: *const c_char) -> *mut Config {
    init_tracing();
    let Some(path) = path_from_c(path) else {
        return null_mut();
    };
    match Config::from_config_file(&path) {
        Ok(config) => Box::into_raw(Box::new(config)),
        Err(e) => {
            tracing::error!("{e:?}");
            null_mut()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn release_config(config: *mut Config) {
    if !config.is_null() {
        drop(Box::from_raw(config));
    }
}

#[no_mangle]
pub unsafe extern "C" fn show_config(config: *const Config) {
    match config.as_ref() {
        Some(config) => config.show_config(),
        None => tracing::error!("config is null"),
    }
}

// task

/// an empty task, freed by `release_task`, `run_full_task` or `run_full_expr`
#[no_mangle]
pub extern "C" fn create_empty_task() -> *mut SataccMinisatTask {
    Box::into_raw(Box::new(SataccMinisatTask::new()))
}

#[no_mangle]
pub unsafe extern "C" fn release_task(task: *mut SataccMinisatTask) {
    if !task.is_null() {
        drop(Box::from_raw(task));
    }
}

#[no_mangle]
pub unsafe extern "C" fn start_new_assign(task: *mut SataccMinisatTask) -> bool {
    let task = deref_or_return!(task, false);
    log_task_error(task.start_new_round())
}

#[no_mangle]
pub unsafe extern "C" fn end_assign(task: *mut SataccMinisatTask, conflict: bool) -> bool {
    let task = deref_or_return!(task, false);
    log_task_error(task.end_round(conflict))
}

#[no_mangle]
pub unsafe extern "C" fn add_watcher_task(
    task: *mut SataccMinisatTask,
    meta_data_addr: u64,
    watcher_addr: u64,
    watcher_id: usize,
) -> bool {
    let task = deref_or_return!(task, false);
    log_task_error(task.add_watcher_task(meta_data_addr, watcher_addr, watcher_id))
}

#[no_mangle]
pub unsafe extern "C" fn add_single_watcher_task_no_clause(
    task: *mut SataccMinisatTask,
    blocker_addr: u64,
    watcher_id: usize,
) -> bool {
    let task = deref_or_return!(task, false);
    log_task_error(task.add_single_watcher_task_no_clause(blocker_addr, watcher_id))
}

#[no_mangle]
pub unsafe extern "C" fn add_single_watcher_task(
    task: *mut SataccMinisatTask,
    blocker_addr: u64,
    clause_addr: u64,
    clause_id: usize,
    processing_time: usize,
    watcher_id: usize,
) -> bool {
    let task = deref_or_return!(task, false);
    log_task_error(task.add_single_watcher_task(
        blocker_addr,
        clause_addr,
        clause_id,
        processing_time,
        watcher_id,
    ))
}

#[no_mangle]
pub unsafe extern "C" fn add_single_watcher_clause_value_addr(
    task: *mut SataccMinisatTask,
    value_addr: u64,
    clause_id: usize,
) -> bool {
    let task = deref_or_return!(task, false);
    log_task_error(task.add_single_watcher_clause_value_addr(value_addr, clause_id))
}

// simulator

/// build a simulator from a config, the config stays owned by the caller
#[no_mangle]
pub unsafe extern "C" fn get_simulator(config: *const Config) -> *mut Simulator {
    init_tracing();
    let Some(config) = config.as_ref() else {
        tracing::error!("config is null");
        return null_mut();
    };
    match Simulator::new(config.clone()) {
        Ok(simulator) => Box::into_raw(Box::new(simulator)),
        Err(e) => {
            tracing::error!("{e:?}");
            null_mut()
        }
    }
}

/// run the next round of `task`, both pointers stay valid
#[no_mangle]
pub unsafe extern "C" fn run_single_task(
    task: *mut SataccMinisatTask,
    sim: *mut Simulator,
) -> bool {
    let task = deref_or_return!(task, false);
    let sim = deref_or_return!(sim, false);
    match sim.run_one_round(task) {
        Ok(Some(_)) => true,
        Ok(None) => {
            tracing::warn!("the task has no round left");
            false
        }
        Err(e) => {
            tracing::error!("{e:?}");
            false
        }
    }
}

/// run every remaining round, the task is released
#[no_mangle]
pub unsafe extern "C" fn run_full_task(task: *mut SataccMinisatTask, sim: *mut Simulator) -> bool {
    if task.is_null() {
        tracing::error!("task is null");
        return false;
    }
    let task = Box::from_raw(task);
    let sim = deref_or_return!(sim, false);
    match task.run_to_completion(sim) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("{e:?}");
            false
        }
    }
}

/// drain the simulator and save its statistics in the working directory, the simulator is released
#[no_mangle]
pub unsafe extern "C" fn finish_simulator(sim: *mut Simulator) -> bool {
    if sim.is_null() {
        tracing::error!("sim is null");
        return false;
    }
    let sim = Box::from_raw(sim);
    let result = sim
        .finish()
        .and_then(|finished| finished.save(STATISTICS_FILE, SATSTAT_FILE, CYCLE_FILE));
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("{e:?}");
            false
        }
    }
}

/// run the whole task on a fresh simulator and save the statistics, the task is released
#[no_mangle]
pub unsafe extern "C" fn run_full_expr(config: *const Config, task: *mut SataccMinisatTask) -> bool {
    init_tracing();
    if task.is_null() {
        tracing::error!("task is null");
        return false;
    }
    let task = Box::from_raw(task);
    let Some(config) = config.as_ref() else {
        tracing::error!("config is null");
        return false;
    };
    let result = crate::satacc::run_full_expr(config.clone(), *task)
        .and_then(|finished| finished.save(STATISTICS_FILE, SATSTAT_FILE, CYCLE_FILE));
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("{e:?}");
            false
        }
    }
}

// satstat

#[no_mangle]
pub extern "C" fn new_satstat_pointer() -> *mut SatStat {
    init_tracing();
    Box::into_raw(Box::new(SatStat::default()))
}

#[no_mangle]
pub unsafe extern "C" fn delete_satstat_pointer(satstat: *mut SatStat) {
    if !satstat.is_null() {
        drop(Box::from_raw(satstat));
    }
}

/// called every time a watcher list is propagated
#[no_mangle]
pub unsafe extern "C" fn satstat_add_watcher(
    satstat: *mut SatStat,
    num_clause_total: usize,
    num_clause_read: usize,
) {
    let satstat = deref_or_return!(satstat, ());
    satstat.record_watcher_added(num_clause_total, num_clause_read);
}

#[no_mangle]
pub unsafe extern "C" fn end_decision(satstat: *mut SatStat, conflict: bool) {
    let satstat = deref_or_return!(satstat, ());
    satstat.record_decision(conflict);
}

#[no_mangle]
pub unsafe extern "C" fn show_data(satstat: *const SatStat) {
    match satstat.as_ref() {
        Some(satstat) => satstat.show_data(),
        None => tracing::error!("satstat is null"),
    }
}

#[no_mangle]
pub unsafe extern "C" fn save_data(satstat: *const SatStat, path: *const c_char) -> bool {
    let Some(satstat) = satstat.as_ref() else {
        tracing::error!("satstat is null");
        return false;
    };
    let Some(path) = path_from_c(path) else {
        return false;
    };
    match satstat.save_data(&path) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("{e:?}");
            false
        }
    }
}
