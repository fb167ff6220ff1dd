//! Solver-side statistics: how many watchers and clauses each decision and
//! each conflict touched, independent of the hardware timing.
use std::{collections::BTreeMap, fmt, fs::File, path::Path};

use eyre::Context;
use ndarray::array;
use ndarray_stats::histogram::{Bins, Edges, Grid, Histogram};
use serde::Serialize;

fn default_grid() -> Grid<usize> {
    let edges = Edges::from(vec![
        0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 200, 300, 400, 500, 600, 700, 800, 900, 1000,
        2000, 3000, 4000, 5000, 6000, 7000, 8000, 9000, 10000, 20000, 30000, 40000, 50000, 60000,
        70000, 80000, 90000, 100000, 200000, 300000, 400000, 500000, 600000, 700000, 800000,
        900000, 1000000, 2000000, 3000000, 4000000, 5000000, 6000000, 7000000, 8000000, 9000000,
        10000000, 20000000, 30000000, 40000000, 50000000, 60000000, 70000000, 80000000, 90000000,
        100000000, 200000000, 300000000, 400000000, 500000000, 600000000, 700000000, 800000000,
        900000000, 1000000000,
    ]);
    Grid::from(vec![Bins::new(edges)])
}

struct NamedHistogram {
    name: &'static str,
    histogram: Histogram<usize>,
}

impl fmt::Debug for NamedHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedHistogram")
            .field("name", &self.name)
            .field("counts", &self.histogram.counts())
            .finish()
    }
}

impl NamedHistogram {
    fn new(name: &'static str, grid: &Grid<usize>) -> Self {
        NamedHistogram {
            name,
            histogram: Histogram::new(grid.clone()),
        }
    }

    fn observe(&mut self, value: usize) {
        if let Err(e) = self.histogram.add_observation(&array![value]) {
            tracing::warn!("{}: cannot record {value}: {e}", self.name);
        }
    }

    fn data(&self) -> HistogramData {
        let bins = &self.histogram.grid().projections()[0];
        HistogramData {
            bins: (0..bins.len()).map(|i| bins.index(i).start).collect(),
            counts: self.histogram.counts().iter().copied().collect(),
        }
    }
}

/// the sat runtime statistics
#[derive(Debug)]
pub struct SatStat {
    current_decision_cf: usize,
    current_watchers_cf: usize,
    current_clauses_cf: usize,
    current_clause_with_data_cf: usize,

    current_watcher_dc: usize,
    current_clause_dc: usize,
    current_clause_with_data_dc: usize,

    clauses_per_watcher: NamedHistogram,
    clause_read_per_watcher: NamedHistogram,
    watchers_per_decision: NamedHistogram,
    clause_read_per_decision: NamedHistogram,
    clauses_per_decision: NamedHistogram,
    decisions_per_conflict: NamedHistogram,
    watchers_per_conflict: NamedHistogram,
    clauses_per_conflict: NamedHistogram,
    clauses_per_conflict_with_data: NamedHistogram,

    total_conflicts: usize,
    total_no_conflicts: usize,
    total_decisions: usize,
    total_clauses: usize,
    total_watchers: usize,
    total_clauses_with_data: usize,
}

impl Default for SatStat {
    fn default() -> Self {
        let grid = default_grid();
        Self {
            current_decision_cf: 0,
            current_watchers_cf: 0,
            current_clauses_cf: 0,
            current_clause_with_data_cf: 0,
            current_watcher_dc: 0,
            current_clause_dc: 0,
            current_clause_with_data_dc: 0,
            clauses_per_watcher: NamedHistogram::new("clauses_per_watcher", &grid),
            clause_read_per_watcher: NamedHistogram::new("clause_read_per_watcher", &grid),
            watchers_per_decision: NamedHistogram::new("watchers_per_decision", &grid),
            clause_read_per_decision: NamedHistogram::new("clause_read_per_decision", &grid),
            clauses_per_decision: NamedHistogram::new("clauses_per_decision", &grid),
            decisions_per_conflict: NamedHistogram::new("decisions_per_conflict", &grid),
            watchers_per_conflict: NamedHistogram::new("watchers_per_conflict", &grid),
            clauses_per_conflict: NamedHistogram::new("clauses_per_conflict", &grid),
            clauses_per_conflict_with_data: NamedHistogram::new(
                "clauses_per_conflict_with_data",
                &grid,
            ),
            total_conflicts: 0,
            total_no_conflicts: 0,
            total_decisions: 0,
            total_clauses: 0,
            total_watchers: 0,
            total_clauses_with_data: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistogramData {
    /// lower edge of each bin
    pub bins: Vec<usize>,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalResult {
    pub total_conflicts: usize,
    pub total_no_conflicts: usize,
    pub total_decisions: usize,
    pub total_clauses: usize,
    pub total_watchers: usize,
    pub total_clauses_with_data: usize,
    pub histograms: BTreeMap<String, HistogramData>,
}

impl SatStat {
    pub fn new() -> Self {
        Self::default()
    }

    fn histograms(&self) -> [&NamedHistogram; 9] {
        [
            &self.clauses_per_watcher,
            &self.clause_read_per_watcher,
            &self.watchers_per_decision,
            &self.clause_read_per_decision,
            &self.clauses_per_decision,
            &self.decisions_per_conflict,
            &self.watchers_per_conflict,
            &self.clauses_per_conflict,
            &self.clauses_per_conflict_with_data,
        ]
    }

    /// called once per propagated watcher list
    pub fn record_watcher_added(&mut self, num_clause_total: usize, num_clause_read: usize) {
        self.current_clause_dc += num_clause_total;
        self.current_clause_with_data_dc += num_clause_read;
        self.current_watcher_dc += 1;

        self.current_watchers_cf += 1;
        self.current_clauses_cf += num_clause_total;
        self.current_clause_with_data_cf += num_clause_read;

        self.total_clauses += num_clause_total;
        self.total_clauses_with_data += num_clause_read;
        self.total_watchers += 1;

        self.clauses_per_watcher.observe(num_clause_total);
        self.clause_read_per_watcher.observe(num_clause_read);
    }

    /// close the current decision, a conflict also closes the conflict window
    pub fn record_decision(&mut self, conflict: bool) {
        self.total_decisions += 1;
        self.current_decision_cf += 1;

        self.watchers_per_decision.observe(self.current_watcher_dc);
        self.clause_read_per_decision
            .observe(self.current_clause_with_data_dc);
        self.clauses_per_decision.observe(self.current_clause_dc);
        self.current_watcher_dc = 0;
        self.current_clause_with_data_dc = 0;
        self.current_clause_dc = 0;

        if conflict {
            self.total_conflicts += 1;
            self.decisions_per_conflict.observe(self.current_decision_cf);
            self.watchers_per_conflict.observe(self.current_watchers_cf);
            self.clauses_per_conflict.observe(self.current_clauses_cf);
            self.clauses_per_conflict_with_data
                .observe(self.current_clause_with_data_cf);
            self.current_decision_cf = 0;
            self.current_watchers_cf = 0;
            self.current_clauses_cf = 0;
            self.current_clause_with_data_cf = 0;
        } else {
            self.total_no_conflicts += 1;
        }
    }

    pub fn result(&self) -> FinalResult {
        FinalResult {
            total_conflicts: self.total_conflicts,
            total_no_conflicts: self.total_no_conflicts,
            total_decisions: self.total_decisions,
            total_clauses: self.total_clauses,
            total_watchers: self.total_watchers,
            total_clauses_with_data: self.total_clauses_with_data,
            histograms: self
                .histograms()
                .iter()
                .map(|histogram| (histogram.name.to_string(), histogram.data()))
                .collect(),
        }
    }

    pub fn show_data(&self) {
        tracing::info!("total_conflicts: {}", self.total_conflicts);
        tracing::info!("total_no_conflicts: {}", self.total_no_conflicts);
        tracing::info!("total_decisions: {}", self.total_decisions);
        tracing::info!("total_clauses: {}", self.total_clauses);
        tracing::info!("total_watchers: {}", self.total_watchers);
        tracing::info!("total_clauses_with_data: {}", self.total_clauses_with_data);
        for histogram in self.histograms() {
            let counts = histogram.histogram.counts();
            tracing::info!(name = histogram.name, ?counts);
        }
    }

    pub fn save_data(&self, path: impl AsRef<Path>) -> eyre::Result<()> {
        let path = path.as_ref();
        let file =
            File::create(path).wrap_err_with(|| format!("cannot create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &self.result())
            .wrap_err_with(|| format!("cannot write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::fs::File;

    use super::*;
    use crate::test_utils::init;

    #[test]
    fn test_windows() {
        init();
        let mut satstat = SatStat::default();
        satstat.record_watcher_added(10, 4);
        satstat.record_watcher_added(20, 3);
        satstat.record_decision(false);
        satstat.record_watcher_added(20, 3);
        satstat.record_watcher_added(20, 3);
        satstat.record_decision(true);
        satstat.show_data();

        let result = satstat.result();
        assert_eq!(result.total_decisions, 2);
        assert_eq!(result.total_conflicts, 1);
        assert_eq!(result.total_no_conflicts, 1);
        assert_eq!(result.total_watchers, 4);
        assert_eq!(result.total_clauses, 70);
        assert_eq!(result.total_clauses_with_data, 13);
        assert_eq!(result.histograms.len(), 9);

        // one conflict closed a window of 2 decisions and 70 clauses
        let per_conflict = &result.histograms["decisions_per_conflict"];
        assert_eq!(per_conflict.bins[0], 0);
        assert_eq!(per_conflict.counts[0], 1);
        let clauses = &result.histograms["clauses_per_conflict"];
        assert_eq!(clauses.bins[7], 70);
        assert_eq!(clauses.counts[7], 1);
        assert_eq!(clauses.counts.iter().sum::<usize>(), 1);
        let per_watcher = &result.histograms["clauses_per_watcher"];
        assert_eq!(per_watcher.counts[1], 1);
        assert_eq!(per_watcher.counts[2], 3);
    }

    #[test]
    fn test_out_of_range_is_dropped() {
        init();
        let mut satstat = SatStat::default();
        satstat.record_watcher_added(2_000_000_000, 0);
        let result = satstat.result();
        assert_eq!(result.total_clauses, 2_000_000_000);
        let debug = format!("{satstat:?}");
        assert!(debug.contains("clauses_per_watcher"));
        let per_watcher = &result.histograms["clauses_per_watcher"];
        assert_eq!(per_watcher.counts.iter().sum::<usize>(), 0);
    }

    #[test]
    fn test_save_data() {
        let mut satstat = SatStat::new();
        satstat.record_watcher_added(3, 1);
        satstat.record_decision(true);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("satstat.json");
        satstat.save_data(&path).unwrap();
        let value: serde_json::Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(value["total_conflicts"], 1);
        assert_eq!(value["histograms"]["clauses_per_watcher"]["counts"][0], 1);
        assert!(satstat.save_data(dir.path().join("no/such/dir.json")).is_err());
    }
}
