//! Analyze a grid read from disk and export the results.

use gridplan_algo::{analyze, AnalyzeOptions};
use gridplan_core::{synthetic, Case, Config};
use gridplan_io::{export_topology, import_topology, ResultsExport, ResultsSummary};
use gridplan_ts::TimeSeries;
use tempfile::tempdir;

#[test]
fn analyze_imported_grid() {
    let dir = tempdir().unwrap();
    export_topology(&synthetic::example_topology(), &dir.path().join("grid")).unwrap();

    let imported = import_topology(&dir.path().join("grid"), &Default::default()).unwrap();
    assert_eq!(imported.stats.transformers, 4);
    let topology = imported.topology;

    let config = Config::default();
    let mut ts = TimeSeries::new();
    ts.set_worst_case(&topology, &config, &[Case::LoadCase, Case::FeedInCase])
        .unwrap();
    let results = analyze(&topology, &ts, &config, &AnalyzeOptions::default()).unwrap();

    let summary = ResultsSummary::from_results(&results);
    assert_eq!(summary.timesteps, 4);
    assert_eq!(summary.mode.as_deref(), Some("full"));
    let min = summary.min_voltage.unwrap();
    assert!(min.v_pu < 1.0 && min.v_pu > 0.9);

    results.to_csv(&dir.path().join("results")).unwrap();
    results.to_json(&dir.path().join("results/summary.json")).unwrap();
    assert!(dir.path().join("results/summary.json").exists());
    assert!(dir.path().join("results/powerflow_results/voltages_pu.csv").exists());
}
