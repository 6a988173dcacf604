use assert_cmd::Command;
use gridplan_core::{synthetic, Case, Config};
use gridplan_ts::TimeSeries;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn example_grid(dir: &Path) {
    gridplan_io::export_topology(&synthetic::example_topology(), dir).unwrap();
}

fn gridplan() -> Command {
    let mut cmd = Command::cargo_bin("gridplan").unwrap();
    cmd.args(["--log-level", "warn", "--threads", "1"]);
    cmd
}

#[test]
fn check_reports_a_clean_grid() {
    let grid = tempdir().unwrap();
    example_grid(grid.path());
    gridplan()
        .args(["check", grid.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Diagnostics:"));
}

#[test]
fn check_fails_on_a_missing_grid() {
    let dir = tempdir().unwrap();
    gridplan()
        .args(["check", dir.path().join("nothing").to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading grid"));
}

#[test]
fn graph_stats_runs() {
    let grid = tempdir().unwrap();
    example_grid(grid.path());
    gridplan()
        .args(["graph", "stats", grid.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Components    : 1"))
        .stdout(predicate::str::contains("LV grids      : 3"));
}

#[test]
fn analyze_worst_cases_and_write_results() {
    let grid = tempdir().unwrap();
    example_grid(grid.path());
    let out = tempdir().unwrap();
    gridplan()
        .args([
            "analyze",
            grid.path().to_str().unwrap(),
            "-o",
            out.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"timesteps\": 4"))
        .stdout(predicate::str::contains("\"mode\": \"full\""));
    assert!(out.path().join("summary.json").exists());
}

#[test]
fn analyze_rejects_unknown_mode() {
    let grid = tempdir().unwrap();
    example_grid(grid.path());
    gridplan()
        .args(["analyze", grid.path().to_str().unwrap(), "--mode", "hv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid analysis mode"));
}

#[test]
fn reinforce_saves_the_reinforced_grid() {
    let grid = tempdir().unwrap();
    let mut topology = synthetic::example_topology();
    topology
        .loads
        .get_mut("Conventional_Load_LVGrid_1_residential_3")
        .unwrap()
        .p_set = 0.4;
    gridplan_io::export_topology(&topology, grid.path()).unwrap();
    let out = tempdir().unwrap();

    gridplan()
        .args([
            "reinforce",
            grid.path().to_str().unwrap(),
            "--out",
            out.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"unresolved_issues\": 0"));
    assert!(out.path().join("study.json").exists());
    let lines = fs::read_to_string(out.path().join("topology/lines.csv")).unwrap();
    assert!(lines.contains("Line_LVGrid_1_building_3"));
}

#[test]
fn ts_resample_to_quarter_hours() {
    let input = tempdir().unwrap();
    let topology = synthetic::example_topology();
    let mut ts = TimeSeries::new();
    ts.set_worst_case(&topology, &Config::default(), &[Case::LoadCase])
        .unwrap();
    ts.to_csv(input.path()).unwrap();
    let out = tempdir().unwrap();

    gridplan()
        .args([
            "ts",
            "resample",
            input.path().to_str().unwrap(),
            "--freq",
            "15min",
            "-o",
            out.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Resampled 2 to 8 time steps"));
    let resampled = TimeSeries::from_csv(out.path()).unwrap();
    assert_eq!(resampled.timeindex.len(), 8);
}

#[test]
fn emob_integrate_writes_a_study() {
    let grid = tempdir().unwrap();
    example_grid(grid.path());
    let simbev = tempdir().unwrap();
    let tracbev = tempdir().unwrap();
    fs::write(
        simbev.path().join("metadata_simbev_run.json"),
        r#"{"config": {"basic": {"start_date": "2011-01-01", "end_date": "2011-01-01", "stepsize": 15, "eta_cp": 0.9}}}"#,
    )
    .unwrap();
    fs::create_dir_all(simbev.path().join("region")).unwrap();
    fs::write(
        simbev.path().join("region/car_1.csv"),
        "location,use_case,netto_charging_capacity,chargingdemand,park_start,park_end\n\
         0_home,home,11.0,22.0,0,31\n",
    )
    .unwrap();
    fs::write(
        tracbev.path().join("home.csv"),
        "x,y,user_centric_weight\n10.01,52.0005,1.0\n",
    )
    .unwrap();
    let out = tempdir().unwrap();

    gridplan()
        .args([
            "emob",
            "integrate",
            grid.path().to_str().unwrap(),
            "--simbev",
            simbev.path().to_str().unwrap(),
            "--tracbev",
            tracbev.path().to_str().unwrap(),
            "--strategy",
            "reduced",
            "-o",
            out.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Integrated 1 charging parks (reduced strategy)"));
    assert!(out.path().join("electromobility").is_dir());
    assert!(out.path().join("timeseries").is_dir());
}
