//! A year-in-a-day study: grid from CSV, predefined profiles, charging parks,
//! analysis and saving.

use chrono::Duration;
use gridplan::{
    AnalyzeOptions, ChargingStrategy, Config, DistributionMode, EmobImportOptions, GridStudy,
    Part, PredefinedProfiles, TimeSeriesFrame,
};
use gridplan_core::{components::LoadKind, synthetic};
use gridplan_ts::{date_range, parse_timestamp};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const HEADER: &str = "location,use_case,netto_charging_capacity,chargingdemand,park_start,park_end\n";

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn mobility_data(simbev: &Path, tracbev: &Path) {
    write(
        &simbev.join("metadata_simbev_run.json"),
        r#"{"config": {"basic": {"start_date": "2011-01-01", "end_date": "2011-01-01", "stepsize": 15, "eta_cp": 0.9}}}"#,
    );
    write(
        &simbev.join("region/car_1.csv"),
        &format!("{HEADER}0_home,home,11.0,22.0,0,31\n6_retail,public,22.0,11.0,40,43\n"),
    );
    write(&simbev.join("region/car_2.csv"), &format!("{HEADER}1_work,work,11.0,5.5,36,60\n"));

    write(&tracbev.join("home.csv"), "x,y,user_centric_weight\n10.01,52.0005,1.0\n");
    write(&tracbev.join("work.csv"), "x,y,user_centric_weight\n10.03,52.0052,1.0\n");
    write(&tracbev.join("public.csv"), "x,y,user_centric_weight\n10.0,52.0121,1.0\n");
}

fn profiles() -> PredefinedProfiles {
    let start = parse_timestamp("2011-01-01 00:00:00").unwrap();
    let index = date_range(start, 24, Duration::hours(1));
    let shape = |peak: usize| -> Vec<f64> {
        (0..24)
            .map(|h| 1.0 - (h as f64 - peak as f64).abs() / 24.0)
            .collect()
    };

    let mut generation = TimeSeriesFrame::new(index.clone());
    generation.insert("solar", shape(12).iter().map(|v| v * 0.6).collect()).unwrap();
    generation.insert("wind", vec![0.3; 24]).unwrap();

    let mut loads = TimeSeriesFrame::new(index);
    for sector in ["residential", "cts", "industrial"] {
        loads
            .insert(sector, shape(18).iter().map(|v| v / 8760.0 * 1.5).collect())
            .unwrap();
    }
    PredefinedProfiles {
        fluctuating_generators: Some(generation),
        conventional_loads: Some(loads),
        ..Default::default()
    }
}

#[test]
fn study_from_csv_to_saved_results() {
    let grid = tempdir().unwrap();
    gridplan_io::export_topology(&synthetic::example_topology(), grid.path()).unwrap();
    let mut study = GridStudy::from_csv_dir(grid.path(), Config::default()).unwrap();

    study.set_time_series_active_power_predefined(&profiles()).unwrap();
    study.set_time_series_reactive_power_control(&[], Default::default()).unwrap();
    assert_eq!(study.timeseries.timeindex.len(), 24);

    let simbev = tempdir().unwrap();
    let tracbev = tempdir().unwrap();
    mobility_data(simbev.path(), tracbev.path());
    let added = study
        .import_electromobility(
            simbev.path(),
            tracbev.path(),
            EmobImportOptions {
                mode: DistributionMode::UserFriendly,
                seed: 7,
            },
        )
        .unwrap();
    assert_eq!(added.len(), 3);
    assert_eq!(
        study
            .topology
            .loads
            .values()
            .filter(|l| l.kind == LoadKind::ChargingPoint)
            .count(),
        3
    );

    study.apply_charging_strategy(ChargingStrategy::Residual).unwrap();
    let charged: f64 = added
        .iter()
        .map(|name| study.timeseries.loads_active_power.column(name).unwrap().iter().sum::<f64>())
        .sum();
    assert!((charged - 38.5 / 0.9 / 1000.0).abs() < 1e-9);
    assert!(!study.check_integrity().has_errors());

    let results = study.analyze(&AnalyzeOptions::default()).unwrap();
    assert_eq!(results.timesteps().len(), 24);
    assert!(results.not_converged.is_empty());

    let saved = tempdir().unwrap();
    study.save(saved.path(), &[]).unwrap();
    let manifest = gridplan::load_manifest(saved.path()).unwrap();
    assert_eq!(
        manifest.parts,
        vec![Part::Topology, Part::Timeseries, Part::Results, Part::Electromobility]
    );

    let loaded = GridStudy::load(saved.path(), Config::default()).unwrap();
    assert_eq!(loaded.timeseries.timeindex, study.timeseries.timeindex);
    assert_eq!(loaded.electromobility, study.electromobility);
    assert_eq!(loaded.topology.loads.len(), study.topology.loads.len());
}
