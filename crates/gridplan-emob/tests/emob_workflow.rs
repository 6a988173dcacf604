//! From mobility simulation output to charging time series in the example grid.

use chrono::Duration;
use gridplan_core::{components::LoadKind, synthetic, Config};
use gridplan_emob::{
    apply_charging_strategy, distribute_charging_demand, import_electromobility,
    integrate_charging_parks, ChargingStrategy, DistributionMode, Electromobility,
};
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
        &format!("{HEADER}0_home,home,11.0,22.0,0,31\ndriving,,0.0,0.0,32,39\n6_retail,public,22.0,11.0,40,43\n"),
    );
    write(&simbev.join("region/car_2.csv"), &format!("{HEADER}1_work,work,11.0,5.5,36,60\n"));
    write(&simbev.join("region/car_3.csv"), &format!("{HEADER}7_charging_hub,hpc,150.0,75.0,50,53\n"));

    write(&tracbev.join("home.csv"), "x,y,user_centric_weight\n10.01,52.0005,1.0\n");
    write(&tracbev.join("work.csv"), "x,y,user_centric_weight\n10.03,52.0052,1.0\n");
    write(&tracbev.join("public.csv"), "x,y,user_centric_weight\n10.0,52.0121,1.0\n");
    write(&tracbev.join("hpc.csv"), "x,y,user_centric_weight\n10.02,52.0051,1.0\n");
}

fn prepared() -> (Electromobility, gridplan_core::Topology) {
    let simbev = tempdir().unwrap();
    let tracbev = tempdir().unwrap();
    mobility_data(simbev.path(), tracbev.path());
    let config = Config::default();

    let mut emob =
        import_electromobility(simbev.path(), tracbev.path(), &config.electromobility).unwrap();
    let mut topology = synthetic::example_topology();
    distribute_charging_demand(
        &mut emob,
        &topology,
        DistributionMode::GridFriendly,
        2011,
        &config.electromobility,
    )
    .unwrap();
    integrate_charging_parks(&mut emob, &mut topology, &config.grid_connection).unwrap();
    (emob, topology)
}

#[test]
fn charging_parks_end_up_in_the_grid() {
    let (emob, topology) = prepared();
    assert_eq!(emob.charging_processes.len(), 4);
    assert_eq!(emob.integrated_charging_parks.len(), 4);

    let charging_points: Vec<_> = topology
        .loads
        .values()
        .filter(|l| l.kind == LoadKind::ChargingPoint)
        .collect();
    assert_eq!(charging_points.len(), 4);
    let hpc = charging_points
        .iter()
        .find(|l| l.sector.as_deref() == Some("hpc"))
        .unwrap();
    assert!((hpc.p_set - 0.1667).abs() < 1e-9);
    assert!(!topology.check_integrity(&Default::default()).has_errors());
}

#[test]
fn hourly_charging_keeps_the_energy() {
    let (emob, _) = prepared();
    let index = gridplan_ts::date_range(emob.simulation_start, 24, Duration::hours(1));
    let config = Config::default();

    for strategy in [ChargingStrategy::Dumb, ChargingStrategy::Reduced] {
        let ts = apply_charging_strategy(&emob, strategy, &index, None, &config.electromobility)
            .unwrap();
        assert_eq!(ts.columns.len(), 4);
        let energy: f64 = ts.columns.values().flatten().sum();
        let expected = (22.0 + 11.0 + 5.5 + 75.0) / 0.9 / 1000.0;
        assert!((energy - expected).abs() < 1e-9, "{strategy}: {energy}");
    }
}
