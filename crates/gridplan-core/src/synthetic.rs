//! Small synthetic MV/LV grid.
//!
//! The MV grid (20 kV) has two feeders from the HV/MV station that form a
//! ring over the open switch `circuit_breaker_1`. Three LV grids hang off the
//! MV feeders, each with one feeder of three branch tees and a house
//! connection per tee.
//!
//! ```text
//! Bus_MVStation_1 ── LV1 ── BranchTee_1 ── LV2 ─┐
//!        │                                      ┊ (open)
//!        └──────── LV3 ── BranchTee_2 ──────────┘
//! ```

use crate::components::{
    Bus, Control, Generator, GridDistrict, Line, LineKind, Load, LoadKind, SwitchRecord,
    Transformer, VoltageLevel,
};
use crate::equipment::EquipmentData;
use crate::topology::Topology;

const MV_CABLE: &str = "NA2XS2Y 3x1x185 RM/25";
const LV_CABLE: &str = "NAYY 4x1x150";
const WEATHER_CELL: u64 = 1122075;

fn cable(
    equipment: &EquipmentData,
    name: &str,
    bus0: &str,
    bus1: &str,
    length: f64,
    level: VoltageLevel,
) -> Line {
    let (type_name, v_nom) = match level {
        VoltageLevel::Mv => (MV_CABLE, 20.0),
        VoltageLevel::Lv => (LV_CABLE, 0.4),
    };
    // Catalogue entries are built in, lookups cannot fail.
    let params = equipment
        .line_type(type_name, level, v_nom)
        .map(|(t, _)| t.parameters(length, 1))
        .unwrap_or(crate::equipment::LineParameters {
            r: 0.0,
            x: 0.0,
            b: 0.0,
            s_nom: 0.0,
        });
    Line {
        name: name.to_string(),
        bus0: bus0.to_string(),
        bus1: bus1.to_string(),
        length,
        r: params.r,
        x: params.x,
        b: params.b,
        s_nom: params.s_nom,
        num_parallel: 1,
        type_info: Some(type_name.to_string()),
        kind: LineKind::Cable,
    }
}

fn transformer(equipment: &EquipmentData, name: &str, bus0: &str, bus1: &str, hvmv: bool) -> Transformer {
    let t = if hvmv {
        equipment.mv_transformer("40 MVA")
    } else {
        equipment.lv_transformer("630 kVA")
    };
    let (s_nom, r_pu, x_pu, type_info) = match t {
        Some(t) => (t.s_nom, t.r_pu, t.x_pu, Some(t.name.clone())),
        None => (if hvmv { 40.0 } else { 0.63 }, 0.01, 0.04, None),
    };
    Transformer {
        name: name.to_string(),
        bus0: bus0.to_string(),
        bus1: bus1.to_string(),
        r_pu,
        x_pu,
        s_nom,
        type_info,
    }
}

fn load(name: &str, bus: &str, p_set: f64, annual: f64, sector: &str) -> Load {
    Load {
        name: name.to_string(),
        bus: bus.to_string(),
        p_set,
        kind: LoadKind::ConventionalLoad,
        annual_consumption: annual,
        sector: Some(sector.to_string()),
        number: Some(1),
    }
}

fn generator(name: &str, bus: &str, p_nom: f64, kind: &str, id: u64) -> Generator {
    Generator {
        name: name.to_string(),
        bus: bus.to_string(),
        control: Control::PQ,
        p_nom,
        kind: kind.to_string(),
        subtype: None,
        weather_cell_id: Some(WEATHER_CELL),
        generator_id: Some(id),
    }
}

/// Build the example grid.
pub fn example_topology() -> Topology {
    let mut topo = Topology::new(1);
    topo.grid_district = GridDistrict {
        population: 25_000,
        area: Some(60.0),
        srid: Some(4326),
        geom_wkt: None,
    };
    let eq = topo.equipment.clone();

    let mv_buses = [
        ("Bus_MVStation_1", 10.0, 52.0),
        ("BusBar_LVGrid_1_MV", 10.01, 52.0),
        ("BranchTee_MVGrid_1_1", 10.02, 52.005),
        ("BusBar_LVGrid_2_MV", 10.03, 52.005),
        ("BusBar_LVGrid_3_MV", 10.0, 52.012),
        ("BranchTee_MVGrid_1_2", 10.015, 52.015),
        ("virtual_BranchTee_MVGrid_1_2", 10.015, 52.015),
    ];
    for (name, x, y) in mv_buses {
        topo.buses
            .insert(name.to_string(), Bus::new(name, 20.0, 1).with_coordinates(x, y));
    }

    let mv_lines = [
        ("Line_10001", "Bus_MVStation_1", "BusBar_LVGrid_1_MV", 1.0),
        ("Line_10002", "BusBar_LVGrid_1_MV", "BranchTee_MVGrid_1_1", 1.2),
        ("Line_10003", "BranchTee_MVGrid_1_1", "BusBar_LVGrid_2_MV", 0.8),
        ("Line_10004", "Bus_MVStation_1", "BusBar_LVGrid_3_MV", 1.5),
        ("Line_10005", "BusBar_LVGrid_3_MV", "BranchTee_MVGrid_1_2", 1.0),
        ("Line_10006", "BusBar_LVGrid_2_MV", "virtual_BranchTee_MVGrid_1_2", 0.9),
    ];
    for (name, bus0, bus1, length) in mv_lines {
        topo.lines.insert(
            name.to_string(),
            cable(&eq, name, bus0, bus1, length, VoltageLevel::Mv),
        );
    }

    topo.switches.insert(
        "circuit_breaker_1".to_string(),
        SwitchRecord {
            name: "circuit_breaker_1".to_string(),
            bus_open: "virtual_BranchTee_MVGrid_1_2".to_string(),
            bus_closed: "BranchTee_MVGrid_1_2".to_string(),
            branch: "Line_10006".to_string(),
            type_info: Some("Switch Disconnector".to_string()),
        },
    );

    topo.transformers_hvmv.insert(
        "MVStation_1_transformer_1".to_string(),
        transformer(&eq, "MVStation_1_transformer_1", "Bus_primary_MVStation_1", "Bus_MVStation_1", true),
    );

    let wind = generator("Generator_MVGrid_1_wind_1", "BranchTee_MVGrid_1_1", 1.5, "wind", 1);
    topo.generators.insert(wind.name.clone(), wind);
    let industry = load(
        "Conventional_Load_MVGrid_1_industrial_1",
        "BranchTee_MVGrid_1_2",
        0.8,
        3000.0,
        "industrial",
    );
    topo.loads.insert(industry.name.clone(), industry);

    for k in 1..=3u32 {
        add_lv_grid(&mut topo, &eq, k);
    }

    topo
}

fn add_lv_grid(topo: &mut Topology, eq: &EquipmentData, k: u32) {
    let mv_bus = format!("BusBar_LVGrid_{}_MV", k);
    let (cx, cy) = topo
        .buses
        .get(&mv_bus)
        .and_then(|b| b.coordinates())
        .unwrap_or((10.0, 52.0));

    let station = format!("BusBar_LVGrid_{}_LV", k);
    topo.buses.insert(
        station.clone(),
        Bus::new(&station, 0.4, 1).with_lv_grid(k).with_coordinates(cx, cy),
    );
    let trafo = format!("LVStation_{}_transformer_1", k);
    topo.transformers
        .insert(trafo.clone(), transformer(eq, &trafo, &mv_bus, &station, false));

    let lengths = [0.05, 0.04, 0.03];
    let mut previous = station;
    for (i, length) in lengths.iter().enumerate() {
        let n = i + 1;
        let offset = 0.0005 * n as f64;
        let tee = format!("BranchTee_LVGrid_{}_{}", k, n);
        topo.buses.insert(
            tee.clone(),
            Bus::new(&tee, 0.4, 1)
                .with_lv_grid(k)
                .with_coordinates(cx + offset, cy),
        );
        let line = format!("Line_LVGrid_{}_{}", k, n);
        topo.lines
            .insert(line.clone(), cable(eq, &line, &previous, &tee, *length, VoltageLevel::Lv));

        let house = format!("Bus_LVGrid_{}_building_{}", k, n);
        let mut house_bus = Bus::new(&house, 0.4, 1)
            .with_lv_grid(k)
            .with_coordinates(cx + offset, cy + 0.0002);
        house_bus.in_building = true;
        topo.buses.insert(house.clone(), house_bus);
        let connection = format!("Line_LVGrid_{}_building_{}", k, n);
        topo.lines.insert(
            connection.clone(),
            cable(eq, &connection, &tee, &house, 0.01, VoltageLevel::Lv),
        );

        let name = format!("Conventional_Load_LVGrid_{}_residential_{}", k, n);
        topo.loads
            .insert(name.clone(), load(&name, &house, 0.01, 4.0, "residential"));

        if n != 2 {
            let name = format!("Generator_LVGrid_{}_solar_{}", k, n);
            let id = 100 * k as u64 + n as u64;
            topo.generators
                .insert(name.clone(), generator(&name, &house, 0.01, "solar", id));
        }

        previous = tee;
    }

    if k == 2 {
        let name = "Conventional_Load_LVGrid_2_cts_1";
        topo.loads
            .insert(name.to_string(), load(name, "BranchTee_LVGrid_2_2", 0.02, 30.0, "cts"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_topology_is_consistent() {
        let topo = example_topology();
        assert_eq!(topo.buses.len(), 7 + 3 * 7);
        assert_eq!(topo.lines.len(), 6 + 3 * 6);
        assert_eq!(topo.transformers.len(), 3);
        assert_eq!(topo.loads.len(), 1 + 9 + 1);
        assert_eq!(topo.generators.len(), 1 + 6);

        let diagnostics = topo.check_integrity(&Default::default());
        assert!(!diagnostics.has_issues(), "{}", diagnostics);
    }
}
