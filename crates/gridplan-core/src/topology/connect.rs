//! Integration of new generators, charging points, heat pumps and storage
//! units into the grid.
//!
//! Voltage levels follow the usual German classification: 4 is the MV side
//! of the HV/MV station, 5 the MV grid, 6 the LV side of an MV/LV station and
//! 7 the LV grid.

use super::edit::LineParams;
use super::Topology;
use crate::components::{Control, LineKind, LoadKind, VoltageLevel};
use crate::config::GridConnectionConfig;
use crate::equipment::{EquipmentData, LineType};
use crate::error::{GridError, GridResult};

/// Component to be connected.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentSpec {
    Generator {
        p_nom: f64,
        kind: String,
        weather_cell_id: Option<u64>,
        generator_id: Option<u64>,
    },
    ChargingPoint {
        p_set: f64,
        use_case: String,
    },
    HeatPump {
        p_set: f64,
    },
    StorageUnit {
        p_nom: f64,
        max_hours: f64,
    },
}

impl ComponentSpec {
    /// Nominal power in MW.
    pub fn power(&self) -> f64 {
        match self {
            ComponentSpec::Generator { p_nom, .. } => *p_nom,
            ComponentSpec::ChargingPoint { p_set, .. } => *p_set,
            ComponentSpec::HeatPump { p_set } => *p_set,
            ComponentSpec::StorageUnit { p_nom, .. } => *p_nom,
        }
    }

    fn label(&self) -> String {
        match self {
            ComponentSpec::Generator {
                kind,
                generator_id: Some(id),
                ..
            } => format!("Generator_{}_{}", kind, id),
            ComponentSpec::Generator { kind, .. } => format!("Generator_{}", kind),
            ComponentSpec::ChargingPoint { use_case, .. } => format!("Charging_Point_{}", use_case),
            ComponentSpec::HeatPump { .. } => "Heat_Pump".to_string(),
            ComponentSpec::StorageUnit { .. } => "StorageUnit".to_string(),
        }
    }

    /// Load sectors whose buses are preferred in voltage level 7.
    fn preferred_sectors(&self) -> &'static [&'static str] {
        match self {
            ComponentSpec::ChargingPoint { use_case, .. } => match use_case.as_str() {
                "home" => &["residential", "home"],
                "work" => &["cts", "industrial", "work"],
                _ => &[],
            },
            ComponentSpec::Generator { p_nom, .. } if *p_nom <= 0.03 => &["residential"],
            ComponentSpec::Generator { .. } => &["cts", "industrial", "agricultural"],
            ComponentSpec::HeatPump { .. } | ComponentSpec::StorageUnit { .. } => &["residential"],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRequest {
    pub component: ComponentSpec,
    /// Derived from the component's power if not given
    pub voltage_level: Option<u8>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// LV grid (MV/LV substation) to connect to in levels 6 and 7
    pub mvlv_subst_id: Option<u32>,
}

impl ConnectionRequest {
    pub fn new(component: ComponentSpec) -> Self {
        Self {
            component,
            voltage_level: None,
            x: None,
            y: None,
            mvlv_subst_id: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn in_voltage_level(mut self, level: u8) -> Self {
        self.voltage_level = Some(level);
        self
    }

    pub fn in_lv_grid(mut self, id: u32) -> Self {
        self.mvlv_subst_id = Some(id);
        self
    }

    fn position(&self) -> Option<(f64, f64)> {
        self.x.zip(self.y)
    }
}

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great circle distance in km between two lon/lat points.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lon1, lat1) = (a.0.to_radians(), a.1.to_radians());
    let (lon2, lat2) = (b.0.to_radians(), b.1.to_radians());
    let h = ((lat2 - lat1) / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * ((lon2 - lon1) / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Local planar coordinates in km around `origin`.
fn to_local_km(p: (f64, f64), origin: (f64, f64)) -> (f64, f64) {
    let kx = 111.32 * origin.1.to_radians().cos();
    ((p.0 - origin.0) * kx, (p.1 - origin.1) * 110.574)
}

/// Projection parameter `t` of `p` on segment `a`-`b` and the distance in km.
fn project_on_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    let (bx, by) = to_local_km(b, a);
    let (px, py) = to_local_km(p, a);
    let len2 = bx * bx + by * by;
    if len2 <= f64::EPSILON {
        return (0.0, (px * px + py * py).sqrt());
    }
    let t = ((px * bx + py * by) / len2).clamp(0.0, 1.0);
    let (dx, dy) = (px - t * bx, py - t * by);
    (t, (dx * dx + dy * dy).sqrt())
}

/// Pick a cable of `level` for `apparent_power` MVA over `length` km.
///
/// Returns the smallest cable whose rating covers the power and whose relative
/// voltage deviation stays below `max_deviation`. If no single cable suffices
/// the largest cable is used with as many parallel lines as needed.
pub fn select_cable(
    equipment: &EquipmentData,
    level: VoltageLevel,
    v_nom: f64,
    apparent_power: f64,
    length: f64,
    max_deviation: f64,
) -> GridResult<(LineType, u32)> {
    let cables = equipment.cables_for(level, v_nom);
    let fits = |cable: &LineType, n: u32| {
        let n = n as f64;
        let z = (cable.r_per_km.powi(2)
            + (cable.l_per_km * 2.0 * std::f64::consts::PI * crate::equipment::FREQUENCY_HZ / 1e3)
                .powi(2))
        .sqrt();
        let deviation = apparent_power * z * length / (n * cable.u_n.powi(2));
        cable.s_nom() * n >= apparent_power && (length <= 0.0 || deviation <= max_deviation)
    };

    if let Some(cable) = cables.iter().find(|c| fits(c, 1)) {
        return Ok(((*cable).clone(), 1));
    }
    let largest = cables.last().ok_or_else(|| {
        GridError::Config(format!("No {} cables for {} kV in equipment data.", level, v_nom))
    })?;
    (2..=20)
        .find(|n| fits(largest, *n))
        .map(|n| ((*largest).clone(), n))
        .ok_or_else(|| {
            GridError::Validation(format!(
                "No suitable cable found for {:.3} MVA in {} grid.",
                apparent_power, level
            ))
        })
}

impl Topology {
    fn max_connection_deviation(config: &GridConnectionConfig, level: VoltageLevel) -> f64 {
        match level {
            VoltageLevel::Mv => config.max_connection_voltage_deviation_mv,
            VoltageLevel::Lv => config.max_connection_voltage_deviation_lv,
        }
    }

    /// Add the component itself at an existing bus.
    pub fn add_component_at(&mut self, bus: &str, spec: &ComponentSpec) -> GridResult<String> {
        match spec {
            ComponentSpec::Generator {
                p_nom,
                kind,
                weather_cell_id,
                generator_id,
            } => self.add_generator(bus, *p_nom, kind, *weather_cell_id, *generator_id),
            ComponentSpec::ChargingPoint { p_set, use_case } => self.add_load(
                bus,
                *p_set,
                LoadKind::ChargingPoint,
                0.0,
                Some(use_case),
                None,
            ),
            ComponentSpec::HeatPump { p_set } => {
                self.add_load(bus, *p_set, LoadKind::HeatPump, 0.0, None, None)
            }
            ComponentSpec::StorageUnit { p_nom, max_hours } => {
                self.add_storage_unit(bus, *p_nom, Control::PQ, *max_hours)
            }
        }
    }

    /// Connect a component in voltage level 4 or 5 and return its name.
    pub fn connect_to_mv(
        &mut self,
        request: &ConnectionRequest,
        config: &GridConnectionConfig,
    ) -> GridResult<String> {
        let power = request.component.power();
        let level = request
            .voltage_level
            .unwrap_or_else(|| config.voltage_level_for(power));
        if !(4..=5).contains(&level) {
            return Err(GridError::Validation(format!(
                "Voltage level {} is not an MV voltage level.",
                level
            )));
        }

        let station = self
            .mv_station_bus()
            .map(str::to_string)
            .ok_or_else(|| GridError::Topology("MV grid has no HV/MV station.".to_string()))?;
        let v_nom = self.mv_grid().nominal_voltage();
        let position = request.position().or_else(|| {
            self.buses.get(&station).and_then(|b| b.coordinates())
        });

        let target = match (level, request.position()) {
            (5, Some(pos)) => self.nearest_mv_connection_point(pos)?,
            _ => station,
        };

        let bus_name = format!("Bus_{}", request.component.label());
        let bus = self.add_bus(
            &bus_name,
            v_nom,
            None,
            position.map(|p| p.0),
            position.map(|p| p.1),
        )?;

        let length = match (
            position,
            self.buses.get(&target).and_then(|b| b.coordinates()),
        ) {
            (Some(a), Some(b)) => haversine_km(a, b).max(config.min_connection_length),
            _ => config.min_connection_length,
        };
        let (cable, n) = select_cable(
            &self.equipment,
            VoltageLevel::Mv,
            v_nom,
            power,
            length,
            Self::max_connection_deviation(config, VoltageLevel::Mv),
        )?;
        self.add_line(
            &target,
            &bus,
            length,
            LineParams {
                kind: Some(LineKind::Cable),
                ..LineParams::of_type(cable.name).with_num_parallel(n)
            },
        )?;

        let name = self.add_component_at(&bus, &request.component)?;
        tracing::info!(component = %name, bus = %bus, target = %target, level, "connected component to MV grid");
        Ok(name)
    }

    /// Nearest MV bus, or a new branch tee on the nearest MV line if that is
    /// closer.
    fn nearest_mv_connection_point(&mut self, pos: (f64, f64)) -> GridResult<String> {
        let virtual_buses: Vec<&str> = self.switches.values().map(|s| s.bus_open.as_str()).collect();
        let switch_branches = self.switch_branches();
        let mv_grid = self.mv_grid();

        let nearest_bus = mv_grid
            .buses()
            .into_iter()
            .filter(|b| !virtual_buses.contains(&b.name.as_str()))
            .filter_map(|b| b.coordinates().map(|c| (b.name.clone(), haversine_km(pos, c))))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        let nearest_line = mv_grid
            .lines()
            .into_iter()
            .filter(|l| !switch_branches.contains(l.name.as_str()))
            .filter_map(|l| {
                let a = self.buses.get(&l.bus0)?.coordinates()?;
                let b = self.buses.get(&l.bus1)?.coordinates()?;
                let (t, d) = project_on_segment(pos, a, b);
                Some((l.name.clone(), t, d))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2));

        match (nearest_bus, nearest_line) {
            (Some((_, bus_d)), Some((line, t, line_d)))
                if line_d < bus_d && t > 1e-3 && t < 1.0 - 1e-3 =>
            {
                self.split_line(&line, t)
            }
            (Some((bus, _)), _) => Ok(bus),
            (None, _) => self
                .mv_station_bus()
                .map(str::to_string)
                .ok_or_else(|| GridError::Topology("MV grid has no HV/MV station.".to_string())),
        }
    }

    /// Split a line at relative position `t` with a new branch tee bus and
    /// return the new bus.
    pub fn split_line(&mut self, line_name: &str, t: f64) -> GridResult<String> {
        let line = self
            .lines
            .get(line_name)
            .cloned()
            .ok_or_else(|| GridError::NotFound(format!("Line {} not in Topology.", line_name)))?;
        let b0 = self.require_bus(&line.bus0)?.clone();
        let b1 = self.require_bus(&line.bus1)?.clone();
        let coords = b0.coordinates().zip(b1.coordinates()).map(|(a, b)| {
            (a.0 + t * (b.0 - a.0), a.1 + t * (b.1 - a.1))
        });

        let grid = self
            .bus_grid(&line.bus0)
            .map(|g| g.to_string())
            .unwrap_or_default();
        let tee = self.add_bus(
            &format!("BranchTee_{}_{}", grid, line_name),
            b0.v_nom,
            b0.lv_grid_id,
            coords.map(|c| c.0),
            coords.map(|c| c.1),
        )?;

        let mut second = line.clone();
        second.bus0 = tee.clone();
        second.length = line.length * (1.0 - t);
        second.r = line.r * (1.0 - t);
        second.x = line.x * (1.0 - t);
        second.b = line.b * (1.0 - t);
        second.name = format!("Line_{}_{}", tee, line.bus1);

        if let Some(first) = self.lines.get_mut(line_name) {
            first.bus1 = tee.clone();
            first.length = line.length * t;
            first.r = line.r * t;
            first.x = line.x * t;
            first.b = line.b * t;
        }
        self.lines.insert(second.name.clone(), second);
        tracing::debug!(line = line_name, tee = %tee, "split line");
        Ok(tee)
    }

    /// Connect a component in voltage level 6 or 7 and return its name.
    pub fn connect_to_lv(
        &mut self,
        request: &ConnectionRequest,
        config: &GridConnectionConfig,
    ) -> GridResult<String> {
        let power = request.component.power();
        let level = request
            .voltage_level
            .unwrap_or_else(|| config.voltage_level_for(power));
        if !(6..=7).contains(&level) {
            return Err(GridError::Validation(format!(
                "Voltage level {} is not an LV voltage level.",
                level
            )));
        }

        let lv_grid_id = self.select_lv_grid(request)?;
        let station = self
            .lv_station_bus(lv_grid_id)
            .map(str::to_string)
            .ok_or_else(|| {
                GridError::Topology(format!("LV grid {} has no MV/LV station.", lv_grid_id))
            })?;

        let bus = if level == 6 {
            station
        } else {
            self.select_lv_bus(lv_grid_id, &station, &request.component)
        };

        let name = self.add_component_at(&bus, &request.component)?;
        tracing::info!(component = %name, bus = %bus, level, "connected component to LV grid");
        Ok(name)
    }

    fn select_lv_grid(&self, request: &ConnectionRequest) -> GridResult<u32> {
        let ids = self.lv_grid_ids();
        if ids.is_empty() {
            return Err(GridError::Topology("Topology has no LV grids.".to_string()));
        }
        if let Some(id) = request.mvlv_subst_id {
            if ids.contains(&id) {
                return Ok(id);
            }
            tracing::warn!(
                "LV grid {} does not exist. Component is connected to the nearest LV grid.",
                id
            );
        }
        let nearest = request.position().and_then(|pos| {
            ids.iter()
                .filter_map(|id| {
                    let bus = self.lv_station_bus(*id)?;
                    let c = self.buses.get(bus)?.coordinates()?;
                    Some((*id, haversine_km(pos, c)))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(id, _)| id)
        });
        Ok(nearest.unwrap_or(ids[0]))
    }

    /// Bus in LV grid `lv_grid_id` for a voltage level 7 component.
    ///
    /// Buses with loads of a preferred sector come first, then any bus with
    /// loads, then any non-station bus. Among candidates the bus with the
    /// fewest components of the same class wins.
    fn select_lv_bus(&self, lv_grid_id: u32, station: &str, spec: &ComponentSpec) -> String {
        let grid = crate::grids::Grid::new(self, crate::grids::GridKind::Lv, lv_grid_id);
        let loads = grid.loads();
        let sectors = spec.preferred_sectors();

        let mut candidates: Vec<&str> = loads
            .iter()
            .filter(|l| l.kind == LoadKind::ConventionalLoad)
            .filter(|l| l.sector.as_deref().map_or(false, |s| sectors.contains(&s)))
            .map(|l| l.bus.as_str())
            .collect();
        if candidates.is_empty() {
            candidates = loads.iter().map(|l| l.bus.as_str()).collect();
        }
        if candidates.is_empty() {
            candidates = grid
                .buses()
                .into_iter()
                .map(|b| b.name.as_str())
                .filter(|b| *b != station)
                .collect();
        }
        candidates.sort_unstable();
        candidates.dedup();

        let occupancy = |bus: &str| match spec {
            ComponentSpec::Generator { .. } => {
                self.generators.values().filter(|g| g.bus == bus).count()
            }
            ComponentSpec::StorageUnit { .. } => {
                self.storage_units.values().filter(|s| s.bus == bus).count()
            }
            ComponentSpec::ChargingPoint { .. } => self
                .loads
                .values()
                .filter(|l| l.bus == bus && l.kind == LoadKind::ChargingPoint)
                .count(),
            ComponentSpec::HeatPump { .. } => self
                .loads
                .values()
                .filter(|l| l.bus == bus && l.kind == LoadKind::HeatPump)
                .count(),
        };

        candidates
            .into_iter()
            .min_by_key(|b| occupancy(b))
            .unwrap_or(station)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    fn solar(p_nom: f64) -> ComponentSpec {
        ComponentSpec::Generator {
            p_nom,
            kind: "solar".into(),
            weather_cell_id: Some(1122075),
            generator_id: Some(4711),
        }
    }

    #[test]
    fn haversine_distance() {
        let d = haversine_km((10.0, 52.0), (10.0, 53.0));
        assert!((d - 111.19).abs() < 0.1);
    }

    #[test]
    fn select_cable_smallest_sufficient() {
        let eq = EquipmentData::default();
        let (cable, n) = select_cable(&eq, VoltageLevel::Lv, 0.4, 0.05, 0.0, 0.04).unwrap();
        assert_eq!(cable.name, "NAYY 4x1x35");
        assert_eq!(n, 1);

        let (cable, n) = select_cable(&eq, VoltageLevel::Lv, 0.4, 0.5, 0.0, 0.04).unwrap();
        assert_eq!(cable.name, "NAYY 4x1x300");
        assert_eq!(n, 2);

        let (cable, _) = select_cable(&eq, VoltageLevel::Mv, 20.0, 5.0, 0.0, 0.02).unwrap();
        assert_eq!(cable.name, "NA2XS2Y 3x1x95 RM/25");
    }

    #[test]
    fn connect_voltage_level_4() {
        let mut topo = synthetic::example_topology();
        let request = ConnectionRequest::new(solar(10.0))
            .in_voltage_level(4)
            .at(10.05, 52.0);
        let name = topo
            .connect_to_mv(&request, &GridConnectionConfig::default())
            .unwrap();
        assert_eq!(name, "Generator_MVGrid_1_solar_4711");
        let bus = topo.generators[&name].bus.clone();
        let lines = topo.get_connected_lines_from_bus(&bus);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].connects("Bus_MVStation_1"));
        assert!(lines[0].length > 3.0);
    }

    #[test]
    fn connect_voltage_level_5_splits_line() {
        let mut topo = synthetic::example_topology();
        let lines_before = topo.lines.len();
        // midway between Bus_MVStation_1 and BusBar_LVGrid_3_MV, slightly off
        let request = ConnectionRequest::new(solar(2.0))
            .in_voltage_level(5)
            .at(10.0005, 52.006);
        let name = topo
            .connect_to_mv(&request, &GridConnectionConfig::default())
            .unwrap();
        assert_eq!(topo.lines.len(), lines_before + 2);

        let tee = topo
            .buses
            .keys()
            .find(|b| b.starts_with("BranchTee_MVGrid_1_Line_10004"))
            .cloned()
            .unwrap();
        let bus = &topo.generators[&name].bus;
        assert!(topo.get_neighbours(bus).contains(&tee));
        let total = topo.lines["Line_10004"].length
            + topo.lines[&format!("Line_{}_BusBar_LVGrid_3_MV", tee)].length;
        assert!((total - 1.5).abs() < 1e-9);
    }

    #[test]
    fn connect_voltage_level_6_and_7() {
        let mut topo = synthetic::example_topology();
        let config = GridConnectionConfig::default();

        let cp = ComponentSpec::ChargingPoint {
            p_set: 0.15,
            use_case: "public".into(),
        };
        let name = topo
            .connect_to_lv(&ConnectionRequest::new(cp).in_lv_grid(2), &config)
            .unwrap();
        assert_eq!(topo.loads[&name].bus, "BusBar_LVGrid_2_LV");

        let home = ComponentSpec::ChargingPoint {
            p_set: 0.011,
            use_case: "home".into(),
        };
        let first = topo
            .connect_to_lv(&ConnectionRequest::new(home.clone()).in_lv_grid(1), &config)
            .unwrap();
        let second = topo
            .connect_to_lv(&ConnectionRequest::new(home).in_lv_grid(1), &config)
            .unwrap();
        let (b1, b2) = (&topo.loads[&first].bus, &topo.loads[&second].bus);
        assert!(b1.starts_with("Bus_LVGrid_1_building"));
        assert!(b2.starts_with("Bus_LVGrid_1_building"));
        assert_ne!(b1, b2);
    }

    #[test]
    fn unknown_lv_grid_falls_back_to_nearest() {
        let mut topo = synthetic::example_topology();
        let request = ConnectionRequest::new(ComponentSpec::HeatPump { p_set: 0.15 })
            .in_lv_grid(99)
            .at(10.0, 52.012);
        let name = topo
            .connect_to_lv(&request, &GridConnectionConfig::default())
            .unwrap();
        assert_eq!(topo.loads[&name].bus, "BusBar_LVGrid_3_LV");
    }

    #[test]
    fn wrong_level_rejected() {
        let mut topo = synthetic::example_topology();
        let request = ConnectionRequest::new(solar(0.01)).in_voltage_level(7);
        assert!(topo
            .connect_to_mv(&request, &GridConnectionConfig::default())
            .is_err());
    }
}
