//! Adding, removing and modifying topology components.

use super::Topology;
use crate::components::{
    Bus, Control, Generator, Line, LineKind, Load, LoadKind, StorageUnit, Transformer,
    VoltageLevel,
};
use crate::equipment::TransformerType;
use crate::error::{GridError, GridResult};
use std::collections::BTreeMap;

/// Electrical parameters of a new line.
///
/// Either `type_info` names a catalogue type, in which case the parameters
/// are derived from it, or `r` and `x` must be given.
#[derive(Debug, Clone, PartialEq)]
pub struct LineParams {
    pub r: Option<f64>,
    pub x: Option<f64>,
    pub b: Option<f64>,
    pub s_nom: Option<f64>,
    pub num_parallel: u32,
    pub kind: Option<LineKind>,
    pub type_info: Option<String>,
}

impl Default for LineParams {
    fn default() -> Self {
        Self {
            r: None,
            x: None,
            b: None,
            s_nom: None,
            num_parallel: 1,
            kind: None,
            type_info: None,
        }
    }
}

impl LineParams {
    pub fn of_type(type_info: impl Into<String>) -> Self {
        Self {
            type_info: Some(type_info.into()),
            ..Self::default()
        }
    }

    pub fn with_num_parallel(mut self, n: u32) -> Self {
        self.num_parallel = n;
        self
    }
}

/// `base` if it is not taken, else `base_1`, `base_2`, ...
fn unique_name<T>(table: &BTreeMap<String, T>, base: &str) -> String {
    if !table.contains_key(base) {
        return base.to_string();
    }
    first_free(table, base, 1)
}

/// `prefix_n` with the smallest `n >= start` that is not taken.
pub fn first_free<T>(table: &BTreeMap<String, T>, prefix: &str, start: usize) -> String {
    let mut n = start;
    loop {
        let name = format!("{}_{}", prefix, n);
        if !table.contains_key(&name) {
            return name;
        }
        n += 1;
    }
}

fn line_type_error(line_type: &str) -> GridError {
    GridError::Topology(format!(
        "Given new line type is not in equipment data. Please make sure to use \
         line type with technical data provided in equipment_data \"mv_cables\" \
         or \"lv_cables\" (got {}).",
        line_type
    ))
}

impl Topology {
    fn grid_repr_of(&self, bus: &str) -> GridResult<String> {
        self.require_bus(bus)?;
        self.bus_grid(bus)
            .map(|g| g.to_string())
            .ok_or_else(|| GridError::NotFound(bus.to_string()))
    }

    /// Add a bus and return its (possibly suffixed) name.
    pub fn add_bus(
        &mut self,
        name: &str,
        v_nom: f64,
        lv_grid_id: Option<u32>,
        x: Option<f64>,
        y: Option<f64>,
    ) -> GridResult<String> {
        if VoltageLevel::from_v_nom(v_nom) == VoltageLevel::Lv && lv_grid_id.is_none() {
            return Err(GridError::Topology(
                "You need to specify an lv_grid_id for low-voltage buses.".to_string(),
            ));
        }
        let name = unique_name(&self.buses, name);
        self.buses.insert(
            name.clone(),
            Bus {
                name: name.clone(),
                v_nom,
                x,
                y,
                mv_grid_id: self.mv_grid_id,
                lv_grid_id,
                in_building: false,
            },
        );
        Ok(name)
    }

    /// Add a load and return its name.
    ///
    /// `sector` is the use case for charging points.
    pub fn add_load(
        &mut self,
        bus: &str,
        p_set: f64,
        kind: LoadKind,
        annual_consumption: f64,
        sector: Option<&str>,
        load_id: Option<u32>,
    ) -> GridResult<String> {
        let grid = self.grid_repr_of(bus)?;
        let name = match kind {
            LoadKind::ConventionalLoad => match (load_id, sector) {
                (Some(id), Some(sector)) => unique_name(
                    &self.loads,
                    &format!("Conventional_Load_{}_{}_{}", grid, sector, id),
                ),
                _ => {
                    let in_grid = self
                        .bus_grid(bus)
                        .map_or(0, |g| g.loads().len());
                    first_free(
                        &self.loads,
                        &format!("Conventional_Load_{}", grid),
                        in_grid + 1,
                    )
                }
            },
            LoadKind::ChargingPoint => first_free(
                &self.loads,
                &format!("Charging_Point_{}_{}", grid, sector.unwrap_or("public")),
                1,
            ),
            LoadKind::HeatPump => first_free(&self.loads, &format!("Heat_Pump_{}", grid), 1),
        };

        self.loads.insert(
            name.clone(),
            Load {
                name: name.clone(),
                bus: bus.to_string(),
                p_set,
                kind,
                annual_consumption,
                sector: sector.map(str::to_string),
                number: load_id,
            },
        );
        tracing::debug!(load = %name, bus, p_set, "added load");
        Ok(name)
    }

    pub fn add_generator(
        &mut self,
        bus: &str,
        p_nom: f64,
        kind: &str,
        weather_cell_id: Option<u64>,
        generator_id: Option<u64>,
    ) -> GridResult<String> {
        let grid = self.grid_repr_of(bus)?;
        let base = match generator_id {
            Some(id) => format!("Generator_{}_{}_{}", grid, kind, id),
            None => format!("Generator_{}_{}", grid, kind),
        };
        let name = unique_name(&self.generators, &base);
        self.generators.insert(
            name.clone(),
            Generator {
                name: name.clone(),
                bus: bus.to_string(),
                control: Control::PQ,
                p_nom,
                kind: kind.to_string(),
                subtype: None,
                weather_cell_id,
                generator_id,
            },
        );
        tracing::debug!(generator = %name, bus, p_nom, "added generator");
        Ok(name)
    }

    pub fn add_storage_unit(
        &mut self,
        bus: &str,
        p_nom: f64,
        control: Control,
        max_hours: f64,
    ) -> GridResult<String> {
        let grid = self.grid_repr_of(bus)?;
        let in_grid = self.bus_grid(bus).map_or(0, |g| g.storage_units().len());
        let name = first_free(
            &self.storage_units,
            &format!("StorageUnit_{}", grid),
            in_grid + 1,
        );
        self.storage_units.insert(
            name.clone(),
            StorageUnit {
                name: name.clone(),
                bus: bus.to_string(),
                control,
                p_nom,
                max_hours,
            },
        );
        Ok(name)
    }

    /// Add a line between two existing buses and return its name.
    ///
    /// If a line between the two buses already exists, its name is returned
    /// and nothing is added.
    pub fn add_line(
        &mut self,
        bus0: &str,
        bus1: &str,
        length: f64,
        params: LineParams,
    ) -> GridResult<String> {
        let bus = self.require_bus(bus0)?.clone();
        self.require_bus(bus1)?;

        if let Some(existing) = self
            .lines
            .values()
            .find(|l| l.connects(bus0) && l.connects(bus1))
        {
            tracing::debug!(
                "Line between {} and {} already exists ({}).",
                bus0,
                bus1,
                existing.name
            );
            return Ok(existing.name.clone());
        }

        let num_parallel = params.num_parallel.max(1);
        let (r, x, b, s_nom, kind) = match &params.type_info {
            Some(type_info) => {
                let (line_type, kind) = self
                    .equipment
                    .line_type(type_info, bus.voltage_level(), bus.v_nom)
                    .ok_or_else(|| line_type_error(type_info))?;
                if params.r.is_some()
                    || params.x.is_some()
                    || params.b.is_some()
                    || params.s_nom.is_some()
                {
                    tracing::warn!(
                        "When line 'type_info' is provided when creating a new line, x, r, b \
                         and s_nom are calculated and provided parameters are overwritten."
                    );
                }
                let p = line_type.parameters(length, num_parallel);
                (p.r, p.x, p.b, p.s_nom, params.kind.unwrap_or(kind))
            }
            None => match (params.r, params.x) {
                (Some(r), Some(x)) => (
                    r,
                    x,
                    params.b.unwrap_or(0.0),
                    params.s_nom.unwrap_or(0.0),
                    params.kind.unwrap_or_default(),
                ),
                _ => {
                    return Err(GridError::Topology(
                        "Newly added line has no line resistance and/or reactance.".to_string(),
                    ))
                }
            },
        };

        let name = unique_name(&self.lines, &format!("Line_{}_{}", bus0, bus1));
        self.lines.insert(
            name.clone(),
            Line {
                name: name.clone(),
                bus0: bus0.to_string(),
                bus1: bus1.to_string(),
                length,
                r,
                x,
                b,
                s_nom,
                num_parallel,
                type_info: params.type_info,
                kind,
            },
        );
        Ok(name)
    }

    /// Add a transformer of catalogue type `ttype`.
    pub fn add_transformer(
        &mut self,
        name: &str,
        bus0: &str,
        bus1: &str,
        ttype: &TransformerType,
        hvmv: bool,
    ) -> GridResult<String> {
        if !hvmv {
            self.require_bus(bus0)?;
        }
        self.require_bus(bus1)?;
        let table = if hvmv {
            &mut self.transformers_hvmv
        } else {
            &mut self.transformers
        };
        let name = unique_name(table, name);
        table.insert(
            name.clone(),
            Transformer {
                name: name.clone(),
                bus0: bus0.to_string(),
                bus1: bus1.to_string(),
                r_pu: ttype.r_pu,
                x_pu: ttype.x_pu,
                s_nom: ttype.s_nom,
                type_info: Some(ttype.name.clone()),
            },
        );
        Ok(name)
    }

    pub fn remove_load(&mut self, name: &str) -> GridResult<()> {
        let load = self
            .loads
            .remove(name)
            .ok_or_else(|| GridError::NotFound(format!("Load {} not in Topology.", name)))?;
        self.remove_dangling_end(&load.bus);
        Ok(())
    }

    pub fn remove_generator(&mut self, name: &str) -> GridResult<()> {
        let generator = self
            .generators
            .remove(name)
            .ok_or_else(|| GridError::NotFound(format!("Generator {} not in Topology.", name)))?;
        self.remove_dangling_end(&generator.bus);
        Ok(())
    }

    pub fn remove_storage_unit(&mut self, name: &str) -> GridResult<()> {
        let storage = self.storage_units.remove(name).ok_or_else(|| {
            GridError::NotFound(format!("Storage unit {} not in Topology.", name))
        })?;
        self.remove_dangling_end(&storage.bus);
        Ok(())
    }

    /// Drop `bus` and its single connecting line if nothing else is attached.
    fn remove_dangling_end(&mut self, bus: &str) {
        let connected = self.get_connected_components_from_bus(bus);
        if connected.component_count() == 0
            && connected.lines.len() == 1
            && connected.transformers.is_empty()
            && connected.transformers_hvmv.is_empty()
            && connected.switches.is_empty()
        {
            self.lines.remove(&connected.lines[0]);
            self.buses.remove(bus);
            tracing::debug!(bus, line = %connected.lines[0], "removed dangling bus and line");
        }
    }

    /// True if `bus` could be removed together with its single line.
    pub fn check_bus_for_removal(&self, bus: &str) -> bool {
        if !self.buses.contains_key(bus) {
            tracing::warn!("Bus of name {} not in Topology. Cannot be removed.", bus);
            return false;
        }
        let connected = self.get_connected_components_from_bus(bus);
        connected.lines.len() <= 1
            && connected.component_count() == 0
            && connected.transformers.is_empty()
            && connected.transformers_hvmv.is_empty()
    }

    /// True if removing `line` does not leave a bus with attached elements
    /// disconnected from the rest of the grid.
    pub fn check_line_for_removal(&self, line: &str) -> bool {
        let Some(l) = self.lines.get(line) else {
            tracing::warn!("Line of name {} not in Topology. Cannot be removed.", line);
            return false;
        };
        if self.check_bus_for_removal(&l.bus0) || self.check_bus_for_removal(&l.bus1) {
            return true;
        }
        self.to_graph().has_path_without(&l.bus0, &l.bus1, line)
    }

    /// Remove a line and all buses that become isolated. Returns false if the
    /// line was not removed.
    pub fn remove_line(&mut self, name: &str) -> bool {
        if !self.check_line_for_removal(name) {
            tracing::warn!("Removal of line {} would create isolated node.", name);
            return false;
        }
        let Some(line) = self.lines.remove(name) else {
            return false;
        };
        for bus in [&line.bus0, &line.bus1] {
            if self.get_connected_components_from_bus(bus).is_empty() {
                self.buses.remove(bus.as_str());
            }
        }
        true
    }

    /// Remove an isolated bus. Returns false if the bus was not removed.
    pub fn remove_bus(&mut self, name: &str) -> bool {
        if !self.buses.contains_key(name) {
            tracing::warn!("Bus of name {} not in Topology. Cannot be removed.", name);
            return false;
        }
        let connected = self.get_connected_components_from_bus(name);
        if !connected.is_empty() {
            tracing::warn!(
                "Bus {} is not isolated and therefore not removed. Remove all connected \
                 elements ({:?}) first.",
                name,
                connected
            );
            return false;
        }
        self.buses.remove(name);
        true
    }

    /// Set the number of parallel lines and rescale the electrical parameters.
    pub fn update_number_of_parallel_lines(
        &mut self,
        changes: &BTreeMap<String, u32>,
    ) -> GridResult<()> {
        for (name, &new) in changes {
            let line = self
                .lines
                .get_mut(name)
                .ok_or_else(|| GridError::NotFound(format!("Line {} not in Topology.", name)))?;
            if new == 0 {
                return Err(GridError::Validation(format!(
                    "Number of parallel lines of {} must be at least 1.",
                    name
                )));
            }
            let factor = line.num_parallel.max(1) as f64 / new as f64;
            line.r *= factor;
            line.x *= factor;
            line.b /= factor;
            line.s_nom /= factor;
            line.num_parallel = new;
        }
        Ok(())
    }

    /// Replace the type of the given lines, resetting them to a single line.
    pub fn change_line_type(&mut self, lines: &[String], line_type: &str) -> GridResult<()> {
        let mut updates = Vec::with_capacity(lines.len());
        for name in lines {
            let line = self
                .lines
                .get(name)
                .ok_or_else(|| GridError::NotFound(format!("Line {} not in Topology.", name)))?;
            let bus = self.require_bus(&line.bus0)?;
            let (data, kind) = self
                .equipment
                .line_type(line_type, bus.voltage_level(), bus.v_nom)
                .ok_or_else(|| line_type_error(line_type))?;
            updates.push((name.clone(), data.parameters(line.length, 1), kind));
        }

        for (name, params, kind) in updates {
            if let Some(line) = self.lines.get_mut(&name) {
                line.r = params.r;
                line.x = params.x;
                line.b = params.b;
                line.s_nom = params.s_nom;
                line.num_parallel = 1;
                line.kind = kind;
                line.type_info = Some(line_type.to_string());
            }
        }
        Ok(())
    }
}
