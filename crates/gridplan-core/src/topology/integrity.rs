//! Integrity checks of the topology tables.

use super::Topology;
use crate::config::IntegrityConfig;
use crate::diagnostics::Diagnostics;
use std::collections::{BTreeMap, BTreeSet};

fn join(names: &[&str]) -> String {
    names.join(", ")
}

impl Topology {
    /// Check the topology for inconsistent or suspicious data.
    ///
    /// References to undefined buses are reported as errors, everything else
    /// as warnings.
    pub fn check_integrity(&self, config: &IntegrityConfig) -> Diagnostics {
        let mut diag = Diagnostics::new();
        self.check_duplicates(&mut diag);
        self.check_bus_references(&mut diag);
        self.check_isolation(&mut diag);
        self.check_line_data(&mut diag, config);
        diag
    }

    fn check_duplicates(&self, diag: &mut Diagnostics) {
        fn key_mismatches<'a, T>(
            table: &'a BTreeMap<String, T>,
            name: impl Fn(&T) -> &str,
        ) -> Vec<&'a str> {
            let mut seen = BTreeSet::new();
            let mut out = Vec::new();
            for (key, value) in table {
                let n = name(value);
                if n != key.as_str() || !seen.insert(n.to_string()) {
                    out.push(key.as_str());
                }
            }
            out
        }

        let tables: [(&str, Vec<&str>); 8] = [
            ("buses", key_mismatches(&self.buses, |b| b.name.as_str())),
            ("lines", key_mismatches(&self.lines, |l| l.name.as_str())),
            ("transformers", key_mismatches(&self.transformers, |t| t.name.as_str())),
            ("transformers_hvmv", key_mismatches(&self.transformers_hvmv, |t| t.name.as_str())),
            ("loads", key_mismatches(&self.loads, |l| l.name.as_str())),
            ("generators", key_mismatches(&self.generators, |g| g.name.as_str())),
            ("storage_units", key_mismatches(&self.storage_units, |s| s.name.as_str())),
            ("switches", key_mismatches(&self.switches, |s| s.name.as_str())),
        ];
        for (table, names) in tables {
            if !names.is_empty() {
                diag.add_error(
                    "duplicate",
                    &format!(
                        "{} have duplicate entry in one of the following components' \
                         dataframes: {}.",
                        join(&names),
                        table
                    ),
                );
            }
        }

        // component names must also be unique across the component tables
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        let components = self
            .loads
            .keys()
            .map(|k| (k.as_str(), "loads"))
            .chain(self.generators.keys().map(|k| (k.as_str(), "generators")))
            .chain(self.storage_units.keys().map(|k| (k.as_str(), "storage_units")));
        for (name, table) in components {
            if let Some(other) = seen.insert(name, table) {
                diag.add_error_with_entity(
                    "duplicate",
                    &format!(
                        "{} have duplicate entry in one of the following components' \
                         dataframes: {}, {}.",
                        name, other, table
                    ),
                    name,
                );
            }
        }
    }

    fn check_bus_references(&self, diag: &mut Diagnostics) {
        let defined = |bus: &str| self.buses.contains_key(bus);

        let mut report = |table: &str, names: Vec<&str>| {
            if !names.is_empty() {
                diag.add_error(
                    "reference",
                    &format!(
                        "The following {} have buses which are not defined: {}.",
                        table,
                        join(&names)
                    ),
                );
            }
        };

        report(
            "loads",
            self.loads
                .values()
                .filter(|c| !defined(&c.bus))
                .map(|c| c.name.as_str())
                .collect(),
        );
        report(
            "generators",
            self.generators
                .values()
                .filter(|c| !defined(&c.bus))
                .map(|c| c.name.as_str())
                .collect(),
        );
        report(
            "storage_units",
            self.storage_units
                .values()
                .filter(|c| !defined(&c.bus))
                .map(|c| c.name.as_str())
                .collect(),
        );
        report(
            "lines",
            self.lines
                .values()
                .filter(|l| !defined(&l.bus0) || !defined(&l.bus1))
                .map(|l| l.name.as_str())
                .collect(),
        );
        report(
            "transformers",
            self.transformers
                .values()
                .filter(|t| !defined(&t.bus0) || !defined(&t.bus1))
                .map(|t| t.name.as_str())
                .collect(),
        );
        // the HV side of HV/MV transformers is outside the modelled grid
        report(
            "transformers_hvmv",
            self.transformers_hvmv
                .values()
                .filter(|t| !defined(&t.bus1))
                .map(|t| t.name.as_str())
                .collect(),
        );
        report(
            "switches",
            self.switches
                .values()
                .filter(|s| {
                    !defined(&s.bus_open)
                        || !defined(&s.bus_closed)
                        || !self.lines.contains_key(&s.branch)
                })
                .map(|s| s.name.as_str())
                .collect(),
        );
    }

    fn check_isolation(&self, diag: &mut Diagnostics) {
        let graph = self.to_graph();
        let isolated = graph.isolated_nodes();
        if !isolated.is_empty() {
            diag.add_warning(
                "isolated",
                &format!("The following buses are isolated: {}.", isolated.join(", ")),
            );
        }
        if graph.islands().len() > 1 {
            diag.add_warning("isolated", "The network has isolated nodes or edges.");
        }
    }

    fn check_line_data(&self, diag: &mut Diagnostics, config: &IntegrityConfig) {
        let long: Vec<&str> = self
            .lines
            .values()
            .filter(|l| l.length > config.max_line_length_km)
            .map(|l| l.name.as_str())
            .collect();
        if !long.is_empty() {
            diag.add_warning(
                "line_length",
                &format!("There are lines with very large line lengths: {}.", join(&long)),
            );
        }

        let short: Vec<&str> = self
            .lines
            .values()
            .filter(|l| l.length < config.min_line_length_km)
            .map(|l| l.name.as_str())
            .collect();
        if !short.is_empty() {
            diag.add_warning(
                "line_length",
                &format!("There are lines with very short line lengths: {}.", join(&short)),
            );
        }

        let small: Vec<&str> = self
            .lines
            .values()
            .filter(|l| (l.r * l.r + l.x * l.x).sqrt() < config.min_impedance_ohm)
            .map(|l| l.name.as_str())
            .collect();
        if !small.is_empty() {
            diag.add_warning(
                "impedance",
                &format!(
                    "Very small values for impedance of lines ({}) detected. This might \
                     cause problems in the power flow.",
                    join(&small)
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::IntegrityConfig;
    use crate::synthetic;

    #[test]
    fn undefined_buses_are_reported() {
        let mut topo = synthetic::example_topology();
        topo.loads
            .get_mut("Conventional_Load_LVGrid_1_residential_1")
            .unwrap()
            .bus = "Bus_missing".into();
        topo.lines.get_mut("Line_LVGrid_2_1").unwrap().bus1 = "Bus_missing".into();

        let diag = topo.check_integrity(&IntegrityConfig::default());
        assert!(diag.contains(
            "The following loads have buses which are not defined: \
             Conventional_Load_LVGrid_1_residential_1."
        ));
        assert!(diag.contains("The following lines have buses which are not defined: Line_LVGrid_2_1."));
        assert!(diag.has_errors());
    }

    #[test]
    fn isolated_buses_are_reported() {
        let mut topo = synthetic::example_topology();
        topo.add_bus("Bus_lonely", 20.0, None, None, None).unwrap();
        let diag = topo.check_integrity(&IntegrityConfig::default());
        assert!(diag.contains("The following buses are isolated: Bus_lonely."));
        assert!(diag.contains("The network has isolated nodes or edges."));
    }

    #[test]
    fn duplicate_component_names() {
        let mut topo = synthetic::example_topology();
        let mut generator = topo.generators["Generator_MVGrid_1_wind_1"].clone();
        generator.name = "Conventional_Load_MVGrid_1_industrial_1".into();
        topo.generators.insert(generator.name.clone(), generator);

        let diag = topo.check_integrity(&IntegrityConfig::default());
        assert!(diag.contains("have duplicate entry in one of the following components' dataframes"));
    }

    #[test]
    fn line_data_warnings() {
        let mut topo = synthetic::example_topology();
        topo.lines.get_mut("Line_10001").unwrap().length = 25.0;
        {
            let line = topo.lines.get_mut("Line_LVGrid_1_1").unwrap();
            line.length = 0.0001;
            line.r = 0.0;
            line.x = 0.0;
        }
        let diag = topo.check_integrity(&IntegrityConfig::default());
        assert!(diag.contains("There are lines with very large line lengths: Line_10001."));
        assert!(diag.contains("There are lines with very short line lengths: Line_LVGrid_1_1."));
        assert!(diag.contains("Very small values for impedance of lines (Line_LVGrid_1_1)"));
        assert!(!diag.has_errors());
    }
}
