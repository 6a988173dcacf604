use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

pub const MANIFEST_FILE: &str = "study.json";

/// Part of a [`crate::GridStudy`] that can be saved separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Topology,
    Timeseries,
    Results,
    Electromobility,
    HeatPump,
    OverlyingGrid,
}

impl Part {
    pub const ALL: [Part; 6] = [
        Part::Topology,
        Part::Timeseries,
        Part::Results,
        Part::Electromobility,
        Part::HeatPump,
        Part::OverlyingGrid,
    ];

    /// Subdirectory the part is saved to.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Part::Topology => "topology",
            Part::Timeseries => "timeseries",
            Part::Results => "results",
            Part::Electromobility => "electromobility",
            Part::HeatPump => "heat_pump",
            Part::OverlyingGrid => "overlying_grid",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Part {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Part::ALL
            .into_iter()
            .find(|p| p.dir_name() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown study part '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyManifest {
    pub created_at: DateTime<Utc>,
    pub version: String,
    pub mv_grid_id: u32,
    pub parts: Vec<Part>,
}

pub fn write_manifest(dir: &Path, manifest: &StudyManifest) -> Result<()> {
    let path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(manifest).context("serializing study manifest")?;
    fs::write(&path, json).with_context(|| format!("writing study manifest '{}'", path.display()))
}

pub fn load_manifest(dir: &Path) -> Result<StudyManifest> {
    let path = dir.join(MANIFEST_FILE);
    let file = fs::File::open(&path)
        .with_context(|| format!("opening study manifest '{}'", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("parsing study manifest '{}'", path.display()))
}
