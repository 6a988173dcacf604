use anyhow::{Context, Result};
use gridplan::GridStudy;
use gridplan_cli::GridInput;
use gridplan_core::{Case, Config};
use gridplan_ts::TimeSeries;
use rayon::ThreadPoolBuilder;
use std::path::Path;
use tracing::info;

pub fn configure_threads(spec: &str) {
    let count = if spec.eq_ignore_ascii_case("auto") {
        num_cpus::get()
    } else {
        spec.parse().unwrap_or_else(|_| num_cpus::get())
    };
    let _ = ThreadPoolBuilder::new().num_threads(count).build_global();
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Grid with the given time series, or both worst cases without.
pub fn load_study(input: &GridInput, config: Config) -> Result<GridStudy> {
    let mut study = GridStudy::from_csv_dir(&input.grid, config)
        .with_context(|| format!("loading grid {}", input.grid.display()))?;
    match &input.timeseries {
        Some(dir) => {
            study.timeseries = TimeSeries::from_csv(dir)
                .with_context(|| format!("loading time series {}", dir.display()))?;
            info!(timesteps = study.timeseries.timeindex.len(), "loaded time series");
        }
        None => {
            study.set_time_series_worst_case_analysis(&[Case::LoadCase, Case::FeedInCase])?;
            info!("no time series given, using worst cases");
        }
    }
    Ok(study)
}

pub fn print_json(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| anyhow::anyhow!("serializing output to JSON: {err}"))?;
    println!("{text}");
    Ok(())
}
