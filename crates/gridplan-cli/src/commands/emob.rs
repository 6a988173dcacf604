use anyhow::Result;
use gridplan::{EmobImportOptions, Part};
use gridplan_cli::EmobCommands;
use gridplan_core::Config;
use gridplan_emob::{ChargingStrategy, DistributionMode};
use tracing::info;

use crate::commands::util::load_study;

pub fn handle(command: &EmobCommands, config: Config) -> Result<()> {
    match command {
        EmobCommands::Integrate {
            input,
            simbev,
            tracbev,
            mode,
            seed,
            strategy,
            out,
        } => {
            let mode: DistributionMode = mode.parse()?;
            let strategy: ChargingStrategy = strategy.parse()?;
            let mut study = load_study(input, config)?;
            // charging follows the simulation calendar unless time series are given
            if input.timeseries.is_none() {
                study.timeseries = Default::default();
            }

            let added = study.import_electromobility(
                simbev,
                tracbev,
                EmobImportOptions { mode, seed: *seed },
            )?;
            if study.timeseries.timeindex.is_empty() {
                if let Some(emob) = &study.electromobility {
                    let index = emob.timeindex();
                    study.set_timeindex(index);
                }
            }
            study.apply_charging_strategy(strategy)?;
            study.save(out, &[Part::Topology, Part::Timeseries, Part::Electromobility])?;

            println!(
                "Integrated {} charging parks ({} strategy), study written to {}",
                added.len(),
                strategy,
                out.display()
            );
            for load in &added {
                info!(load = %load, "charging point");
            }
            Ok(())
        }
    }
}
