use anyhow::{Context, Result};
use gridplan::Part;
use gridplan_algo::{
    AnalyzeMode, AnalyzeOptions, ReinforceMode, ReinforceOptions, TimestepSelection,
    Troubleshooting,
};
use gridplan_cli::{Commands, TimestepArg};
use gridplan_core::Config;
use gridplan_io::ResultsExport;
use tracing::info;

use crate::commands::util::{load_study, print_json};

pub fn handle(command: &Commands, config: Config) -> Result<()> {
    match command {
        Commands::Analyze {
            input,
            mode,
            troubleshooting,
            out,
        } => {
            let mode: AnalyzeMode = mode.parse()?;
            let mut study = load_study(input, config)?;
            let options = AnalyzeOptions {
                troubleshooting: if *troubleshooting {
                    Troubleshooting::iteration()
                } else {
                    Troubleshooting::Off
                },
                ..AnalyzeOptions::default()
            }
            .with_mode(mode);
            info!("Analyzing {} ({})", input.grid.display(), mode);
            let results = study.analyze(&options)?;
            if let Some(dir) = out {
                results
                    .to_csv(dir)
                    .with_context(|| format!("writing results to {}", dir.display()))?;
                results.to_json(&dir.join("summary.json"))?;
                info!("Results written to {}", dir.display());
            }
            print_json(&results.to_json_value()?)
        }
        Commands::Reinforce {
            input,
            mode,
            timesteps,
            max_iterations,
            combined_analysis,
            skip_unresolved,
            out,
        } => {
            let mode = mode
                .as_deref()
                .map(str::parse::<ReinforceMode>)
                .transpose()?;
            let mut study = load_study(input, config)?;
            let options = ReinforceOptions {
                timesteps: match timesteps {
                    TimestepArg::All => TimestepSelection::All,
                    TimestepArg::Snapshot => TimestepSelection::Snapshot,
                    TimestepArg::Reduced => TimestepSelection::Reduced,
                },
                max_while_iterations: *max_iterations,
                combined_analysis: *combined_analysis,
                mode,
                skip_unresolved: *skip_unresolved,
                ..ReinforceOptions::default()
            };
            info!("Reinforcing {}", input.grid.display());
            study.reinforce(&options)?;
            if let Some(dir) = out {
                study.save(dir, &[Part::Topology, Part::Results])?;
                study.results.to_json(&dir.join("summary.json"))?;
                info!("Reinforced grid written to {}", dir.display());
            }
            print_json(&study.results.to_json_value()?)
        }
        other => anyhow::bail!("{other:?} is not an analysis command"),
    }
}
