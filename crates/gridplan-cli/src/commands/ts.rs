use anyhow::{Context, Result};
use gridplan_cli::TsCommands;
use gridplan_ts::{parse_frequency, ResampleMethod, TimeSeries};
use tracing::info;

pub fn handle(command: &TsCommands) -> Result<()> {
    match command {
        TsCommands::Resample {
            input,
            freq,
            method,
            out,
        } => {
            let freq = parse_frequency(freq)?;
            let method: ResampleMethod = method.parse()?;
            info!("Resampling {} to {} min", input.display(), freq.num_minutes());
            let mut ts = TimeSeries::from_csv(input)
                .with_context(|| format!("loading time series {}", input.display()))?;
            let before = ts.timeindex.len();
            ts.resample(method, freq)?;
            ts.to_csv(out)
                .with_context(|| format!("writing time series to {}", out.display()))?;
            println!(
                "Resampled {} to {} time steps, written to {}",
                before,
                ts.timeindex.len(),
                out.display()
            );
            Ok(())
        }
    }
}
