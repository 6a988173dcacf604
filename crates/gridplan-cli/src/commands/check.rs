use anyhow::Result;
use gridplan_cli::GridInput;
use gridplan_core::Config;
use std::io::{self, Write};
use tabwriter::TabWriter;

use crate::commands::util::load_study;

pub fn handle(input: &GridInput, config: Config) -> Result<()> {
    let study = load_study(input, config)?;
    let diagnostics = study.check_integrity();

    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "SEVERITY\tCATEGORY\tENTITY\tMESSAGE")?;
    for issue in &diagnostics.issues {
        writeln!(
            writer,
            "{:?}\t{}\t{}\t{}",
            issue.severity,
            issue.category,
            issue.entity.as_deref().unwrap_or("-"),
            issue.message
        )?;
    }
    writer.flush()?;
    println!("Diagnostics: {}", diagnostics.summary());

    if diagnostics.has_errors() {
        anyhow::bail!(
            "{} integrity errors in {}",
            diagnostics.error_count(),
            input.grid.display()
        );
    }
    Ok(())
}
