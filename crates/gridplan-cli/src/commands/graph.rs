use anyhow::{Context, Result};
use gridplan_cli::GraphCommands;
use gridplan_io::import_topology;
use tracing::info;

pub fn handle(command: &GraphCommands) -> Result<()> {
    match command {
        GraphCommands::Stats { grid } => {
            info!("Displaying graph statistics for {}", grid.display());
            let imported = import_topology(grid, &Default::default())
                .with_context(|| format!("loading grid {}", grid.display()))?;
            let stats = imported.topology.to_graph().stats();
            println!("Graph statistics for {}:", grid.display());
            println!("  Nodes         : {}", stats.node_count);
            println!("  Edges         : {}", stats.edge_count);
            println!("  Components    : {}", stats.connected_components);
            println!(
                "  Degree [min/avg/max]: {}/{:.2}/{}",
                stats.min_degree, stats.avg_degree, stats.max_degree
            );
            println!("  Density       : {:.4}", stats.density);
            println!("  LV grids      : {}", imported.topology.lv_grid_ids().len());
            Ok(())
        }
    }
}
