use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use sensor_graph::{DatasetConfig, GraphBuilder, load_dataset};

fn main() -> Result<()> {
    env_logger::init();

    let Some(config_path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        bail!("usage: sensor-graph <config.json>");
    };

    let config = DatasetConfig::from_file(&config_path)
        .with_context(|| format!("reading config {}", config_path.display()))?;

    let dataset = load_dataset(&config).context("loading dataset")?;
    let similarity = config
        .similarity
        .builder()
        .context("configuring similarity")?;
    let adjacency = similarity.build(&dataset).context("building adjacency")?;
    let adjacency = config
        .similarity
        .post_process()
        .apply(adjacency)
        .context("sparsifying adjacency")?;

    log::info!(
        "{} nodes, {} steps @ {}, {} edges after post-processing",
        dataset.n_nodes(),
        dataset.n_steps(),
        dataset.freq(),
        adjacency.edge_count()
    );

    if let Some(out) = &config.output_path {
        adjacency
            .write_csv(out, dataset.nodes())
            .with_context(|| format!("writing adjacency to {}", out.display()))?;
        log::info!("Wrote adjacency to {}", out.display());
    }

    Ok(())
}
