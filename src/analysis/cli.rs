//! Command-line front end.

use super::config::Config;
use super::pipeline::{run_concept_stats, run_qualitative, run_quantitative};
use crate::classifier::ClassifierKind;
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "conceptsim",
    version,
    about = "Compare medical-concept and document features for diagnosis classification."
)]
pub struct Cli {
    /// Dataset name; must be listed under `data.datasets`
    #[clap(value_name = "DATASET")]
    pub dataset: String,

    /// Classifier used for the ablation
    #[arg(value_enum, default_value_t = ClassifierKind::Mlp)]
    pub classifier: ClassifierKind,

    /// Configuration file; defaults are used when it does not exist
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Also tabulate the extracted concepts
    #[arg(long)]
    pub concept_stats: bool,

    /// Skip the cross-validated ablation
    #[arg(long)]
    pub skip_quant: bool,

    /// Skip the pairwise similarity analysis
    #[arg(long)]
    pub skip_qual: bool,

    /// Worker threads for model fitting (overrides `runtime.threads`)
    #[arg(long)]
    pub threads: Option<usize>,
}

/// Run every requested stage for `cli.dataset`.
pub fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(threads) = cli.threads {
        config.runtime.threads = threads;
    }
    config.check_dataset(&cli.dataset)?;
    log::info!(
        "Analysing {} with {} ({} worker threads requested)",
        cli.dataset,
        cli.classifier,
        config.runtime.threads
    );

    if cli.concept_stats {
        run_concept_stats(&config, &cli.dataset)?;
    }
    if !cli.skip_quant {
        let pool = config.thread_pool()?;
        run_quantitative(&config, &cli.dataset, cli.classifier, &pool)?;
    }
    if !cli.skip_qual {
        run_qualitative(&config, &cli.dataset)?;
    }
    Ok(())
}
