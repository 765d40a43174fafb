use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use mscluster::algorithm::similarity::SimilarityKind;
use mscluster_tool::config::ToolConfig;
use mscluster_tool::pipeline::run_clustering;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SimilarityArg {
    Jaccard,
    JaccardLsh,
    CombinedFisher,
}

impl From<SimilarityArg> for SimilarityKind {
    fn from(arg: SimilarityArg) -> Self {
        match arg {
            SimilarityArg::Jaccard => SimilarityKind::Jaccard,
            SimilarityArg::JaccardLsh => SimilarityKind::JaccardLsh,
            SimilarityArg::CombinedFisher => SimilarityKind::CombinedFisher,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mscluster")]
#[command(about = "Greedy clustering of tandem mass spectra")]
struct Args {
    /// JSON spectrum files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// MSP file the consensus spectra are written to
    #[arg(short, long)]
    output: PathBuf,

    /// JSON configuration file, command line options take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Precursor tolerance in integer m/z space
    #[arg(short = 'p', long)]
    precursor_tolerance: Option<i32>,

    /// Threshold of the first round
    #[arg(short = 's', long)]
    threshold_start: Option<f64>,

    /// Threshold of the last round
    #[arg(short = 'e', long)]
    threshold_end: Option<f64>,

    /// Number of clustering rounds
    #[arg(short = 'r', long)]
    rounds: Option<usize>,

    /// Worker threads, 0 uses all cores
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Cluster spectra regardless of their precursor charge
    #[arg(long)]
    ignore_charge: bool,

    #[arg(long, value_enum)]
    similarity: Option<SimilarityArg>,

    /// Fragment bin width in Th
    #[arg(long)]
    fragment_bin_width: Option<f64>,
}

impl Args {
    fn apply(&self, config: &mut ToolConfig) {
        let params = &mut config.clustering;
        if let Some(tolerance) = self.precursor_tolerance {
            params.precursor_tolerance = tolerance;
        }
        if let Some(start) = self.threshold_start {
            params.threshold_start = start;
        }
        if let Some(end) = self.threshold_end {
            params.threshold_end = end;
        }
        if let Some(rounds) = self.rounds {
            params.rounds = rounds;
        }
        if let Some(threads) = self.threads {
            params.n_threads = threads;
        }
        if self.ignore_charge {
            params.ignore_charge = true;
        }
        if let Some(similarity) = self.similarity {
            params.similarity = similarity.into();
        }
        if let Some(width) = self.fragment_bin_width {
            config.conversion.fragment_bin_width = width;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ToolConfig::from_json_file(path)?,
        None => ToolConfig::default(),
    };
    args.apply(&mut config);

    let params = &config.clustering;
    log::info!(
        "Precursor tolerance {}, thresholds {} - {} in {} rounds, similarity {:?}",
        params.precursor_tolerance,
        params.threshold_start,
        params.threshold_end,
        params.rounds,
        params.similarity
    );

    let summary = run_clustering(&config, &args.inputs, &args.output)?;
    println!(
        "Clustered {} spectra into {} clusters, result written to {}",
        summary.spectra,
        summary.clusters,
        args.output.display()
    );

    Ok(())
}
