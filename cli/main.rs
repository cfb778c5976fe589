#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::Parser;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use smchet::challenge::{ErrorLog, run_batch, score_challenge, verify_challenge};
use smchet::config::{ScoringOptions, load_prediction_config, load_truth_config};
use smchet::normalize::CombinationPlan;
use smchet::telemetry::checkpoint;
use smchet::types::{ChallengeOutcome, Subchallenge};

#[derive(Parser)]
#[command(
    name = "smchet",
    version,
    about = "Score tumour subclonal reconstructions against ground truth",
    long_about = "Validates and scores SMC-Het subchallenge submissions (1A-3B). Matrix \
                 subchallenges are normalised so that the truth scores 1 and the worse of \
                 the one-cluster / one-cluster-per-mutation baselines scores 0."
)]
struct Cli {
    /// Subchallenge to score (1A, 1B, 1C, 2A, 2B, 3A or 3B)
    #[arg(short = 'c', long)]
    challenge: Option<Subchallenge>,

    /// Prediction file(s), in the order the subchallenge expects
    #[arg(long, num_args = 1..)]
    predfiles: Vec<PathBuf>,

    /// Truth file(s), matching --predfiles
    #[arg(long, num_args = 0..)]
    truthfiles: Vec<PathBuf>,

    /// VCF listing the mutations; lines ending in True are true positives
    #[arg(long)]
    vcf: Option<PathBuf>,

    /// Where to write the JSON results
    #[arg(short = 'o', long)]
    outputfile: PathBuf,

    /// Only verify the prediction files
    #[arg(short = 'v')]
    verify: bool,

    /// TOML file with scoring options
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON-lines file mapping challenge ids to prediction files
    #[arg(long, requires = "truth_config")]
    pred_config: Option<PathBuf>,

    /// JSON-lines file mapping challenge ids to their VCF and truth files
    #[arg(long, requires = "pred_config")]
    truth_config: Option<PathBuf>,

    /// Accepted for compatibility; scoring is always exact
    #[arg(long, hide = true)]
    approx: bool,
}

fn load_options(path: Option<&PathBuf>) -> Result<ScoringOptions, Box<dyn std::error::Error>> {
    let options = match path {
        Some(path) => ScoringOptions::load(path)?,
        None => ScoringOptions::default(),
    };
    // Surface configuration mistakes before any file is read.
    options.sc2_metrics()?;
    CombinationPlan::from_options(&options)?;
    Ok(options)
}

fn run(cli: Cli, errors: &mut ErrorLog) -> Result<(), Box<dyn std::error::Error>> {
    if cli.approx {
        log::info!("--approx has no effect; scores are computed exactly");
    }
    let options = load_options(cli.config.as_ref())?;

    let results: BTreeMap<String, ChallengeOutcome> =
        match (&cli.pred_config, &cli.truth_config) {
            (Some(pred_config), Some(truth_config)) => {
                let predictions = load_prediction_config(pred_config)?;
                let truths = load_truth_config(truth_config)?;
                log::info!(
                    "Batch run over {} prediction entries",
                    predictions.len()
                );
                run_batch(&predictions, &truths, cli.verify, &options, errors)
            }
            _ => {
                let challenge = cli
                    .challenge
                    .ok_or("--challenge is required unless --pred-config and --truth-config are given")?;
                let outcome = if cli.verify {
                    verify_challenge(challenge, &cli.predfiles, cli.vcf.as_deref(), errors)
                } else {
                    score_challenge(
                        challenge,
                        &cli.predfiles,
                        &cli.truthfiles,
                        cli.vcf.as_deref(),
                        &options,
                        errors,
                    )
                };
                BTreeMap::from([(challenge.id().to_string(), outcome)])
            }
        };

    fs::write(&cli.outputfile, serde_json::to_string(&results)?)?;
    log::info!("Results written to {}", cli.outputfile.display());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let started = Instant::now();
    let cli = Cli::parse();
    let mut errors = ErrorLog::new();

    let result = run(cli, &mut errors);
    checkpoint("DONE");
    log::info!("run took {:.2} seconds!", started.elapsed().as_secs_f64());

    for message in errors.messages() {
        println!("{message}");
    }
    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
    if !errors.is_empty() {
        eprintln!("Errors encountered. See the messages above; results of any successful evaluations are in the output file.");
        process::exit(1);
    }
}
