pub mod fit;
pub mod predict;

use clap::*;
use qfit::libs::error::QfitError;
use qfit::libs::fit::{FitOptions, MapqFit};
use qfit::libs::logger::Logger;
use qfit::libs::model::family_by_name;
use qfit::libs::report::{write_feature_importances, write_parameters};
use qfit::libs::table::CsvTableSource;
use std::path::{Path, PathBuf};

/// Options shared by every subcommand that trains models.
pub fn training_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("outdir")
            .long("outdir")
            .short('o')
            .num_args(1)
            .required(true)
            .help("Output directory"),
    )
    .arg(
        Arg::new("model_family")
            .long("model-family")
            .num_args(1)
            .default_value("ExtraTrees")
            .help("Model family to train: ExtraTrees, RandomForest or logistic"),
    )
    .arg(
        Arg::new("optimization_tolerance")
            .long("optimization-tolerance")
            .num_args(1)
            .default_value("1e-3")
            .value_parser(value_parser!(f64))
            .help("Score gain that counts as much better during the search"),
    )
    .arg(
        Arg::new("subsampling_series")
            .long("subsampling-series")
            .num_args(1)
            .default_value("1.0")
            .help("Comma-separated fractions of training rows to use, one run each"),
    )
    .arg(
        Arg::new("trials")
            .long("trials")
            .num_args(1)
            .default_value("1")
            .value_parser(value_parser!(usize))
            .help("Number of runs per fraction"),
    )
    .arg(
        Arg::new("seed")
            .long("seed")
            .num_args(1)
            .default_value("99099")
            .value_parser(value_parser!(u64))
            .help("Random seed; trial i uses seed + i"),
    )
    .arg(
        Arg::new("model_params")
            .long("model-params")
            .num_args(1)
            .help("Colon-separated hyperparameters; skips the search"),
    )
    .arg(
        Arg::new("reweight_ratio")
            .long("reweight-ratio")
            .num_args(1)
            .default_value("1.0")
            .value_parser(value_parser!(f64))
            .help("Refit with weights in [1/ratio, 1] from a first fit"),
    )
    .arg(
        Arg::new("reweight_mapq")
            .long("reweight-mapq")
            .action(ArgAction::SetTrue)
            .help("Refit with the first fit's MAPQs as weights"),
    )
    .arg(
        Arg::new("no_oob")
            .long("no-oob")
            .action(ArgAction::SetTrue)
            .help("Score candidates by cross-validation even if OOB is available"),
    )
    .arg(
        Arg::new("include_mapq")
            .long("include-mapq")
            .action(ArgAction::SetTrue)
            .help("Offer the aligner's MAPQ to the model as a feature"),
    )
    .arg(
        Arg::new("folds")
            .long("folds")
            .num_args(1)
            .default_value("3")
            .value_parser(value_parser!(usize))
            .help("Cross-validation folds"),
    )
    .arg(
        Arg::new("max_rows")
            .long("max-rows")
            .num_args(1)
            .default_value("500000")
            .value_parser(value_parser!(usize))
            .help("Rows read per chunk"),
    )
    .arg(
        Arg::new("parallel")
            .long("parallel")
            .short('p')
            .num_args(1)
            .default_value("1")
            .value_parser(value_parser!(usize))
            .help("Number of threads for cross-validation"),
    )
}

/// One training run: a subsampling fraction and a trial number.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub fraction: f64,
    pub trial: usize,
    pub dir: PathBuf,
}

/// Every run requested on the command line, each with its own output
/// directory below `--outdir`.
pub fn runs(args: &ArgMatches) -> anyhow::Result<Vec<Run>> {
    let outdir = args.get_one::<String>("outdir").unwrap();
    let series = args.get_one::<String>("subsampling_series").unwrap();
    let trials = *args.get_one::<usize>("trials").unwrap();

    let fractions = series
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<f64>()
                .map_err(|_| anyhow::anyhow!("invalid subsampling fraction: {}", s))
        })
        .collect::<anyhow::Result<Vec<f64>>>()?;

    let mut runs = vec![];
    for fraction in &fractions {
        for trial in 0..trials.max(1) {
            let mut dir = PathBuf::from(outdir);
            if fractions.len() > 1 {
                dir.push(format!("sample{:?}", fraction));
            }
            if trials > 1 {
                dir.push(format!("trial{}", trial));
            }
            runs.push(Run {
                fraction: *fraction,
                trial,
                dir,
            });
        }
    }
    Ok(runs)
}

pub fn fit_options(args: &ArgMatches, run: &Run) -> anyhow::Result<FitOptions> {
    let model_params = match args.get_one::<String>("model_params") {
        Some(s) => Some(parse_params(args.get_one::<String>("model_family").unwrap(), s)?),
        None => None,
    };

    Ok(FitOptions {
        sample_fraction: run.fraction,
        include_mapq: args.get_flag("include_mapq"),
        model_params,
        reweight_ratio: *args.get_one::<f64>("reweight_ratio").unwrap(),
        reweight_mapq: args.get_flag("reweight_mapq"),
        no_oob: args.get_flag("no_oob"),
        folds: *args.get_one::<usize>("folds").unwrap(),
        seed: *args.get_one::<u64>("seed").unwrap() + run.trial as u64,
    })
}

fn parse_params(family: &str, s: &str) -> anyhow::Result<Vec<f64>> {
    s.split(':')
        .map(|p| {
            p.trim().parse::<f64>().map_err(|_| {
                anyhow::Error::from(QfitError::BadModelParams {
                    family: family.to_string(),
                    message: format!("{} is not a number", p),
                })
            })
        })
        .collect()
}

/// Train every category found under `prefix` for one run.
pub fn train(
    args: &ArgMatches,
    prefix: &str,
    run: &Run,
    log: &Logger,
) -> anyhow::Result<MapqFit> {
    let family = args.get_one::<String>("model_family").unwrap();
    let tolerance = *args.get_one::<f64>("optimization_tolerance").unwrap();
    let max_rows = *args.get_one::<usize>("max_rows").unwrap();

    let opts = fit_options(args, run)?;
    let seed = opts.seed;
    let source = CsvTableSource::new(prefix, max_rows);
    let mut fit = MapqFit::new(opts)?;
    fit.train(&source, &|| family_by_name(family, seed, tolerance), log)?;
    Ok(fit)
}

/// Feature importances and hyperparameters of a trained run.
pub fn write_reports(fit: &MapqFit, dir: &Path) -> anyhow::Result<()> {
    write_feature_importances(fit, &path_str(&dir.join("featimport")))?;
    write_parameters(fit, &path_str(&dir.join("params")))?;
    Ok(())
}

pub fn init_threads(args: &ArgMatches) -> anyhow::Result<()> {
    let opt_parallel = *args.get_one::<usize>("parallel").unwrap();
    rayon::ThreadPoolBuilder::new()
        .num_threads(opt_parallel)
        .build_global()?;
    Ok(())
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
