use clap::*;
use qfit::libs::category::CategoryMap;
use qfit::libs::fit::MapqFit;
use qfit::libs::logger::Logger;
use qfit::libs::predict::{predict, PredictOptions};
use qfit::libs::predictions::{MapqPredictions, PredictionSink};
use qfit::libs::table::CsvTableSource;
use std::path::Path;

use super::path_str;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    let cmd = Command::new("predict")
        .about("Train MAPQ models, then predict MAPQs for new alignments")
        .after_help(
            r###"
Trains on <training-prefix> as `qfit fit` does, then predicts every category
present under <input-prefix>.

Output, per run:
* predictions.csv   - id,mapq for every input alignment
* featimport_<c>.csv, params.csv - as written by `qfit fit`

With --assess-accuracy and labelled input, also:
* roc.csv, roc_orig.csv - cumulative correct/incorrect per MAPQ
* summary.csv           - AUC and Brier score of new and original MAPQs
* top_incorrect.csv     - the incorrect alignments with the highest MAPQ, with
                          their features as <c>_<column>

Notes:
* A category in the input with rows but no training data is an error; empty
  tables are skipped
* Identical feature rows are predicted once unless --no-collapse is given
* --predict-for-training repeats the prediction on the training tables into
  <outdir>/training/, and moves the results for the input to <outdir>/test/
* --keep-per-category also writes results per category into
  <outdir>/<category>/

Examples:
1. Predict:
   qfit predict training input -o out

2. Predict and assess, per category too:
   qfit predict training input -o out --assess-accuracy --keep-per-category

"###,
        )
        .arg(
            Arg::new("training")
                .required(true)
                .index(1)
                .help("Prefix of the training feature tables"),
        )
        .arg(
            Arg::new("input")
                .required(true)
                .index(2)
                .help("Prefix of the feature tables to predict"),
        )
        .arg(
            Arg::new("assess_accuracy")
                .long("assess-accuracy")
                .action(ArgAction::SetTrue)
                .help("Assess predictions against the labels of the input"),
        )
        .arg(
            Arg::new("predict_for_training")
                .long("predict-for-training")
                .action(ArgAction::SetTrue)
                .help("Also predict the training tables"),
        )
        .arg(
            Arg::new("keep_per_category")
                .long("keep-per-category")
                .action(ArgAction::SetTrue)
                .help("Also write results per category"),
        )
        .arg(
            Arg::new("no_collapse")
                .long("no-collapse")
                .action(ArgAction::SetTrue)
                .help("Predict every row, even when feature rows repeat"),
        )
        .arg(
            Arg::new("assess_limit")
                .long("assess-limit")
                .num_args(1)
                .default_value("100000000")
                .value_parser(value_parser!(usize))
                .help("Most alignments kept for assessment"),
        );
    super::training_args(cmd)
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    let training = args.get_one::<String>("training").unwrap();
    let input = args.get_one::<String>("input").unwrap();
    let max_rows = *args.get_one::<usize>("max_rows").unwrap();

    let is_assess = args.get_flag("assess_accuracy");
    let is_training = args.get_flag("predict_for_training");
    let opts = PredictOptions {
        dedup: !args.get_flag("no_collapse"),
        keep_data: is_assess,
        keep_per_category: args.get_flag("keep_per_category"),
        calc_summaries: is_assess,
        assess_limit: *args.get_one::<usize>("assess_limit").unwrap(),
        ..Default::default()
    };

    super::init_threads(args)?;
    let log = Logger::default();

    //----------------------------
    // Ops
    //----------------------------
    for run in super::runs(args)? {
        log.info(format_args!(
            "Run with fraction {}, trial {}, into {}",
            run.fraction,
            run.trial,
            run.dir.display()
        ));
        std::fs::create_dir_all(&run.dir)?;

        let fit = super::train(args, training, &run, &log.scoped("fit"))?;
        super::write_reports(&fit, &run.dir)?;

        let test_dir = if is_training {
            run.dir.join("test")
        } else {
            run.dir.clone()
        };
        let source = CsvTableSource::new(input, max_rows);
        predict_and_write(&fit, &source, &opts, &test_dir, is_assess, &log)?;

        if is_training {
            let source = CsvTableSource::new(training, max_rows);
            let opts = PredictOptions {
                training: true,
                ..opts.clone()
            };
            predict_and_write(&fit, &source, &opts, &run.dir.join("training"), is_assess, &log)?;
        }
    }

    Ok(())
}

fn predict_and_write(
    fit: &MapqFit,
    source: &CsvTableSource,
    opts: &PredictOptions,
    dir: &Path,
    is_assess: bool,
    log: &Logger,
) -> anyhow::Result<()> {
    let mut preds = predict(fit, source, opts, &log.scoped("predict"))?;

    let columns = fit.feature_names();
    write_sink(&mut preds.overall, dir, is_assess, &columns, log)?;
    if let Some(per_category) = preds.per_category.as_mut() {
        for (cat, sink) in per_category.iter_mut() {
            write_sink(sink, &dir.join(cat.long()), is_assess, &columns, log)?;
        }
    }
    Ok(())
}

fn write_sink(
    sink: &mut MapqPredictions,
    dir: &Path,
    is_assess: bool,
    columns: &CategoryMap<Vec<String>>,
    log: &Logger,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    sink.write_predictions(&path_str(&dir.join("predictions.csv")))?;

    if !is_assess {
        return Ok(());
    }
    if !sink.can_assess() {
        log.warn(format_args!(
            "{}: alignments are not labelled, skipping assessment",
            sink.name()
        ));
        return Ok(());
    }
    sink.write_rocs(
        &path_str(&dir.join("roc.csv")),
        &path_str(&dir.join("roc_orig.csv")),
    )?;
    sink.write_summary_measures(&path_str(&dir.join("summary.csv")))?;
    sink.write_top_incorrect(&path_str(&dir.join("top_incorrect.csv")), 50, columns)?;
    log.info(format_args!("Wrote assessment of {} to {}", sink.name(), dir.display()));
    Ok(())
}
