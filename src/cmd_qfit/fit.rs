use clap::*;
use qfit::libs::logger::Logger;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    let cmd = Command::new("fit")
        .about("Train MAPQ models and report feature importances")
        .after_help(
            r###"
Trains one model per alignment category present under <training-prefix>.

Output, per run:
* featimport_<c>.csv - feature,importance,rank for each trained category
* params.csv         - model family, fraction and chosen hyperparameters

Notes:
* Training tables need a `correct` column with 1/0 labels
* Model families and their --model-params:
    * ExtraTrees, RandomForest - n_trees:max_depth:max_features, e.g. `30:12:0.5`
    * logistic                 - l2_penalty:epochs, e.g. `0.01:200`
* Tree ensembles pick hyperparameters by out-of-bag accuracy, unless --no-oob
  asks for cross-validation; logistic always cross-validates
* --model-params skips the hyperparameter search
* Several --subsampling-series fractions write into <outdir>/sample<fraction>/
* --trials > 1 writes into .../trial<i>/

Examples:
1. Search hyperparameters and report:
   qfit fit training -o out

2. Fixed hyperparameters on half of the training rows:
   qfit fit training -o out --model-params 30:12:0.5 --subsampling-series 0.5

3. Logistic regression:
   qfit fit training -o out --model-family logistic

"###,
        )
        .arg(
            Arg::new("training")
                .required(true)
                .index(1)
                .help("Prefix of the training feature tables"),
        );
    super::training_args(cmd)
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    let training = args.get_one::<String>("training").unwrap();
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
    }

    Ok(())
}
