extern crate clap;
use clap::*;

mod cmd_qfit;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app = Command::new("qfit")
        .version(crate_version!())
        .about("`qfit` - Learn and apply MAPQ models for read alignments")
        .propagate_version(true)
        .arg_required_else_help(true)
        .color(ColorChoice::Auto)
        .subcommand(cmd_qfit::fit::make_subcommand())
        .subcommand(cmd_qfit::predict::make_subcommand())
        .after_help(
            r###"Subcommands:

* fit     - Train one model per alignment category; report features and parameters
* predict - Train, then predict MAPQs for a set of alignments

Feature tables are CSV files named <prefix>_<c>.csv or <prefix>_<c>.csv.gz,
one per alignment category:

* d - Discordant pairs
* b - Bad-end pairs
* c - Concordant pairs
* u - Unpaired reads

Logging is controlled by RUST_LOG, e.g. RUST_LOG=qfit::fit=debug.

"###,
        );

    match app.get_matches().subcommand() {
        Some(("fit", sub_matches)) => cmd_qfit::fit::execute(sub_matches),
        Some(("predict", sub_matches)) => cmd_qfit::predict::execute(sub_matches),
        _ => unreachable!(),
    }?;

    Ok(())
}
