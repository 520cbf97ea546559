use crate::libs::category::{Category, CategoryMap};
use crate::libs::dedup::dedup;
use crate::libs::error::QfitError;
use crate::libs::features::Extracted;
use crate::libs::fit::MapqFit;
use crate::libs::logger::Logger;
use crate::libs::postprocess::{postprocess, PostprocessParams};
use crate::libs::predictions::{MapqPredictions, PredictionBatch, PredictionSink};
use crate::libs::table::TableSource;

/// Knobs of a prediction run.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictOptions {
    /// Predict once per distinct feature row
    pub dedup: bool,
    /// Forward raw feature rows to the sinks
    pub keep_data: bool,
    /// Also collect predictions per category
    pub keep_per_category: bool,
    pub calc_summaries: bool,
    /// Most alignments kept for assessment, per sink
    pub assess_limit: usize,
    /// Predicting for the training data itself; only affects sink names
    pub training: bool,
    pub postprocess: PostprocessParams,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self {
            dedup: true,
            keep_data: false,
            keep_per_category: false,
            calc_summaries: false,
            assess_limit: 100_000_000,
            training: false,
            postprocess: PostprocessParams::default(),
        }
    }
}

/// Sinks filled by [`predict`].
#[derive(Debug)]
pub struct Predictions {
    pub overall: MapqPredictions,
    pub per_category: Option<CategoryMap<MapqPredictions>>,
}

/// Apply the trained models to every chunk of `source`, collecting results
/// in `MapqPredictions` sinks.
pub fn predict(
    fit: &MapqFit,
    source: &dyn TableSource,
    opts: &PredictOptions,
    log: &Logger,
) -> anyhow::Result<Predictions> {
    let suffix = if opts.training { "training" } else { "test" };
    let mut overall = MapqPredictions::new(
        &format!("overall_{}", suffix),
        opts.calc_summaries,
        opts.assess_limit,
    );
    log.info(format_args!("  Created overall predictions sink"));

    let mut per_category = if opts.keep_per_category {
        let mut map = CategoryMap::new();
        for cat in Category::ALL.iter().filter(|c| source.has_category(**c)) {
            let name = format!("{}_{}", cat.long(), suffix);
            map.insert(
                *cat,
                MapqPredictions::new(&name, opts.calc_summaries, opts.assess_limit),
            );
            log.info(format_args!("  Created {} predictions sink", name));
        }
        Some(map)
    } else {
        None
    };

    predict_into(fit, source, opts, &mut overall, per_category.as_mut(), log)?;

    Ok(Predictions {
        overall,
        per_category,
    })
}

/// Stream every chunk of every category through extraction, optional
/// deduplication, the category's model and postprocessing, forwarding each
/// batch to `overall` and to the category's sink in `per_category`.
/// Every sink is finalized once at the end.
pub fn predict_into<S: PredictionSink>(
    fit: &MapqFit,
    source: &dyn TableSource,
    opts: &PredictOptions,
    overall: &mut S,
    mut per_category: Option<&mut CategoryMap<S>>,
    log: &Logger,
) -> anyhow::Result<()> {
    let phase = if opts.training { "training" } else { "test" };

    for cat in Category::ALL {
        if !source.has_category(cat) {
            continue;
        }
        for (nchunk, chunk) in source.chunks(cat)?.enumerate() {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            // only categories with rows need a model
            let model = fit.model(cat).ok_or(QfitError::NotTrained(cat))?;
            log.info(format_args!(
                "  Making predictions for {} {} chunk {}, {} rows",
                phase,
                cat,
                nchunk + 1,
                chunk.nrows()
            ));
            let Extracted {
                x,
                ids,
                mapq_orig,
                correct,
                ..
            } = fit.extractor().extract_frozen(&chunk, cat)?;
            drop(chunk);

            let pcor = if opts.dedup {
                let (uniq, index) = dedup(&x);
                if index.n_rows() > 0 {
                    log.info(format_args!(
                        "    Collapsed {} rows to {} distinct rows ({:.2}%)",
                        index.n_rows(),
                        index.n_unique(),
                        100.0 * index.n_unique() as f64 / index.n_rows() as f64
                    ));
                }
                let pcor = model.predictor.predict(&uniq);
                drop(uniq);
                index.scatter(&pcor)
            } else {
                model.predictor.predict(&x)
            };
            let data = if opts.keep_data {
                Some(x.to_rows())
            } else {
                None
            };
            drop(x);

            let pcor = postprocess(pcor, cat.long(), &opts.postprocess, log);
            let batch = PredictionBatch {
                category: cat,
                pcor,
                ids,
                mapq_orig,
                correct,
                data,
            };
            overall.add(&batch, log)?;
            if let Some(sinks) = per_category.as_mut() {
                if let Some(sink) = sinks.get_mut(cat) {
                    sink.add(&batch, log)?;
                }
            }
        }
    }

    log.info(format_args!("Finalizing results for overall {} data", phase));
    overall.finalize(log)?;
    if let Some(sinks) = per_category {
        for (cat, sink) in sinks.iter_mut() {
            log.info(format_args!("Finalizing results for {} {} data", cat, phase));
            sink.finalize(log)?;
        }
    }
    log.info(format_args!("Done"));
    Ok(())
}
