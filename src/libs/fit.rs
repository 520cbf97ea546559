use crate::libs::category::{Category, CategoryMap};
use crate::libs::error::QfitError;
use crate::libs::features::{Extracted, FeatureExtractor};
use crate::libs::logger::Logger;
use crate::libs::mapq::pcor_to_mapq;
use crate::libs::matrix::Matrix;
use crate::libs::model::{ModelFamily, Params, Predictor};
use crate::libs::postprocess::PostprocessParams;
use crate::libs::table::{FeatureTable, TableSource};
use anyhow::anyhow;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Knobs of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    /// Fraction of training rows actually used, in `(0, 1]`
    pub sample_fraction: f64,
    /// Offer the aligner's MAPQ to the model as a feature
    pub include_mapq: bool,
    /// Fixed hyperparameters; skips the search when set
    pub model_params: Option<Params>,
    /// Refit with weights in `[1/ratio, 1]` derived from a first fit
    pub reweight_ratio: f64,
    /// Refit with the first fit's MAPQs as weights
    pub reweight_mapq: bool,
    /// Score candidates by cross-validation even if the family has OOB scores
    pub no_oob: bool,
    pub folds: usize,
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            sample_fraction: 1.0,
            include_mapq: false,
            model_params: None,
            reweight_ratio: 1.0,
            reweight_mapq: false,
            no_oob: false,
            folds: 3,
            seed: 99099,
        }
    }
}

/// The result of training one category.
pub struct TrainedModel {
    pub predictor: Box<dyn Predictor>,
    /// Hyperparameters joined with `:`
    pub params: String,
    pub columns: Vec<String>,
    /// Rows and columns of the matrix the final model was fit on
    pub shape: (usize, usize),
}

/// Trains one model per category and keeps what prediction needs.
pub struct MapqFit {
    opts: FitOptions,
    family_name: Option<String>,
    extractor: FeatureExtractor,
    models: CategoryMap<TrainedModel>,
    rng: StdRng,
}

impl MapqFit {
    pub fn new(opts: FitOptions) -> anyhow::Result<Self> {
        check_fraction(opts.sample_fraction)?;
        Ok(Self {
            extractor: FeatureExtractor::new(opts.include_mapq),
            family_name: None,
            models: CategoryMap::new(),
            rng: StdRng::seed_from_u64(opts.seed),
            opts,
        })
    }

    pub fn options(&self) -> &FitOptions {
        &self.opts
    }

    /// Name of the model family used, once any category was trained.
    pub fn family_name(&self) -> Option<&str> {
        self.family_name.as_deref()
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn model(&self, cat: Category) -> Option<&TrainedModel> {
        self.models.get(cat)
    }

    pub fn models(&self) -> &CategoryMap<TrainedModel> {
        &self.models
    }

    /// Feature column names of every trained category.
    pub fn feature_names(&self) -> CategoryMap<Vec<String>> {
        let mut names = CategoryMap::new();
        for (cat, model) in self.models.iter() {
            names.insert(cat, model.columns.clone());
        }
        names
    }

    /// Train every category `source` has. `family` makes a fresh model
    /// family for each category.
    pub fn train(
        &mut self,
        source: &dyn TableSource,
        family: &dyn Fn() -> anyhow::Result<Box<dyn ModelFamily>>,
        log: &Logger,
    ) -> anyhow::Result<()> {
        for cat in Category::ALL {
            if !source.has_category(cat) {
                continue;
            }
            let chunks = source.chunks(cat)?.collect::<anyhow::Result<Vec<_>>>()?;
            let train = FeatureTable::concat(chunks)?;
            let mut fam = family()?;
            self.train_category(cat, train, fam.as_mut(), log)?;
        }
        Ok(())
    }

    /// Train the model of one category. An empty table is skipped.
    pub fn train_category(
        &mut self,
        cat: Category,
        train: FeatureTable,
        family: &mut dyn ModelFamily,
        log: &Logger,
    ) -> anyhow::Result<()> {
        if self.models.contains(cat) {
            return Err(QfitError::AlreadyTrained(cat).into());
        }
        if train.is_empty() {
            log.info(format_args!("No {} training records, skipping", cat));
            return Ok(());
        }

        let labels = train.correct().ok_or(QfitError::MissingLabels(cat))?;
        if labels.iter().all_equal() {
            log.warn(format_args!(
                "All {} training data has correct={}. This might mean the simulation is making a \
                 mistake, or that the aligner can resolve the point of origin of every read. \
                 Treat results circumspectly.",
                cat, labels[0] as u8
            ));
        }

        let Extracted {
            x, mapq_orig, correct, columns, ..
        } = self.extractor.extract(&train, cat, true, log)?;
        let nrows = train.nrows();
        drop(train);
        let y = correct.ok_or(QfitError::MissingLabels(cat))?;

        let frac = self.opts.sample_fraction;
        let (x, _mapq_orig, y) = if frac < 1.0 {
            log.info(format_args!(
                "  Sampling {:.2}% of {} rows of {} records",
                100.0 * frac,
                nrows,
                cat
            ));
            let sampled = subsample(x, mapq_orig, y, frac, &mut self.rng)?;
            log.info(format_args!("  Now has {} rows", sampled.0.nrows()));
            sampled
        } else {
            (x, mapq_orig, y)
        };

        log.info(format_args!(
            "Fitting {} {} training records; {} features each",
            x.nrows(),
            cat,
            x.ncols()
        ));
        let shape = x.shape();
        let ratio = self.opts.reweight_ratio;
        let by_mapq = self.opts.reweight_mapq;

        let (mut predictor, params) = match &self.opts.model_params {
            Some(params) => {
                let pred = family.predictor_from_params(params)?;
                log.info(format_args!(
                    "    Using user-specified parameters: {}",
                    join_params(params)
                ));
                (pred, params.clone())
            }
            None => {
                let (pred, params) = self.select_model(family, &x, &y, cat, log)?;
                log.info(format_args!("    Chose parameters: {}", join_params(&params)));
                (pred, params)
            }
        };
        fit_and_reweight(predictor.as_mut(), &x, &y, ratio, by_mapq)?;
        drop(x);
        drop(y);

        self.family_name = Some(family.name().to_string());
        self.models.insert(
            cat,
            TrainedModel {
                predictor,
                params: join_params(&params),
                columns,
                shape,
            },
        );
        log.info(format_args!("    Done training {}", cat));
        Ok(())
    }

    /// Walk the family's candidates, scoring each by OOB or
    /// cross-validation, and return the best.
    fn select_model(
        &self,
        family: &mut dyn ModelFamily,
        x: &Matrix,
        y: &[bool],
        cat: Category,
        log: &Logger,
    ) -> anyhow::Result<(Box<dyn Predictor>, Params)> {
        let use_oob = family.supports_oob() && !self.opts.no_oob;
        let mut best_score = f64::NEG_INFINITY;

        while let Some((params, mut pred)) = family.next_candidate() {
            let score = if use_oob {
                fit_and_reweight(
                    pred.as_mut(),
                    x,
                    y,
                    self.opts.reweight_ratio,
                    self.opts.reweight_mapq,
                )?;
                pred.oob_score()
                    .ok_or_else(|| anyhow!("{}: {} reported no OOB score", cat, family.name()))?
            } else {
                cross_val_score(pred.as_ref(), x, y, self.opts.folds)?
            };
            best_score = best_score.max(score);

            let (better, much_better) = family.record_score(score);
            let symbol = if much_better {
                "*"
            } else if better {
                "+"
            } else {
                ""
            };
            log.debug(format_args!(
                "{}, {}={:.3}, {}{}",
                cat.short(),
                if use_oob { "oob" } else { "score" },
                score,
                join_params(&params),
                symbol
            ));
        }

        let (params, pred) = family
            .best_predictor()
            .ok_or_else(|| QfitError::NoViableCandidate {
                category: cat,
                family: family.name().to_string(),
            })?;
        log.info(format_args!(
            "BEST: {}, avg={:.3}, {}, using {}",
            cat.short(),
            best_score,
            join_params(&params),
            if use_oob { "OOB" } else { "cross validation" }
        ));
        Ok((pred, params))
    }
}

pub fn join_params(params: &[f64]) -> String {
    params.iter().join(":")
}

fn check_fraction(fraction: f64) -> anyhow::Result<()> {
    if fraction > 0.0 && fraction <= 1.0 {
        Ok(())
    } else {
        Err(QfitError::BadFraction(fraction).into())
    }
}

/// Keep `round(fraction * n)` random rows, the same ones in all three
/// inputs and in their original order.
pub fn subsample<R: Rng>(
    x: Matrix,
    mapq_orig: Vec<f64>,
    y: Vec<bool>,
    fraction: f64,
    rng: &mut R,
) -> anyhow::Result<(Matrix, Vec<f64>, Vec<bool>)> {
    check_fraction(fraction)?;
    let n = x.nrows();
    if fraction == 1.0 || n == 0 {
        return Ok((x, mapq_orig, y));
    }

    let k = ((n as f64 * fraction).round() as usize).clamp(1, n);
    let mut idx = rand::seq::index::sample(rng, n, k).into_vec();
    idx.sort_unstable();

    let x = x.select_rows(&idx);
    let mapq_orig = idx.iter().map(|&i| mapq_orig[i]).collect();
    let y = idx.iter().map(|&i| y[i]).collect();
    Ok((x, mapq_orig, y))
}

/// Fit, then optionally refit once with weights derived from the first
/// fit's predictions on the training rows.
pub fn fit_and_reweight(
    pred: &mut dyn Predictor,
    x: &Matrix,
    y: &[bool],
    reweight_ratio: f64,
    reweight_mapq: bool,
) -> anyhow::Result<()> {
    pred.fit(x, y, None)?;
    if reweight_ratio > 1.0 {
        let lower = 1.0 / reweight_ratio;
        let weights: Vec<f64> = pred
            .predict(x)
            .iter()
            .map(|p| lower + p * (1.0 - lower))
            .collect();
        pred.fit(x, y, Some(&weights))?;
    } else if reweight_mapq {
        let ceiling = PostprocessParams::default().ceiling;
        let weights: Vec<f64> = pred
            .predict(x)
            .iter()
            .map(|p| pcor_to_mapq(p.min(ceiling)))
            .collect();
        pred.fit(x, y, Some(&weights))?;
    }
    Ok(())
}

/// Mean accuracy over stratified folds, each scored with a fresh copy of
/// `pred` fit on the remaining folds.
pub fn cross_val_score(
    pred: &dyn Predictor,
    x: &Matrix,
    y: &[bool],
    folds: usize,
) -> anyhow::Result<f64> {
    let n = x.nrows();
    if n < 2 {
        let mut p = pred.fresh();
        p.fit(x, y, None)?;
        return Ok(accuracy(&p.predict(x), y));
    }
    let k = folds.clamp(2, n);

    // deal positives then negatives round-robin into folds
    let mut fold_of = vec![0; n];
    let order = (0..n).filter(|&i| y[i]).chain((0..n).filter(|&i| !y[i]));
    for (c, i) in order.enumerate() {
        fold_of[i] = c % k;
    }

    let scores = (0..k)
        .into_par_iter()
        .map(|f| -> anyhow::Result<f64> {
            let (test, train): (Vec<usize>, Vec<usize>) = (0..n).partition(|&i| fold_of[i] == f);
            let y_train: Vec<bool> = train.iter().map(|&i| y[i]).collect();
            let y_test: Vec<bool> = test.iter().map(|&i| y[i]).collect();

            let mut p = pred.fresh();
            p.fit(&x.select_rows(&train), &y_train, None)?;
            Ok(accuracy(&p.predict(&x.select_rows(&test)), &y_test))
        })
        .collect::<anyhow::Result<Vec<f64>>>()?;

    Ok(scores.iter().sum::<f64>() / scores.len() as f64)
}

fn accuracy(pcor: &[f64], y: &[bool]) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let hits = pcor.iter().zip(y).filter(|(p, t)| (**p > 0.5) == **t).count();
    hits as f64 / y.len() as f64
}
