//! Capabilities a model family must provide to the trainer.

use crate::libs::error::QfitError;
use crate::libs::matrix::Matrix;

pub mod forest;
pub mod logistic;

pub use forest::{Forest, ForestFamily, ForestKind};
pub use logistic::{LogisticFamily, LogisticRegression};

/// A hyperparameter vector.
pub type Params = Vec<f64>;

/// A classifier estimating the probability that a row's label is `true`.
pub trait Predictor: Send + Sync {
    /// Fit on `x`/`y`, optionally weighting each row.
    fn fit(&mut self, x: &Matrix, y: &[bool], weights: Option<&[f64]>) -> anyhow::Result<()>;

    /// Probability of the `true` class for every row of `x`.
    fn predict(&self, x: &Matrix) -> Vec<f64>;

    /// One value per training column, in training column order.
    fn feature_importances(&self) -> Vec<f64>;

    /// Out-of-bag accuracy of the last fit, for models that compute one.
    fn oob_score(&self) -> Option<f64> {
        None
    }

    /// An unfitted predictor with the same hyperparameters.
    fn fresh(&self) -> Box<dyn Predictor>;
}

/// A model class together with its hyperparameter search strategy.
pub trait ModelFamily {
    fn name(&self) -> &str;

    /// The next candidate to score, or `None` once the search is exhausted.
    fn next_candidate(&mut self) -> Option<(Params, Box<dyn Predictor>)>;

    fn supports_oob(&self) -> bool;

    /// Feed back the score of the last candidate. Returns whether it beat
    /// the running best, and whether it beat it by more than the tolerance.
    fn record_score(&mut self, score: f64) -> (bool, bool);

    /// The best-scoring hyperparameters and an unfitted predictor for them.
    fn best_predictor(&mut self) -> Option<(Params, Box<dyn Predictor>)>;

    fn predictor_from_params(&self, params: &[f64]) -> anyhow::Result<Box<dyn Predictor>>;
}

/// Bookkeeping for a search over a fixed list of hyperparameter vectors.
#[derive(Debug, Clone)]
pub struct GridSearch {
    grid: Vec<Params>,
    next: usize,
    tolerance: f64,
    best: Option<(usize, f64)>,
}

impl GridSearch {
    pub fn new(grid: Vec<Params>, tolerance: f64) -> Self {
        Self {
            grid,
            next: 0,
            tolerance,
            best: None,
        }
    }

    pub fn next_params(&mut self) -> Option<Params> {
        let params = self.grid.get(self.next).cloned();
        if params.is_some() {
            self.next += 1;
        }
        params
    }

    /// Score the most recently issued parameters.
    pub fn record(&mut self, score: f64) -> (bool, bool) {
        if self.next == 0 || !score.is_finite() {
            return (false, false);
        }
        let idx = self.next - 1;
        match self.best {
            None => {
                self.best = Some((idx, score));
                (true, true)
            }
            Some((_, best)) if score > best => {
                self.best = Some((idx, score));
                (true, score > best + self.tolerance)
            }
            Some(_) => (false, false),
        }
    }

    pub fn best_params(&self) -> Option<&Params> {
        self.best.map(|(idx, _)| &self.grid[idx])
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best.map(|(_, score)| score)
    }
}

/// Look up a model family by its command-line name. `seed` drives the
/// bootstrap samples of the tree ensembles.
pub fn family_by_name(name: &str, seed: u64, tolerance: f64) -> anyhow::Result<Box<dyn ModelFamily>> {
    match name {
        "ExtraTrees" => Ok(Box::new(ForestFamily::new(ForestKind::ExtraTrees, seed, tolerance))),
        "RandomForest" => Ok(Box::new(ForestFamily::new(ForestKind::RandomForest, seed, tolerance))),
        "logistic" => Ok(Box::new(LogisticFamily::new(tolerance))),
        _ => Err(QfitError::UnknownModelFamily(name.to_string()).into()),
    }
}
