//! Bagged ensembles of classification trees.
//!
//! Every tree is grown on a bootstrap sample of the training rows; the rows a
//! tree never saw give the out-of-bag accuracy used to compare candidates.
//! Random forests pick the best threshold of each candidate feature,
//! extremely randomised trees draw one threshold per feature at random.

use super::{GridSearch, ModelFamily, Params, Predictor};
use crate::libs::error::QfitError;
use crate::libs::matrix::Matrix;
use anyhow::bail;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Sentinel child index of leaves.
const NO_CHILD: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForestKind {
    RandomForest,
    ExtraTrees,
}

impl ForestKind {
    pub fn name(&self) -> &'static str {
        match self {
            ForestKind::RandomForest => "RandomForest",
            ForestKind::ExtraTrees => "ExtraTrees",
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    feature: usize,
    threshold: f64,
    left: u32,
    right: u32,
    /// Weighted fraction of `true` labels reaching the node
    value: f64,
}

impl Node {
    fn leaf(value: f64) -> Self {
        Self {
            feature: 0,
            threshold: 0.0,
            left: NO_CHILD,
            right: NO_CHILD,
            value,
        }
    }

    fn is_leaf(&self) -> bool {
        self.left == NO_CHILD
    }
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut node = &self.nodes[0];
        while !node.is_leaf() {
            let next = if row[node.feature] <= node.threshold {
                node.left
            } else {
                node.right
            };
            node = &self.nodes[next as usize];
        }
        node.value
    }
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Weighted Gini impurity times the node weight.
fn gini_weight(pos: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let p = (pos / total).clamp(0.0, 1.0);
    total * 2.0 * p * (1.0 - p)
}

struct Grower<'a> {
    x: &'a Matrix,
    y: &'a [bool],
    /// Row weights, already multiplied by the bootstrap counts
    w: &'a [f64],
    kind: ForestKind,
    max_depth: usize,
    n_candidates: usize,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl<'a> Grower<'a> {
    fn grow(mut self, rows: Vec<usize>, rng: &mut StdRng) -> (Tree, Vec<f64>) {
        self.nodes.push(Node::leaf(0.0));
        let mut stack = vec![(0usize, rows, 0usize)];

        while let Some((id, rows, depth)) = stack.pop() {
            let (pos, total) = self.totals(&rows);
            self.nodes[id].value = if total > 0.0 { pos / total } else { 0.0 };

            let first = self.y[rows[0]];
            let pure = rows.iter().all(|&i| self.y[i] == first);
            if pure || depth >= self.max_depth || rows.len() < 2 || total <= 0.0 {
                continue;
            }

            let split = match self.best_split(&rows, pos, total, rng) {
                Some(s) => s,
                None => continue,
            };
            let (left, right): (Vec<usize>, Vec<usize>) = rows
                .into_iter()
                .partition(|i| self.x.get(*i, split.feature) <= split.threshold);
            if left.is_empty() || right.is_empty() {
                continue;
            }

            self.importances[split.feature] += split.gain;
            let l = self.nodes.len() as u32;
            self.nodes.push(Node::leaf(0.0));
            self.nodes.push(Node::leaf(0.0));
            let node = &mut self.nodes[id];
            node.feature = split.feature;
            node.threshold = split.threshold;
            node.left = l;
            node.right = l + 1;

            stack.push(((l + 1) as usize, right, depth + 1));
            stack.push((l as usize, left, depth + 1));
        }

        (Tree { nodes: self.nodes }, self.importances)
    }

    fn totals(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(pos, total), &i| {
            let w = self.w[i];
            (if self.y[i] { pos + w } else { pos }, total + w)
        })
    }

    /// Try features in random order until `n_candidates` non-constant ones
    /// were scored and one of them splits.
    fn best_split(&self, rows: &[usize], pos: f64, total: f64, rng: &mut StdRng) -> Option<Split> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(rng);

        let mut best: Option<Split> = None;
        let mut tried = 0;
        for f in features {
            if tried >= self.n_candidates && best.is_some() {
                break;
            }
            let candidate = match self.kind {
                ForestKind::RandomForest => self.best_threshold(rows, f, pos, total),
                ForestKind::ExtraTrees => self.random_threshold(rows, f, pos, total, rng),
            };
            if let Some(c) = candidate {
                tried += 1;
                if best.map_or(true, |b| c.gain > b.gain) {
                    best = Some(c);
                }
            }
        }
        best.filter(|b| b.gain > 0.0)
    }

    fn best_threshold(&self, rows: &[usize], f: usize, pos: f64, total: f64) -> Option<Split> {
        let mut vals: Vec<(f64, bool, f64)> = rows
            .iter()
            .map(|&i| (self.x.get(i, f), self.y[i], self.w[i]))
            .collect();
        vals.sort_by(|a, b| a.0.total_cmp(&b.0));
        if vals[0].0 == vals[vals.len() - 1].0 {
            return None;
        }

        let parent = gini_weight(pos, total);
        let (mut lpos, mut ltotal) = (0.0, 0.0);
        let mut best: Option<Split> = None;
        for k in 0..vals.len() - 1 {
            if vals[k].1 {
                lpos += vals[k].2;
            }
            ltotal += vals[k].2;
            if vals[k].0 == vals[k + 1].0 {
                continue;
            }
            let gain = parent - gini_weight(lpos, ltotal) - gini_weight(pos - lpos, total - ltotal);
            if best.map_or(true, |b| gain > b.gain) {
                best = Some(Split {
                    feature: f,
                    threshold: (vals[k].0 + vals[k + 1].0) / 2.0,
                    gain,
                });
            }
        }
        best
    }

    fn random_threshold(
        &self,
        rows: &[usize],
        f: usize,
        pos: f64,
        total: f64,
        rng: &mut StdRng,
    ) -> Option<Split> {
        let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
            let v = self.x.get(i, f);
            (lo.min(v), hi.max(v))
        });
        if lo >= hi {
            return None;
        }

        let threshold = rng.gen_range(lo..hi);
        let (mut lpos, mut ltotal) = (0.0, 0.0);
        for &i in rows {
            if self.x.get(i, f) <= threshold {
                if self.y[i] {
                    lpos += self.w[i];
                }
                ltotal += self.w[i];
            }
        }
        let gain = gini_weight(pos, total)
            - gini_weight(lpos, ltotal)
            - gini_weight(pos - lpos, total - ltotal);
        Some(Split {
            feature: f,
            threshold,
            gain,
        })
    }
}

/// An ensemble of trees grown on bootstrap samples; predicts the mean of the
/// trees' leaf probabilities.
#[derive(Debug, Clone)]
pub struct Forest {
    kind: ForestKind,
    n_trees: usize,
    max_depth: usize,
    /// Fraction of the columns considered at each split
    max_features: f64,
    seed: u64,
    trees: Vec<Tree>,
    importances: Vec<f64>,
    oob: Option<f64>,
}

impl Forest {
    pub fn new(kind: ForestKind, n_trees: usize, max_depth: usize, max_features: f64, seed: u64) -> Self {
        Self {
            kind,
            n_trees,
            max_depth,
            max_features,
            seed,
            trees: vec![],
            importances: vec![],
            oob: None,
        }
    }

    pub fn kind(&self) -> ForestKind {
        self.kind
    }

    /// Number of fitted trees.
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

impl Predictor for Forest {
    fn fit(&mut self, x: &Matrix, y: &[bool], weights: Option<&[f64]>) -> anyhow::Result<()> {
        let (n, p) = x.shape();
        if n == 0 {
            bail!("cannot fit on an empty matrix");
        }
        if y.len() != n {
            bail!("{} labels for {} rows", y.len(), n);
        }

        // unusable weights fall back to uniform ones
        let w: Vec<f64> = match weights {
            Some(w)
                if w.len() == n
                    && w.iter().all(|v| v.is_finite() && *v >= 0.0)
                    && w.iter().sum::<f64>() > 0.0 =>
            {
                w.to_vec()
            }
            _ => vec![1.0; n],
        };

        let kind = self.kind;
        let max_depth = self.max_depth;
        let seed = self.seed;
        let n_candidates = ((self.max_features * p as f64).ceil() as usize).clamp(1, p.max(1));

        let grown: Vec<(Tree, Vec<f64>, Vec<bool>)> = (0..self.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let mut counts = vec![0u32; n];
                for _ in 0..n {
                    counts[rng.gen_range(0..n)] += 1;
                }
                let rows: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();
                let tw: Vec<f64> = counts.iter().zip(&w).map(|(c, wi)| *c as f64 * wi).collect();

                let grower = Grower {
                    x,
                    y,
                    w: &tw,
                    kind,
                    max_depth,
                    n_candidates,
                    nodes: vec![],
                    importances: vec![0.0; p],
                };
                let (tree, imp) = grower.grow(rows, &mut rng);
                (tree, imp, counts.iter().map(|c| *c > 0).collect())
            })
            .collect();

        // out-of-bag votes
        let mut sum = vec![0.0; n];
        let mut votes = vec![0usize; n];
        for (tree, _, in_bag) in &grown {
            for i in (0..n).filter(|&i| !in_bag[i]) {
                sum[i] += tree.predict_row(x.row(i));
                votes[i] += 1;
            }
        }
        let scored: Vec<usize> = (0..n).filter(|&i| votes[i] > 0).collect();
        let hits = scored
            .iter()
            .filter(|&&i| (sum[i] / votes[i] as f64 > 0.5) == y[i])
            .count();
        self.oob = if scored.is_empty() {
            Some(0.0)
        } else {
            Some(hits as f64 / scored.len() as f64)
        };

        let mut importances = vec![0.0; p];
        for (_, imp, _) in &grown {
            let total: f64 = imp.iter().sum();
            if total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(imp) {
                    *acc += v / total;
                }
            }
        }
        let total: f64 = importances.iter().sum();
        self.importances = if total > 0.0 {
            importances.iter().map(|v| v / total).collect()
        } else {
            vec![1.0 / p.max(1) as f64; p]
        };
        self.trees = grown.into_iter().map(|(tree, _, _)| tree).collect();

        Ok(())
    }

    fn predict(&self, x: &Matrix) -> Vec<f64> {
        let k = self.trees.len().max(1) as f64;
        x.rows()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / k)
            .collect()
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.importances.clone()
    }

    /// Accuracy over the rows left out of at least one bootstrap sample;
    /// 0 when every row was drawn by every tree.
    fn oob_score(&self) -> Option<f64> {
        self.oob
    }

    fn fresh(&self) -> Box<dyn Predictor> {
        Box::new(Forest::new(
            self.kind,
            self.n_trees,
            self.max_depth,
            self.max_features,
            self.seed,
        ))
    }
}

/// Grid search over `[n_trees, max_depth, max_features]`, scored out of bag.
#[derive(Debug, Clone)]
pub struct ForestFamily {
    kind: ForestKind,
    seed: u64,
    search: GridSearch,
}

impl ForestFamily {
    pub fn new(kind: ForestKind, seed: u64, tolerance: f64) -> Self {
        let mut grid = vec![];
        for n_trees in [15.0, 30.0] {
            for max_depth in [6.0, 12.0, 24.0] {
                for max_features in [0.5, 1.0] {
                    grid.push(vec![n_trees, max_depth, max_features]);
                }
            }
        }
        Self {
            kind,
            seed,
            search: GridSearch::new(grid, tolerance),
        }
    }

    fn build(&self, params: &[f64]) -> anyhow::Result<Forest> {
        let bad = |message: &str| QfitError::BadModelParams {
            family: self.kind.name().to_string(),
            message: message.to_string(),
        };
        let whole = |v: &f64| v.is_finite() && *v >= 1.0 && v.fract() == 0.0;
        match params {
            [n_trees, max_depth, max_features] => {
                if !whole(n_trees) {
                    return Err(bad("n_trees must be a positive integer").into());
                }
                if !whole(max_depth) {
                    return Err(bad("max_depth must be a positive integer").into());
                }
                if !(*max_features > 0.0 && *max_features <= 1.0) {
                    return Err(bad("max_features must lie in (0, 1]").into());
                }
                Ok(Forest::new(
                    self.kind,
                    *n_trees as usize,
                    *max_depth as usize,
                    *max_features,
                    self.seed,
                ))
            }
            _ => Err(bad("expected three parameters, n_trees:max_depth:max_features").into()),
        }
    }
}

impl ModelFamily for ForestFamily {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn next_candidate(&mut self) -> Option<(Params, Box<dyn Predictor>)> {
        let params = self.search.next_params()?;
        let pred = self.build(&params).ok()?;
        Some((params, Box::new(pred)))
    }

    fn supports_oob(&self) -> bool {
        true
    }

    fn record_score(&mut self, score: f64) -> (bool, bool) {
        self.search.record(score)
    }

    fn best_predictor(&mut self) -> Option<(Params, Box<dyn Predictor>)> {
        let params = self.search.best_params()?.clone();
        let pred = self.build(&params).ok()?;
        Some((params, Box::new(pred)))
    }

    fn predictor_from_params(&self, params: &[f64]) -> anyhow::Result<Box<dyn Predictor>> {
        Ok(Box::new(self.build(params)?))
    }
}
