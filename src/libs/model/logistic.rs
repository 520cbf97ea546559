use super::{GridSearch, ModelFamily, Params, Predictor};
use crate::libs::error::QfitError;
use crate::libs::matrix::Matrix;
use anyhow::bail;

const LEARNING_RATE: f64 = 0.5;

/// L2-regularised logistic regression on standardised features, fit by
/// full-batch gradient descent.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    l2: f64,
    epochs: usize,
    mean: Vec<f64>,
    scale: Vec<f64>,
    coef: Vec<f64>,
    intercept: f64,
}

impl LogisticRegression {
    pub fn new(l2: f64, epochs: usize) -> Self {
        Self {
            l2,
            epochs,
            mean: vec![],
            scale: vec![],
            coef: vec![],
            intercept: 0.0,
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coef
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    fn margin(&self, row: &[f64]) -> f64 {
        let mut t = self.intercept;
        for (j, v) in row.iter().enumerate() {
            t += self.coef[j] * (v - self.mean[j]) / self.scale[j];
        }
        t
    }
}

fn sigmoid(t: f64) -> f64 {
    if t >= 0.0 {
        1.0 / (1.0 + (-t).exp())
    } else {
        let e = t.exp();
        e / (1.0 + e)
    }
}

impl Predictor for LogisticRegression {
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
        let wsum: f64 = w.iter().sum();

        let mut mean = vec![0.0; p];
        for (row, wi) in x.rows().zip(&w) {
            for j in 0..p {
                mean[j] += wi * row[j];
            }
        }
        mean.iter_mut().for_each(|m| *m /= wsum);

        let mut scale = vec![0.0; p];
        for (row, wi) in x.rows().zip(&w) {
            for j in 0..p {
                scale[j] += wi * (row[j] - mean[j]).powi(2);
            }
        }
        for s in scale.iter_mut() {
            *s = (*s / wsum).sqrt();
            if !(*s > 1e-12) {
                *s = 1.0;
            }
        }

        self.mean = mean;
        self.scale = scale;
        self.coef = vec![0.0; p];
        self.intercept = 0.0;

        let mut grad = vec![0.0; p];
        for _ in 0..self.epochs {
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_b = 0.0;
            for ((row, wi), yi) in x.rows().zip(&w).zip(y) {
                let err = wi * (sigmoid(self.margin(row)) - if *yi { 1.0 } else { 0.0 });
                grad_b += err;
                for j in 0..p {
                    grad[j] += err * (row[j] - self.mean[j]) / self.scale[j];
                }
            }
            self.intercept -= LEARNING_RATE * grad_b / wsum;
            for j in 0..p {
                self.coef[j] -= LEARNING_RATE * (grad[j] / wsum + self.l2 * self.coef[j]);
            }
        }

        Ok(())
    }

    fn predict(&self, x: &Matrix) -> Vec<f64> {
        x.rows().map(|row| sigmoid(self.margin(row))).collect()
    }

    fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.coef.iter().map(|c| c.abs()).sum();
        if total > 0.0 {
            self.coef.iter().map(|c| c.abs() / total).collect()
        } else {
            let k = self.coef.len();
            vec![1.0 / k as f64; k]
        }
    }

    fn fresh(&self) -> Box<dyn Predictor> {
        Box::new(LogisticRegression::new(self.l2, self.epochs))
    }
}

/// Grid search over `[l2_penalty, epochs]`.
#[derive(Debug, Clone)]
pub struct LogisticFamily {
    search: GridSearch,
}

impl LogisticFamily {
    pub fn new(tolerance: f64) -> Self {
        let mut grid = vec![];
        for l2 in [0.0, 0.001, 0.01, 0.1] {
            for epochs in [50.0, 200.0] {
                grid.push(vec![l2, epochs]);
            }
        }
        Self {
            search: GridSearch::new(grid, tolerance),
        }
    }

    fn build(params: &[f64]) -> anyhow::Result<LogisticRegression> {
        let bad = |message: &str| QfitError::BadModelParams {
            family: "logistic".to_string(),
            message: message.to_string(),
        };
        match params {
            [l2, epochs] => {
                if !l2.is_finite() || *l2 < 0.0 {
                    return Err(bad("l2 penalty must be a non-negative number").into());
                }
                if !epochs.is_finite() || *epochs < 1.0 || epochs.fract() != 0.0 {
                    return Err(bad("epochs must be a positive integer").into());
                }
                Ok(LogisticRegression::new(*l2, *epochs as usize))
            }
            _ => Err(bad("expected two parameters, l2_penalty:epochs").into()),
        }
    }
}

impl ModelFamily for LogisticFamily {
    fn name(&self) -> &str {
        "logistic"
    }

    fn next_candidate(&mut self) -> Option<(Params, Box<dyn Predictor>)> {
        let params = self.search.next_params()?;
        let pred = Self::build(&params).ok()?;
        Some((params, Box::new(pred)))
    }

    fn supports_oob(&self) -> bool {
        false
    }

    fn record_score(&mut self, score: f64) -> (bool, bool) {
        self.search.record(score)
    }

    fn best_predictor(&mut self) -> Option<(Params, Box<dyn Predictor>)> {
        let params = self.search.best_params()?.clone();
        let pred = Self::build(&params).ok()?;
        Some((params, Box::new(pred)))
    }

    fn predictor_from_params(&self, params: &[f64]) -> anyhow::Result<Box<dyn Predictor>> {
        Ok(Box::new(Self::build(params)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // label follows the first feature; the second is noise
    fn data() -> (Matrix, Vec<bool>) {
        let mut rows = vec![];
        let mut y = vec![];
        for i in 0..40 {
            let a = i as f64 / 4.0;
            let b = ((i * 7) % 5) as f64;
            rows.push(vec![a, b]);
            y.push(a > 5.0);
        }
        (Matrix::from_rows(&rows), y)
    }

    #[test]
    fn test_fit_predict() {
        let (x, y) = data();
        let mut lr = LogisticRegression::new(0.0, 200);
        lr.fit(&x, &y, None).unwrap();

        let pred = lr.predict(&x);
        let correct = pred.iter().zip(&y).filter(|(p, t)| (**p > 0.5) == **t).count();
        assert!(correct >= 36, "accuracy {} / 40", correct);
        assert!(pred.iter().all(|p| (0.0..=1.0).contains(p)));

        let imp = lr.feature_importances();
        assert_eq!(imp.len(), 2);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_fit_deterministic() {
        let (x, y) = data();
        let mut a = LogisticRegression::new(0.01, 50);
        let mut b = LogisticRegression::new(0.01, 50);
        a.fit(&x, &y, None).unwrap();
        b.fit(&x, &y, Some(&[1.0; 40][..])).unwrap();
        assert_eq!(a.predict(&x), b.predict(&x));
    }

    #[test]
    fn test_zero_weights_fall_back() {
        let (x, y) = data();
        let mut a = LogisticRegression::new(0.0, 50);
        let mut b = LogisticRegression::new(0.0, 50);
        a.fit(&x, &y, None).unwrap();
        b.fit(&x, &y, Some(&[0.0; 40][..])).unwrap();
        assert_eq!(a.coefficients(), b.coefficients());
    }

    #[test]
    fn test_constant_column() {
        let x = Matrix::from_rows(&[vec![1.0, 3.0], vec![2.0, 3.0]]);
        let mut lr = LogisticRegression::new(0.0, 10);
        lr.fit(&x, &[false, true], None).unwrap();
        assert!(lr.predict(&x).iter().all(|p| p.is_finite()));
        assert_eq!(lr.coefficients()[1], 0.0);
    }

    #[test]
    fn test_family() {
        let mut fam = LogisticFamily::new(1e-3);
        assert!(!fam.supports_oob());
        let mut n = 0;
        while let Some((params, _)) = fam.next_candidate() {
            assert_eq!(params.len(), 2);
            fam.record_score(if n == 3 { 0.9 } else { 0.5 });
            n += 1;
        }
        assert_eq!(n, 8);
        let (best, _) = fam.best_predictor().unwrap();
        assert_eq!(best, vec![0.001, 200.0]);

        assert!(fam.predictor_from_params(&[0.1, 20.0]).is_ok());
        assert!(fam.predictor_from_params(&[0.1]).is_err());
        assert!(fam.predictor_from_params(&[0.1, 2.5]).is_err());
        assert!(fam.predictor_from_params(&[-1.0, 2.0]).is_err());
    }
}
