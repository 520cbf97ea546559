use crate::libs::logger::Logger;

/// Bounds applied to predicted probabilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostprocessParams {
    /// Largest pcor ever emitted; keeps MAPQ finite
    pub ceiling: f64,
    /// Added to the largest unsaturated pcor to replace saturated ones
    pub epsilon: f64,
}

impl Default for PostprocessParams {
    fn default() -> Self {
        Self {
            ceiling: 0.999999,
            epsilon: 1e-6,
        }
    }
}

/// Repair pcors of 1.0, which would turn into infinite MAPQs, and clamp the
/// batch into `[0, ceiling]`.
///
/// Saturated values are moved just above the largest unsaturated value, so
/// they still rank first. A fully saturated batch carries no ranking signal
/// and becomes all `ceiling`.
///
/// ```
/// use qfit::libs::logger::Logger;
/// use qfit::libs::postprocess::{postprocess, PostprocessParams};
///
/// let out = postprocess(vec![1.0, 1.0], "Unpaired", &PostprocessParams::default(), &Logger::default());
/// assert_eq!(out, vec![0.999999, 0.999999]);
/// ```
pub fn postprocess(
    mut pcor: Vec<f64>,
    name: &str,
    params: &PostprocessParams,
    log: &Logger,
) -> Vec<f64> {
    if pcor.is_empty() {
        return pcor;
    }

    let max_unsaturated = pcor
        .iter()
        .copied()
        .filter(|p| *p < 1.0)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))));

    match max_unsaturated {
        None => {
            log.warn(format_args!(
                "All data points for {} are predicted correct; results unreliable",
                name
            ));
            pcor.iter_mut().for_each(|p| *p = params.ceiling);
        }
        Some(m) => {
            for p in pcor.iter_mut() {
                if *p >= 1.0 {
                    *p = m + params.epsilon;
                }
            }
        }
    }

    for p in pcor.iter_mut() {
        *p = p.min(params.ceiling).max(0.0);
    }
    pcor
}
