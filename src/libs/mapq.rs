//! Conversions between probability of correct placement and MAPQ.

/// `-10 * log10(1 - pcor)`. Infinite for a pcor of 1.0.
pub fn pcor_to_mapq(pcor: f64) -> f64 {
    if pcor <= 0.0 {
        return 0.0;
    }
    -10.0 * (1.0 - pcor).log10()
}

pub fn mapq_to_pcor(mapq: f64) -> f64 {
    1.0 - 10f64.powf(-mapq / 10.0)
}

pub fn pcors_to_mapqs(pcor: &[f64]) -> Vec<f64> {
    pcor.iter().map(|p| pcor_to_mapq(*p)).collect()
}
