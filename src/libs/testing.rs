//! Synthetic feature tables for unit tests.

use crate::libs::table::FeatureTable;

/// Row `id` of a deterministic table: the alignment is correct when its
/// score beats the second-best score.
pub fn synthetic_row(id: u64) -> (bool, f64, f64, f64) {
    let as_ = -(((id * 37) % 50) as f64);
    let xs = -(((id * 11) % 60) as f64);
    let correct = as_ > xs;
    let mapq = if correct { 40.0 } else { 1.0 };
    (correct, mapq, as_, xs)
}

/// Rows `start..start + n`, with a constant `flag` column.
pub fn synthetic_table(start: u64, n: usize) -> FeatureTable {
    let ids: Vec<u64> = (start..start + n as u64).collect();
    let rows: Vec<_> = ids.iter().map(|id| synthetic_row(*id)).collect();
    FeatureTable::new(
        ids,
        Some(rows.iter().map(|r| r.0).collect()),
        vec![
            ("mapq".to_string(), rows.iter().map(|r| r.1).collect()),
            ("as".to_string(), rows.iter().map(|r| r.2).collect()),
            ("xs".to_string(), rows.iter().map(|r| r.3).collect()),
            ("flag".to_string(), vec![1.0; n]),
        ],
    )
    .unwrap()
}
