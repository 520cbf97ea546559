use crate::libs::matrix::Matrix;
use fxhash::FxBuildHasher;
use indexmap::IndexMap;

/// Exact bit patterns of a row, usable as a hash key.
///
/// `0.0` and `-0.0` produce different keys.
pub fn row_key(row: &[f64]) -> Box<[u64]> {
    row.iter().map(|v| v.to_bits()).collect()
}

/// Distinct rows of a matrix and the way back to the original rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupIndex {
    /// Row index of each group's representative, in first-seen order
    pub unique: Vec<usize>,
    /// For every original row, its position in `unique`
    pub inverse: Vec<usize>,
}

impl DedupIndex {
    pub fn n_unique(&self) -> usize {
        self.unique.len()
    }

    pub fn n_rows(&self) -> usize {
        self.inverse.len()
    }

    /// Expand one value per unique row into one value per original row.
    pub fn scatter<T: Copy>(&self, values: &[T]) -> Vec<T> {
        assert_eq!(values.len(), self.unique.len(), "one value per unique row");
        self.inverse.iter().map(|&u| values[u]).collect()
    }
}

/// Group bit-identical rows of `m`.
pub fn dedup_index(m: &Matrix) -> DedupIndex {
    let mut groups: IndexMap<Box<[u64]>, usize, FxBuildHasher> =
        IndexMap::with_capacity_and_hasher(m.nrows(), FxBuildHasher::default());
    let mut inverse = Vec::with_capacity(m.nrows());

    for (i, row) in m.rows().enumerate() {
        let entry = groups.entry(row_key(row));
        inverse.push(entry.index());
        entry.or_insert(i);
    }

    DedupIndex {
        unique: groups.into_values().collect(),
        inverse,
    }
}

/// Collapse `m` to its distinct rows.
pub fn dedup(m: &Matrix) -> (Matrix, DedupIndex) {
    let index = dedup_index(m);
    (m.select_rows(&index.unique), index)
}
