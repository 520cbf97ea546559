/// Dense row-major matrix of `f64`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matrix {
    data: Vec<f64>,
    nrows: usize,
    ncols: usize,
}

impl Matrix {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: vec![0.0; nrows * ncols],
            nrows,
            ncols,
        }
    }

    /// Build from row-major data. Panics if the length does not match.
    pub fn from_vec(nrows: usize, ncols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), nrows * ncols, "matrix data has wrong length");
        Self { data, nrows, ncols }
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Self {
        let ncols = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(rows.len() * ncols);
        for row in rows {
            assert_eq!(row.len(), ncols, "ragged rows");
            data.extend_from_slice(row);
        }
        Self {
            data,
            nrows: rows.len(),
            ncols,
        }
    }

    /// Interleave equally long columns into a row-major matrix.
    pub fn from_columns(nrows: usize, columns: &[&[f64]]) -> Self {
        let ncols = columns.len();
        let mut data = Vec::with_capacity(nrows * ncols);
        for i in 0..nrows {
            for col in columns {
                data.push(col[i]);
            }
        }
        Self { data, nrows, ncols }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.ncols..(i + 1) * self.ncols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact(0) panics, so zero-width matrices yield empty rows by hand
        let ncols = self.ncols;
        (0..self.nrows).map(move |i| &self.data[i * ncols..(i + 1) * ncols])
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.ncols + j]
    }

    /// Copy the given rows, in the given order, into a new matrix.
    pub fn select_rows(&self, idx: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(idx.len() * self.ncols);
        for &i in idx {
            data.extend_from_slice(self.row(i));
        }
        Matrix {
            data,
            nrows: idx.len(),
            ncols: self.ncols,
        }
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows().map(|r| r.to_vec()).collect()
    }

    /// Append the rows of `other`. Column counts must agree.
    pub fn append(&mut self, other: &Matrix) {
        if self.nrows == 0 && self.ncols == 0 {
            self.ncols = other.ncols;
        }
        assert_eq!(self.ncols, other.ncols, "column count mismatch");
        self.data.extend_from_slice(&other.data);
        self.nrows += other.nrows;
    }
}
