use crate::libs::category::{Category, CategoryMap};
use crate::libs::error::QfitError;
use crate::libs::logger::Logger;
use crate::libs::matrix::Matrix;
use crate::libs::table::{FeatureTable, MAPQ_COL};
use itertools::Itertools;
use std::collections::HashSet;

/// A feature matrix with its parallel per-row vectors.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub x: Matrix,
    pub ids: Vec<u64>,
    pub mapq_orig: Vec<f64>,
    pub correct: Option<Vec<bool>>,
    pub columns: Vec<String>,
}

/// Turns feature tables into matrices, remembering per category which
/// columns were selected at training time.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    include_mapq: bool,
    frozen: CategoryMap<Vec<String>>,
}

impl FeatureExtractor {
    /// With `include_mapq`, the aligner's MAPQ is a candidate feature too.
    pub fn new(include_mapq: bool) -> Self {
        Self {
            include_mapq,
            frozen: CategoryMap::new(),
        }
    }

    pub fn frozen_columns(&self, cat: Category) -> Option<&[String]> {
        self.frozen.get(cat).map(|v| v.as_slice())
    }

    /// Extract features from `table`. When `training`, first select and
    /// freeze the category's columns; otherwise reuse the frozen ones.
    pub fn extract(
        &mut self,
        table: &FeatureTable,
        cat: Category,
        training: bool,
        log: &Logger,
    ) -> anyhow::Result<Extracted> {
        if !training {
            return self.extract_frozen(table, cat);
        }
        let labs = self.select_columns(table, cat, log)?;
        let out = extract_columns(table, cat, &labs)?;
        self.frozen.insert(cat, labs);
        Ok(out)
    }

    /// Select and freeze the columns of `cat`. Nothing is frozen if a
    /// selected column holds a non-finite value.
    pub fn freeze(
        &mut self,
        table: &FeatureTable,
        cat: Category,
        log: &Logger,
    ) -> anyhow::Result<&[String]> {
        let labs = self.select_columns(table, cat, log)?;
        for lab in &labs {
            check_finite(table.column(lab).unwrap_or(&[]), cat, lab)?;
        }
        self.frozen.insert(cat, labs);
        Ok(self.frozen.get(cat).map(|v| v.as_slice()).unwrap_or(&[]))
    }

    /// Columns that vary and are not copies of an earlier column.
    fn select_columns(
        &self,
        table: &FeatureTable,
        cat: Category,
        log: &Logger,
    ) -> anyhow::Result<Vec<String>> {
        if self.frozen.contains(cat) {
            return Err(QfitError::AlreadyTrained(cat).into());
        }

        let mut labs: Vec<&str> = table
            .column_names()
            .filter(|name| self.include_mapq || *name != MAPQ_COL)
            .filter(|name| table.column(name).is_some_and(is_varying))
            .collect();

        log.info(format_args!("  Removing duplicate columns"));
        let mut to_remove = HashSet::new();
        for (a, b) in labs.iter().tuple_combinations() {
            if same_values(table.column(a).unwrap_or(&[]), table.column(b).unwrap_or(&[])) {
                to_remove.insert(*b);
            }
        }
        labs.retain(|lab| !to_remove.contains(lab));

        if labs.is_empty() {
            return Err(QfitError::NoFeatureColumns(cat).into());
        }
        log.debug(format_args!("  {} columns: {}", cat, labs.iter().join(",")));

        Ok(labs.into_iter().map(|s| s.to_string()).collect())
    }

    /// Extract using the frozen columns of `cat`, failing on any missing
    /// column or non-finite value.
    pub fn extract_frozen(&self, table: &FeatureTable, cat: Category) -> anyhow::Result<Extracted> {
        let labs = self.frozen.get(cat).ok_or(QfitError::NotTrained(cat))?;
        extract_columns(table, cat, labs)
    }
}

fn extract_columns(table: &FeatureTable, cat: Category, labs: &[String]) -> anyhow::Result<Extracted> {
    let mut cols: Vec<&[f64]> = Vec::with_capacity(labs.len());
    for lab in labs {
        let col = table.column(lab).ok_or_else(|| QfitError::MissingColumn {
            category: cat,
            column: lab.clone(),
        })?;
        check_finite(col, cat, lab)?;
        cols.push(col);
    }

    Ok(Extracted {
        x: Matrix::from_columns(table.nrows(), &cols),
        ids: table.ids().to_vec(),
        mapq_orig: table.mapq().to_vec(),
        correct: table.correct().map(|c| c.to_vec()),
        columns: labs.to_vec(),
    })
}

fn check_finite(col: &[f64], cat: Category, lab: &str) -> Result<(), QfitError> {
    match col.iter().position(|v| !v.is_finite()) {
        Some(row) => Err(QfitError::NonFinite {
            category: cat,
            column: lab.to_string(),
            row,
        }),
        None => Ok(()),
    }
}

// `-0.0 == 0.0`, so signed zeros never make a column vary
fn is_varying(col: &[f64]) -> bool {
    match col.first() {
        Some(first) => col.iter().any(|v| v != first),
        None => false,
    }
}

fn same_values(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}
