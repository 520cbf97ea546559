use crate::libs::category::{Category, CategoryMap};
use anyhow::{anyhow, bail, Context};
use indexmap::IndexMap;
use std::io::BufRead;

/// Column holding the alignment identifier
pub const ID_COL: &str = "id";
/// Column holding the ground-truth label, when known
pub const CORRECT_COL: &str = "correct";
/// Column holding the aligner's own MAPQ
pub const MAPQ_COL: &str = "mapq";

/// A chunk of rows of one category's feature table.
///
/// Every column other than `id` and `correct` is numeric and is kept by
/// name in file order; `mapq` is one of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    ids: Vec<u64>,
    correct: Option<Vec<bool>>,
    columns: IndexMap<String, Vec<f64>>,
}

impl FeatureTable {
    pub fn new(
        ids: Vec<u64>,
        correct: Option<Vec<bool>>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> anyhow::Result<Self> {
        let nrows = ids.len();
        if let Some(labels) = &correct {
            if labels.len() != nrows {
                bail!("`{}` has {} rows, expected {}", CORRECT_COL, labels.len(), nrows);
            }
        }
        let mut map = IndexMap::with_capacity(columns.len());
        for (name, values) in columns {
            if name == ID_COL || name == CORRECT_COL {
                bail!("`{}` is a reserved column name", name);
            }
            if values.len() != nrows {
                bail!("`{}` has {} rows, expected {}", name, values.len(), nrows);
            }
            if map.insert(name.clone(), values).is_some() {
                bail!("duplicated column `{}`", name);
            }
        }
        if !map.contains_key(MAPQ_COL) {
            bail!("missing `{}` column", MAPQ_COL);
        }

        Ok(Self {
            ids,
            correct,
            columns: map,
        })
    }

    pub fn nrows(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn mapq(&self) -> &[f64] {
        self.column(MAPQ_COL).unwrap_or(&[])
    }

    pub fn correct(&self) -> Option<&[bool]> {
        self.correct.as_deref()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    /// Numeric column names in file order, `mapq` included.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// Stack chunks row-wise. All chunks must carry the same columns;
    /// labels survive only if every chunk has them.
    pub fn concat(tables: Vec<FeatureTable>) -> anyhow::Result<FeatureTable> {
        let mut iter = tables.into_iter();
        let mut acc = match iter.next() {
            Some(t) => t,
            None => return Ok(FeatureTable::default()),
        };
        for t in iter {
            if !t.columns.keys().eq(acc.columns.keys()) {
                bail!("cannot concatenate tables with different columns");
            }
            acc.ids.extend(t.ids);
            acc.correct = match (acc.correct.take(), t.correct) {
                (Some(mut a), Some(b)) => {
                    a.extend(b);
                    Some(a)
                }
                _ => None,
            };
            for (name, values) in t.columns {
                acc.columns[&name].extend(values);
            }
        }
        Ok(acc)
    }
}

/// Producer of row chunks, one restartable sequence per category.
pub trait TableSource {
    fn has_category(&self, cat: Category) -> bool;

    /// Chunks for `cat` in source order. Each call starts from the beginning.
    fn chunks<'a>(
        &'a self,
        cat: Category,
    ) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<FeatureTable>> + 'a>>;
}

/// Feature tables stored as `<prefix>_<tag>.csv[.gz]`, read `chunk_size`
/// rows at a time.
#[derive(Debug, Clone)]
pub struct CsvTableSource {
    prefix: String,
    chunk_size: usize,
}

impl CsvTableSource {
    pub fn new(prefix: &str, chunk_size: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            chunk_size: chunk_size.max(1),
        }
    }
}

impl TableSource for CsvTableSource {
    fn has_category(&self, cat: Category) -> bool {
        crate::table_path(&self.prefix, cat.short()).is_some()
    }

    fn chunks<'a>(
        &'a self,
        cat: Category,
    ) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<FeatureTable>> + 'a>> {
        let path = crate::table_path(&self.prefix, cat.short())
            .ok_or_else(|| anyhow!("no {} table for prefix {}", cat, self.prefix))?;
        let path = path.to_string_lossy().to_string();
        let chunks = CsvChunks::open(&path, self.chunk_size)?;
        Ok(Box::new(chunks))
    }
}

struct CsvChunks {
    path: String,
    reader: csv::Reader<Box<dyn BufRead>>,
    headers: Vec<String>,
    chunk_size: usize,
    row_no: usize,
    done: bool,
}

impl CsvChunks {
    fn open(path: &str, chunk_size: usize) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(crate::reader(path)?);
        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("reading CSV headers of {}", path))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if !headers.iter().any(|h| h == ID_COL) {
            bail!("{}: missing `{}` column", path, ID_COL);
        }
        if !headers.iter().any(|h| h == MAPQ_COL) {
            bail!("{}: missing `{}` column", path, MAPQ_COL);
        }

        Ok(Self {
            path: path.to_string(),
            reader,
            headers,
            chunk_size,
            row_no: 0,
            done: false,
        })
    }

    fn read_chunk(&mut self) -> anyhow::Result<Option<FeatureTable>> {
        let mut ids = vec![];
        let mut labels: Vec<Option<bool>> = vec![];
        let has_labels = self.headers.iter().any(|h| h == CORRECT_COL);
        let mut columns: Vec<(String, Vec<f64>)> = self
            .headers
            .iter()
            .filter(|h| *h != ID_COL && *h != CORRECT_COL)
            .map(|h| (h.clone(), vec![]))
            .collect();

        let mut record = csv::StringRecord::new();
        while ids.len() < self.chunk_size {
            let more = self
                .reader
                .read_record(&mut record)
                .with_context(|| format!("{}: CSV row {}", self.path, self.row_no + 1))?;
            if !more {
                self.done = true;
                break;
            }
            self.row_no += 1;

            let mut col = 0;
            for (header, field) in self.headers.iter().zip(record.iter()) {
                let field = field.trim();
                if header == ID_COL {
                    let id = field.parse::<u64>().with_context(|| {
                        format!("{}: row {}, `{}`: '{}' is not an id", self.path, self.row_no, header, field)
                    })?;
                    ids.push(id);
                } else if header == CORRECT_COL {
                    labels.push(parse_label(field).with_context(|| {
                        format!("{}: row {}, `{}`", self.path, self.row_no, header)
                    })?);
                } else {
                    let v = field.parse::<f64>().with_context(|| {
                        format!("{}: row {}, `{}`: '{}' is not a number", self.path, self.row_no, header, field)
                    })?;
                    columns[col].1.push(v);
                    col += 1;
                }
            }
        }

        if ids.is_empty() {
            return Ok(None);
        }
        let correct = if has_labels {
            labels.into_iter().collect::<Option<Vec<bool>>>()
        } else {
            None
        };
        FeatureTable::new(ids, correct, columns).map(Some)
    }
}

impl Iterator for CsvChunks {
    type Item = anyhow::Result<FeatureTable>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_chunk() {
            Ok(Some(t)) => Some(Ok(t)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// `1`/`true` and `0`/`false` are labels; `-1` or an empty cell is unknown.
fn parse_label(field: &str) -> anyhow::Result<Option<bool>> {
    match field {
        "1" | "true" | "True" | "T" => Ok(Some(true)),
        "0" | "false" | "False" | "F" => Ok(Some(false)),
        "-1" | "" => Ok(None),
        _ => bail!("'{}' is not a correctness label", field),
    }
}

/// Tables held in memory, already split into chunks.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: CategoryMap<Vec<FeatureTable>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push(&mut self, cat: Category, chunk: FeatureTable) {
        match self.tables.get_mut(cat) {
            Some(chunks) => chunks.push(chunk),
            None => {
                self.tables.insert(cat, vec![chunk]);
            }
        }
    }
}

impl TableSource for MemorySource {
    fn has_category(&self, cat: Category) -> bool {
        self.tables.contains(cat)
    }

    fn chunks<'a>(
        &'a self,
        cat: Category,
    ) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<FeatureTable>> + 'a>> {
        let chunks = self
            .tables
            .get(cat)
            .ok_or_else(|| anyhow!("no {} table in memory", cat))?;
        Ok(Box::new(chunks.iter().cloned().map(Ok)))
    }
}
