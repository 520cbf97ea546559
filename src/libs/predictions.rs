use crate::libs::category::{Category, CategoryMap};
use crate::libs::logger::Logger;
use crate::libs::mapq::{mapq_to_pcor, pcor_to_mapq};
use itertools::Itertools;
use std::io::Write;

/// Predictions for one chunk, parallel vectors by row.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionBatch {
    pub category: Category,
    pub pcor: Vec<f64>,
    pub ids: Vec<u64>,
    pub mapq_orig: Vec<f64>,
    pub correct: Option<Vec<bool>>,
    /// Raw feature rows, when requested
    pub data: Option<Vec<Vec<f64>>>,
}

impl PredictionBatch {
    pub fn len(&self) -> usize {
        self.pcor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcor.is_empty()
    }
}

/// Receiver of prediction batches.
pub trait PredictionSink {
    fn add(&mut self, batch: &PredictionBatch, log: &Logger) -> anyhow::Result<()>;

    /// Called once after the last batch.
    fn finalize(&mut self, log: &Logger) -> anyhow::Result<()>;

    /// Whether ground truth is known for everything added.
    fn can_assess(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub id: u64,
    pub pcor: f64,
    pub category: Category,
    pub mapq_orig: f64,
    pub correct: Option<bool>,
    pub data: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderedBy {
    Unordered,
    Pcor,
    Id,
}

/// Accuracy of the new and the original MAPQs over the assessed alignments.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub n: usize,
    pub n_correct: usize,
    pub n_incorrect: usize,
    pub auc: Option<f64>,
    pub auc_orig: Option<f64>,
    pub brier: f64,
    pub brier_orig: f64,
}

/// Collects predictions for export and, optionally, assessment.
#[derive(Debug, Clone)]
pub struct MapqPredictions {
    name: String,
    calc_summaries: bool,
    limit: usize,
    preds: Vec<(u64, f64)>,
    records: Vec<PredictionRecord>,
    labelled: bool,
    truncated: bool,
    ordered_by: OrderedBy,
    summary: Option<Summary>,
    finalized: bool,
}

impl MapqPredictions {
    /// `limit` caps how many alignments are kept for assessment.
    pub fn new(name: &str, calc_summaries: bool, limit: usize) -> Self {
        Self {
            name: name.to_string(),
            calc_summaries,
            limit,
            preds: vec![],
            records: vec![],
            labelled: true,
            truncated: false,
            ordered_by: OrderedBy::Unordered,
            summary: None,
            finalized: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.preds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }

    /// `(id, pcor)` of every alignment added, in the current order.
    pub fn pcors(&self) -> &[(u64, f64)] {
        &self.preds
    }

    /// Alignments kept for assessment.
    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }

    pub fn ordered_by(&self) -> OrderedBy {
        self.ordered_by
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn order_by_ids(&mut self) {
        self.preds.sort_by_key(|p| p.0);
        self.records.sort_by_key(|r| r.id);
        self.ordered_by = OrderedBy::Id;
    }

    /// Highest pcor first; ties by id.
    pub fn order_by_pcor(&mut self) {
        self.preds
            .sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        self.records
            .sort_by(|a, b| b.pcor.total_cmp(&a.pcor).then(a.id.cmp(&b.id)));
        self.ordered_by = OrderedBy::Pcor;
    }

    /// `id,mapq` for every alignment, in id order.
    pub fn write_predictions(&mut self, outfile: &str) -> anyhow::Result<()> {
        self.order_by_ids();
        let mut writer = crate::writer(outfile)?;
        writer.write_fmt(format_args!("id,mapq\n"))?;
        for (id, pcor) in &self.preds {
            writer.write_fmt(format_args!("{},{:.3}\n", id, pcor_to_mapq(*pcor)))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_summary_measures(&self, outfile: &str) -> anyhow::Result<()> {
        let summary = match &self.summary {
            Some(s) => s,
            None => anyhow::bail!("{}: no summary measures, was the sink finalized?", self.name),
        };
        let fmt_auc = |v: Option<f64>| v.map_or("NA".to_string(), |v| format!("{:.6}", v));

        let mut writer = crate::writer(outfile)?;
        writer.write_fmt(format_args!(
            "name,n,n_correct,n_incorrect,auc,auc_orig,brier,brier_orig\n"
        ))?;
        writer.write_fmt(format_args!(
            "{},{},{},{},{},{},{:.6},{:.6}\n",
            self.name,
            summary.n,
            summary.n_correct,
            summary.n_incorrect,
            fmt_auc(summary.auc),
            fmt_auc(summary.auc_orig),
            summary.brier,
            summary.brier_orig
        ))?;
        writer.flush()?;
        Ok(())
    }

    /// The `n` incorrect alignments with the highest pcor. Feature values
    /// go in one block per category, headed `<c>_<column>` from `columns`;
    /// rows leave the blocks of other categories empty.
    pub fn write_top_incorrect(
        &self,
        outfile: &str,
        n: usize,
        columns: &CategoryMap<Vec<String>>,
    ) -> anyhow::Result<()> {
        let mut top: Vec<&PredictionRecord> = self
            .records
            .iter()
            .filter(|r| r.correct == Some(false))
            .collect();
        top.sort_by(|a, b| b.pcor.total_cmp(&a.pcor).then(a.id.cmp(&b.id)));
        top.truncate(n);

        let mut blocks: Vec<(Category, &[String])> = vec![];
        for cat in Category::ALL {
            if !top.iter().any(|r| r.category == cat && r.data.is_some()) {
                continue;
            }
            let names = columns
                .get(cat)
                .ok_or_else(|| anyhow::anyhow!("{}: no feature names for {}", self.name, cat))?;
            blocks.push((cat, names.as_slice()));
        }

        let mut writer = crate::writer(outfile)?;
        let mut header = "id,category,pcor,mapq,mapq_orig".to_string();
        for (cat, names) in &blocks {
            for name in names.iter() {
                header += &format!(",{}_{}", cat.short(), name);
            }
        }
        writer.write_fmt(format_args!("{}\n", header))?;
        for r in top {
            let mut line = format!(
                "{},{},{:.6},{:.3},{}",
                r.id,
                r.category.short(),
                r.pcor,
                pcor_to_mapq(r.pcor),
                r.mapq_orig
            );
            for (cat, names) in &blocks {
                match &r.data {
                    Some(data) if r.category == *cat => {
                        if data.len() != names.len() {
                            anyhow::bail!(
                                "{}: alignment {} has {} features, {} has {} columns",
                                self.name,
                                r.id,
                                data.len(),
                                cat,
                                names.len()
                            );
                        }
                        line += &format!(",{}", data.iter().join(","));
                    }
                    _ => line += &",".repeat(names.len()),
                }
            }
            writer.write_fmt(format_args!("{}\n", line))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Cumulative correct/incorrect counts per distinct MAPQ, high to low,
    /// for the new (`roc_file`) and the original (`roc_orig_file`) MAPQs.
    pub fn write_rocs(&self, roc_file: &str, roc_orig_file: &str) -> anyhow::Result<()> {
        let new: Vec<(f64, bool)> = self
            .records
            .iter()
            .filter_map(|r| r.correct.map(|c| (pcor_to_mapq(r.pcor), c)))
            .collect();
        write_roc(roc_file, new)?;

        let orig: Vec<(f64, bool)> = self
            .records
            .iter()
            .filter_map(|r| r.correct.map(|c| (r.mapq_orig, c)))
            .collect();
        write_roc(roc_orig_file, orig)?;
        Ok(())
    }
}

impl PredictionSink for MapqPredictions {
    fn add(&mut self, batch: &PredictionBatch, log: &Logger) -> anyhow::Result<()> {
        if batch.ids.len() != batch.pcor.len() || batch.mapq_orig.len() != batch.pcor.len() {
            anyhow::bail!("{}: ragged prediction batch", self.name);
        }
        if batch.correct.is_none() {
            self.labelled = false;
        }
        self.preds
            .extend(batch.ids.iter().copied().zip(batch.pcor.iter().copied()));
        self.ordered_by = OrderedBy::Unordered;

        if !self.calc_summaries || !self.labelled {
            return Ok(());
        }
        let room = self.limit.saturating_sub(self.records.len());
        if room < batch.len() && !self.truncated {
            self.truncated = true;
            log.info(format_args!(
                "{}: assessing only the first {} alignments",
                self.name, self.limit
            ));
        }
        for i in 0..batch.len().min(room) {
            self.records.push(PredictionRecord {
                id: batch.ids[i],
                pcor: batch.pcor[i],
                category: batch.category,
                mapq_orig: batch.mapq_orig[i],
                correct: batch.correct.as_ref().map(|c| c[i]),
                data: batch.data.as_ref().map(|d| d[i].clone()),
            });
        }
        Ok(())
    }

    fn finalize(&mut self, log: &Logger) -> anyhow::Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        if !self.labelled {
            self.records.clear();
        }
        self.order_by_pcor();
        if self.calc_summaries && self.can_assess() {
            self.summary = Some(summarize(&self.records));
        }
        log.info(format_args!(
            "Finalized {} ({} alignments, {} assessed)",
            self.name,
            self.preds.len(),
            self.records.len()
        ));
        Ok(())
    }

    fn can_assess(&self) -> bool {
        self.labelled && !self.preds.is_empty()
    }
}

fn summarize(records: &[PredictionRecord]) -> Summary {
    let labels: Vec<bool> = records.iter().map(|r| r.correct == Some(true)).collect();
    let pcor: Vec<f64> = records.iter().map(|r| r.pcor).collect();
    let pcor_orig: Vec<f64> = records.iter().map(|r| mapq_to_pcor(r.mapq_orig)).collect();
    let n_correct = labels.iter().filter(|c| **c).count();

    Summary {
        n: records.len(),
        n_correct,
        n_incorrect: records.len() - n_correct,
        auc: auc(&pcor, &labels),
        auc_orig: auc(&pcor_orig, &labels),
        brier: brier(&pcor, &labels),
        brier_orig: brier(&pcor_orig, &labels),
    }
}

/// Area under the ROC curve by the rank-sum statistic, averaging ranks
/// over ties. `None` unless both classes are present.
pub fn auc(scores: &[f64], labels: &[bool]) -> Option<f64> {
    let n_pos = labels.iter().filter(|l| **l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks i+1..=j+1 share their mean
        let rank = (i + j + 2) as f64 / 2.0;
        rank_sum += rank * order[i..=j].iter().filter(|k| labels[**k]).count() as f64;
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    Some((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

pub fn brier(pcor: &[f64], labels: &[bool]) -> f64 {
    if pcor.is_empty() {
        return 0.0;
    }
    let sse: f64 = pcor
        .iter()
        .zip(labels)
        .map(|(p, l)| (p - if *l { 1.0 } else { 0.0 }).powi(2))
        .sum();
    sse / pcor.len() as f64
}

fn write_roc(outfile: &str, mut points: Vec<(f64, bool)>) -> anyhow::Result<()> {
    points.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut writer = crate::writer(outfile)?;
    writer.write_fmt(format_args!("mapq,cum_correct,cum_incorrect\n"))?;
    let (mut cor, mut incor) = (0usize, 0usize);
    for (mapq, group) in &points.iter().chunk_by(|p| p.0.to_bits()) {
        for (_, c) in group {
            if *c {
                cor += 1;
            } else {
                incor += 1;
            }
        }
        writer.write_fmt(format_args!("{:.3},{},{}\n", f64::from_bits(mapq), cor, incor))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn batch(ids: &[u64], pcor: &[f64], correct: Option<&[bool]>) -> PredictionBatch {
        PredictionBatch {
            category: Category::Unpaired,
            pcor: pcor.to_vec(),
            ids: ids.to_vec(),
            mapq_orig: vec![10.0; ids.len()],
            correct: correct.map(|c| c.to_vec()),
            data: None,
        }
    }

    #[test]
    fn test_auc() {
        assert_eq!(auc(&[0.9, 0.8, 0.2, 0.1], &[true, true, false, false]), Some(1.0));
        assert_eq!(auc(&[0.1, 0.2, 0.8, 0.9], &[true, true, false, false]), Some(0.0));
        assert_eq!(auc(&[0.5, 0.5], &[true, false]), Some(0.5));
        assert_eq!(auc(&[0.5, 0.6], &[true, true]), None);
        assert_relative_eq!(
            auc(&[0.9, 0.3, 0.5, 0.1], &[true, true, false, false]).unwrap(),
            0.75
        );
    }

    #[test]
    fn test_brier() {
        assert_relative_eq!(brier(&[1.0, 0.0], &[true, false]), 0.0);
        assert_relative_eq!(brier(&[0.5, 0.5], &[true, false]), 0.25);
    }

    #[test]
    fn test_sink_assess() {
        let log = Logger::default();
        let mut p = MapqPredictions::new("overall_test", true, 3);
        p.add(&batch(&[5, 1], &[0.9, 0.2], Some(&[true, false])), &log)
            .unwrap();
        p.add(&batch(&[3, 4], &[0.99, 0.5], Some(&[false, true])), &log)
            .unwrap();
        assert!(p.can_assess());
        p.finalize(&log).unwrap();

        assert_eq!(p.len(), 4);
        assert_eq!(p.records().len(), 3, "assessment is capped");
        assert_eq!(p.ordered_by(), OrderedBy::Pcor);
        assert_eq!(p.pcors()[0], (3, 0.99));

        let s = p.summary().unwrap();
        assert_eq!((s.n, s.n_correct, s.n_incorrect), (3, 1, 2));

        p.order_by_ids();
        assert_eq!(
            p.pcors().iter().map(|x| x.0).collect::<Vec<_>>(),
            vec![1, 3, 4, 5]
        );
    }

    #[test]
    fn test_sink_unlabelled() {
        let log = Logger::default();
        let mut p = MapqPredictions::new("overall_test", true, 100);
        p.add(&batch(&[1], &[0.9], Some(&[true])), &log).unwrap();
        p.add(&batch(&[2], &[0.4], None), &log).unwrap();
        p.finalize(&log).unwrap();
        assert!(!p.can_assess());
        assert!(p.summary().is_none());
        assert!(p.records().is_empty());
    }

    #[test]
    fn test_sink_writers() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = |name: &str| dir.path().join(name).to_string_lossy().to_string();
        let log = Logger::default();

        let mut p = MapqPredictions::new("overall_test", true, 100);
        let mut b = batch(&[2, 1, 3], &[0.9, 0.99, 0.5], Some(&[false, true, true]));
        b.data = Some(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);
        p.add(&b, &log).unwrap();
        p.finalize(&log).unwrap();

        p.write_rocs(&path("roc.csv"), &path("roc_orig.csv")).unwrap();
        let roc = std::fs::read_to_string(path("roc.csv")).unwrap();
        assert_eq!(
            roc,
            "mapq,cum_correct,cum_incorrect\n20.000,1,0\n10.000,1,1\n3.010,2,1\n"
        );
        let roc_orig = std::fs::read_to_string(path("roc_orig.csv")).unwrap();
        assert_eq!(roc_orig, "mapq,cum_correct,cum_incorrect\n10.000,2,1\n");

        let mut columns = CategoryMap::new();
        columns.insert(Category::Unpaired, vec!["as".to_string(), "xs".to_string()]);
        p.write_top_incorrect(&path("top.csv"), 50, &columns).unwrap();
        let top = std::fs::read_to_string(path("top.csv")).unwrap();
        assert_eq!(
            top,
            "id,category,pcor,mapq,mapq_orig,u_as,u_xs\n2,u,0.900000,10.000,10,1,2\n"
        );

        p.write_summary_measures(&path("summary.csv")).unwrap();
        let summary = std::fs::read_to_string(path("summary.csv")).unwrap();
        assert!(summary.starts_with("name,n,n_correct,n_incorrect,auc"));
        assert!(summary.contains("overall_test,3,2,1,0.500000,0.500000"));

        p.write_predictions(&path("predictions.csv")).unwrap();
        let preds = std::fs::read_to_string(path("predictions.csv")).unwrap();
        assert_eq!(preds, "id,mapq\n1,20.000\n2,10.000\n3,3.010\n");
        assert_eq!(p.ordered_by(), OrderedBy::Id);
    }

    #[test]
    fn test_top_incorrect_column_names() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("top.csv").to_string_lossy().to_string();
        let log = Logger::default();

        let mut p = MapqPredictions::new("overall_test", true, 100);
        let mut conc = batch(&[1, 2], &[0.9, 0.4], Some(&[false, true]));
        conc.category = Category::Concordant;
        conc.data = Some(vec![vec![-3.0, -9.0, 1.0], vec![0.0, -2.0, 1.0]]);
        let mut unp = batch(&[7], &[0.6], Some(&[false]));
        unp.data = Some(vec![vec![-12.0, -14.0]]);
        p.add(&conc, &log).unwrap();
        p.add(&unp, &log).unwrap();
        p.finalize(&log).unwrap();

        let mut columns = CategoryMap::new();
        columns.insert(
            Category::Concordant,
            vec!["as".to_string(), "xs".to_string(), "fraglen".to_string()],
        );
        columns.insert(Category::Unpaired, vec!["as".to_string(), "xs".to_string()]);
        p.write_top_incorrect(&path, 50, &columns).unwrap();

        let top = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = top.lines().collect();
        assert_eq!(
            lines[0],
            "id,category,pcor,mapq,mapq_orig,c_as,c_xs,c_fraglen,u_as,u_xs"
        );
        assert_eq!(lines[1], "1,c,0.900000,10.000,10,-3,-9,1,,");
        assert_eq!(lines[2], "7,u,0.600000,3.979,10,,,,-12,-14");
        assert_eq!(lines.len(), 3);

        // names must cover every category written
        columns.remove(Category::Unpaired);
        assert!(p.write_top_incorrect(&path, 50, &columns).is_err());
    }
}
