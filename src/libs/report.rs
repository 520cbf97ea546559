use crate::libs::category::Category;
use crate::libs::fit::MapqFit;
use std::io::Write;

/// Dense ranks of `importances`: 1 for the highest, ties broken by the
/// original order.
///
/// ```
/// use qfit::libs::report::feature_ranks;
/// assert_eq!(feature_ranks(&[0.1, 0.5, 0.4]), vec![3, 1, 2]);
/// ```
pub fn feature_ranks(importances: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..importances.len()).collect();
    order.sort_by(|a, b| importances[*b].total_cmp(&importances[*a]));

    let mut ranks = vec![0; importances.len()];
    for (rank, i) in order.into_iter().enumerate() {
        ranks[i] = rank + 1;
    }
    ranks
}

/// Write `<prefix>_<c>.csv` for every trained category.
pub fn write_feature_importances(fit: &MapqFit, prefix: &str) -> anyhow::Result<()> {
    for (cat, model) in fit.models().iter() {
        let importances = model.predictor.feature_importances();
        let ranks = feature_ranks(&importances);

        let mut writer = crate::writer(&format!("{}_{}.csv", prefix, cat.short()))?;
        writer.write_fmt(format_args!("feature,importance,rank\n"))?;
        for ((name, imp), rank) in model.columns.iter().zip(&importances).zip(&ranks) {
            writer.write_fmt(format_args!("{},{:.4},{}\n", name, imp, rank))?;
        }
        writer.flush()?;
    }
    Ok(())
}

/// Write the hyperparameter summary of a run to `<prefix>.csv`.
pub fn write_parameters(fit: &MapqFit, prefix: &str) -> anyhow::Result<()> {
    let mut header = vec!["model_type".to_string(), "subsampling_fraction".to_string()];
    let mut row = vec![
        fit.family_name().unwrap_or("NA").to_string(),
        format!("{:?}", fit.options().sample_fraction),
    ];

    for cat in Category::ALL {
        let c = cat.short();
        header.push(format!("{}_model_params", c));
        header.push(format!("{}_training_rows", c));
        header.push(format!("{}_training_cols", c));
        match fit.model(cat) {
            Some(model) => {
                row.push(model.params.clone());
                row.push(model.shape.0.to_string());
                row.push(model.shape.1.to_string());
            }
            None => {
                row.push("NA".to_string());
                row.push("0".to_string());
                row.push("0".to_string());
            }
        }
    }

    let mut writer = crate::writer(&format!("{}.csv", prefix))?;
    writer.write_fmt(format_args!("{}\n{}\n", header.join(","), row.join(",")))?;
    writer.flush()?;
    Ok(())
}
