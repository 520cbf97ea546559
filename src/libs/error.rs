use crate::libs::category::Category;

/// Fatal conditions raised by fitting and prediction.
///
/// Library functions return `anyhow::Result`; these variants travel inside
/// the `anyhow::Error` and can be recovered with `downcast_ref`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QfitError {
    /// Every candidate column was constant or a duplicate of another column
    #[error("{0}: all training records were identical, no usable feature columns")]
    NoFeatureColumns(Category),

    /// A column selected at training time is absent at prediction time
    #[error("{category}: column `{column}` was in the training data but is missing from the test data")]
    MissingColumn { category: Category, column: String },

    /// A selected feature holds NaN or an infinity
    #[error("{category}: column `{column}` contains a non-finite value at row {row}")]
    NonFinite {
        category: Category,
        column: String,
        row: usize,
    },

    #[error("bad subsampling fraction {0}, must lie in (0, 1]")]
    BadFraction(f64),

    #[error("{0}: category was already trained")]
    AlreadyTrained(Category),

    #[error("{0}: no trained columns for category")]
    NotTrained(Category),

    #[error("{0}: training data has no ground-truth `correct` labels")]
    MissingLabels(Category),

    #[error("bad model parameters for {family}: {message}")]
    BadModelParams { family: String, message: String },

    #[error("unknown model family `{0}`")]
    UnknownModelFamily(String),

    /// The hyperparameter search ended without producing a predictor
    #[error("{category}: no viable candidate from model family {family}")]
    NoViableCandidate { category: Category, family: String },
}
