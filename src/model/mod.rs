//! Win-probability models.
//!
//! The scorer talks to the [`Classifier`] trait so the model can be
//! swapped without touching scoring logic. The default implementation
//! is a standardized logistic regression trained in-process.

mod logistic;

pub use logistic::LogisticModel;

use crate::types::{EngineError, FEATURE_COUNT};

/// Binary win/loss classifier over fixed-width feature rows.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// False until `fit` has succeeded at least once or trained state
    /// was imported.
    fn is_trained(&self) -> bool;

    /// Train on the full batch, replacing any previous fit.
    fn fit(&mut self, rows: &[[f64; FEATURE_COUNT]], labels: &[bool]) -> Result<(), EngineError>;

    /// Win probability in [0, 1]. Untrained models return 0.5.
    fn predict_probability(&self, row: &[f64; FEATURE_COUNT]) -> f64;

    /// Serializable snapshot for persistence.
    fn export_state(&self) -> Result<serde_json::Value, EngineError>;

    /// Restore from a snapshot produced by `export_state`.
    fn import_state(&mut self, state: serde_json::Value) -> Result<(), EngineError>;
}
