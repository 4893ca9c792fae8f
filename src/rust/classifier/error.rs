/// Represents the different types of errors that can occur in the text classifier.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// Error occurred while building or running the tokenizer
    #[error("Tokenizer error: {0}")]
    TokenizerError(String),
    /// Error occurred while building or applying the feature matrix
    #[error("Feature error: {0}")]
    FeatureError(String),
    /// Error occurred during the build phase
    #[error("Build error: {0}")]
    BuildError(String),
    /// The pipeline was used before `fit` was called
    #[error("Pipeline has not been fitted yet")]
    NotFitted,
    /// Error occurred while making predictions
    #[error("Prediction error: {0}")]
    PredictionError(String),
    /// Error occurred due to invalid input parameters
    #[error("Validation error: {0}")]
    ValidationError(String),
}
