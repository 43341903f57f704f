pub mod answer_oracle;
pub mod confidence;
pub mod llm_service;
pub mod reporting;
pub mod state_store;
pub mod variant_selector;

pub use answer_oracle::{AnswerOracle, LlmAnswerOracle, OracleQuery};
pub use confidence::{confidence_summary, decide, ConfidenceSummary};
pub use llm_service::LlmService;
pub use reporting::{
    LogNotifier, Notifier, OutcomeEvent, OutcomeSink, RunSummary, TelegramNotifier, TrackerWriter,
};
pub use state_store::{StateStore, StoreStats};
pub use variant_selector::{Classification, LlmVariantClassifier, VariantClassifier, VariantSelector};
