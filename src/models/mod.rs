pub mod answer;
pub mod field;
pub mod loaders;
pub mod profile;
pub mod record;
pub mod target;
pub mod variant;

pub use answer::{clamp_confidence, AnswerRecord, ApplicationDecision, DecisionAction};
pub use field::{FieldDescriptor, FieldKey, FieldKind};
pub use loaders::{load_all_targets, load_profile, load_targets_file};
pub use profile::CandidateProfile;
pub use record::{ProcessingRecord, ProcessingStatus};
pub use target::{Target, TargetList};
pub use variant::{Locale, VariantCategory, VariantRecommendation};
