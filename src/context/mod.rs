mod analyzer;
mod languages;
mod types;

pub use analyzer::{derive_depth, derive_scope, parse_action_plan, ActionPlan, ContextAnalyzer};
pub use languages::LanguageDetector;
pub use types::{AnalysisContext, Complexity, Depth, Intent, RankedIntent, Scope};
