//! Recommendation generation.
//!
//! Rules are declarative: a condition over the current aggregates, a
//! message template, an action and an impact estimator. The engine
//! evaluates every rule independently and always closes the list with the
//! domain's default recommendation.

pub mod engine;
pub mod rules;
pub mod template;

pub use engine::{RecommendationEngine, RuleContext};
pub use rules::{DefaultRecommendation, ImpactEstimate, RecommendationRule, RuleCondition};
pub use template::MessageTemplate;
