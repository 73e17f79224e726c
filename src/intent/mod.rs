//! Command Understanding
//!
//! Pattern registry, natural-language interpreter, and parameter
//! extraction. Classification never fails the caller: low-confidence
//! input degrades to an unknown intent with ranked suggestions.

pub mod interpreter;
pub mod params;
pub mod patterns;

pub use interpreter::{
    CommandInterpreter, ConfidenceFactors, ParsedIntent, Suggestion, EARLY_EXIT_CONFIDENCE,
};
pub use params::{ParamIssue, ParameterExtractor};
pub use patterns::{CommandIntent, PatternDefinition, DEFAULT_REGISTRY};
