//! Type definitions for the scoring pipeline

pub mod application;
pub mod result;

pub use application::{columns, ApplicantRecord, Attribute, LoanApplication};
pub use result::{
    Decision, Direction, ExplanationEntry, RiskTier, ScoreResponse, ScoreResult,
    ScoredApplication,
};
