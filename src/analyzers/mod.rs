//! Analyzers
//!
//! Pure, synchronous analysis of credit terms and contract text, plus an
//! optional LLM review in [`ai`].

pub mod ai;
pub mod clauses;
pub mod contract;
pub mod gpr;
pub mod text;

pub use ai::{AiReview, Consumer, ContractReviewer, LlmProvider, OllamaProvider};
pub use clauses::{ClauseDetector, ClauseRisk, DetectedClause, Severity};
pub use contract::{ContractAnalysis, ContractAnalyzer, DocumentKind};
pub use gpr::{GprCalculation, GprCalculator, GprRequest, GprVerification};
