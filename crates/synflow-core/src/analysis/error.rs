use crate::cfg::NodeId;
use crate::IrError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Unknown analysis: {0}")]
    UnknownAnalysis(String),
    #[error("Analysis was not requested for this run: {0}")]
    NotRequested(String),
    #[error("Malformed analysis sequence: {0}")]
    MalformedSequence(String),
    #[error("Too many analyses: {requested} requested, at most {max} allowed")]
    TooManyAnalyses { requested: usize, max: usize },
    #[error("Cannot splice parameters into variadic function {callee} (called from {caller})")]
    VariadicSplice { caller: String, callee: String },
    #[error("Call to {callee} passes {args} arguments, expected {params}")]
    ArityMismatch {
        callee: String,
        args: usize,
        params: usize,
    },
    #[error("Function has no body: {0}")]
    MissingBody(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error(
        "No fixpoint after {iterations} iterations in {function} at {node} (analyses: {})",
        .analyses.join(", ")
    )]
    NonTermination {
        analyses: Vec<String>,
        function: String,
        node: NodeId,
        iterations: u64,
    },
    #[error("Monotonicity violated by {analysis} in {function} at {node}")]
    MonotonicityViolation {
        analysis: String,
        function: String,
        node: NodeId,
    },
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Ir(#[from] IrError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
