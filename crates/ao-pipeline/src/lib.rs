//! Pipeline orchestration (§4.5-§4.9): intent classification, planning,
//! confirmed-plan execution with per-step controller/evaluator cycles, and
//! the direct-QA fast path, all fanned out through a single callback sink.

pub mod callback;
pub mod direct_qa;
pub mod executor;
pub mod plan_file;
pub mod transforms;

pub use callback::{CallbackFanout, EventSink};
pub use direct_qa::DirectQaExecutor;
pub use executor::{PlanExecutor, PlanOutcome};
pub use transforms::{Controller, IntentClassifier, OverallEvaluator, Planner, StepEvaluator};
