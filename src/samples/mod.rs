//! Ready-made executors for two small workflows: a doubling loop and a
//! draft/review cycle between a chat-backed worker and a reviewer.

pub mod doubling;
pub mod review;

pub use doubling::{DoublingLoopExecutor, NumberDoubleExecutor};
pub use review::{AutoApprover, ReviewRequest, ReviewResponse, SecondApprover, Worker};
