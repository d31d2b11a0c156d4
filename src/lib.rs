//! exec-match - execution-based equivalence checking for SQL.
//!
//! A predicted query is judged against a gold query by running both inside
//! sandboxed copies of every database replica and comparing the results under
//! bag semantics.

pub mod compare;
pub mod config;
pub mod db;
pub mod error;
pub mod harness;
pub mod judge;
pub mod logging;
pub mod rewrite;

pub use compare::{result_eq, DenotationComparator};
pub use error::{EvalError, Result};
pub use harness::{ExecutionOutcome, Harness};
pub use judge::{Judge, JudgeRequest, Verdict};
