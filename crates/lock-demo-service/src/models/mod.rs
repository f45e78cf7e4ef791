//! 领域模型

mod run;

pub use run::{Provider, RaceResponse, RunRequest, RunResult, RunStatus};
