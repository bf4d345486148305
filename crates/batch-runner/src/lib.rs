pub mod batch;
pub mod config;
pub mod execution;
pub mod output;

pub use batch::{BatchRunner, SkipPolicy, TimeBudget};
pub use execution::{CommandExecutor, ExecutorSettings, ShellConfig, ShellExecutor};
