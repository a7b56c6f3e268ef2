//! Agent process supervision: spawn, exit monitoring, stderr diagnostics.

pub mod spawner;
pub mod stderr;

pub use spawner::{monitor_exit, spawn_agent, AgentConnection, ProcessExit, SpawnConfig};
pub use stderr::{run_stderr_drain, StderrRing};
