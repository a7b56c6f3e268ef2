//! Session layer: state machine, reader/writer tasks, permission registry.

pub mod core;
pub mod registry;
pub mod writer;

pub use self::core::Session;
pub use registry::PermissionRegistry;
pub use writer::run_writer;
