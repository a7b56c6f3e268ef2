//! Newline-delimited JSON wire layer: line codec and frame model.

pub mod codec;
pub mod frame;

pub use codec::{LineCodec, DEFAULT_MAX_LINE_BYTES};
pub use frame::{parse_line, ControlRequest, Frame};
