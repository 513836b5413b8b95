//! wen: ask a language model for a shell script, watch the answer render as
//! it streams, then fill in its parameters and run it.

pub mod actions;
pub mod classifier;
pub mod config;
pub mod error_handling;
pub mod execution;
pub mod extractor;
pub mod interactive;
pub mod logging;
pub mod prompt;
pub mod provider;
pub mod renderer;
pub mod report;
pub mod stream;
pub mod system_info;
pub mod validation;

pub use classifier::{Classifier, Unit};
pub use extractor::{extract, HiddenParams, ParamKind, ParamPlaceholder};
pub use renderer::{TerminalRenderer, Theme};
pub use report::{report_stream, report_stream_until, StreamOutcome, StreamReport};
