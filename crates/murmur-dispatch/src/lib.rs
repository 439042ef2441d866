//! Transcript classification: turning recognized text into an ordered list
//! of actions, including voice-command lookup and auto-punctuation.

pub mod classifier;
pub mod command_table;
pub mod sink;

pub use classifier::TextClassifier;
pub use command_table::{CommandAction, CommandTable};
pub use sink::{ActionSink, LogSink, RecordingSink};
