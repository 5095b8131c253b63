//! Inbound events.
//!
//! This module provides:
//! - the strict schema of bus messages
//! - the normalized event and its log projection
//! - the normalizer that turns one into the other

mod event;
mod normalizer;
mod raw;

pub use event::{Event, LogRecord, LOG_DATETIME_FORMAT, NO_UTTERANCE, STRIPPED_DATA_KEYS};
pub use normalizer::{DropReason, EventNormalizer, Normalized};
pub use raw::RawMessage;
