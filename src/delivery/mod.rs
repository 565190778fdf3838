//! Pairing delivery
//!
//! The queue only offers pairings; a `PairingSink` hands them to whatever
//! transport connects the two participants and reports whether both sides
//! received the notification.

pub mod sink;

pub use sink::{ChannelPairingSink, LoggingPairingSink, PairingSink};
