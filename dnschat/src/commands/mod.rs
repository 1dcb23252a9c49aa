//! CLI command wiring for the `dnschat` demo binary.

pub mod base;
