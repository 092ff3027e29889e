//! # telecine-capture
//!
//! Runs on the capture workstation. Connects to the scanner's frame
//! stream, runs the `telecine-core` receive loop on a worker task and
//! logs the events it publishes.

pub mod config;
pub mod events;
