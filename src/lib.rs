//! # FreeD Reader Library
//!
//! Receive, decode and inspect FreeD D1 camera tracking telemetry over UDP.
//!
//! This library provides the packet codec, unit conversion, spare word
//! (genlock/timecode) analysis and a background receive session publishing
//! snapshots, plus a packet generator for loopback testing.

pub mod config;
pub mod display;
pub mod error;
pub mod freed;
pub mod genlock;
pub mod session;
pub mod simulator;
pub mod units;
