//! # FreeD Protocol Module
//!
//! Implementation of the FreeD D1 camera tracking protocol.
//!
//! This module handles:
//! - D1 packet validation and decoding (29-byte frames, surplus bytes surfaced)
//! - 24-bit signed big-endian field encoding
//! - XOR checksum calculation
//! - Packet encoding with genlock phase emulation for simulation

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod checksum;
