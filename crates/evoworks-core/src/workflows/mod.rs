//! # Workflows Module
//!
//! Top-level entry points: complete conversion runs from a layout spreadsheet to a
//! saved worklist.
//!
//! ## Architecture
//!
//! - **Conversion Workflow** ([`convert`]) - Reads the layout, registers plates and
//!   source samples, converts, encodes and saves atomically. Nothing is written unless
//!   every step succeeds.

pub mod convert;
