//! # Engine Module
//!
//! Turns validated sheets into registered samples, ordered transfer operations and
//! finally worklist commands.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Conversion settings and their builder
//! - **Converters** ([`converters`]) - Sample lists, picking sheets and distribution sheets
//! - **Encoding** ([`encoding`]) - Operation ordering and the sample-aware worklist writer
//! - **Progress Monitoring** ([`progress`]) - Phase and task events for front ends
//! - **Error Handling** ([`error`]) - The aggregate error type and its stable kinds
//!
//! ## Key Capabilities
//!
//! - **Identity-checked sample registration** with optional plate creation on first use
//! - **Volume bookkeeping** per reaction with a configurable overfill policy
//! - **Shared aspirates** for distribution rows, split to the tip volume when limited

pub mod config;
pub mod converters;
pub mod encoding;
pub mod error;
pub mod progress;
