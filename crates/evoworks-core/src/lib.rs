//! # evoworks Core Library
//!
//! Turns spreadsheet descriptions of plates, samples and liquid transfers into
//! Tecan Freedom EVOware worklists (`.gwl`) for liquid-handling robots.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture so that the data model,
//! the conversion logic and the user-facing entry points can be tested in isolation.
//!
//! - **[`core`]: The Foundation.** Plate formats, plates, samples and reactions,
//!   the registries that index them, spreadsheet loading and the worklist command
//!   codec. Nothing here knows about a complete conversion run.
//!
//! - **[`engine`]: The Logic Core.** Configuration, error aggregation, progress
//!   reporting, the dialect converters that turn spreadsheet records into transfer
//!   operations, and the `SampleWorklist` encoder that orders and emits commands.
//!
//! - **[`workflows`]: The Public API.** Complete, all-or-nothing conversion runs
//!   from an input spreadsheet to a saved worklist file.

pub mod core;
pub mod engine;
pub mod workflows;
