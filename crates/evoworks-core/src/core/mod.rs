//! # Core Module
//!
//! The stateless foundation of evoworks: labware geometry, plate and sample models,
//! their registries, and the file formats read and written by a conversion run.
//!
//! ## Architecture
//!
//! - **Data Model** ([`models`]) - Plate formats, wells, plates, samples, reactions and
//!   transfer operations
//! - **Registries** ([`registry`]) - The format catalog, the plate index and the sample index
//! - **File I/O** ([`io`]) - Spreadsheet loading, header keywords, dialect readers and the
//!   EVOware worklist codec
//! - **Dialogs** ([`dialogs`]) - Injectable file-chooser and notification capabilities
//!
//! ## Key Capabilities
//!
//! - **Bijective well addressing** between labels such as `B03`, zero-based coordinates
//!   and the robot's linear well numbering
//! - **Identity checks** that keep sample identifiers and physical locations consistent
//! - **Strict worklist encoding** that refuses to emit lines the robot would misread

pub mod dialogs;
pub mod io;
pub mod models;
pub mod registry;
