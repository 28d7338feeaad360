//! Spreadsheet input and worklist output.

pub mod keywords;
pub mod reader;
pub mod sheet;
pub mod worklist;
