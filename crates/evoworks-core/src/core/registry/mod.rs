pub mod formats;
pub mod plates;
pub mod samples;
