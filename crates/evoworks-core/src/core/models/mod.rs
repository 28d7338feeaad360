pub mod format;
pub mod ids;
pub mod plate;
pub mod sample;
pub mod transfer;
