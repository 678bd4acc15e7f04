pub mod constants;
pub mod core;
pub mod dtos;
pub mod helper;
pub mod telemetry;
