pub mod http;
pub mod metrics;
pub mod startup;
pub mod static_files;
pub mod telemetry;
