pub mod config;
pub mod feed;
pub mod lint;
pub mod pki;
pub mod report;
pub mod telemetry;
