pub mod configuration;
pub mod credentials;
pub mod csrf;
pub mod errors;
pub mod fixture;
pub mod harness;
pub mod report;
pub mod server;
pub mod session;
pub mod suite;
pub mod telemetry;
