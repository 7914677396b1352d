pub mod error;
pub mod image_ops;
pub mod library;
pub mod media_host;
pub mod platform;
pub mod providers;
pub mod rehost;
pub mod telemetry;
