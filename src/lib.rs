//! amr2mqtt bridges utility meter readings received by rtlamr to MQTT
//!
//! Every line rtlamr emits is classified by its protocol, converted into the
//! configured unit and published. Home Assistant discovery documents are sent
//! once for every configured meter.

pub mod models;
pub mod config;
pub mod metering_amr;
pub mod mqtt;
pub mod rtlamr;

// Re-export common types for easier access
pub use models::{AmrProtocol, LastSeenFormat, MeterClass};
pub use config::{Config, MeterConfig};
pub use metering_amr::AmrManager;
pub use mqtt::{MqttManager, Transmission};
pub use rtlamr::RtlamrProcess;
