use log::info;
use serde::{Deserialize, Serialize};
use serde_yml;
use std::collections::HashMap;
use std::fs;
use thiserror::Error;

use crate::models::{AmrProtocol, LastSeenFormat, MeterClass};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read the config on {0}")]
    NotFound(String),
    #[error("Unable to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to parse config file: {0}")]
    Parse(#[from] serde_yml::Error),
    #[error("Unknown protocol {0} in rtlamr.protocols")]
    UnknownProtocol(String),
}

fn mqtt_port_default() -> u16 { return 1883 }
fn mqtt_base_topic_default() -> String { return "amr2mqtt".to_string() }
fn mqtt_keep_alive_default() -> u64 { return 60 }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    /* A random one is generated when not set */
    pub client_name: Option<String>,
    #[serde(default="mqtt_base_topic_default")]
    pub base_topic: String,
    #[serde(default="mqtt_keep_alive_default")]
    pub keep_alive: u64,
    pub ca_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

impl MqttConfig {
    pub fn reading_topic(&self, meter_id: &str) -> String {
        return format!("{}/{}", self.base_topic, meter_id);
    }

    pub fn availability_topic(&self) -> String {
        return format!("{}/bridge/state", self.base_topic);
    }
}

fn rtlamr_path_default() -> String { return "/usr/bin/rtlamr".to_string() }
fn rtlamr_protocols_default() -> String { return "all".to_string() }
fn rtlamr_extra_args_default() -> Vec<String> { return Vec::new() }
fn rtlamr_error_pause_default() -> u64 { return 2 }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct RtlamrConfig {
    #[serde(default="rtlamr_path_default")]
    pub path: String,
    /// Either `all` or a comma separated list like `idm,scm+`
    #[serde(default="rtlamr_protocols_default")]
    pub protocols: String,
    #[serde(default="rtlamr_extra_args_default")]
    pub extra_args: Vec<String>,
    /// Seconds to wait after a line could not be handled
    #[serde(default="rtlamr_error_pause_default")]
    pub error_pause: u64,
}

impl RtlamrConfig {
    pub fn watches_all(&self) -> bool {
        return self.protocols.trim() == "all";
    }

    /// Checks the comma separated protocol list, `all` yields an empty list
    pub fn watched_protocols(&self) -> Result<Vec<AmrProtocol>, ConfigError> {
        if self.watches_all() {
            return Ok(Vec::new());
        }

        let mut protocols = Vec::new();
        for name in self.protocols.split(',').map(|p| p.trim()).filter(|p| !p.is_empty()) {
            match AmrProtocol::from_str(name) {
                Some(p) => protocols.push(p),
                None => return Err(ConfigError::UnknownProtocol(name.to_string())),
            }
        }
        return Ok(protocols);
    }
}

fn discovery_enabled_default() -> bool { return true }
fn discovery_prefix_default() -> String { return "homeassistant".to_string() }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DiscoveryConfig {
    #[serde(default="discovery_enabled_default")]
    pub enabled: bool,
    #[serde(default="discovery_prefix_default")]
    pub prefix: String,
    pub via_device: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct LastSeenConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub format: LastSeenFormat,
}

impl LastSeenConfig {
    pub fn active_format(&self) -> Option<LastSeenFormat> {
        if self.enabled {
            return Some(self.format);
        }
        return None;
    }
}

fn meter_multiplier_default() -> f64 { return 1.0 }
fn meter_precision_default() -> i32 { return -1 }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MeterConfig {
    pub protocol: AmrProtocol,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    #[serde(default="meter_multiplier_default")]
    pub multiplier: f64,
    /// Decimal places to round to, negative means no rounding at all
    #[serde(default="meter_precision_default")]
    pub precision: i32,
    #[serde(alias="unit_of_measurement")]
    pub unit: Option<String>,
    #[serde(rename="type")]
    pub meter_type: Option<MeterClass>,
}

impl MeterConfig {
    pub fn new(protocol: AmrProtocol) -> Self {
        return MeterConfig {
            protocol,
            name: None,
            manufacturer: None,
            model: None,
            multiplier: meter_multiplier_default(),
            precision: meter_precision_default(),
            unit: None,
            meter_type: None,
        };
    }
}

fn discovery_default() -> DiscoveryConfig {
    return DiscoveryConfig { enabled: discovery_enabled_default(), prefix: discovery_prefix_default(), via_device: None }
}
fn rtlamr_default() -> RtlamrConfig {
    return RtlamrConfig {
        path: rtlamr_path_default(),
        protocols: rtlamr_protocols_default(),
        extra_args: rtlamr_extra_args_default(),
        error_pause: rtlamr_error_pause_default(),
    }
}
fn meters_default() -> HashMap<String, MeterConfig> { return HashMap::new() }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    pub mqtt: MqttConfig,
    #[serde(default="rtlamr_default")]
    pub rtlamr: RtlamrConfig,
    #[serde(default="discovery_default")]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub last_seen: LastSeenConfig,
    #[serde(default="meters_default")]
    pub meters: HashMap<String, MeterConfig>,
}

impl Config {
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let c: Config = serde_yml::from_str(contents)?;
        /* Fail early instead of handing rtlamr a broken -msgtype */
        c.rtlamr.watched_protocols()?;
        return Ok(c);
    }

    pub fn load() -> Result<Self, ConfigError> {
        let candidates = match std::env::var("AMR2MQTT_CONFIG") {
            Ok(path) => vec![path],
            Err(_) => vec!["config/amr2mqtt.yaml".to_string(), "amr2mqtt.yaml".to_string()],
        };

        for path in candidates.iter() {
            match fs::read_to_string(path) {
                Ok(contents) => {
                    info!("Loading config from {path}");
                    return Config::from_yaml(&contents);
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }

        return Err(ConfigError::NotFound(candidates.join(" or ")));
    }

    /// Sorted ids of all configured meters, used for the rtlamr id filter
    pub fn meter_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.meters.keys().cloned().collect();
        ids.sort();
        return ids;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
mqtt:
  host: broker.local
  user: amr
  pass: secret
rtlamr:
  protocols: idm,scm
last_seen:
  enabled: true
  format: epoch
meters:
  "1234567":
    protocol: idm
    name: House Power
    multiplier: 0.01
    precision: 2
    unit_of_measurement: kWh
    type: energy
  "7654321":
    protocol: scm+
"#;

    #[test]
    fn parse_full_config() {
        let c = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(c.mqtt.port, 1883);
        assert_eq!(c.mqtt.base_topic, "amr2mqtt");
        assert_eq!(c.mqtt.reading_topic("1234567"), "amr2mqtt/1234567");
        assert_eq!(c.mqtt.availability_topic(), "amr2mqtt/bridge/state");
        assert_eq!(c.rtlamr.path, "/usr/bin/rtlamr");
        assert_eq!(c.rtlamr.error_pause, 2);
        assert!(c.discovery.enabled);
        assert_eq!(c.discovery.prefix, "homeassistant");
        assert_eq!(c.last_seen.active_format(), Some(LastSeenFormat::Epoch));

        let power = &c.meters["1234567"];
        assert_eq!(power.protocol, AmrProtocol::Idm);
        assert_eq!(power.unit.as_deref(), Some("kWh"));
        assert_eq!(power.meter_type, Some(MeterClass::Energy));
        assert_eq!(power.precision, 2);

        let water = &c.meters["7654321"];
        assert_eq!(water.protocol, AmrProtocol::ScmPlus);
        assert_eq!(water.multiplier, 1.0);
        assert_eq!(water.precision, -1);
        assert_eq!(c.meter_ids(), vec!["1234567".to_string(), "7654321".to_string()]);
    }

    #[test]
    fn watched_protocols() {
        let c = Config::from_yaml(SAMPLE).unwrap();
        assert!(!c.rtlamr.watches_all());
        assert_eq!(c.rtlamr.watched_protocols().unwrap(), vec![AmrProtocol::Idm, AmrProtocol::Scm]);

        let c = Config::from_yaml("mqtt:\n  host: localhost\n").unwrap();
        assert!(c.rtlamr.watches_all());
        assert!(c.meters.is_empty());
        assert_eq!(c.last_seen.active_format(), None);
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let res = Config::from_yaml("mqtt:\n  host: localhost\nrtlamr:\n  protocols: idm,foo\n");
        assert!(matches!(res, Err(ConfigError::UnknownProtocol(p)) if p == "foo"));
    }
}
