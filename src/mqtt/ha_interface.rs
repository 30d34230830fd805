use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::{Config, MeterConfig};
use crate::metering_amr::classifier::{descriptor, CONSUMPTION_FIELD, INTERVAL_FIELD, INTERVAL_START_FIELD};
use crate::models::MeterClass;

pub const DEVICE_PREFIX: &str = "amr2mqtt";
pub const LAST_INTERVAL_ATTR: &str = "LastIntervalConsumption";
const CATEGORY_DIAGNOSTIC: &str = "diagnostic";
const LAST_SEEN_ATTR: &str = "'last_seen': value_json.last_seen";

lazy_static! {
    /* ERT is kept together, everything else gets split before a capital */
    static ref CAMEL_CASE: Regex = Regex::new(r"([^A-Z]|ERT)([A-Z])").expect("attribute name pattern");
}

/// `PacketCRC` becomes `Packet CRC`, `ERTType` becomes `ERT Type`
pub fn humanize_attribute(attribute: &str) -> String {
    return CAMEL_CASE.replace_all(attribute, "${1} ${2}").to_string();
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HaDevice {
    pub identifiers: Vec<String>,
    pub name: String,
    pub sw_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HaAvailability {
    pub topic: String,
}

/// Home Assistant MQTT discovery payload for one sensor entity
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HaSensor {
    pub enabled_by_default: bool,
    pub name: String,
    pub unique_id: String,
    pub value_template: String,
    pub state_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_attributes_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_attributes_template: Option<String>,
    pub availability: Vec<HaAvailability>,
    pub device: HaDevice,
    pub state_topic: String,
    pub platform: String,
}

impl HaSensor {
    /// Consumption like sensors count up and take their class from the meter type
    fn set_consumption_details(&mut self, meter: &MeterConfig) {
        self.state_class = "total".to_string();
        match meter.meter_type {
            Some(MeterClass::Gas) => self.device_class = Some("gas".to_string()),
            Some(MeterClass::Energy) => self.device_class = Some("energy".to_string()),
            Some(_) => self.icon = Some("mdi:water".to_string()),
            None => {},
        }
        self.unit_of_measurement = meter.unit.clone();
    }
}

/// A discovery payload together with the retained topic it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryDocument {
    pub attribute: String,
    pub topic: String,
    pub payload: HaSensor,
}

impl DiscoveryDocument {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        return serde_json::to_string(&self.payload);
    }
}

pub struct DiscoveryBuilder {
    prefix: String,
    base_topic: String,
    availability_topic: String,
    via_device: Option<String>,
    last_seen: bool,
    sw_version: String,
}

impl DiscoveryBuilder {
    pub fn from_config(config: &Config) -> Self {
        return DiscoveryBuilder {
            prefix: config.discovery.prefix.clone(),
            base_topic: config.mqtt.base_topic.clone(),
            availability_topic: config.mqtt.availability_topic(),
            via_device: config.discovery.via_device.clone(),
            last_seen: config.last_seen.enabled,
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
        };
    }

    fn state_topic(&self, meter_id: &str) -> String {
        return format!("{}/{}", self.base_topic, meter_id);
    }

    fn sensor(&self, meter_id: &str, device: &HaDevice, attribute: &str, enabled: bool, category: Option<&str>) -> HaSensor {
        let device_id = &device.identifiers[0];
        return HaSensor {
            enabled_by_default: enabled,
            name: format!("{} {}", device.name, humanize_attribute(attribute)),
            unique_id: format!("{device_id}_{attribute}"),
            value_template: format!("{{{{ value_json.{attribute} }}}}"),
            state_class: "measurement".to_string(),
            device_class: None,
            icon: None,
            unit_of_measurement: None,
            entity_category: category.map(|c| c.to_string()),
            json_attributes_topic: None,
            json_attributes_template: match self.last_seen {
                true => Some(format!("{{{{ {{ {LAST_SEEN_ATTR} }} | tojson }}}}")),
                false => None,
            },
            availability: vec![HaAvailability { topic: self.availability_topic.clone() }],
            device: device.clone(),
            state_topic: self.state_topic(meter_id),
            platform: "mqtt".to_string(),
        };
    }

    fn interval_sensor(&self, meter_id: &str, device: &HaDevice, meter: &MeterConfig) -> HaSensor {
        let last_seen_attr = match self.last_seen {
            true => format!("{LAST_SEEN_ATTR},"),
            false => String::new(),
        };

        let mut sensor = self.sensor(meter_id, device, LAST_INTERVAL_ATTR, true, None);
        sensor.value_template = format!("{{{{ value_json.{INTERVAL_FIELD}[0] }}}}");
        sensor.json_attributes_topic = Some(self.state_topic(meter_id));
        sensor.json_attributes_template = Some(format!(
            "{{{{ {{'{INTERVAL_FIELD}': value_json.{INTERVAL_FIELD},'{INTERVAL_START_FIELD}': value_json.{INTERVAL_START_FIELD},{last_seen_attr}'last_reset': value_json.{INTERVAL_START_FIELD}}} | tojson }}}}"
        ));
        sensor.set_consumption_details(meter);
        return sensor;
    }

    fn document(&self, meter_id: &str, attribute: &str, payload: HaSensor) -> DiscoveryDocument {
        return DiscoveryDocument {
            attribute: attribute.to_string(),
            topic: format!("{}/sensor/{}/{}/config", self.prefix, meter_id, attribute),
            payload,
        };
    }

    /// All discovery documents of one configured meter, always in the same order
    pub fn build(&self, meter_id: &str, meter: &MeterConfig) -> Vec<DiscoveryDocument> {
        let device = HaDevice {
            identifiers: vec![format!("{DEVICE_PREFIX}_{meter_id}")],
            name: meter.name.clone().unwrap_or_else(|| meter_id.to_string()),
            sw_version: self.sw_version.clone(),
            via_device: self.via_device.clone(),
            manufacturer: meter.manufacturer.clone(),
            model: meter.model.clone(),
        };

        let mut docs = Vec::new();

        let mut consumption = self.sensor(meter_id, &device, CONSUMPTION_FIELD, true, None);
        consumption.set_consumption_details(meter);
        docs.push(self.document(meter_id, CONSUMPTION_FIELD, consumption));

        let desc = descriptor(meter.protocol);
        if desc.has_intervals {
            docs.push(self.document(meter_id, LAST_INTERVAL_ATTR, self.interval_sensor(meter_id, &device, meter)));
        }

        /* Disabled by default, people can enable what they care about */
        for attribute in desc.diagnostics.iter() {
            let sensor = self.sensor(meter_id, &device, attribute, false, Some(CATEGORY_DIAGNOSTIC));
            docs.push(self.document(meter_id, attribute, sensor));
        }

        return docs;
    }

    pub fn build_all(&self, meters: &HashMap<String, MeterConfig>) -> Vec<DiscoveryDocument> {
        let mut ids: Vec<&String> = meters.keys().collect();
        ids.sort();
        return ids.into_iter().flat_map(|id| self.build(id, &meters[id])).collect();
    }
}
