use serde::{Deserialize, Deserializer};

use crate::models::AmrProtocol;

/// One decoded message as rtlamr hands it to us, field name to value
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Meter ids arrive as numbers, but some decoder builds quote them
fn deserialize_meter_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        Text(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s.trim().parse::<u64>().map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct IdmMessage {
    pub preamble: u64,
    #[serde(rename = "PacketTypeID")]
    pub packet_type_id: u8,
    pub packet_length: u8,
    pub hamming_code: u8,
    pub application_version: u8,
    #[serde(rename = "ERTType")]
    pub ert_type: u8,
    #[serde(rename = "ERTSerialNumber", deserialize_with = "deserialize_meter_id")]
    pub ert_serial_number: u64,
    pub consumption_interval_count: u32,
    pub module_programming_state: u8,
    /* Byte arrays, rtlamr may render them as list or base64 */
    pub tamper_counters: serde_json::Value,
    pub asynchronous_counters: u64,
    pub power_outage_flags: serde_json::Value,
    pub last_consumption_count: i64,
    pub differential_consumption_intervals: Vec<i64>,
    pub transmit_time_offset: u32,
    #[serde(rename = "SerialNumberCRC")]
    pub serial_number_crc: u32,
    #[serde(rename = "PacketCRC")]
    pub packet_crc: u32,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct NetIdmMessage {
    pub preamble: u64,
    #[serde(rename = "ProtocolID")]
    pub protocol_id: u8,
    pub packet_length: u8,
    pub hamming_code: u8,
    pub application_version: u8,
    #[serde(rename = "ERTType")]
    pub ert_type: u8,
    #[serde(rename = "ERTSerialNumber", deserialize_with = "deserialize_meter_id")]
    pub ert_serial_number: u64,
    pub consumption_interval_count: u32,
    pub programming_state: u8,
    pub last_generation: i64,
    pub last_consumption: i64,
    pub last_consumption_net: i64,
    pub differential_consumption_intervals: Vec<i64>,
    pub transmit_time_offset: u32,
    #[serde(rename = "SerialNumberCRC")]
    pub serial_number_crc: u32,
    #[serde(rename = "PacketCRC")]
    pub packet_crc: u32,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct R900Message {
    #[serde(rename = "ID", deserialize_with = "deserialize_meter_id")]
    pub id: u64,
    pub unkn1: u8,
    pub no_use: u8,
    pub back_flow: u8,
    pub consumption: i64,
    pub unkn3: u8,
    pub leak: u8,
    pub leak_now: u8,
    #[serde(rename = "checksum")]
    pub checksum: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ScmMessage {
    #[serde(rename = "ID", deserialize_with = "deserialize_meter_id")]
    pub id: u64,
    #[serde(rename = "Type")]
    pub ert_type: u8,
    pub tamper_phy: u8,
    pub tamper_enc: u8,
    pub consumption: i64,
    pub checksum_val: u32,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ScmPlusMessage {
    pub frame_sync: u32,
    #[serde(rename = "ProtocolID")]
    pub protocol_id: u8,
    pub endpoint_type: u8,
    #[serde(rename = "EndpointID", deserialize_with = "deserialize_meter_id")]
    pub endpoint_id: u64,
    pub consumption: i64,
    pub tamper: u32,
    #[serde(rename = "PacketCRC")]
    pub packet_crc: u32,
}

/// Interval related data of an IDM or NetIDM message
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalReport<'a> {
    pub interval_count: u32,
    pub transmit_time_offset: u32,
    pub intervals: &'a [i64],
}

/// A classified message, the only place raw decoder fields get interpreted
#[derive(Debug, Clone, PartialEq)]
pub enum AmrMessage {
    Idm(IdmMessage),
    NetIdm(NetIdmMessage),
    R900(R900Message),
    Scm(ScmMessage),
    ScmPlus(ScmPlusMessage),
}

impl AmrMessage {
    pub fn protocol(&self) -> AmrProtocol {
        match self {
            AmrMessage::Idm(_) => AmrProtocol::Idm,
            AmrMessage::NetIdm(_) => AmrProtocol::NetIdm,
            AmrMessage::R900(_) => AmrProtocol::R900,
            AmrMessage::Scm(_) => AmrProtocol::Scm,
            AmrMessage::ScmPlus(_) => AmrProtocol::ScmPlus,
        }
    }

    /// Decimal meter id, no leading zeros
    pub fn meter_id(&self) -> String {
        let id = match self {
            AmrMessage::Idm(m) => m.ert_serial_number,
            AmrMessage::NetIdm(m) => m.ert_serial_number,
            AmrMessage::R900(m) => m.id,
            AmrMessage::Scm(m) => m.id,
            AmrMessage::ScmPlus(m) => m.endpoint_id,
        };
        return id.to_string();
    }

    /// Raw cumulative consumption count before any conversion
    pub fn consumption(&self) -> i64 {
        match self {
            AmrMessage::Idm(m) => m.last_consumption_count,
            AmrMessage::NetIdm(m) => m.last_consumption_net,
            AmrMessage::R900(m) => m.consumption,
            AmrMessage::Scm(m) => m.consumption,
            AmrMessage::ScmPlus(m) => m.consumption,
        }
    }

    pub fn intervals(&self) -> Option<IntervalReport<'_>> {
        match self {
            AmrMessage::Idm(m) => Some(IntervalReport {
                interval_count: m.consumption_interval_count,
                transmit_time_offset: m.transmit_time_offset,
                intervals: &m.differential_consumption_intervals,
            }),
            AmrMessage::NetIdm(m) => Some(IntervalReport {
                interval_count: m.consumption_interval_count,
                transmit_time_offset: m.transmit_time_offset,
                intervals: &m.differential_consumption_intervals,
            }),
            _ => None,
        }
    }
}
