use log::debug;

use crate::models::AmrProtocol;
use super::structs::{AmrMessage, RawRecord};
use super::AmrError;

pub const CONSUMPTION_FIELD: &str = "Consumption";
pub const INTERVAL_FIELD: &str = "DifferentialConsumptionIntervals";
pub const INTERVAL_ID_FIELD: &str = "ConsumptionIntervalCount";
pub const INTERVAL_START_FIELD: &str = "IntervalStart";
pub const TIME_OFFSET_FIELD: &str = "TransmitTimeOffset";

/* Header fields shared by IDM and NetIDM */
macro_rules! idm_diagnostics {
    ($($extra: expr),*) => {
        &[
            $($extra,)*
            "Preamble",
            "PacketLength",
            "HammingCode",
            "ApplicationVersion",
            "ERTType",
            INTERVAL_ID_FIELD,
            TIME_OFFSET_FIELD,
            "SerialNumberCRC",
            "PacketCRC",
        ]
    };
}

/// Everything we know about the shape of one protocol's messages
#[derive(Debug)]
pub struct ProtocolDescriptor {
    pub protocol: AmrProtocol,
    /// rtlamr emits a fixed number of fields per protocol, we classify on that
    pub field_count: usize,
    pub id_field: &'static str,
    pub consumption_field: &'static str,
    pub has_intervals: bool,
    /// Attributes offered as disabled diagnostic sensors, order is stable
    pub diagnostics: &'static [&'static str],
}

pub static PROTOCOLS: [ProtocolDescriptor; 5] = [
    ProtocolDescriptor {
        protocol: AmrProtocol::Idm,
        field_count: 17,
        id_field: "ERTSerialNumber",
        consumption_field: "LastConsumptionCount",
        has_intervals: true,
        diagnostics: idm_diagnostics!(
            "ModuleProgrammingState",
            "TamperCounters",
            "AsynchronousCounters",
            "PowerOutageFlags"
        ),
    },
    ProtocolDescriptor {
        protocol: AmrProtocol::NetIdm,
        field_count: 16,
        id_field: "ERTSerialNumber",
        consumption_field: "LastConsumptionNet",
        has_intervals: true,
        diagnostics: idm_diagnostics!("ProgrammingState", "LastGeneration", "LastConsumption"),
    },
    ProtocolDescriptor {
        protocol: AmrProtocol::R900,
        field_count: 9,
        id_field: "ID",
        consumption_field: CONSUMPTION_FIELD,
        has_intervals: false,
        diagnostics: &["Unkn1", "NoUse", "BackFlow", "Unkn3", "Leak", "LeakNow", "checksum"],
    },
    ProtocolDescriptor {
        protocol: AmrProtocol::Scm,
        field_count: 6,
        id_field: "ID",
        consumption_field: CONSUMPTION_FIELD,
        has_intervals: false,
        diagnostics: &["Type", "TamperPhy", "TamperEnc", "ChecksumVal"],
    },
    ProtocolDescriptor {
        protocol: AmrProtocol::ScmPlus,
        field_count: 7,
        id_field: "EndpointID",
        consumption_field: CONSUMPTION_FIELD,
        has_intervals: false,
        diagnostics: &["FrameSync", "ProtocolID", "EndpointType", "Tamper", "PacketCRC"],
    },
];

pub fn descriptor_for_count(field_count: usize) -> Option<&'static ProtocolDescriptor> {
    return PROTOCOLS.iter().find(|d| d.field_count == field_count);
}

pub fn descriptor(protocol: AmrProtocol) -> &'static ProtocolDescriptor {
    match PROTOCOLS.iter().find(|d| d.protocol == protocol) {
        Some(d) => d,
        /* Every enum variant has a row in the table above */
        None => unreachable!("no descriptor for {}", protocol.to_string()),
    }
}

fn field_text(raw: &RawRecord, field: &str) -> String {
    match raw.get(field) {
        Some(v) => v.to_string(),
        None => "<missing>".to_string(),
    }
}

/// Turns a raw record into a typed message based on its number of fields
pub fn classify(raw: &RawRecord) -> Result<AmrMessage, AmrError> {
    let field_count = raw.len();
    let desc = match descriptor_for_count(field_count) {
        Some(d) => d,
        None => return Err(AmrError::UnrecognizedShape { field_count }),
    };

    debug!("{field_count} fields, treating message as {} from {}, consumption {}",
           desc.protocol.to_string(), field_text(raw, desc.id_field), field_text(raw, desc.consumption_field));

    let value = serde_json::Value::Object(raw.clone());
    let missing = |source: serde_json::Error| AmrError::MissingField { protocol: desc.protocol, source };

    let message = match desc.protocol {
        AmrProtocol::Idm => AmrMessage::Idm(serde_json::from_value(value).map_err(missing)?),
        AmrProtocol::NetIdm => AmrMessage::NetIdm(serde_json::from_value(value).map_err(missing)?),
        AmrProtocol::R900 => AmrMessage::R900(serde_json::from_value(value).map_err(missing)?),
        AmrProtocol::Scm => AmrMessage::Scm(serde_json::from_value(value).map_err(missing)?),
        AmrProtocol::ScmPlus => AmrMessage::ScmPlus(serde_json::from_value(value).map_err(missing)?),
    };

    return Ok(message);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub fn record(value: serde_json::Value) -> RawRecord {
        match value {
            serde_json::Value::Object(m) => m,
            _ => panic!("test record must be an object"),
        }
    }

    pub fn idm_record(serial: u64, interval_count: u32, offset: u32) -> RawRecord {
        record(json!({
            "Preamble": 5582782,
            "PacketTypeID": 28,
            "PacketLength": 92,
            "HammingCode": 198,
            "ApplicationVersion": 4,
            "ERTType": 7,
            "ERTSerialNumber": serial,
            "ConsumptionIntervalCount": interval_count,
            "ModuleProgrammingState": 188,
            "TamperCounters": [2, 0, 0, 3, 64, 0],
            "AsynchronousCounters": 0,
            "PowerOutageFlags": [0, 0, 0, 0, 0, 0],
            "LastConsumptionCount": 12345,
            "DifferentialConsumptionIntervals": [15, 17, 16, 21],
            "TransmitTimeOffset": offset,
            "SerialNumberCRC": 48911,
            "PacketCRC": 11457
        }))
    }

    pub fn netidm_record(serial: u64) -> RawRecord {
        record(json!({
            "Preamble": 5582782,
            "ProtocolID": 28,
            "PacketLength": 92,
            "HammingCode": 198,
            "ApplicationVersion": 4,
            "ERTType": 8,
            "ERTSerialNumber": serial,
            "ConsumptionIntervalCount": 41,
            "ProgrammingState": 186,
            "LastGeneration": 88,
            "LastConsumption": 20400,
            "LastConsumptionNet": 20312,
            "DifferentialConsumptionIntervals": [3, 4],
            "TransmitTimeOffset": 320,
            "SerialNumberCRC": 1211,
            "PacketCRC": 8802
        }))
    }

    pub fn r900_record(id: u64) -> RawRecord {
        record(json!({
            "ID": id,
            "Unkn1": 163,
            "NoUse": 0,
            "BackFlow": 0,
            "Consumption": 1002,
            "Unkn3": 0,
            "Leak": 2,
            "LeakNow": 0,
            "checksum": 17
        }))
    }

    pub fn scm_record(id: u64, consumption: i64) -> RawRecord {
        record(json!({
            "ID": id,
            "Type": 12,
            "TamperPhy": 1,
            "TamperEnc": 0,
            "Consumption": consumption,
            "ChecksumVal": 49938
        }))
    }

    pub fn scm_plus_record(id: u64) -> RawRecord {
        record(json!({
            "FrameSync": 5795,
            "ProtocolID": 30,
            "EndpointType": 156,
            "EndpointID": id,
            "Consumption": 3117,
            "Tamper": 2056,
            "PacketCRC": 40542
        }))
    }

    #[test]
    fn log_fields_follow_descriptor() {
        let raw = scm_record(30000001, 100);
        let desc = descriptor(AmrProtocol::Scm);
        assert_eq!(field_text(&raw, desc.id_field), "30000001");
        assert_eq!(field_text(&raw, desc.consumption_field), "100");
        assert_eq!(field_text(&raw, "Nope"), "<missing>");
    }

    #[test]
    fn classify_all_known_shapes() {
        let cases = vec![
            (idm_record(1234567, 5, 1600), AmrProtocol::Idm, "1234567"),
            (netidm_record(7654321), AmrProtocol::NetIdm, "7654321"),
            (r900_record(1550000000), AmrProtocol::R900, "1550000000"),
            (scm_record(30000001, 100), AmrProtocol::Scm, "30000001"),
            (scm_plus_record(88001), AmrProtocol::ScmPlus, "88001"),
        ];

        for (raw, protocol, id) in cases {
            let msg = classify(&raw).unwrap();
            assert_eq!(msg.protocol(), protocol);
            assert_eq!(msg.meter_id(), id);

            let desc = descriptor(protocol);
            assert_eq!(desc.field_count, raw.len());
            assert_eq!(raw[desc.id_field].to_string(), id);
            assert_eq!(raw[desc.consumption_field].as_i64(), Some(msg.consumption()));
            assert_eq!(desc.has_intervals, protocol.has_intervals());
            assert_eq!(msg.intervals().is_some(), desc.has_intervals);
        }
    }

    #[test]
    fn unknown_field_count_is_unrecognized() {
        let mut raw = scm_record(1, 1);
        raw.insert("Extra".to_string(), json!(1));
        raw.insert("More".to_string(), json!(2));
        assert!(matches!(classify(&raw), Err(AmrError::UnrecognizedShape { field_count: 8 })));
        assert!(matches!(classify(&RawRecord::new()), Err(AmrError::UnrecognizedShape { field_count: 0 })));
    }

    #[test]
    fn right_count_wrong_fields_is_missing_field() {
        let raw = record(json!({"A": 1, "B": 2, "C": 3, "D": 4, "E": 5, "F": 6}));
        let res = classify(&raw);
        assert!(matches!(res, Err(AmrError::MissingField { protocol: AmrProtocol::Scm, .. })));
    }

    #[test]
    fn meter_id_is_plain_decimal() {
        let mut raw = scm_record(0, 1);
        raw.insert("ID".to_string(), json!("000042"));
        let msg = classify(&raw).unwrap();
        assert_eq!(msg.meter_id(), "42");
    }

    #[test]
    fn consumption_field_per_protocol() {
        assert_eq!(classify(&idm_record(1, 1, 0)).unwrap().consumption(), 12345);
        assert_eq!(classify(&netidm_record(1)).unwrap().consumption(), 20312);
        assert_eq!(classify(&scm_record(1, 777)).unwrap().consumption(), 777);
        for desc in PROTOCOLS.iter() {
            assert!(!desc.diagnostics.is_empty());
        }
    }
}
