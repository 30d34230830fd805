use chrono::{DateTime, FixedOffset, Local, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashMap;

use crate::config::{Config, MeterConfig};
use crate::models::{AmrProtocol, LastSeenFormat};
use super::classifier::{self, CONSUMPTION_FIELD, INTERVAL_FIELD, INTERVAL_START_FIELD};
use super::converter::{to_json_number, Conversion};
use super::gate;
use super::intervals::IntervalTracker;
use super::structs::RawRecord;
use super::AmrError;

pub const LAST_SEEN_FIELD: &str = "last_seen";
pub const PROTOCOL_FIELD: &str = "Protocol";

/// A reading ready to be published, all decoder fields plus what we added
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReading {
    pub meter_id: String,
    pub protocol: AmrProtocol,
    pub document: serde_json::Map<String, Value>,
}

impl NormalizedReading {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        return serde_json::to_string(&self.document);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadingOptions {
    pub last_seen: Option<LastSeenFormat>,
    /// Used when watching all protocols so people can tell what they receive
    pub tag_protocol: bool,
}

pub struct ReadingNormalizer {
    meters: HashMap<String, MeterConfig>,
    options: ReadingOptions,
    intervals: IntervalTracker,
}

impl ReadingNormalizer {
    pub fn new(meters: HashMap<String, MeterConfig>, options: ReadingOptions) -> Self {
        return ReadingNormalizer {
            meters,
            options,
            intervals: IntervalTracker::new(),
        };
    }

    pub fn from_config(config: &Config) -> Self {
        let options = ReadingOptions {
            last_seen: config.last_seen.active_format(),
            tag_protocol: config.rtlamr.watches_all(),
        };
        return ReadingNormalizer::new(config.meters.clone(), options);
    }

    pub fn normalize(&mut self, raw: RawRecord, received: DateTime<FixedOffset>) -> Result<NormalizedReading, AmrError> {
        return self.normalize_at(raw, received, Utc::now());
    }

    /// Same as [`ReadingNormalizer::normalize`] with the clock for `last_seen` passed in
    pub fn normalize_at(&mut self, raw: RawRecord, received: DateTime<FixedOffset>, now: DateTime<Utc>) -> Result<NormalizedReading, AmrError> {
        /* Classification fails before any state is touched */
        let message = classifier::classify(&raw)?;
        let meter_id = message.meter_id();
        let protocol = message.protocol();
        let conversion = Conversion::for_meter(self.meters.get(&meter_id));

        let mut document = raw;
        document.insert(CONSUMPTION_FIELD.to_string(), to_json_number(conversion.apply(message.consumption())));

        if let Some(report) = message.intervals() {
            let converted: Vec<Value> = conversion.apply_all(report.intervals).into_iter().map(to_json_number).collect();
            let window = self.intervals.update(&meter_id, report.interval_count, report.transmit_time_offset, received);

            document.insert(INTERVAL_FIELD.to_string(), Value::Array(converted));
            document.insert(INTERVAL_START_FIELD.to_string(), format_interval_start(window.start).into());
        }

        if let Some(format) = self.options.last_seen {
            document.insert(LAST_SEEN_FIELD.to_string(), format_last_seen(format, now));
        }

        if self.options.tag_protocol {
            document.insert(PROTOCOL_FIELD.to_string(), protocol.to_string().into());
        }

        return Ok(NormalizedReading { meter_id, protocol, document });
    }

    pub fn should_publish(&self, reading: &NormalizedReading) -> bool {
        return gate::should_publish(&self.meters, &reading.meter_id, reading.protocol);
    }

    pub fn intervals(&self) -> &IntervalTracker {
        return &self.intervals;
    }
}

/// Microsecond resolution, the fraction is left out when there is none
pub fn format_interval_start(start: DateTime<FixedOffset>) -> String {
    if start.timestamp_subsec_micros() == 0 {
        return start.to_rfc3339_opts(SecondsFormat::Secs, false);
    }
    return start.to_rfc3339_opts(SecondsFormat::Micros, false);
}

pub fn format_last_seen(format: LastSeenFormat, now: DateTime<Utc>) -> Value {
    match format {
        LastSeenFormat::Iso8601Local => now.with_timezone(&Local).to_rfc3339_opts(SecondsFormat::Secs, false).into(),
        LastSeenFormat::Iso8601 => now.to_rfc3339_opts(SecondsFormat::Secs, false).into(),
        LastSeenFormat::Epoch => now.timestamp().into(),
    }
}
