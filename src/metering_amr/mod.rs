use chrono::{DateTime, FixedOffset};
use log::{debug, error, info};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::Sender;

use crate::config::Config;
use crate::models::AmrProtocol;
use crate::mqtt::Transmission;
use crate::rtlamr::DecoderError;

pub mod structs;
pub mod classifier;
pub mod converter;
pub mod intervals;
pub mod normalizer;
pub mod gate;

use normalizer::{NormalizedReading, ReadingNormalizer};
use structs::RawRecord;

/// Why a decoder line did not turn into a reading
#[derive(Error, Debug)]
pub enum AmrError {
    #[error("Line is not valid decoder JSON: {0}")]
    MalformedLine(#[from] serde_json::Error),
    #[error("Line carries no Message")]
    NoMessage,
    #[error("Unsupported message with {field_count} fields")]
    UnrecognizedShape { field_count: usize },
    #[error("Message looks like {protocol:?} but is missing fields: {source}")]
    MissingField { protocol: AmrProtocol, source: serde_json::Error },
}

impl AmrError {
    /// Broken input gets a short pause, messages we just do not handle do not
    pub fn needs_pause(&self) -> bool {
        matches!(self, AmrError::MalformedLine(_) | AmrError::MissingField { .. })
    }
}

/// One line of `rtlamr -format=json`
#[derive(Deserialize, Debug)]
struct DecoderLine {
    #[serde(rename = "Time")]
    time: DateTime<FixedOffset>,
    #[serde(rename = "Message")]
    message: Option<RawRecord>,
}

/// Splits a decoder line into the message and the time it was received
pub fn parse_line(line: &str) -> Result<(RawRecord, DateTime<FixedOffset>), AmrError> {
    let decoded: DecoderLine = serde_json::from_str(line.trim())?;
    match decoded.message {
        Some(message) => Ok((message, decoded.time)),
        None => Err(AmrError::NoMessage),
    }
}

pub struct AmrManager {
    sender: Sender<Transmission>,
    normalizer: ReadingNormalizer,
    error_pause: Duration,
}

impl AmrManager {
    pub fn new(sender: Sender<Transmission>, config: &Config) -> Self {
        return AmrManager {
            sender,
            normalizer: ReadingNormalizer::from_config(config),
            error_pause: Duration::from_secs(config.rtlamr.error_pause),
        };
    }

    /// Normalizes one line, `None` means the reading must not be published
    pub fn process_line(&mut self, line: &str) -> Result<Option<NormalizedReading>, AmrError> {
        let (raw, received) = parse_line(line)?;
        let reading = self.normalizer.normalize(raw, received)?;

        debug!("Meter: {}, MsgType: {}, Reading: {}",
               reading.meter_id, reading.protocol.to_string(), reading.to_json().unwrap_or_default());

        if !self.normalizer.should_publish(&reading) {
            return Ok(None);
        }
        return Ok(Some(reading));
    }

    /// Handles decoder output, the stream ending is reported as [`DecoderError::Exited`]
    pub async fn start_thread<R: AsyncBufRead + Unpin>(&mut self, reader: R) -> Result<(), DecoderError> {
        info!("Starting AMR thread, waiting for decoder lines");
        let mut lines = reader.lines();

        loop {
            let line = match lines.next_line().await? {
                Some(line) => line,
                None => return Err(DecoderError::Exited),
            };

            if line.trim().is_empty() {
                continue;
            }

            match self.process_line(&line) {
                Ok(Some(reading)) => {
                    if self.sender.send(Transmission::Reading(reading)).await.is_err() {
                        error!("MQTT side has gone away, stopping");
                        return Ok(());
                    }
                },
                Ok(None) => {},
                Err(e) => {
                    debug!("Skipping line: {e}");
                    if e.needs_pause() && !self.error_pause.is_zero() {
                        tokio::time::sleep(self.error_pause).await;
                    }
                }
            }
        }
    }
}
