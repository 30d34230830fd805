pub mod ha_interface;

use std::fs;
use std::time::Duration;
use crate::config::MqttConfig;
use crate::metering_amr::normalizer::NormalizedReading;
use crate::mqtt::ha_interface::DiscoveryDocument;
use log::{debug, error, info};
use thiserror::Error;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::oneshot;
use rumqttc::{AsyncClient, ConnectReturnCode, ConnectionError, Event, LastWill, MqttOptions, Packet, QoS, TlsConfiguration, Transport};

pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

#[derive(Error, Debug)]
pub enum MqttError {
    #[error("Unable to read TLS file {path}: {source}")]
    TlsFile { path: String, source: std::io::Error },
    #[error("Client certificate and key have to be given together")]
    IncompleteClientAuth,
    #[error("MQTT Broker refused connection - {reason} (result code {code:?})")]
    Refused { reason: &'static str, code: ConnectReturnCode },
}

pub fn refusal_reason(code: ConnectReturnCode) -> &'static str {
    match code {
        ConnectReturnCode::RefusedProtocolVersion => "Incorrect protocol version",
        ConnectReturnCode::BadClientId => "Invalid client identifier",
        ConnectReturnCode::ServiceUnavailable => "Server unavailable",
        ConnectReturnCode::BadUserNamePassword => "Bad username or password",
        ConnectReturnCode::NotAuthorized => "Not authorised",
        _ => "Unknown error",
    }
}

pub enum Transmission {
    Reading(NormalizedReading),
    AutoDiscovery(DiscoveryDocument),
    Shutdown,
}

/// Hands discovery documents to the MQTT thread, returns how many got queued
pub async fn queue_discovery(tx: &Sender<Transmission>, docs: Vec<DiscoveryDocument>) -> usize {
    let mut queued = 0;
    for doc in docs {
        if let Err(e) = tx.send(Transmission::AutoDiscovery(doc)).await {
            error!("Unable to queue discovery document: {e}");
            break;
        }
        queued += 1;
    }
    return queued;
}

pub struct MqttManager {
    rx: Receiver<Transmission>,
    exit_thread: bool,
    client: AsyncClient,
    config: MqttConfig,
}

fn read_tls_file(path: &str) -> Result<Vec<u8>, MqttError> {
    return fs::read(path).map_err(|source| MqttError::TlsFile { path: path.to_string(), source });
}

fn tls_transport(config: &MqttConfig) -> Result<Option<Transport>, MqttError> {
    let ca_path = match &config.ca_cert {
        Some(p) => p,
        None => return Ok(None),
    };

    let client_auth = match (&config.client_cert, &config.client_key) {
        (Some(cert), Some(key)) => Some((read_tls_file(cert)?, read_tls_file(key)?)),
        (None, None) => None,
        _ => return Err(MqttError::IncompleteClientAuth),
    };

    return Ok(Some(Transport::tls_with_config(TlsConfiguration::Simple {
        ca: read_tls_file(ca_path)?,
        alpn: None,
        client_auth,
    })));
}

/// Client id from the config or a random one so two bridges do not kick each other
pub fn client_id(config: &MqttConfig) -> String {
    match &config.client_name {
        Some(name) if !name.is_empty() => name.clone(),
        _ => format!("amr2mqtt-{}", uuid::Uuid::new_v4()),
    }
}

impl MqttManager {
    /// The returned receiver fires once when the broker refuses us, the bridge has to stop then
    pub fn new(config: &MqttConfig) -> Result<(Self, Sender<Transmission>, oneshot::Receiver<MqttError>), MqttError> {
        let (mtx, mrx) = tokio::sync::mpsc::channel(100);
        let (refused_tx, refused_rx) = oneshot::channel();

        info!("MQTT connection to {}:{} starting up", config.host, config.port);
        let availability_topic = config.availability_topic();
        let mut mqttoptions = MqttOptions::new(client_id(config), config.host.clone(), config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive));
        mqttoptions.set_last_will(LastWill::new(availability_topic.clone(), PAYLOAD_OFFLINE, QoS::AtLeastOnce, true));

        if let Some(user) = &config.user {
            mqttoptions.set_credentials(user.clone(), config.pass.clone().unwrap_or_default());
        }

        if let Some(transport) = tls_transport(config)? {
            info!("Using TLS for the MQTT connection");
            mqttoptions.set_transport(transport);
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

        let online_c = client.clone();
        let online_topic = availability_topic;
        tokio::spawn(async move {
            info!("MQTT Eventloop started");
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected, announcing availability");
                        let client_clone = online_c.clone();
                        let topic = online_topic.clone();
                        /* The request queue is drained by this very loop, do not block it */
                        tokio::spawn(async move {
                            if let Err(e) = client_clone.publish(topic, QoS::AtLeastOnce, true, PAYLOAD_ONLINE).await {
                                error!("Unable to publish availability: {e}");
                            }
                        });
                    },
                    Ok(_) => {},
                    Err(ConnectionError::ConnectionRefused(code)) => {
                        let e = MqttError::Refused { reason: refusal_reason(code), code };
                        error!("{e}");
                        let _ = refused_tx.send(e);
                        return;
                    },
                    Err(e) => {
                        error!("Error in MQTT {:?}, reconnecting ", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        return Ok((MqttManager {
            client,
            rx: mrx,
            exit_thread: false,
            config: config.clone(),
        }, mtx, refused_rx));
    }

    async fn publish(&self, topic: String, qos: QoS, retain: bool, payload: String) {
        match self.client.publish(topic.clone(), qos, retain, payload).await {
            Err(e) => { error!("Error publishing to {topic}: {e}"); },
            Ok(_) => { debug!("Published to {topic}"); }
        }
    }

    pub async fn start_thread(&mut self) {
        while !self.exit_thread {
            let transmission = match self.rx.recv().await {
                Some(t) => t,
                None => {
                    debug!("Reading returned none, we exit now");
                    self.exit_thread = true;
                    continue;
                }
            };

            match transmission {
                Transmission::Reading(reading) => {
                    let payload = match reading.to_json() {
                        Ok(p) => p,
                        Err(e) => { error!("Unable to serialize reading of {}: {e}", reading.meter_id); continue; }
                    };
                    self.publish(self.config.reading_topic(&reading.meter_id), QoS::AtLeastOnce, false, payload).await;
                },
                Transmission::AutoDiscovery(disc) => {
                    match disc.to_json() {
                        Ok(payload) => self.publish(disc.topic.clone(), QoS::AtLeastOnce, true, payload).await,
                        Err(e) => error!("Unable to serialize discovery for {}: {e}", disc.topic),
                    }
                },
                Transmission::Shutdown => {
                    info!("Disconnecting from MQTT broker");
                    self.publish(self.config.availability_topic(), QoS::AtLeastOnce, true, PAYLOAD_OFFLINE.to_string()).await;
                    let _ = self.client.disconnect().await;
                    self.exit_thread = true;
                },
            };
        }

        info!("MQTT thread exit");
    }
}
