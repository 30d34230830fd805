use amr2mqtt::{mqtt::{ha_interface::DiscoveryBuilder, queue_discovery}, rtlamr::DecoderError, AmrManager, Config, MqttManager, RtlamrProcess, Transmission};
use log::{error, info};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;


#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let default_filter = std::env::var("AMR2MQTT_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let (mut decoder, stdout) = match RtlamrProcess::start(&config) {
        Ok(d) => d,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let (mut mqtt, tx, refused) = match MqttManager::new(&config.mqtt) {
        Ok(m) => m,
        Err(e) => {
            error!("{e}");
            decoder.stop().await;
            std::process::exit(1);
        }
    };

    let mqtt_thread: JoinHandle<()> = tokio::spawn(async move {
        mqtt.start_thread().await;
    });

    if config.discovery.enabled {
        let builder = DiscoveryBuilder::from_config(&config);
        let queued = queue_discovery(&tx, builder.build_all(&config.meters)).await;
        info!("Discovery queued for {} meters, {queued} documents", config.meters.len());
    }

    let mut amr = AmrManager::new(tx.clone(), &config);
    let amr_thread: JoinHandle<Result<(), DecoderError>> = tokio::spawn(async move {
        amr.start_thread(stdout).await
    });

    let mut sigterm = signal(SignalKind::terminate())?;
    info!("All modules started, now waiting for a signal to exit");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => { info!("SIGINT received"); },
        _ = sigterm.recv() => { info!("SIGTERM received"); },
        res = amr_thread => {
            match res {
                Ok(Ok(())) => info!("AMR thread finished"),
                Ok(Err(e)) => error!("{e}"),
                Err(e) => error!("AMR thread failed: {e}"),
            }
        },
        Ok(e) = refused => { error!("Shutting down: {e}"); },
    }

    let _ = tx.send(Transmission::Shutdown).await;
    let _ = mqtt_thread.await;
    decoder.stop().await;
    Ok(())
}
