use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

mod analytics;
mod api;
mod buffer;
mod camera;
mod config;
mod notify;

use analytics::ObjectDetector;
use api::AppState;
use camera::{CameraWorker, Registry, VideoCaptureSource, WorkerSettings};
use config::Config;
use notify::{
    EmailChannel, FileLogChannel, NotificationChannel, NotificationDispatcher,
    NotificationThrottler,
};

const DISPATCH_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("camwatch=debug".parse()?))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    tracing::info!("loaded {} camera(s)", config.cameras.len());

    let channels = notification_channels(&config)?;
    let (notify_tx, notify_rx) = notify::queue();
    let dispatcher = tokio::spawn(NotificationDispatcher::new(notify_rx, channels).run());

    let mut registry = Registry::new();
    for cam_config in &config.cameras {
        let detector = ObjectDetector::new(
            &config.detection.model,
            config.detection.confidence_threshold,
            config.detection.classes.clone(),
            config.detection.intra_threads,
        )
        .map_err(|e| format!("camera {}: failed to load model: {e}", cam_config.id))?;

        let source = VideoCaptureSource::new(cam_config.url.clone(), config.capture.read_timeout());
        let throttler = NotificationThrottler::new(
            cam_config.id.clone(),
            config.notifications.cooldown(),
            notify_tx.clone(),
        );

        let worker = CameraWorker::new(
            cam_config.clone(),
            WorkerSettings::from_config(&config, cam_config),
            Box::new(source),
            Box::new(detector),
            throttler,
        );
        registry.register(worker)?;
    }
    drop(notify_tx);
    tracing::info!(cameras = ?registry.camera_ids(), "registered {} camera(s)", registry.len());

    let registry = Arc::new(registry);
    registry.start_all();

    let state = AppState::new(Arc::clone(&registry), config.stream.poll_interval());

    let served = serve_until_shutdown(state, config.http.port).await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "HTTP server failed");
    }

    let stopping = Arc::clone(&registry);
    tokio::task::spawn_blocking(move || stopping.stop_all()).await?;

    // Open viewer connections may still hold the registry, and with it the
    // throttlers' senders, so the dispatcher only gets a grace period.
    drop(registry);
    match tokio::time::timeout(DISPATCH_GRACE, dispatcher).await {
        Ok(Err(e)) => tracing::error!(error = %e, "notification dispatcher failed"),
        Err(_) => tracing::debug!("notification dispatcher still running at shutdown"),
        Ok(Ok(())) => {}
    }

    served?;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn serve_until_shutdown(state: AppState, port: u16) -> std::io::Result<()> {
    tokio::select! {
        result = api::start_server(state, port) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    }
}

fn notification_channels(config: &Config) -> Result<Vec<NotificationChannel>, notify::NotifyError> {
    let mut channels = vec![NotificationChannel::FileLog(FileLogChannel::new(
        &config.notifications.log_file,
    ))];

    if config.notifications.email.enabled {
        channels.push(NotificationChannel::Email(EmailChannel::new(
            &config.notifications.email,
        )?));
    }

    Ok(channels)
}
