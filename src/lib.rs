pub mod classify;
pub mod config;
pub mod error;
pub mod gateway;
pub mod geolocation;
pub mod models;
pub mod notifications;
pub mod orchestrator;
pub mod parse;
pub mod prompts;
pub mod sse;
pub mod state;
pub mod transport;
pub mod visual;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::gateway::{AiGateway, GeminiGateway};
use crate::geolocation::{GeolocationAdapter, LocationProvider, StaticLocationProvider};
use crate::notifications::NotificationCenter;
use crate::orchestrator::Orchestrator;
use crate::transport::{GeminiTransport, Transport};

/// Wire the Gemini transport, gateway, notification center and location
/// lookup into a ready orchestrator.
pub fn build_orchestrator(cfg: &Config) -> Result<Orchestrator> {
    let transport = Arc::new(GeminiTransport::new(&cfg.gemini, cfg.retry.clone())?);

    let gateway = GeminiGateway::new(Arc::clone(&transport) as Arc<dyn Transport>, cfg);

    let locator = GeolocationAdapter::new(
        Arc::new(StaticLocationProvider::from_config(&cfg.geolocation)) as Arc<dyn LocationProvider>,
        cfg.geolocation.timeout(),
    );

    Ok(Orchestrator::new(
        Arc::new(gateway) as Arc<dyn AiGateway>,
        NotificationCenter::new(&cfg.notifications),
        locator,
        cfg,
    ))
}
