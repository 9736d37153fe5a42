use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::GeolocationConfig;
use crate::models::GeoLocation;

#[cfg(test)]
use mockall::automock;

/// Platform failure codes. Never escapes the adapter.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeolocationUnavailable {
    #[error("Geolocation permission denied by user.")]
    PermissionDenied,
    #[error("Location information is unavailable.")]
    PositionUnavailable,
    #[error("The request to get user location timed out.")]
    Timeout,
}

/// Best-effort, one-shot position lookup offered by the platform.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(
        &self,
        timeout: Duration,
    ) -> std::result::Result<GeoLocation, GeolocationUnavailable>;
}

/// Reports a configured position, or a failure when none is configured.
#[derive(Debug, Clone)]
pub struct StaticLocationProvider {
    location: Option<GeoLocation>,
    enabled: bool,
}

impl StaticLocationProvider {
    pub fn new(location: Option<GeoLocation>, enabled: bool) -> Self {
        Self { location, enabled }
    }

    pub fn from_config(cfg: &GeolocationConfig) -> Self {
        Self::new(cfg.fixed_location(), cfg.enabled)
    }
}

#[async_trait]
impl LocationProvider for StaticLocationProvider {
    async fn current_position(
        &self,
        _timeout: Duration,
    ) -> std::result::Result<GeoLocation, GeolocationUnavailable> {
        if !self.enabled {
            return Err(GeolocationUnavailable::PermissionDenied);
        }
        self.location
            .ok_or(GeolocationUnavailable::PositionUnavailable)
    }
}

/// Wraps the platform lookup with a bounded wait. Never fails: every problem
/// becomes `None` plus a reason handed to the caller's notifier.
pub struct GeolocationAdapter {
    provider: Arc<dyn LocationProvider>,
    timeout: Duration,
}

impl GeolocationAdapter {
    pub fn new(provider: Arc<dyn LocationProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn resolve<F>(&self, on_failure: F) -> Option<GeoLocation>
    where
        F: FnOnce(&str),
    {
        let lookup = self.provider.current_position(self.timeout);
        let outcome = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(result) => result,
            Err(_) => Err(GeolocationUnavailable::Timeout),
        };

        match outcome {
            Ok(location) => {
                tracing::debug!(
                    latitude = location.latitude,
                    longitude = location.longitude,
                    "Resolved user location"
                );
                Some(location)
            }
            Err(reason) => {
                tracing::warn!("Geolocation error: {}", reason);
                on_failure(&reason.to_string());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct SlowProvider;

    #[async_trait]
    impl LocationProvider for SlowProvider {
        async fn current_position(
            &self,
            _timeout: Duration,
        ) -> std::result::Result<GeoLocation, GeolocationUnavailable> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(GeoLocation {
                latitude: 0.0,
                longitude: 0.0,
            })
        }
    }

    async fn resolve_with(failure: GeolocationUnavailable) -> (Option<GeoLocation>, Option<String>) {
        let mut mock = MockLocationProvider::new();
        mock.expect_current_position()
            .times(1)
            .returning(move |_| Err(failure));
        let adapter = GeolocationAdapter::new(Arc::new(mock), Duration::from_secs(10));

        let mut reason = None;
        let location = adapter.resolve(|r| reason = Some(r.to_string())).await;
        (location, reason)
    }

    #[tokio::test]
    async fn test_each_failure_resolves_to_none_with_distinct_reason() {
        let mut reasons = HashSet::new();
        for failure in [
            GeolocationUnavailable::PermissionDenied,
            GeolocationUnavailable::PositionUnavailable,
            GeolocationUnavailable::Timeout,
        ] {
            let (location, reason) = resolve_with(failure).await;
            assert!(location.is_none());
            reasons.insert(reason.expect("notifier should be called"));
        }
        assert_eq!(reasons.len(), 3);
    }

    #[tokio::test]
    async fn test_success_skips_notifier() {
        let mut mock = MockLocationProvider::new();
        mock.expect_current_position().times(1).returning(|_| {
            Ok(GeoLocation {
                latitude: 35.69,
                longitude: 51.39,
            })
        });
        let adapter = GeolocationAdapter::new(Arc::new(mock), Duration::from_secs(10));

        let mut called = false;
        let location = adapter.resolve(|_| called = true).await;
        assert_eq!(location.map(|l| l.latitude), Some(35.69));
        assert!(!called);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait_reports_timeout() {
        let adapter = GeolocationAdapter::new(Arc::new(SlowProvider), Duration::from_secs(10));
        let mut reason = None;
        let location = adapter.resolve(|r| reason = Some(r.to_string())).await;
        assert!(location.is_none());
        assert_eq!(
            reason.as_deref(),
            Some("The request to get user location timed out.")
        );
    }

    #[tokio::test]
    async fn test_static_provider_outcomes() {
        let loc = GeoLocation {
            latitude: 1.0,
            longitude: 2.0,
        };
        let timeout = Duration::from_secs(1);
        assert_eq!(
            StaticLocationProvider::new(Some(loc), true)
                .current_position(timeout)
                .await,
            Ok(loc)
        );
        assert_eq!(
            StaticLocationProvider::new(Some(loc), false)
                .current_position(timeout)
                .await,
            Err(GeolocationUnavailable::PermissionDenied)
        );
        assert_eq!(
            StaticLocationProvider::new(None, true)
                .current_position(timeout)
                .await,
            Err(GeolocationUnavailable::PositionUnavailable)
        );
    }
}
