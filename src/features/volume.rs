//! Speaker volume and mute, exposed to the host as a 0-100 percentage.
//!
//! The TV reports volume in its own step range (`min..=max`, typically
//! `0..=60`). Converting percent to steps rounds; converting back floors, so
//! a round trip may land one step off.

use crate::cache::ExpiringCache;
use crate::error::Result;
use crate::gateway::DeviceGateway;
use crate::notifier::{Dependant, FeatureKind, Notifier, StateChange};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ENDPOINT: &str = "audio/volume";

/// Volume as the TV reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeState {
    pub min: i32,
    pub max: i32,
    pub current: i32,
    #[serde(default)]
    pub muted: bool,
}

impl Default for VolumeState {
    fn default() -> Self {
        Self {
            min: 0,
            max: 60,
            current: 0,
            muted: false,
        }
    }
}

impl VolumeState {
    pub fn percentage(&self) -> u8 {
        let span = i64::from(self.max) - i64::from(self.min);
        if span <= 0 {
            return 0;
        }
        let offset = (i64::from(self.current) - i64::from(self.min)).clamp(0, span);
        (offset * 100 / span) as u8
    }

    /// The same state with `current` set to `percent` of the range.
    pub fn with_percentage(self, percent: u8) -> Self {
        let span = i64::from(self.max) - i64::from(self.min);
        if span <= 0 {
            return Self {
                current: self.min,
                ..self
            };
        }
        let percent = f64::from(percent.min(100));
        let current = self.min + (span as f64 * percent / 100.0).round() as i32;
        Self { current, ..self }
    }

    pub fn with_muted(self, muted: bool) -> Self {
        Self { muted, ..self }
    }
}

/// What the TV accepts on write.
#[derive(Debug, Serialize)]
struct VolumeWrite {
    current: i32,
    muted: bool,
}

pub struct VolumeFeature {
    gateway: DeviceGateway,
    cache: ExpiringCache<VolumeState>,
    notifier: Notifier,
}

impl VolumeFeature {
    pub fn new(gateway: DeviceGateway, ttl: Duration, notify_delay: Duration) -> Self {
        Self {
            gateway,
            cache: ExpiringCache::new("volume", ttl),
            notifier: Notifier::new(FeatureKind::Volume, notify_delay),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn cache(&self) -> &ExpiringCache<VolumeState> {
        &self.cache
    }

    /// Current volume. On a failed read the last known state (or the default
    /// range at zero) is served for another TTL window.
    pub async fn get_volume(&self) -> VolumeState {
        let fetch = move || self.gateway.get::<VolumeState>(ENDPOINT);
        match self.cache.get_or_refresh(fetch, VolumeState::default()).await {
            Ok(state) => state,
            Err(e) => {
                log::warn!("[Volume] state unavailable, keeping last known: {}", e);
                self.cache.extend_lease(VolumeState::default())
            }
        }
    }

    pub async fn get_percentage(&self) -> u8 {
        self.get_volume().await.percentage()
    }

    pub async fn is_muted(&self) -> bool {
        self.get_volume().await.muted
    }

    pub async fn set_percentage(&self, percent: u8) -> Result<()> {
        let desired = self.get_volume().await.with_percentage(percent);
        self.apply(desired).await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        let desired = self.get_volume().await.with_muted(muted);
        self.apply(desired).await
    }

    async fn apply(&self, desired: VolumeState) -> Result<()> {
        if self.get_volume().await == desired {
            return Ok(());
        }

        self.cache.update(desired);
        let body = VolumeWrite {
            current: desired.current,
            muted: desired.muted,
        };
        let result = self.gateway.post(ENDPOINT, &body).await.map(|_| ());
        self.cache.update(desired);
        self.notifier.schedule_dependant_refresh(StateChange::Volume);

        match &result {
            Ok(()) => log::info!(
                "[Volume] set to {}%{}",
                desired.percentage(),
                if desired.muted { " (muted)" } else { "" }
            ),
            Err(e) => log::warn!("[Volume] write failed: {}", e),
        }
        result
    }
}

#[async_trait]
impl Dependant for VolumeFeature {
    fn name(&self) -> &'static str {
        "volume"
    }

    async fn acknowledge(&self, _change: &StateChange) -> Result<()> {
        self.cache.invalidate();
        self.get_volume().await;
        Ok(())
    }
}
