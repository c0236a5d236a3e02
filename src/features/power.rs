//! TV power: `On` or `Standby`.
//!
//! Powering on from deep standby goes through the wake sequencer first. No
//! intermediate "waking" state is visible; readers see off until the
//! power-on write has settled.

use super::is_on;
use crate::cache::ExpiringCache;
use crate::error::Result;
use crate::gateway::DeviceGateway;
use crate::notifier::{FeatureKind, Notifier, StateChange};
use crate::wake::WakeSequencer;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ENDPOINT: &str = "powerstate";

#[derive(Debug, Serialize, Deserialize)]
struct PowerState {
    powerstate: String,
}

pub struct PowerFeature {
    gateway: DeviceGateway,
    wake: WakeSequencer,
    cache: ExpiringCache<bool>,
    notifier: Notifier,
}

impl PowerFeature {
    pub fn new(
        gateway: DeviceGateway,
        wake: WakeSequencer,
        ttl: Duration,
        notify_delay: Duration,
    ) -> Self {
        Self {
            gateway,
            wake,
            cache: ExpiringCache::new("power", ttl),
            notifier: Notifier::new(FeatureKind::Power, notify_delay),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn cache(&self) -> &ExpiringCache<bool> {
        &self.cache
    }

    /// Whether the TV is on. An unreachable TV is reported as off.
    pub async fn get_state(&self) -> bool {
        self.cache
            .get_or_refresh(move || self.fetch(), false)
            .await
            .unwrap_or(false)
    }

    async fn fetch(&self) -> Result<bool> {
        match self.gateway.get::<PowerState>(ENDPOINT).await {
            Ok(state) => Ok(is_on(&state.powerstate)),
            Err(e) => {
                log::warn!("[Power] state unavailable, assuming off: {}", e);
                Ok(false)
            }
        }
    }

    /// Switch the TV on or to standby. Requests for the current state are no-ops.
    pub async fn set_state(&self, on: bool) -> Result<()> {
        if self.get_state().await == on {
            log::debug!("[Power] already {}", if on { "on" } else { "in standby" });
            return Ok(());
        }

        // Readers keep seeing standby until the TV is awake.
        if on && let Err(e) = self.wake.wake_and_warm_up().await {
            log::warn!("[Power] could not wake TV: {}", e);
            return Err(e);
        }

        self.cache.update(on);
        let result = self.write(on).await;
        self.cache.update(on);
        self.notifier
            .schedule_dependant_refresh(StateChange::Power { on });

        match &result {
            Ok(()) => log::info!("[Power] TV switched {}", if on { "on" } else { "to standby" }),
            Err(e) => log::warn!("[Power] switching TV {} failed: {}", if on { "on" } else { "off" }, e),
        }
        result
    }

    async fn write(&self, on: bool) -> Result<()> {
        let state = PowerState {
            powerstate: if on { "On" } else { "Standby" }.to_string(),
        };
        self.gateway.post(ENDPOINT, &state).await?;
        Ok(())
    }
}
