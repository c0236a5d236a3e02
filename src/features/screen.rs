//! Screen on/off, independent of power (audio-only and Ambilight-only modes).

use super::{is_on, on_off};
use crate::cache::ExpiringCache;
use crate::error::Result;
use crate::gateway::DeviceGateway;
use crate::notifier::{Dependant, FeatureKind, Notifier, StateChange};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const ENDPOINT: &str = "screenstate";

#[derive(Debug, Serialize, Deserialize)]
struct ScreenState {
    screenstate: String,
}

/// Last screen state actually observed, shared with features that keep
/// separate state for a lit and a dark screen. Starts lit.
#[derive(Debug, Clone)]
pub struct ScreenContext(Arc<AtomicBool>);

impl Default for ScreenContext {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl ScreenContext {
    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::SeqCst);
    }
}

pub struct ScreenFeature {
    gateway: DeviceGateway,
    cache: ExpiringCache<bool>,
    context: ScreenContext,
    notifier: Notifier,
}

impl ScreenFeature {
    pub fn new(gateway: DeviceGateway, ttl: Duration, notify_delay: Duration) -> Self {
        Self {
            gateway,
            cache: ExpiringCache::new("screen", ttl),
            context: ScreenContext::default(),
            notifier: Notifier::new(FeatureKind::Screen, notify_delay),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn cache(&self) -> &ExpiringCache<bool> {
        &self.cache
    }

    /// Follows every screen state read from or written to the TV.
    pub fn context(&self) -> ScreenContext {
        self.context.clone()
    }

    /// Whether the screen is lit. An unreachable TV is reported as off.
    pub async fn get_state(&self) -> bool {
        self.cache
            .get_or_refresh(move || self.fetch(), false)
            .await
            .unwrap_or(false)
    }

    async fn fetch(&self) -> Result<bool> {
        match self.gateway.get::<ScreenState>(ENDPOINT).await {
            Ok(state) => {
                let on = is_on(&state.screenstate);
                self.context.set(on);
                Ok(on)
            }
            Err(e) => {
                log::warn!("[Screen] state unavailable, assuming off: {}", e);
                Ok(false)
            }
        }
    }

    pub async fn set_state(&self, on: bool) -> Result<()> {
        if self.get_state().await == on {
            return Ok(());
        }

        self.cache.update(on);
        self.context.set(on);
        let state = ScreenState {
            screenstate: on_off(on).to_string(),
        };
        let result = self.gateway.post(ENDPOINT, &state).await.map(|_| ());
        self.cache.update(on);
        self.notifier
            .schedule_dependant_refresh(StateChange::Screen { on });

        match &result {
            Ok(()) => log::info!("[Screen] screen switched {}", on_off(on)),
            Err(e) => log::warn!("[Screen] switching screen {} failed: {}", on_off(on), e),
        }
        result
    }
}

#[async_trait]
impl Dependant for ScreenFeature {
    fn name(&self) -> &'static str {
        "screen"
    }

    async fn acknowledge(&self, change: &StateChange) -> Result<()> {
        match *change {
            // The screen follows power; no need to ask the TV.
            StateChange::Power { on } => {
                log::debug!("[Screen] adopting power state {}", on_off(on));
                self.cache.update(on);
                self.context.set(on);
            }
            _ => {
                self.cache.invalidate();
                self.get_state().await;
            }
        }
        Ok(())
    }
}
