//! The assembled television: features, their dependency wiring, and the
//! background refresh loop.

use crate::config::Config;
use crate::error::Result;
use crate::features::{
    AmbilightFeature, AmbilightStyle, DeviceInfo, PowerFeature, RemoteControl, ScreenFeature,
    VolumeFeature, VolumeState,
};
use crate::gateway::{DeviceGateway, HttpTransport, Transport};
use crate::wake::WakeSequencer;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything the host can observe at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub power: bool,
    pub screen: bool,
    pub volume: VolumeState,
    pub ambilight_on: bool,
    pub ambilight_style: AmbilightStyle,
}

pub struct Television {
    power: Arc<PowerFeature>,
    screen: Arc<ScreenFeature>,
    volume: Arc<VolumeFeature>,
    ambilight: Arc<AmbilightFeature>,
    remote: RemoteControl,
    info: DeviceInfo,
    shutdown: CancellationToken,
}

impl Television {
    /// Connect over HTTP and UDP as configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::from_config(&config.tv)?);
        let wake = WakeSequencer::from_config(&config.wake)?;
        Ok(Self::with_parts(config, transport, wake))
    }

    /// Build the features on top of an arbitrary transport and wake sequencer.
    ///
    /// Dependency edges: power feeds screen, volume and Ambilight; screen
    /// feeds Ambilight.
    pub fn with_parts(config: &Config, transport: Arc<dyn Transport>, wake: WakeSequencer) -> Self {
        let gateway = DeviceGateway::new(transport);
        let ms = Duration::from_millis;

        let power = Arc::new(PowerFeature::new(
            gateway.clone(),
            wake,
            ms(config.cache.power_ttl_ms),
            ms(config.notify.power_delay_ms),
        ));
        let screen = Arc::new(ScreenFeature::new(
            gateway.clone(),
            ms(config.cache.screen_ttl_ms),
            ms(config.notify.screen_delay_ms),
        ));
        let volume = Arc::new(VolumeFeature::new(
            gateway.clone(),
            ms(config.cache.volume_ttl_ms),
            ms(config.notify.volume_delay_ms),
        ));
        let ambilight = Arc::new(AmbilightFeature::new(
            gateway.clone(),
            config.ambilight.clone(),
            screen.context(),
            ms(config.cache.ambilight_ttl_ms),
            ms(config.notify.ambilight_delay_ms),
        ));

        power.notifier().add_dependant(&screen);
        power.notifier().add_dependant(&volume);
        power.notifier().add_dependant(&ambilight);
        screen.notifier().add_dependant(&ambilight);

        Self {
            power,
            screen,
            volume,
            ambilight,
            remote: RemoteControl::new(gateway.clone(), &config.keys),
            info: DeviceInfo::new(gateway),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn power(&self) -> &PowerFeature {
        &self.power
    }

    pub fn screen(&self) -> &ScreenFeature {
        &self.screen
    }

    pub fn volume(&self) -> &VolumeFeature {
        &self.volume
    }

    pub fn ambilight(&self) -> &AmbilightFeature {
        &self.ambilight
    }

    pub fn remote(&self) -> &RemoteControl {
        &self.remote
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Read every feature through the caches.
    ///
    /// Power and screen go first, so Ambilight files the style it reads
    /// under the screen state of this round.
    pub async fn snapshot(&self) -> Snapshot {
        let (power, screen) = tokio::join!(self.power.get_state(), self.screen.get_state());
        let (volume, (ambilight_on, ambilight_style)) =
            tokio::join!(self.volume.get_volume(), self.ambilight.get_state());
        Snapshot {
            power,
            screen,
            volume,
            ambilight_on,
            ambilight_style,
        }
    }

    /// Take a snapshot every `interval` until [`shutdown`](Self::shutdown).
    ///
    /// Changes between consecutive snapshots are logged.
    pub fn spawn_poller(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let tv = Arc::clone(self);
        let cancel = self.shutdown.child_token();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last: Option<Snapshot> = None;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let current = tv.snapshot().await;
                if last.as_ref() != Some(&current) {
                    log::info!(
                        "[Poller] power={} screen={} volume={}%{} ambilight={} ({})",
                        current.power,
                        current.screen,
                        current.volume.percentage(),
                        if current.volume.muted { " muted" } else { "" },
                        current.ambilight_on,
                        current.ambilight_style.style_name
                    );
                }
                last = Some(current);
            }
            log::debug!("[Poller] stopped");
        })
    }

    /// Stop the poller and drop every dependant refresh that is still waiting.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.power.notifier().cancel_pending();
        self.screen.notifier().cancel_pending();
        self.volume.notifier().cancel_pending();
        self.ambilight.notifier().cancel_pending();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
