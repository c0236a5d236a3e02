//! Ambilight on/off, style memory and manual colour.
//!
//! The TV has two independent knobs: a power flag (`ambilight/power`) and
//! the active style (`ambilight/currentconfiguration`). Ambilight counts as
//! on when either says so. Switching off selects the `OFF` style; switching
//! back on restores the style that was active before, remembered separately
//! for a lit and for a dark screen.

use super::color::{ColorCoalescer, DeviceColor, HsbColor};
use super::screen::ScreenContext;
use super::{is_on, on_off};
use crate::cache::ExpiringCache;
use crate::config::AmbilightConfig;
use crate::error::Result;
use crate::gateway::DeviceGateway;
use crate::notifier::{Dependant, FeatureKind, Notifier, StateChange};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const POWER_ENDPOINT: &str = "ambilight/power";
const STYLE_ENDPOINT: &str = "ambilight/currentconfiguration";

pub const OFF_STYLE_NAME: &str = "OFF";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorSettings {
    pub color: DeviceColor,
    #[serde(default)]
    pub color_delta: DeviceColor,
    #[serde(default)]
    pub speed: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// An Ambilight configuration as `ambilight/currentconfiguration` speaks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbilightStyle {
    pub style_name: String,
    #[serde(default)]
    pub is_expert: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_setting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_settings: Option<ColorSettings>,
}

impl AmbilightStyle {
    fn named(style_name: &str, menu_setting: &str) -> Self {
        Self {
            style_name: style_name.to_string(),
            is_expert: false,
            menu_setting: Some(menu_setting.to_string()),
            string_value: None,
            algorithm: None,
            color_settings: None,
        }
    }

    pub fn off() -> Self {
        Self {
            menu_setting: None,
            ..Self::named(OFF_STYLE_NAME, "")
        }
    }

    pub fn is_off(&self) -> bool {
        self.style_name == OFF_STYLE_NAME
    }

    /// Built-in restore target with a lit screen.
    pub fn follow_video() -> Self {
        Self::named("FOLLOW_VIDEO", "STANDARD")
    }

    /// Built-in restore target with a dark screen.
    pub fn lounge() -> Self {
        Self::named("FOLLOW_COLOR", "HOT_LAVA")
    }

    /// A fixed colour, as an expert-mode style.
    pub fn manual_color(color: DeviceColor) -> Self {
        Self {
            style_name: "FOLLOW_COLOR".to_string(),
            is_expert: true,
            menu_setting: None,
            string_value: None,
            algorithm: Some("MANUAL_HUE".to_string()),
            color_settings: Some(ColorSettings {
                color,
                color_delta: DeviceColor::default(),
                speed: 255,
                mode: Some("Automatic".to_string()),
            }),
        }
    }

    /// The fixed colour of a manual style.
    pub fn manual_color_value(&self) -> Option<DeviceColor> {
        match (&self.algorithm, &self.color_settings) {
            (Some(algorithm), Some(settings)) if algorithm == "MANUAL_HUE" => Some(settings.color),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AmbilightPower {
    power: String,
}

/// Last non-off style seen per screen context.
#[derive(Default)]
struct RememberedStyles {
    screen_on: Option<AmbilightStyle>,
    screen_off: Option<AmbilightStyle>,
}

impl RememberedStyles {
    fn slot(&mut self, screen_on: bool) -> &mut Option<AmbilightStyle> {
        if screen_on {
            &mut self.screen_on
        } else {
            &mut self.screen_off
        }
    }
}

pub struct AmbilightFeature {
    gateway: DeviceGateway,
    style_cache: ExpiringCache<AmbilightStyle>,
    power_cache: ExpiringCache<bool>,
    remembered: Mutex<RememberedStyles>,
    defaults: AmbilightConfig,
    screen: ScreenContext,
    color: ColorCoalescer,
    notifier: Notifier,
}

impl AmbilightFeature {
    /// `screen` decides which per-context memory styles are filed under.
    pub fn new(
        gateway: DeviceGateway,
        defaults: AmbilightConfig,
        screen: ScreenContext,
        ttl: Duration,
        notify_delay: Duration,
    ) -> Self {
        let debounce = Duration::from_millis(defaults.color_debounce_ms);
        Self {
            gateway,
            style_cache: ExpiringCache::new("ambilight style", ttl),
            power_cache: ExpiringCache::new("ambilight power", ttl),
            remembered: Mutex::new(RememberedStyles::default()),
            defaults,
            screen,
            color: ColorCoalescer::new(debounce),
            notifier: Notifier::new(FeatureKind::Ambilight, notify_delay),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn style_cache(&self) -> &ExpiringCache<AmbilightStyle> {
        &self.style_cache
    }

    /// Screen context used for style memory.
    pub fn is_screen_on(&self) -> bool {
        self.screen.is_on()
    }

    pub fn set_screen_context(&self, screen_on: bool) {
        self.screen.set(screen_on);
    }

    /// Style remembered for the given screen context, if any.
    pub fn remembered_style(&self, screen_on: bool) -> Option<AmbilightStyle> {
        self.remembered.lock().slot(screen_on).clone()
    }

    fn remember(&self, style: &AmbilightStyle) {
        if style.is_off() {
            return;
        }
        let screen_on = self.is_screen_on();
        log::debug!(
            "[Ambilight] remembering {} for screen {}",
            style.style_name,
            on_off(screen_on)
        );
        *self.remembered.lock().slot(screen_on) = Some(style.clone());
    }

    /// Active style. A failed read keeps the last known style (or `OFF`)
    /// for another TTL window.
    pub async fn get_current_style(&self) -> AmbilightStyle {
        match self
            .style_cache
            .get_or_refresh(move || self.fetch_style(), AmbilightStyle::off())
            .await
        {
            Ok(style) => style,
            Err(e) => {
                log::warn!("[Ambilight] style unavailable, keeping last known: {}", e);
                self.style_cache.extend_lease(AmbilightStyle::off())
            }
        }
    }

    async fn fetch_style(&self) -> Result<AmbilightStyle> {
        let style: AmbilightStyle = self.gateway.get(STYLE_ENDPOINT).await?;
        self.remember(&style);
        if let Some(color) = style.manual_color_value() {
            self.color.adopt(HsbColor::from_device(color));
        }
        Ok(style)
    }

    async fn get_power_flag(&self) -> bool {
        self.power_cache
            .get_or_refresh(move || self.fetch_power(), false)
            .await
            .unwrap_or(false)
    }

    async fn fetch_power(&self) -> Result<bool> {
        match self.gateway.get::<AmbilightPower>(POWER_ENDPOINT).await {
            Ok(state) => Ok(is_on(&state.power)),
            Err(e) => {
                log::warn!("[Ambilight] power flag unavailable, assuming off: {}", e);
                Ok(false)
            }
        }
    }

    /// On/off together with the active style. On if either the power flag
    /// is set or a non-off style is active.
    pub async fn get_state(&self) -> (bool, AmbilightStyle) {
        let (style, powered) = tokio::join!(self.get_current_style(), self.get_power_flag());
        (powered || !style.is_off(), style)
    }

    pub async fn get_on(&self) -> bool {
        self.get_state().await.0
    }

    /// The style `set_on(true)` restores in the current screen context.
    pub fn style_to_restore(&self) -> AmbilightStyle {
        let screen_on = self.is_screen_on();
        let (default, always) = if screen_on {
            (
                &self.defaults.default_style_screen_on,
                self.defaults.always_use_default_screen_on,
            )
        } else {
            (
                &self.defaults.default_style_screen_off,
                self.defaults.always_use_default_screen_off,
            )
        };

        if always && let Some(style) = default {
            return style.clone();
        }
        self.remembered_style(screen_on)
            .or_else(|| default.clone())
            .unwrap_or_else(|| {
                if screen_on {
                    AmbilightStyle::follow_video()
                } else {
                    AmbilightStyle::lounge()
                }
            })
    }

    pub async fn set_on(&self, on: bool) -> Result<()> {
        if self.get_on().await == on {
            return Ok(());
        }

        let style = if on {
            self.style_to_restore()
        } else {
            self.remember(&self.get_current_style().await);
            AmbilightStyle::off()
        };
        log::info!(
            "[Ambilight] switching {} ({})",
            on_off(on),
            style.style_name
        );

        self.style_cache.update(style.clone());
        self.power_cache.update(on);
        let result = self.write_style_and_power(&style, on).await;
        self.style_cache.update(style);
        self.power_cache.update(on);
        self.notifier
            .schedule_dependant_refresh(StateChange::Ambilight { on });

        if let Err(e) = &result {
            log::warn!("[Ambilight] switching {} failed: {}", on_off(on), e);
        }
        result
    }

    async fn write_style_and_power(&self, style: &AmbilightStyle, on: bool) -> Result<()> {
        self.gateway.post(STYLE_ENDPOINT, style).await?;
        let power = AmbilightPower {
            power: on_off(on).to_string(),
        };
        self.gateway.post(POWER_ENDPOINT, &power).await?;
        Ok(())
    }

    /// Activate an explicit style. Selecting `OFF` is the same as switching off.
    pub async fn set_style(&self, style: AmbilightStyle) -> Result<()> {
        if style.is_off() {
            return self.set_on(false).await;
        }
        if self.get_current_style().await == style {
            return Ok(());
        }

        self.remember(&style);
        self.style_cache.update(style.clone());
        self.power_cache.update(true);
        let result = self.gateway.post(STYLE_ENDPOINT, &style).await.map(|_| ());
        self.style_cache.update(style);
        self.notifier
            .schedule_dependant_refresh(StateChange::Ambilight { on: true });
        result
    }

    pub fn color(&self) -> HsbColor {
        self.color.color()
    }

    pub async fn set_hue(&self, hue: u16) -> Result<()> {
        self.color.set_hue(hue);
        self.flush_color().await
    }

    pub async fn set_saturation(&self, saturation: u16) -> Result<()> {
        self.color.set_saturation(saturation);
        self.flush_color().await
    }

    pub async fn set_brightness(&self, brightness: u16) -> Result<()> {
        self.color.set_brightness(brightness);
        self.flush_color().await
    }

    /// Debounce, then send the colour if this write was the last of its burst.
    async fn flush_color(&self) -> Result<()> {
        let Some(color) = self.color.settle().await else {
            return Ok(());
        };
        log::debug!("[Ambilight] applying colour {:?}", color);
        self.set_style(AmbilightStyle::manual_color(color.to_device()))
            .await
    }
}

#[async_trait]
impl Dependant for AmbilightFeature {
    fn name(&self) -> &'static str {
        "ambilight"
    }

    async fn acknowledge(&self, change: &StateChange) -> Result<()> {
        match *change {
            StateChange::Screen { on } | StateChange::Power { on } => {
                self.set_screen_context(on);
            }
            _ => {}
        }
        self.style_cache.invalidate();
        self.power_cache.invalidate();
        self.get_on().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Method;
    use crate::testing::StubTransport;
    use futures_util::future::join_all;
    use serde_json::json;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(2);
    const FOLLOW_AUDIO: &str =
        r#"{"styleName":"FOLLOW_AUDIO","isExpert":false,"menuSetting":"ENERGY_ADAPTIVE_BRIGHTNESS"}"#;
    const OFF: &str = r#"{"styleName":"OFF","isExpert":false}"#;

    fn feature_with(stub: &Arc<StubTransport>, defaults: AmbilightConfig) -> AmbilightFeature {
        AmbilightFeature::new(
            DeviceGateway::new(stub.clone()),
            defaults,
            ScreenContext::default(),
            TTL,
            Duration::from_millis(2500),
        )
    }

    fn feature(stub: &Arc<StubTransport>) -> AmbilightFeature {
        feature_with(stub, AmbilightConfig::default())
    }

    fn stub(style: &str, power: &str) -> Arc<StubTransport> {
        let stub = Arc::new(StubTransport::new());
        stub.reply(STYLE_ENDPOINT, style);
        stub.reply(POWER_ENDPOINT, &format!(r#"{{"power":"{power}"}}"#));
        stub
    }

    #[test]
    fn test_style_wire_format() {
        let style: AmbilightStyle = serde_json::from_str(FOLLOW_AUDIO).unwrap();
        assert_eq!(style.style_name, "FOLLOW_AUDIO");
        assert!(!style.is_off());

        assert_eq!(
            serde_json::to_value(AmbilightStyle::off()).unwrap(),
            json!({"styleName": "OFF", "isExpert": false})
        );

        let manual = AmbilightStyle::manual_color(DeviceColor {
            hue: 10,
            saturation: 20,
            brightness: 30,
        });
        let value = serde_json::to_value(&manual).unwrap();
        assert_eq!(value["algorithm"], "MANUAL_HUE");
        assert_eq!(value["colorSettings"]["color"]["hue"], 10);
        assert_eq!(value["colorSettings"]["colorDelta"]["brightness"], 0);
        assert_eq!(manual.manual_color_value().map(|c| c.brightness), Some(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_when_either_flag_or_style_says_so() {
        assert!(feature(&stub(FOLLOW_AUDIO, "Off")).get_on().await);
        assert!(feature(&stub(OFF, "On")).get_on().await);
        assert!(!feature(&stub(OFF, "Off")).get_on().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_style_read_falls_back_and_extends_lease() {
        let stub = stub(OFF, "Off");
        stub.fail(STYLE_ENDPOINT);
        let ambilight = feature(&stub);

        assert!(ambilight.get_current_style().await.is_off());
        tokio::time::advance(TTL / 2).await;
        assert!(ambilight.get_current_style().await.is_off());
        assert_eq!(stub.count(Method::Get, STYLE_ENDPOINT), 1);

        tokio::time::advance(TTL).await;
        ambilight.get_current_style().await;
        assert_eq!(stub.count(Method::Get, STYLE_ENDPOINT), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_style_read_keeps_last_known_style() {
        let stub = stub(FOLLOW_AUDIO, "On");
        let ambilight = feature(&stub);
        assert_eq!(ambilight.get_current_style().await.style_name, "FOLLOW_AUDIO");

        tokio::time::advance(TTL).await;
        stub.fail(STYLE_ENDPOINT);
        assert_eq!(ambilight.get_current_style().await.style_name, "FOLLOW_AUDIO");
    }

    #[tokio::test(start_paused = true)]
    async fn test_off_then_on_restores_previous_style() {
        let stub = stub(FOLLOW_AUDIO, "On");
        let ambilight = feature(&stub);

        ambilight.set_on(false).await.unwrap();
        assert_eq!(
            stub.posts(STYLE_ENDPOINT),
            vec![json!({"styleName": "OFF", "isExpert": false})]
        );
        assert_eq!(stub.last_body(POWER_ENDPOINT), Some(json!({"power": "Off"})));
        assert!(!ambilight.get_on().await);

        ambilight.set_on(true).await.unwrap();
        let restored = stub.last_body(STYLE_ENDPOINT).unwrap();
        assert_eq!(restored["styleName"], "FOLLOW_AUDIO");
        assert_eq!(stub.last_body(POWER_ENDPOINT), Some(json!({"power": "On"})));
        assert!(ambilight.get_on().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_on_is_idempotent() {
        let stub = stub(FOLLOW_AUDIO, "On");
        let ambilight = feature(&stub);
        ambilight.set_on(true).await.unwrap();
        assert_eq!(stub.count(Method::Post, STYLE_ENDPOINT), 0);
        assert_eq!(stub.count(Method::Post, POWER_ENDPOINT), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_uses_builtin_style_per_screen_context() {
        let stub = stub(OFF, "Off");
        let ambilight = feature(&stub);
        assert_eq!(ambilight.style_to_restore(), AmbilightStyle::follow_video());

        ambilight.set_screen_context(false);
        ambilight.set_on(true).await.unwrap();
        assert_eq!(
            stub.last_body(STYLE_ENDPOINT).unwrap()["menuSetting"],
            "HOT_LAVA"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_use_default_overrides_memory() {
        let defaults = AmbilightConfig {
            default_style_screen_on: Some(AmbilightStyle::lounge()),
            always_use_default_screen_on: true,
            ..AmbilightConfig::default()
        };
        let stub = stub(FOLLOW_AUDIO, "On");
        let ambilight = feature_with(&stub, defaults);

        ambilight.get_current_style().await;
        assert!(ambilight.remembered_style(true).is_some());
        assert_eq!(ambilight.style_to_restore(), AmbilightStyle::lounge());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_default_used_when_nothing_remembered() {
        let defaults = AmbilightConfig {
            default_style_screen_off: Some(AmbilightStyle::follow_video()),
            ..AmbilightConfig::default()
        };
        let ambilight = feature_with(&stub(OFF, "Off"), defaults);
        ambilight.set_screen_context(false);
        assert_eq!(ambilight.style_to_restore(), AmbilightStyle::follow_video());
    }

    #[tokio::test(start_paused = true)]
    async fn test_styles_are_remembered_per_screen_context() {
        let stub = stub(FOLLOW_AUDIO, "On");
        let ambilight = feature(&stub);
        ambilight.get_current_style().await;

        ambilight
            .acknowledge(&StateChange::Screen { on: false })
            .await
            .unwrap();
        assert!(!ambilight.is_screen_on());
        assert!(ambilight.remembered_style(true).is_some());
        // The re-read after the screen went dark is stored for the dark context.
        assert!(ambilight.remembered_style(false).is_some());

        let fresh = feature(&stub);
        fresh.set_screen_context(false);
        fresh.get_current_style().await;
        assert!(fresh.remembered_style(true).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_screen_context_decides_memory_slot() {
        let stub = stub(FOLLOW_AUDIO, "On");
        let screen = ScreenContext::default();
        let ambilight = AmbilightFeature::new(
            DeviceGateway::new(stub.clone()),
            AmbilightConfig::default(),
            screen.clone(),
            TTL,
            Duration::from_millis(2500),
        );

        screen.set(false);
        ambilight.get_current_style().await;
        assert!(!ambilight.is_screen_on());
        assert!(ambilight.remembered_style(true).is_none());
        assert_eq!(
            ambilight.remembered_style(false).map(|s| s.style_name),
            Some("FOLLOW_AUDIO".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hue_burst_writes_once_with_last_value() {
        let stub = stub(OFF, "Off");
        let ambilight = Arc::new(feature(&stub));

        let writes = [0u16, 90, 180, 270, 360].map(|hue| {
            let ambilight = ambilight.clone();
            async move { ambilight.set_hue(hue).await }
        });
        for outcome in join_all(writes).await {
            outcome.unwrap();
        }

        let posts = stub.posts(STYLE_ENDPOINT);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0]["algorithm"], "MANUAL_HUE");
        assert_eq!(posts[0]["colorSettings"]["color"]["hue"], 255);
        assert_eq!(ambilight.color().hue, 360);
        assert!(ambilight.get_on().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_colour_is_adopted_from_device() {
        let manual = serde_json::to_string(&AmbilightStyle::manual_color(DeviceColor {
            hue: 128,
            saturation: 255,
            brightness: 255,
        }))
        .unwrap();
        let ambilight = feature(&stub(&manual, "On"));
        ambilight.get_current_style().await;
        assert_eq!(ambilight.color().hue, 181);
        assert_eq!(ambilight.color().saturation, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_change_updates_context_and_rereads() {
        let stub = stub(FOLLOW_AUDIO, "On");
        let ambilight = feature(&stub);
        assert!(ambilight.get_on().await);

        stub.reply(STYLE_ENDPOINT, OFF);
        stub.reply(POWER_ENDPOINT, r#"{"power":"Off"}"#);
        ambilight
            .acknowledge(&StateChange::Power { on: false })
            .await
            .unwrap();
        assert!(!ambilight.is_screen_on());
        assert!(!ambilight.get_on().await);
        assert_eq!(stub.count(Method::Get, STYLE_ENDPOINT), 2);
    }
}
