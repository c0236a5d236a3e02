//! Remote control key injection.

use crate::error::Result;
use crate::gateway::DeviceGateway;
use serde::Serialize;
use std::collections::HashMap;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

const ENDPOINT: &str = "input/key";

/// Abstract remote keys a host can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RemoteKey {
    Rewind,
    FastForward,
    NextTrack,
    PreviousTrack,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Select,
    Back,
    Exit,
    PlayPause,
    Information,
    VolumeUp,
    VolumeDown,
    Mute,
    Home,
    Standby,
}

impl RemoteKey {
    /// JointSpace key name the TV expects by default.
    pub fn device_key(self) -> &'static str {
        match self {
            Self::Rewind => "Rewind",
            Self::FastForward => "FastForward",
            Self::NextTrack => "Next",
            Self::PreviousTrack => "Previous",
            Self::ArrowUp => "CursorUp",
            Self::ArrowDown => "CursorDown",
            Self::ArrowLeft => "CursorLeft",
            Self::ArrowRight => "CursorRight",
            Self::Select => "Confirm",
            Self::Back => "Back",
            Self::Exit => "Exit",
            Self::PlayPause => "PlayPause",
            Self::Information => "Info",
            Self::VolumeUp => "VolumeUp",
            Self::VolumeDown => "VolumeDown",
            Self::Mute => "Mute",
            Self::Home => "Home",
            Self::Standby => "Standby",
        }
    }
}

#[derive(Debug, Serialize)]
struct KeyPress<'a> {
    key: &'a str,
}

pub struct RemoteControl {
    gateway: DeviceGateway,
    remap: HashMap<RemoteKey, String>,
}

impl RemoteControl {
    /// `remap` maps abstract key names (`"information"`) to device keys
    /// (`"Options"`). Unknown names are logged and ignored.
    pub fn new(gateway: DeviceGateway, remap: &HashMap<String, String>) -> Self {
        let remap = remap
            .iter()
            .filter_map(|(name, device_key)| match name.parse::<RemoteKey>() {
                Ok(key) => Some((key, device_key.clone())),
                Err(_) => {
                    log::warn!("[Remote] ignoring remap of unknown key {:?}", name);
                    None
                }
            })
            .collect();
        Self { gateway, remap }
    }

    /// Device key sent for `key`, after remapping.
    pub fn resolve(&self, key: RemoteKey) -> &str {
        self.remap
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.device_key())
    }

    pub async fn send_key(&self, key: RemoteKey) -> Result<()> {
        let device_key = self.resolve(key);
        log::debug!("[Remote] {} -> {}", key, device_key);
        self.gateway
            .post(ENDPOINT, &KeyPress { key: device_key })
            .await?;
        Ok(())
    }

    pub fn keys() -> impl Iterator<Item = RemoteKey> {
        RemoteKey::iter()
    }
}
