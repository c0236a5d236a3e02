//! Device aspects mirrored from the TV.
//!
//! Each stateful feature owns an [`ExpiringCache`](crate::cache::ExpiringCache)
//! of its own value and reconciles what the host asks for with what the TV
//! reports. Reads never fail: an unreachable TV resolves to a per-feature
//! fallback. Writes report failure to the host, but keep the optimistic
//! cache value until the next refresh corrects it.

pub mod ambilight;
pub mod color;
pub mod info;
pub mod power;
pub mod remote;
pub mod screen;
pub mod volume;

pub use ambilight::{AmbilightFeature, AmbilightStyle};
pub use color::{ColorCoalescer, HsbColor};
pub use info::DeviceInfo;
pub use power::PowerFeature;
pub use remote::{RemoteControl, RemoteKey};
pub use screen::{ScreenContext, ScreenFeature};
pub use volume::{VolumeFeature, VolumeState};

/// The TV spells its binary states `"On"` / `"Off"` / `"Standby"`.
pub(crate) fn is_on(word: &str) -> bool {
    word.eq_ignore_ascii_case("on")
}

pub(crate) fn on_off(on: bool) -> &'static str {
    if on { "On" } else { "Off" }
}
