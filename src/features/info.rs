//! Read-only facts about the TV: identity, API version, what is on screen.

use crate::error::Result;
use crate::gateway::DeviceGateway;
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiVersion {
    #[serde(rename = "Major")]
    pub major: u32,
    #[serde(rename = "Minor", default)]
    pub minor: u32,
    #[serde(rename = "Patch", default)]
    pub patch: u32,
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SystemInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serialnumber_encrypted: Option<String>,
    pub api_version: ApiVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityComponent {
    pub package_name: String,
    #[serde(default)]
    pub class_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentActivity {
    #[serde(default)]
    component: Option<ActivityComponent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentChannel {
    #[serde(default)]
    channel: Option<Channel>,
}

pub struct DeviceInfo {
    gateway: DeviceGateway,
}

impl DeviceInfo {
    pub fn new(gateway: DeviceGateway) -> Self {
        Self { gateway }
    }

    pub async fn system(&self) -> Result<SystemInfo> {
        self.gateway.get("system").await
    }

    /// The app in the foreground, if the TV reports one.
    pub async fn current_activity(&self) -> Result<Option<ActivityComponent>> {
        let activity: CurrentActivity = self.gateway.get("activities/current").await?;
        Ok(activity.component)
    }

    /// The tuned broadcast channel, if live TV is showing.
    pub async fn current_channel(&self) -> Result<Option<Channel>> {
        let tv: CurrentChannel = self.gateway.get("activities/tv").await?;
        Ok(tv.channel)
    }
}
