//! Canonical platform keys and resolution from client signals

use serde::Serialize;
use tracing::{debug, instrument};

use crate::aliases::canonicalize;

/// Canonical key used to index release assets in a snapshot.
///
/// `Darwin*` keys point at the zipped update payload consumed by the
/// auto-updater, `Dmg*` keys at the installer image a person downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Platform {
    #[serde(rename = "darwin")]
    Darwin,
    #[serde(rename = "darwin_arm64")]
    DarwinArm64,
    #[serde(rename = "dmg")]
    Dmg,
    #[serde(rename = "dmg_arm64")]
    DmgArm64,
    #[serde(rename = "exe")]
    Exe,
    #[serde(rename = "exe_arm64")]
    ExeArm64,
    #[serde(rename = "deb")]
    Deb,
    #[serde(rename = "deb_arm64")]
    DebArm64,
    #[serde(rename = "rpm")]
    Rpm,
    #[serde(rename = "rpm_arm64")]
    RpmArm64,
    #[serde(rename = "AppImage")]
    AppImage,
    #[serde(rename = "AppImage_arm64")]
    AppImageArm64,
}

impl Platform {
    pub const ALL: [Platform; 12] = [
        Platform::Darwin,
        Platform::DarwinArm64,
        Platform::Dmg,
        Platform::DmgArm64,
        Platform::Exe,
        Platform::ExeArm64,
        Platform::Deb,
        Platform::DebArm64,
        Platform::Rpm,
        Platform::RpmArm64,
        Platform::AppImage,
        Platform::AppImageArm64,
    ];

    /// The key as it appears in URLs and in the snapshot
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Darwin => "darwin",
            Platform::DarwinArm64 => "darwin_arm64",
            Platform::Dmg => "dmg",
            Platform::DmgArm64 => "dmg_arm64",
            Platform::Exe => "exe",
            Platform::ExeArm64 => "exe_arm64",
            Platform::Deb => "deb",
            Platform::DebArm64 => "deb_arm64",
            Platform::Rpm => "rpm",
            Platform::RpmArm64 => "rpm_arm64",
            Platform::AppImage => "AppImage",
            Platform::AppImageArm64 => "AppImage_arm64",
        }
    }

    /// Exact match against canonical keys only; aliases go through [`canonicalize`].
    pub fn from_key(key: &str) -> Option<Platform> {
        Platform::ALL.into_iter().find(|p| p.as_str() == key)
    }

    /// The arm64 twin of an x86 key. Arm64 keys map to themselves.
    pub fn with_arm64(self) -> Platform {
        match self {
            Platform::Darwin | Platform::DarwinArm64 => Platform::DarwinArm64,
            Platform::Dmg | Platform::DmgArm64 => Platform::DmgArm64,
            Platform::Exe | Platform::ExeArm64 => Platform::ExeArm64,
            Platform::Deb | Platform::DebArm64 => Platform::DebArm64,
            Platform::Rpm | Platform::RpmArm64 => Platform::RpmArm64,
            Platform::AppImage | Platform::AppImageArm64 => Platform::AppImageArm64,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operating system family inferred from a `User-Agent` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOs {
    MacOs,
    Windows,
    Other,
}

impl ClientOs {
    pub fn detect(user_agent: &str) -> ClientOs {
        let ua = user_agent.to_ascii_lowercase();

        // iOS agents advertise "like Mac OS X"
        let mobile_apple = ["iphone", "ipad", "ipod"].iter().any(|m| ua.contains(m));
        if !mobile_apple && (ua.contains("macintosh") || ua.contains("mac os x")) {
            return ClientOs::MacOs;
        }

        if ua.contains("windows") && !ua.contains("windows phone") {
            return ClientOs::Windows;
        }

        ClientOs::Other
    }
}

/// Per-request inputs used to pick a platform
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientSignals<'a> {
    pub user_agent: Option<&'a str>,
    pub platform: Option<&'a str>,
    pub is_update: bool,
}

impl<'a> ClientSignals<'a> {
    pub fn from_user_agent(user_agent: Option<&'a str>, is_update: bool) -> Self {
        Self {
            user_agent,
            platform: None,
            is_update,
        }
    }

    pub fn from_platform(platform: &'a str, is_update: bool) -> Self {
        Self {
            user_agent: None,
            platform: Some(platform),
            is_update,
        }
    }

    /// Resolve the signals to a canonical key.
    ///
    /// An explicit platform token always wins over the user agent. Whatever
    /// token is produced is passed through the alias table, so a `None` here
    /// means the request named nothing we ship.
    #[instrument(level = "debug", skip(self), fields(platform = ?self.platform, is_update = self.is_update))]
    pub fn resolve(&self) -> Option<Platform> {
        let token = match self.platform {
            Some(token) => rewrite_installer_token(token, self.is_update),
            None => infer_from_user_agent(self.user_agent?, self.is_update)?,
        };

        let resolved = canonicalize(token);
        debug!("Resolved platform token {} to {:?}", token, resolved);
        resolved
    }
}

/// A bare `mac` token means the installer image for a download but the
/// update feed for an update check.
fn rewrite_installer_token(token: &str, is_update: bool) -> &str {
    if is_update {
        return token;
    }

    match token {
        "mac" => Platform::Dmg.as_str(),
        "mac_arm64" => Platform::DmgArm64.as_str(),
        other => other,
    }
}

fn infer_from_user_agent(user_agent: &str, is_update: bool) -> Option<&'static str> {
    match ClientOs::detect(user_agent) {
        ClientOs::MacOs if is_update => Some(Platform::Darwin.as_str()),
        ClientOs::MacOs => Some(Platform::Dmg.as_str()),
        ClientOs::Windows => Some(Platform::Exe.as_str()),
        ClientOs::Other => None,
    }
}
