//! Accepted platform spellings mapped to canonical keys

use crate::platform::Platform;

const ALIASES: &[(Platform, &[&str])] = &[
    (Platform::Darwin, &["mac", "macos", "osx"]),
    (Platform::Exe, &["win32", "windows", "win"]),
    (Platform::Deb, &["debian"]),
    (Platform::Rpm, &["fedora"]),
    (Platform::AppImage, &["appimage", "linux"]),
    (Platform::Dmg, &["dmg"]),
    (Platform::DarwinArm64, &["mac_arm64", "macos_arm64", "osx_arm64"]),
    (Platform::ExeArm64, &["win32_arm64", "windows_arm64", "win_arm64"]),
    (Platform::DebArm64, &["debian_arm64"]),
    (Platform::RpmArm64, &["fedora_arm64"]),
    (Platform::AppImageArm64, &["appimage_arm64", "linux_arm64"]),
    (Platform::DmgArm64, &["dmg_arm64"]),
];

/// Map a client supplied token to its canonical key.
///
/// Canonical keys map to themselves. Matching is case sensitive, so
/// `AppImage` is canonical while `appimage` is an alias of it.
pub fn canonicalize(token: &str) -> Option<Platform> {
    Platform::from_key(token).or_else(|| {
        ALIASES
            .iter()
            .find(|(_, aliases)| aliases.contains(&token))
            .map(|(platform, _)| *platform)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted_tokens() -> Vec<&'static str> {
        Platform::ALL
            .iter()
            .map(Platform::as_str)
            .chain(ALIASES.iter().flat_map(|(_, aliases)| aliases.iter().copied()))
            .collect()
    }

    #[test]
    fn test_known_aliases() {
        assert_eq!(canonicalize("mac"), Some(Platform::Darwin));
        assert_eq!(canonicalize("osx"), Some(Platform::Darwin));
        assert_eq!(canonicalize("win32"), Some(Platform::Exe));
        assert_eq!(canonicalize("windows"), Some(Platform::Exe));
        assert_eq!(canonicalize("linux"), Some(Platform::AppImage));
        assert_eq!(canonicalize("fedora"), Some(Platform::Rpm));
        assert_eq!(canonicalize("debian"), Some(Platform::Deb));
        assert_eq!(canonicalize("mac_arm64"), Some(Platform::DarwinArm64));
        assert_eq!(canonicalize("linux_arm64"), Some(Platform::AppImageArm64));
    }

    #[test]
    fn test_unknown_tokens() {
        assert_eq!(canonicalize(""), None);
        assert_eq!(canonicalize("MAC"), None);
        assert_eq!(canonicalize("solaris"), None);
        assert_eq!(canonicalize("mac_x86"), None);
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        for token in accepted_tokens() {
            let once = canonicalize(token).unwrap_or_else(|| panic!("{token} has no entry"));
            assert_eq!(canonicalize(once.as_str()), Some(once), "token={token}");
        }
    }

    #[test]
    fn test_every_canonical_key_has_an_arm64_twin() {
        for platform in Platform::ALL {
            let twin = format!("{}_arm64", platform.as_str().trim_end_matches("_arm64"));
            assert_eq!(canonicalize(&twin), Some(platform.with_arm64()));
        }
    }

    #[test]
    fn test_aliases_do_not_collide() {
        let mut seen = std::collections::HashSet::new();
        for (_, aliases) in ALIASES {
            for alias in *aliases {
                assert!(seen.insert(*alias), "duplicate alias {alias}");
            }
        }
    }
}
