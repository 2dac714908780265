use crate::{error::HelperResult, http::UpdaterFeed};
use serde::Serialize;

pub const APP_VERSION_FILE: &str = "app_version.txt";
const RELEASES_URL: &str = "https://github.com/Henrique-Coder/modding-helper/releases/download";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateResult {
    UpToDate { version: String },
    Available { version: String, download_url: String },
}

pub fn check_for_updates(
    feed: &dyn UpdaterFeed,
    current_version: &str,
    loader: &str,
    game_version: &str,
) -> HelperResult<UpdateResult> {
    let raw = feed.fetch_text(APP_VERSION_FILE)?;
    let latest_version = normalize_version(&raw);
    if !is_newer_version(&latest_version, current_version) {
        return Ok(UpdateResult::UpToDate {
            version: current_version.to_string(),
        });
    }
    let download_url = release_url(&latest_version, loader, game_version);
    Ok(UpdateResult::Available {
        version: latest_version,
        download_url,
    })
}

pub fn release_url(version: &str, loader: &str, game_version: &str) -> String {
    format!("{RELEASES_URL}/v{version}/ModdingHelper-v{version}-{loader}-mc{game_version}.exe")
}

fn normalize_version(tag: &str) -> String {
    tag.trim().trim_start_matches('v').to_string()
}

fn is_newer_version(latest: &str, current: &str) -> bool {
    match (parse_version(latest), parse_version(current)) {
        (Some(latest), Some(current)) => latest > current,
        _ => false,
    }
}

fn parse_version(raw: &str) -> Option<(u64, u64, u64)> {
    let raw = raw
        .trim()
        .trim_start_matches('v')
        .split('-')
        .next()?
        .split('+')
        .next()?;
    let mut parts = raw.split('.').map(|part| part.parse::<u64>().ok());
    let major = parts.next().flatten()?;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some((major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::StaticFeed;

    #[test]
    fn compares_numeric_components() {
        assert!(is_newer_version("1.0.10", "1.0.2"));
        assert!(is_newer_version("v2.0", "1.9.9"));
        assert!(!is_newer_version("1.0.2", "1.0.2"));
        assert!(!is_newer_version("1.0.1-beta", "1.0.2"));
        assert!(!is_newer_version("garbage", "1.0.2"));
    }

    #[test]
    fn reports_available_release_with_link() {
        let feed = StaticFeed::default().with(APP_VERSION_FILE, "1.1.0\n");
        let result = check_for_updates(&feed, "1.0.2", "fabric", "1.20.1").unwrap();
        assert_eq!(
            result,
            UpdateResult::Available {
                version: "1.1.0".to_string(),
                download_url: "https://github.com/Henrique-Coder/modding-helper/releases/download/v1.1.0/ModdingHelper-v1.1.0-fabric-mc1.20.1.exe".to_string(),
            }
        );
    }

    #[test]
    fn same_version_is_up_to_date() {
        let feed = StaticFeed::default().with(APP_VERSION_FILE, "1.0.2");
        let result = check_for_updates(&feed, "1.0.2", "fabric", "1.20.1").unwrap();
        assert!(matches!(result, UpdateResult::UpToDate { .. }));
        assert!(check_for_updates(&StaticFeed::default(), "1.0.2", "fabric", "1.20.1").is_err());
    }
}
