use crate::{
    error::{HelperError, HelperResult},
    http::{self, USER_AGENT},
};
use serde::Deserialize;
use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMod {
    pub filename: String,
    pub download_url: String,
}

/// Where mod builds come from. The installer only talks to this trait.
pub trait ModHost {
    /// Latest build of `slug` for the configured loader and game version, or
    /// `None` when the host has nothing matching.
    fn resolve(&self, slug: &str) -> HelperResult<Option<ResolvedMod>>;

    fn download(&self, resolved: &ResolvedMod, dest: &Path) -> HelperResult<()>;
}

#[derive(Debug, Deserialize)]
struct ProjectVersion {
    #[serde(default)]
    files: Vec<VersionFile>,
}

#[derive(Debug, Deserialize)]
struct VersionFile {
    url: String,
    filename: String,
}

pub struct ModrinthClient {
    api_base: String,
    loader: String,
    game_version: String,
    query_agent: ureq::Agent,
    download_agent: ureq::Agent,
}

impl ModrinthClient {
    pub fn new(api_base: &str, loader: &str, game_version: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            loader: loader.to_string(),
            game_version: game_version.to_string(),
            query_agent: http::agent(Duration::from_secs(10)),
            download_agent: http::agent(Duration::from_secs(60)),
        }
    }

    pub fn versions_url(&self, slug: &str) -> String {
        format!("{}/v2/project/{}/version", self.api_base, slug)
    }
}

impl ModHost for ModrinthClient {
    fn resolve(&self, slug: &str) -> HelperResult<Option<ResolvedMod>> {
        let url = self.versions_url(slug);
        let loaders = format!("[\"{}\"]", self.loader);
        let game_versions = format!("[\"{}\"]", self.game_version);
        let response = match self
            .query_agent
            .get(&url)
            .query("loaders", &loaders)
            .query("game_versions", &game_versions)
            .set("User-Agent", USER_AGENT)
            .call()
        {
            Ok(response) => response,
            // Unknown slug.
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(err) => return Err(HelperError::from_ureq(&url, err)),
        };
        let body = response.into_string().map_err(|err| HelperError::Network {
            url: url.clone(),
            message: err.to_string(),
        })?;
        Ok(select_latest_file(&body))
    }

    fn download(&self, resolved: &ResolvedMod, dest: &Path) -> HelperResult<()> {
        let response = self
            .download_agent
            .get(&resolved.download_url)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|err| HelperError::from_ureq(&resolved.download_url, err))?;
        let mut reader = response.into_reader();
        let part = partial_path(dest);
        let mut file = File::create(&part).map_err(|err| HelperError::io("create", &part, err))?;
        let copied = copy_body(&mut reader, &mut file, &resolved.download_url, &part);
        drop(file);
        if let Err(err) = copied {
            let _ = fs::remove_file(&part);
            return Err(err);
        }
        fs::rename(&part, dest).map_err(|err| HelperError::io("finalize", dest, err))?;
        Ok(())
    }
}

/// Streams the response body into `file`. Read failures are network errors,
/// write failures are filesystem errors on `part`.
fn copy_body(reader: &mut impl Read, file: &mut File, url: &str, part: &Path) -> HelperResult<()> {
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(HelperError::Network {
                    url: url.to_string(),
                    message: err.to_string(),
                })
            }
        };
        file.write_all(&buffer[..read])
            .map_err(|err| HelperError::io("write", part, err))?;
    }
    file.flush().map_err(|err| HelperError::io("write", part, err))
}

/// The host lists newest versions first; take the first file of the first one.
/// Empty or malformed bodies count as "no build available".
pub fn select_latest_file(body: &str) -> Option<ResolvedMod> {
    let versions: Vec<ProjectVersion> = serde_json::from_str(body).ok()?;
    let file = versions.into_iter().next()?.files.into_iter().next()?;
    Some(ResolvedMod {
        filename: file.filename,
        download_url: file.url,
    })
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
