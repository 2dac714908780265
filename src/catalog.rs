use crate::{
    error::{HelperError, HelperResult},
    http::UpdaterFeed,
    log::ActivityLog,
};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const CATALOG_FILE: &str = "modlist.yaml";
pub const CATALOG_VERSION_FILE: &str = "modlist_version.txt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModDefinition {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ModLibs,
    NvidiaGpu,
    Optimization,
    Ui,
}

impl Category {
    /// Install order.
    pub const ALL: [Category; 4] = [
        Category::ModLibs,
        Category::NvidiaGpu,
        Category::Optimization,
        Category::Ui,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::ModLibs => "mod_libs",
            Category::NvidiaGpu => "nvidia_gpu",
            Category::Optimization => "optimization",
            Category::Ui => "ui",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::ModLibs => "Libraries",
            Category::NvidiaGpu => "NVIDIA",
            Category::Optimization => "Optimization",
            Category::Ui => "Optional",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(deserialize_with = "deserialize_version")]
    pub version: String,
    #[serde(default)]
    pub ui: Vec<ModDefinition>,
    #[serde(default)]
    pub mod_libs: Vec<ModDefinition>,
    #[serde(default)]
    pub nvidia_gpu: Vec<ModDefinition>,
    #[serde(default)]
    pub optimization: Vec<ModDefinition>,
}

impl Catalog {
    pub fn parse(raw: &str) -> HelperResult<Self> {
        serde_yaml::from_str(raw).map_err(|err| HelperError::Catalog(err.to_string()))
    }

    pub fn mods(&self, category: Category) -> &[ModDefinition] {
        match category {
            Category::ModLibs => &self.mod_libs,
            Category::NvidiaGpu => &self.nvidia_gpu,
            Category::Optimization => &self.optimization,
            Category::Ui => &self.ui,
        }
    }

    pub fn find_selectable(&self, query: &str) -> Option<&ModDefinition> {
        self.ui.iter().find(|def| matches_query(def, query))
    }

    pub fn find(&self, query: &str) -> Option<(Category, &ModDefinition)> {
        Category::ALL.iter().find_map(|category| {
            self.mods(*category)
                .iter()
                .find(|def| matches_query(def, query))
                .map(|def| (*category, def))
        })
    }
}

fn matches_query(def: &ModDefinition, query: &str) -> bool {
    let query = query.trim();
    def.name.eq_ignore_ascii_case(query) || def.slug.eq_ignore_ascii_case(query)
}

/// Catalog versions are written as bare numbers as often as strings. Floats
/// keep their decimal point (`1.0` stays `1.0`) so they match the marker text.
fn deserialize_version<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(value) => Ok(value.trim().to_string()),
        serde_yaml::Value::Number(number) => Ok(number.to_string()),
        other => Err(D::Error::custom(format!(
            "version must be a string or number, found {other:?}"
        ))),
    }
}

/// Keeps a local copy of the catalog and refreshes it when the published
/// version marker moves.
pub struct CatalogLoader {
    cache_path: PathBuf,
}

impl CatalogLoader {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_path: cache_dir.join(CATALOG_FILE),
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn load(&self, feed: &dyn UpdaterFeed, log: &mut ActivityLog) -> HelperResult<Catalog> {
        let cached = self.read_cache(log);

        match feed.fetch_text(CATALOG_VERSION_FILE) {
            Ok(marker) => {
                if let Some(catalog) = cached {
                    if catalog.version == marker.trim() {
                        return Ok(catalog);
                    }
                }
            }
            Err(err) => {
                if let Some(catalog) = cached {
                    log.log_warn(format!(
                        "Could not check for a newer mod list ({err}); using cached version {}",
                        catalog.version
                    ));
                    return Ok(catalog);
                }
                return Err(err);
            }
        }

        let raw = feed.fetch_text(CATALOG_FILE)?;
        let catalog = Catalog::parse(&raw)?;
        write_atomic_text(&self.cache_path, &raw)?;
        log.log_info(format!("Mod list updated to version {}", catalog.version));
        Ok(catalog)
    }

    fn read_cache(&self, log: &mut ActivityLog) -> Option<Catalog> {
        let raw = fs::read_to_string(&self.cache_path).ok()?;
        match Catalog::parse(&raw) {
            Ok(catalog) => Some(catalog),
            Err(err) => {
                log.log_warn(format!("Ignoring unreadable cached mod list: {err}"));
                None
            }
        }
    }
}

fn write_atomic_text(path: &Path, contents: &str) -> HelperResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| HelperError::io("create", parent, err))?;
    }
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    fs::write(&temp_path, contents).map_err(|err| HelperError::io("write", &temp_path, err))?;
    fs::rename(&temp_path, path).map_err(|err| HelperError::io("replace", path, err))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::http::testing::StaticFeed;

    pub const SAMPLE: &str = r#"
version: 7
ui:
  - name: Mod Menu
    slug: modmenu
    description: Adds a mod menu
    website_url: https://modrinth.com/mod/modmenu
  - name: Zoomify
    slug: zoomify
    description: Zoom
    website_url: https://modrinth.com/mod/zoomify
mod_libs:
  - name: Fabric API
    slug: fabric-api
    description: Core hooks
    website_url: https://modrinth.com/mod/fabric-api
nvidia_gpu:
  - name: Nvidium
    slug: nvidium
    description: Mesh shaders
    website_url: https://modrinth.com/mod/nvidium
optimization:
  - name: Sodium
    slug: sodium
    description: Rendering
    website_url: https://modrinth.com/mod/sodium
"#;

    #[test]
    fn parses_numeric_version_and_categories() {
        let catalog = Catalog::parse(SAMPLE).unwrap();
        assert_eq!(catalog.version, "7");
        assert_eq!(catalog.mods(Category::ModLibs)[0].slug, "fabric-api");
        assert_eq!(catalog.mods(Category::Ui).len(), 2);
        assert_eq!(catalog.find_selectable("zoomify").unwrap().name, "Zoomify");
        assert_eq!(catalog.find_selectable("mod menu").unwrap().slug, "modmenu");
        assert!(catalog.find_selectable("sodium").is_none());
        assert_eq!(catalog.find("Sodium").unwrap().0, Category::Optimization);
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let catalog = Catalog::parse("version: '1.4'\nmod_libs: []\n").unwrap();
        assert_eq!(catalog.version, "1.4");
        assert!(catalog.ui.is_empty());
        assert!(catalog.nvidia_gpu.is_empty());
        assert!(Catalog::parse("ui: [").is_err());
    }

    #[test]
    fn downloads_when_no_cache_exists() {
        let dir = tempfile::tempdir().unwrap();
        let loader = CatalogLoader::new(dir.path());
        let feed = StaticFeed::default()
            .with(CATALOG_VERSION_FILE, "7\n")
            .with(CATALOG_FILE, SAMPLE);
        let mut log = ActivityLog::silent();

        let catalog = loader.load(&feed, &mut log).unwrap();
        assert_eq!(catalog.version, "7");
        assert!(feed.requested(CATALOG_FILE));
        assert_eq!(fs::read_to_string(loader.cache_path()).unwrap(), SAMPLE);
    }

    #[test]
    fn reuses_cache_when_version_matches() {
        let dir = tempfile::tempdir().unwrap();
        let loader = CatalogLoader::new(dir.path());
        fs::write(loader.cache_path(), SAMPLE).unwrap();
        let feed = StaticFeed::default().with(CATALOG_VERSION_FILE, "7");
        let mut log = ActivityLog::silent();

        let catalog = loader.load(&feed, &mut log).unwrap();
        assert_eq!(catalog.mod_libs.len(), 1);
        assert!(!feed.requested(CATALOG_FILE));
    }

    #[test]
    fn float_version_matches_its_marker() {
        let dir = tempfile::tempdir().unwrap();
        let loader = CatalogLoader::new(dir.path());
        fs::write(loader.cache_path(), "version: 1.0\nmod_libs: []\n").unwrap();
        let feed = StaticFeed::default().with(CATALOG_VERSION_FILE, "1.0\n");
        let mut log = ActivityLog::silent();

        let catalog = loader.load(&feed, &mut log).unwrap();
        assert_eq!(catalog.version, "1.0");
        assert!(!feed.requested(CATALOG_FILE));
        assert_eq!(Catalog::parse("version: 2.5\n").unwrap().version, "2.5");
        assert!(Catalog::parse("version: [1]\n").is_err());
    }

    #[test]
    fn refreshes_stale_cache() {
        let dir = tempfile::tempdir().unwrap();
        let loader = CatalogLoader::new(dir.path());
        fs::write(loader.cache_path(), "version: 6\n").unwrap();
        let feed = StaticFeed::default()
            .with(CATALOG_VERSION_FILE, "7")
            .with(CATALOG_FILE, SAMPLE);
        let mut log = ActivityLog::silent();

        let catalog = loader.load(&feed, &mut log).unwrap();
        assert_eq!(catalog.version, "7");
        assert_eq!(catalog.ui.len(), 2);
        assert!(log.messages().any(|line| line.contains("version 7")));
    }

    #[test]
    fn offline_falls_back_to_cache_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let loader = CatalogLoader::new(dir.path());
        let feed = StaticFeed::default();
        let mut log = ActivityLog::silent();

        let err = loader.load(&feed, &mut log).unwrap_err();
        assert!(err.is_network());

        fs::write(loader.cache_path(), SAMPLE).unwrap();
        let catalog = loader.load(&feed, &mut log).unwrap();
        assert_eq!(catalog.version, "7");
        assert!(log.messages().any(|line| line.contains("cached version 7")));
    }
}
