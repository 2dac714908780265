use crate::{backup::regular_files, catalog::Catalog, error::HelperResult};
use serde::Deserialize;
use std::{collections::HashSet, fs::File, io::Read, path::Path};
use zip::ZipArchive;

#[derive(Debug, Deserialize)]
struct FabricModJson {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Names and ids declared in the `fabric.mod.json` of every jar in
/// `mods_dir`, deduplicated in discovery order. Jars without readable
/// metadata are skipped.
pub fn installed_mod_ids(mods_dir: &Path) -> HelperResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for path in regular_files(mods_dir)? {
        if !is_jar(&path) {
            continue;
        }
        let Some(meta) = read_fabric_meta(&path) else {
            continue;
        };
        for value in [meta.name, meta.id].into_iter().flatten() {
            if seen.insert(value.clone()) {
                ids.push(value);
            }
        }
    }
    Ok(ids)
}

/// Optional catalog mods that are already installed, by display name.
pub fn preselect(catalog: &Catalog, installed: &[String]) -> Vec<String> {
    catalog
        .ui
        .iter()
        .filter(|def| installed.iter().any(|value| value == &def.name))
        .map(|def| def.name.clone())
        .collect()
}

pub fn is_jar(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().ends_with(".jar"))
        .unwrap_or(false)
}

fn read_fabric_meta(path: &Path) -> Option<FabricModJson> {
    let file = File::open(path).ok()?;
    let mut archive = ZipArchive::new(file).ok()?;
    let mut entry = archive.by_name("fabric.mod.json").ok()?;
    let mut raw = String::new();
    entry.read_to_string(&mut raw).ok()?;
    serde_json::from_str(&raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, io::Write};
    use zip::{write::SimpleFileOptions, ZipWriter};

    fn write_jar(path: &Path, fabric_json: Option<&str>) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        if let Some(json) = fabric_json {
            zip.start_file("fabric.mod.json", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(json.as_bytes()).unwrap();
        }
        zip.start_file("META-INF/MANIFEST.MF", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"Manifest-Version: 1.0\n").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn reads_names_and_ids_from_jars() {
        let dir = tempfile::tempdir().unwrap();
        write_jar(
            &dir.path().join("a-modmenu.jar"),
            Some(r#"{"schemaVersion": 1, "id": "modmenu", "name": "Mod Menu"}"#),
        );
        write_jar(&dir.path().join("b-plain.jar"), None);
        write_jar(
            &dir.path().join("c-modmenu-copy.jar"),
            Some(r#"{"id": "modmenu", "name": "Mod Menu"}"#),
        );
        fs::write(dir.path().join("d-broken.jar"), b"not a zip").unwrap();
        fs::write(dir.path().join("readme.txt"), b"hi").unwrap();

        let ids = installed_mod_ids(dir.path()).unwrap();
        assert_eq!(ids, vec!["Mod Menu", "modmenu"]);
    }

    #[test]
    fn preselects_installed_optional_mods() {
        let catalog = Catalog::parse(crate::catalog::tests::SAMPLE).unwrap();
        let installed = vec!["Zoomify".to_string(), "sodium".to_string()];
        assert_eq!(preselect(&catalog, &installed), vec!["Zoomify"]);
    }
}
