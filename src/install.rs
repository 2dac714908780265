use crate::{
    backup::{regular_files, BackupManager},
    catalog::{Catalog, Category, ModDefinition},
    error::{HelperError, HelperResult},
    log::ActivityLog,
    modrinth::ModHost,
    scan::is_jar,
};
use serde::Serialize;
use std::{collections::HashSet, fs, path::Path};

#[derive(Debug, Clone, Default)]
pub struct InstallPlan {
    /// Optional mods to install, by name or slug.
    pub selected: Vec<String>,
    pub nvidia: bool,
    pub backup: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedMod {
    pub name: String,
    pub slug: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub snapshot: Option<String>,
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedMod>,
    pub removed: Vec<String>,
    pub unknown_selections: Vec<String>,
}

pub struct Installer<'a, H: ModHost> {
    catalog: &'a Catalog,
    host: &'a H,
    backups: &'a BackupManager,
}

impl<'a, H: ModHost> Installer<'a, H> {
    pub fn new(catalog: &'a Catalog, host: &'a H, backups: &'a BackupManager) -> Self {
        Self {
            catalog,
            host,
            backups,
        }
    }

    /// Mods the plan asks for, in install order. Optional mods keep catalog
    /// order regardless of selection order.
    pub fn desired_mods(&self, plan: &InstallPlan) -> Vec<(Category, &'a ModDefinition)> {
        let mut out = Vec::new();
        for category in Category::ALL {
            if category == Category::NvidiaGpu && !plan.nvidia {
                continue;
            }
            for def in self.catalog.mods(category) {
                if category == Category::Ui
                    && !plan
                        .selected
                        .iter()
                        .any(|query| self.catalog.find_selectable(query) == Some(def))
                {
                    continue;
                }
                out.push((category, def));
            }
        }
        out
    }

    /// One linear pass: optional backup, resolve and download each desired
    /// mod, then prune jars that are no longer wanted.
    ///
    /// Resolution misses and HTTP errors for a single mod are logged and the
    /// pass continues. Transport failures abort before anything is pruned.
    pub fn run(
        &self,
        mods_dir: &Path,
        plan: &InstallPlan,
        log: &mut ActivityLog,
    ) -> HelperResult<InstallReport> {
        if !mods_dir.is_dir() {
            return Err(HelperError::MissingModsDir(mods_dir.to_path_buf()));
        }

        let mut report = InstallReport::default();
        for query in &plan.selected {
            if self.catalog.find_selectable(query).is_none() {
                log.log_warn(format!("Unknown optional mod: {query}"));
                report.unknown_selections.push(query.clone());
            }
        }

        if plan.backup {
            let snapshot = self.backups.create_snapshot(mods_dir, log)?;
            report.snapshot = Some(snapshot.name);
        }

        log.log_info("Downloading mods...".to_string());
        let mut desired = HashSet::new();
        for (_, def) in self.desired_mods(plan) {
            self.install_one(def, mods_dir, &mut desired, &mut report, log)?;
        }

        self.prune(mods_dir, &desired, &mut report, log)?;

        if report.failed.is_empty() {
            log.log_info("All mods were successfully installed!".to_string());
        } else {
            log.log_warn(format!(
                "Finished with {} mod(s) that could not be installed.",
                report.failed.len()
            ));
        }
        Ok(report)
    }

    fn install_one(
        &self,
        def: &ModDefinition,
        mods_dir: &Path,
        desired: &mut HashSet<String>,
        report: &mut InstallReport,
        log: &mut ActivityLog,
    ) -> HelperResult<()> {
        let resolved = match self.host.resolve(&def.slug) {
            Ok(Some(resolved)) if is_plain_file_name(&resolved.filename) => resolved,
            Ok(Some(resolved)) => {
                let reason = format!("refusing unsafe file name {:?}", resolved.filename);
                record_failure(def, reason, report, log);
                return Ok(());
            }
            Ok(None) => {
                let reason = HelperError::NotFound(def.slug.clone()).to_string();
                record_failure(def, reason, report, log);
                return Ok(());
            }
            Err(err) if err.is_network() => return Err(err),
            Err(err) => {
                record_failure(def, err.to_string(), report, log);
                return Ok(());
            }
        };

        desired.insert(resolved.filename.clone());
        let dest = mods_dir.join(&resolved.filename);
        if dest.exists() {
            log.log_info(format!("Mod {} is already installed!", def.name));
            report.skipped.push(resolved.filename);
            return Ok(());
        }

        match self.host.download(&resolved, &dest) {
            Ok(()) => {
                log.log_info(format!("Mod {} was successfully installed!", def.name));
                report.installed.push(resolved.filename);
            }
            Err(err) if err.is_network() => return Err(err),
            Err(err) => record_failure(def, err.to_string(), report, log),
        }
        Ok(())
    }

    fn prune(
        &self,
        mods_dir: &Path,
        desired: &HashSet<String>,
        report: &mut InstallReport,
        log: &mut ActivityLog,
    ) -> HelperResult<()> {
        for path in regular_files(mods_dir)? {
            if !is_jar(&path) {
                continue;
            }
            let name = match path.file_name() {
                Some(name) => name.to_string_lossy().to_string(),
                None => continue,
            };
            if desired.contains(&name) {
                continue;
            }
            fs::remove_file(&path).map_err(|err| HelperError::io("remove", &path, err))?;
            log.log_info(format!("Old mod {name} was successfully removed!"));
            report.removed.push(name);
        }
        Ok(())
    }
}

fn record_failure(
    def: &ModDefinition,
    reason: String,
    report: &mut InstallReport,
    log: &mut ActivityLog,
) {
    log.log_error(format!("Error downloading mod: {} ({reason})", def.name));
    report.failed.push(FailedMod {
        name: def.name.clone(),
        slug: def.slug.clone(),
        reason,
    });
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).is_relative()
}
