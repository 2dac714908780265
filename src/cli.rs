use crate::{
    backup::BackupManager,
    catalog::{Catalog, CatalogLoader, Category},
    config::{self, AppConfig},
    error::HelperError,
    http::HttpFeed,
    install::{InstallPlan, InstallReport, Installer},
    log::{ActivityLog, Echo, LogEntry},
    minecraft,
    modrinth::ModrinthClient,
    scan,
    update::{self, UpdateResult},
};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct GlobalOptions {
    format: Option<OutputFormat>,
    quiet: bool,
    minecraft_dir: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Install(InstallOptions),
    Revert(RevertOptions),
    Backup,
    BackupsList,
    CatalogList,
    CatalogShow(String),
    Detect,
    Paths,
    ConfigShow,
    ConfigSet { key: String, value: String },
    Update,
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selection {
    /// Optional mods whose jars are already in the mods folder.
    Detected,
    Explicit(Vec<String>),
    All,
    Nothing,
}

#[derive(Debug, PartialEq, Eq)]
struct InstallOptions {
    selection: Selection,
    nvidia: Option<bool>,
    backup: Option<bool>,
    skip_update_check: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct RevertOptions {
    assume_yes: bool,
    skip_update_check: bool,
}

struct Session {
    config: AppConfig,
    log: ActivityLog,
    format: OutputFormat,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, command) = parse_args(&args)?;
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("Modding Helper v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let mut session = Session::open(&global)?;
            run_command(&mut session, command)
        }
    }
}

impl Session {
    fn open(global: &GlobalOptions) -> Result<Self> {
        let mut config = AppConfig::load_or_create()?;
        if let Some(dir) = &global.minecraft_dir {
            config.minecraft_dir = dir.clone();
        }
        let format = global.format.unwrap_or(OutputFormat::Text);
        let echo = match (format, global.quiet) {
            (OutputFormat::Json, _) => Echo::Off,
            (OutputFormat::Text, true) => Echo::Quiet,
            (OutputFormat::Text, false) => Echo::Normal,
        };
        let log_path = config::log_path(&config::base_data_dir()?);
        Ok(Self {
            config,
            log: ActivityLog::new(Some(log_path), echo),
            format,
        })
    }

    fn feed(&self) -> HttpFeed {
        HttpFeed::new(&self.config.updater_base_url)
    }

    fn backups(&self) -> BackupManager {
        BackupManager::new(&self.config.backups_dir)
    }

    fn load_catalog(&mut self) -> Result<Catalog> {
        let loader = CatalogLoader::new(&config::cache_dir()?);
        let feed = self.feed();
        let catalog = loader
            .load(&feed, &mut self.log)
            .context("load mod list")?;
        Ok(catalog)
    }

    fn ensure_latest(&mut self) -> Result<()> {
        let feed = self.feed();
        match update::check_for_updates(
            &feed,
            env!("CARGO_PKG_VERSION"),
            &self.config.loader,
            &self.config.game_version,
        ) {
            Ok(UpdateResult::UpToDate { .. }) => Ok(()),
            Ok(UpdateResult::Available {
                version,
                download_url,
            }) => bail!(
                "A new version of Modding Helper is available ({version}). \
                 Download it from {download_url} or rerun with --skip-update-check."
            ),
            Err(err) => {
                self.log
                    .log_warn(format!("Could not check for app updates: {err}"));
                Ok(())
            }
        }
    }
}

fn parse_args(args: &[String]) -> Result<(GlobalOptions, CliCommand)> {
    if matches!(args.first().map(|s| s.as_str()), Some("--help" | "-h" | "help")) {
        return Ok((GlobalOptions::default(), CliCommand::Help));
    }
    if matches!(args.first().map(|s| s.as_str()), Some("--version" | "-V" | "version")) {
        return Ok((GlobalOptions::default(), CliCommand::Version));
    }

    let (global, tokens) = parse_global_options(args)?;
    let command = parse_subcommand(&tokens)?;
    if let CliCommand::Revert(options) = &command {
        if global.format == Some(OutputFormat::Json) && !options.assume_yes {
            bail!("revert with --format json requires --yes");
        }
    }
    Ok((global, command))
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut global = GlobalOptions::default();
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            global.format = Some(parse_format(value)?);
            continue;
        }
        if let Some(value) = arg.strip_prefix("--minecraft-dir=") {
            global.minecraft_dir = Some(PathBuf::from(value));
            continue;
        }
        match arg.as_str() {
            "--format" => {
                let value = iter.next().context("--format requires a value")?;
                global.format = Some(parse_format(value)?);
            }
            "--minecraft-dir" => {
                let value = iter.next().context("--minecraft-dir requires a path")?;
                global.minecraft_dir = Some(PathBuf::from(value));
            }
            "-q" | "--quiet" => global.quiet = true,
            _ => tokens.push(arg.to_string()),
        }
    }
    Ok((global, tokens))
}

fn parse_format(value: &str) -> Result<OutputFormat> {
    OutputFormat::parse(value).with_context(|| format!("Unknown format: {value} (use json or text)"))
}

fn parse_subcommand(tokens: &[String]) -> Result<CliCommand> {
    let Some(head) = tokens.first() else {
        return Ok(CliCommand::Help);
    };
    let rest = tokens.get(1..).unwrap_or(&[]);
    let sub = rest.first().map(|value| value.as_str());
    match head.as_str() {
        "install" => Ok(CliCommand::Install(parse_install(rest)?)),
        "revert" => Ok(CliCommand::Revert(parse_revert(rest)?)),
        "backup" => Ok(CliCommand::Backup),
        "backups" => match sub.unwrap_or("list") {
            "list" => Ok(CliCommand::BackupsList),
            other => bail!("Unknown backups command: {other} (use 'list')"),
        },
        "catalog" => match sub.unwrap_or("list") {
            "list" => Ok(CliCommand::CatalogList),
            "show" => {
                let name = rest
                    .get(1..)
                    .filter(|words| !words.is_empty())
                    .context("catalog show requires a mod name or slug")?;
                Ok(CliCommand::CatalogShow(name.join(" ")))
            }
            other => bail!("Unknown catalog command: {other} (use 'list' or 'show')"),
        },
        "detect" => Ok(CliCommand::Detect),
        "paths" => Ok(CliCommand::Paths),
        "config" => match sub.unwrap_or("show") {
            "show" => Ok(CliCommand::ConfigShow),
            "set" => {
                let (Some(key), Some(value)) = (rest.get(1), rest.get(2)) else {
                    bail!("config set requires a key and a value");
                };
                Ok(CliCommand::ConfigSet {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            other => bail!("Unknown config command: {other} (use 'show' or 'set')"),
        },
        "update" => Ok(CliCommand::Update),
        other => bail!("Unknown command: {other} (see --help)"),
    }
}

fn parse_install(args: &[String]) -> Result<InstallOptions> {
    let mut explicit = Vec::new();
    let mut selection = None;
    let mut nvidia = None;
    let mut backup = None;
    let mut skip_update_check = false;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--select" | "-s" => {
                let value = iter.next().context("--select requires a mod name or slug")?;
                explicit.push(value.to_string());
            }
            value if value.starts_with("--select=") => {
                explicit.push(value.trim_start_matches("--select=").to_string());
            }
            "--all" => selection = Some(Selection::All),
            "--none" => selection = Some(Selection::Nothing),
            "--nvidia" => nvidia = Some(true),
            "--no-nvidia" => nvidia = Some(false),
            "--backup" => backup = Some(true),
            "--no-backup" => backup = Some(false),
            "--skip-update-check" => skip_update_check = true,
            other => bail!("Unknown install option: {other}"),
        }
    }

    let selection = match (selection, explicit.is_empty()) {
        (Some(_), false) => bail!("--select cannot be combined with --all or --none"),
        (Some(selection), true) => selection,
        (None, false) => Selection::Explicit(explicit),
        (None, true) => Selection::Detected,
    };

    Ok(InstallOptions {
        selection,
        nvidia,
        backup,
        skip_update_check,
    })
}

fn parse_revert(args: &[String]) -> Result<RevertOptions> {
    let mut options = RevertOptions {
        assume_yes: false,
        skip_update_check: false,
    };
    for arg in args {
        match arg.as_str() {
            "--yes" | "-y" => options.assume_yes = true,
            "--skip-update-check" => options.skip_update_check = true,
            other => bail!("Unknown revert option: {other}"),
        }
    }
    Ok(options)
}

fn run_command(session: &mut Session, command: CliCommand) -> Result<()> {
    match command {
        CliCommand::Install(options) => install(session, options),
        CliCommand::Revert(options) => revert(session, options),
        CliCommand::Backup => backup_now(session),
        CliCommand::BackupsList => list_backups(session),
        CliCommand::CatalogList => list_catalog(session),
        CliCommand::CatalogShow(query) => show_catalog_entry(session, &query),
        CliCommand::Detect => detect(session),
        CliCommand::Paths => list_paths(session),
        CliCommand::ConfigShow => print_json(&session.config),
        CliCommand::ConfigSet { key, value } => {
            session.config.set(&key, &value)?;
            session.config.save()?;
            println!("Set {key} = {value}");
            Ok(())
        }
        CliCommand::Update => check_update(session),
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

fn install(session: &mut Session, options: InstallOptions) -> Result<()> {
    if !options.skip_update_check {
        session.ensure_latest()?;
    }
    let catalog = session.load_catalog()?;
    let mods_dir = session.config.mods_dir();

    let selected = selected_mods(options.selection, &catalog, &mods_dir)?;
    let nvidia = options.nvidia.unwrap_or_else(minecraft::detect_nvidia_gpu);
    if nvidia {
        session
            .log
            .log_info("ON - Mods made for NVIDIA graphics cards will be installed.".to_string());
    } else {
        session.log.log_info(
            "OFF - Mods made for NVIDIA graphics cards will not be installed.".to_string(),
        );
    }
    let plan = InstallPlan {
        selected,
        nvidia,
        backup: options
            .backup
            .unwrap_or(session.config.backup_before_install),
    };

    let host = ModrinthClient::new(
        &session.config.api_base,
        &session.config.loader,
        &session.config.game_version,
    );
    let backups = session.backups();
    let installer = Installer::new(&catalog, &host, &backups);
    let report = installer
        .run(&mods_dir, &plan, &mut session.log)
        .context("install mods")?;

    match session.format {
        OutputFormat::Json => print_json(&WithLog {
            result: &report,
            log: session.log.entries(),
        }),
        OutputFormat::Text => {
            print_install_summary(&report);
            Ok(())
        }
    }
}

fn selected_mods(selection: Selection, catalog: &Catalog, mods_dir: &Path) -> Result<Vec<String>> {
    Ok(match selection {
        Selection::Explicit(names) => names,
        Selection::All => catalog.ui.iter().map(|def| def.name.clone()).collect(),
        Selection::Nothing => Vec::new(),
        Selection::Detected => {
            if !mods_dir.is_dir() {
                return Err(HelperError::MissingModsDir(mods_dir.to_path_buf()).into());
            }
            let installed = scan::installed_mod_ids(mods_dir)
                .with_context(|| format!("scan {}", mods_dir.display()))?;
            scan::preselect(catalog, &installed)
        }
    })
}

/// JSON output of the mutating commands: the outcome plus the activity lines
/// it produced.
#[derive(Serialize)]
struct WithLog<'a, T: Serialize> {
    result: &'a T,
    log: &'a [LogEntry],
}

fn print_install_summary(report: &InstallReport) {
    println!(
        "{} installed, {} already present, {} removed, {} failed",
        report.installed.len(),
        report.skipped.len(),
        report.removed.len(),
        report.failed.len()
    );
    if let Some(snapshot) = &report.snapshot {
        println!("Backup: {snapshot}");
    }
}

fn revert(session: &mut Session, options: RevertOptions) -> Result<()> {
    if !options.skip_update_check {
        session.ensure_latest()?;
    }
    let backups = session.backups();
    let Some(latest) = backups.latest()? else {
        session.log.log_error("No backups found!".to_string());
        bail!("No backups found!");
    };
    if !options.assume_yes
        && !confirm(&format!(
            "Are you sure you want to revert mods to the last backup ({})?",
            latest.name
        ))?
    {
        eprintln!("Revert cancelled.");
        return Ok(());
    }

    let report = backups.revert_to_latest(&session.config.mods_dir(), &mut session.log)?;
    match session.format {
        OutputFormat::Json => print_json(&WithLog {
            result: &report,
            log: session.log.entries(),
        }),
        OutputFormat::Text => Ok(()),
    }
}

fn backup_now(session: &mut Session) -> Result<()> {
    let backups = session.backups();
    let snapshot = backups.create_snapshot(&session.config.mods_dir(), &mut session.log)?;
    match session.format {
        OutputFormat::Json => print_json(&WithLog {
            result: &snapshot,
            log: session.log.entries(),
        }),
        OutputFormat::Text => Ok(()),
    }
}

#[derive(Serialize)]
struct BackupListItem {
    name: String,
    path: String,
    files: usize,
}

fn list_backups(session: &Session) -> Result<()> {
    let backups = session.backups();
    let mut items = Vec::new();
    for snapshot in backups.list_snapshots()?.into_iter().rev() {
        items.push(BackupListItem {
            files: snapshot.file_count()?,
            path: snapshot.path.display().to_string(),
            name: snapshot.name,
        });
    }

    match session.format {
        OutputFormat::Json => print_json(&items)?,
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No backups found!");
                return Ok(());
            }
            println!("Backups in {}:", backups.root().display());
            for item in items {
                println!("{}  {:>4} file(s)", item.name, item.files);
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct CatalogListItem<'a> {
    category: Category,
    name: &'a str,
    slug: &'a str,
}

fn list_catalog(session: &mut Session) -> Result<()> {
    let catalog = session.load_catalog()?;
    let mut items = Vec::new();
    for category in Category::ALL {
        for def in catalog.mods(category) {
            items.push(CatalogListItem {
                category,
                name: &def.name,
                slug: &def.slug,
            });
        }
    }

    match session.format {
        OutputFormat::Json => print_json(&items)?,
        OutputFormat::Text => {
            println!("Mod list version {}", catalog.version);
            for item in items {
                println!(
                    "{:<12} {:<28} {}",
                    item.category.label(),
                    item.name,
                    item.slug
                );
            }
        }
    }
    Ok(())
}

fn show_catalog_entry(session: &mut Session, query: &str) -> Result<()> {
    let catalog = session.load_catalog()?;
    let Some((category, def)) = catalog.find(query) else {
        bail!("No mod named {query} in the mod list");
    };
    match session.format {
        OutputFormat::Json => print_json(def)?,
        OutputFormat::Text => {
            println!("{} ({})", def.name, category.key());
            println!("Slug: {}", def.slug);
            println!("Description: {}", def.description);
            println!("Website: {}", def.website_url);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct DetectOutput {
    nvidia_gpu: bool,
    installed: Vec<String>,
    preselected: Vec<String>,
}

fn detect(session: &mut Session) -> Result<()> {
    let catalog = session.load_catalog()?;
    let installed = scan::installed_mod_ids(&session.config.mods_dir())?;
    let output = DetectOutput {
        nvidia_gpu: minecraft::detect_nvidia_gpu(),
        preselected: scan::preselect(&catalog, &installed),
        installed,
    };

    match session.format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Text => {
            let gpu = if output.nvidia_gpu { "yes" } else { "no" };
            println!("NVIDIA graphics card: {gpu}");
            println!("Installed optional mods: {}", output.preselected.join(", "));
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct PathsOutput {
    minecraft_dir: String,
    mods_dir: String,
    backups_dir: String,
    data_dir: String,
    cache_dir: String,
    looks_like_minecraft: bool,
}

fn list_paths(session: &Session) -> Result<()> {
    let output = PathsOutput {
        minecraft_dir: session.config.minecraft_dir.display().to_string(),
        mods_dir: session.config.mods_dir().display().to_string(),
        backups_dir: session.config.backups_dir.display().to_string(),
        data_dir: config::base_data_dir()?.display().to_string(),
        cache_dir: config::cache_dir()?.display().to_string(),
        looks_like_minecraft: minecraft::looks_like_minecraft_dir(&session.config.minecraft_dir),
    };

    match session.format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Text => {
            println!("Minecraft dir: {}", output.minecraft_dir);
            println!("Mods dir: {}", output.mods_dir);
            println!("Backups dir: {}", output.backups_dir);
            println!("Data dir: {}", output.data_dir);
            println!("Cache dir: {}", output.cache_dir);
            if !output.looks_like_minecraft {
                println!("Warning: the Minecraft dir does not look like a .minecraft folder");
            }
        }
    }
    Ok(())
}

fn check_update(session: &Session) -> Result<()> {
    let result = update::check_for_updates(
        &session.feed(),
        env!("CARGO_PKG_VERSION"),
        &session.config.loader,
        &session.config.game_version,
    )
    .context("check for updates")?;

    match session.format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => match result {
            UpdateResult::UpToDate { version } => println!("Modding Helper {version} is up to date."),
            UpdateResult::Available {
                version,
                download_url,
            } => {
                println!("A new version of Modding Helper is available ({version}).");
                println!("Download: {download_url}");
            }
        },
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    io::stderr().flush().context("flush stderr")?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("read confirmation")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_help() {
    println!("Modding Helper v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  modding-helper install             Install the mod list into the mods folder");
    println!("  modding-helper revert              Restore the latest backup of the mods folder");
    println!("  modding-helper backup              Back up the mods folder now");
    println!("  modding-helper backups list        List backups, newest first");
    println!("  modding-helper catalog list        List the mods in the mod list");
    println!("  modding-helper catalog show <mod>  Show description and website of a mod");
    println!("  modding-helper detect              Show GPU and already-installed optional mods");
    println!("  modding-helper paths               Show configured paths");
    println!("  modding-helper config show         Show configuration");
    println!("  modding-helper config set <k> <v>  Change a configuration value");
    println!("  modding-helper update              Check for a newer Modding Helper");
    println!();
    println!("Global options:");
    println!("  --format <json|text>               Output format");
    println!("  --minecraft-dir <path>             Use this .minecraft folder for one run");
    println!("  -q, --quiet                        Only print warnings and errors");
    println!("  -h, --help                         Show help");
    println!("  -V, --version                      Show version");
    println!();
    println!("Install options:");
    println!("  -s, --select <mod>                 Optional mod to install (repeatable)");
    println!("  --all | --none                     Select every optional mod, or none");
    println!("                                     (default: optional mods already installed)");
    println!("  --nvidia | --no-nvidia             Override NVIDIA graphics card detection");
    println!("  --backup | --no-backup             Override backup_before_install");
    println!("  --skip-update-check                Do not require the latest app version");
    println!();
    println!("Revert options:");
    println!("  -y, --yes                          Do not ask for confirmation (required with --format json)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn no_arguments_shows_help() {
        let (_, command) = parse_args(&[]).unwrap();
        assert_eq!(command, CliCommand::Help);
    }

    #[test]
    fn install_defaults_to_detected_selection() {
        let (global, command) = parse_args(&args("install")).unwrap();
        assert!(global.format.is_none());
        assert_eq!(
            command,
            CliCommand::Install(InstallOptions {
                selection: Selection::Detected,
                nvidia: None,
                backup: None,
                skip_update_check: false,
            })
        );
    }

    #[test]
    fn install_collects_selection_and_toggles() {
        let (global, command) = parse_args(&args(
            "--format json install -s modmenu --select=zoomify --no-nvidia --no-backup -q",
        ))
        .unwrap();
        assert_eq!(global.format, Some(OutputFormat::Json));
        assert!(global.quiet);
        assert_eq!(
            command,
            CliCommand::Install(InstallOptions {
                selection: Selection::Explicit(vec![
                    "modmenu".to_string(),
                    "zoomify".to_string()
                ]),
                nvidia: Some(false),
                backup: Some(false),
                skip_update_check: false,
            })
        );
    }

    #[test]
    fn conflicting_selection_flags_fail() {
        assert!(parse_args(&args("install --all --select modmenu")).is_err());
        assert!(parse_args(&args("install --frobnicate")).is_err());
        assert!(parse_args(&args("--format xml install")).is_err());
    }

    #[test]
    fn parses_other_commands() {
        let (global, command) =
            parse_args(&args("--minecraft-dir /tmp/mc revert --yes")).unwrap();
        assert_eq!(global.minecraft_dir, Some(PathBuf::from("/tmp/mc")));
        assert_eq!(
            command,
            CliCommand::Revert(RevertOptions {
                assume_yes: true,
                skip_update_check: false,
            })
        );
        assert_eq!(
            parse_args(&args("catalog show Mod Menu")).unwrap().1,
            CliCommand::CatalogShow("Mod Menu".to_string())
        );
        assert_eq!(parse_args(&args("backups")).unwrap().1, CliCommand::BackupsList);
        assert_eq!(
            parse_args(&args("config set loader quilt")).unwrap().1,
            CliCommand::ConfigSet {
                key: "loader".to_string(),
                value: "quilt".to_string(),
            }
        );
        assert!(parse_args(&args("config set loader")).is_err());
        assert!(parse_args(&args("--format json revert")).is_err());
        assert!(parse_args(&args("--format json revert --yes")).is_ok());
        assert!(parse_args(&args("frobnicate")).is_err());
    }

    #[test]
    fn detected_selection_reports_missing_mods_dir() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::parse(crate::catalog::tests::SAMPLE).unwrap();
        let missing = dir.path().join("mods");

        let err = selected_mods(Selection::Detected, &catalog, &missing).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HelperError>(),
            Some(HelperError::MissingModsDir(_))
        ));
        assert_eq!(
            selected_mods(Selection::All, &catalog, &missing).unwrap(),
            vec!["Mod Menu".to_string(), "Zoomify".to_string()]
        );

        fs::create_dir(&missing).unwrap();
        assert!(selected_mods(Selection::Detected, &catalog, &missing)
            .unwrap()
            .is_empty());
    }
}
