use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::Cli;
use crate::config::lazydjango::Snapshot;
use crate::drivers::SnapshotDriver;
use crate::manager::SnapshotManager;
use crate::project::{self, DiscoverOptions, compose};
use crate::utils::process::SystemRunner;
use colored::*;
use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets::UTF8_FULL};

/// Where to look for `manage.py`: `--project`, else the working directory.
fn start_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.project {
        Some(dir) => Ok(dir.clone()),
        None => std::env::current_dir().context("failed to read current directory"),
    }
}

fn open_manager(cli: &Cli) -> Result<SnapshotManager> {
    let start = start_dir(cli)?;
    let options = DiscoverOptions {
        introspect: !cli.no_introspect,
        engine: cli.engine.clone(),
        database_name: cli.db_name.clone(),
    };

    let bar = create_progress_bar("Inspecting project");
    let executor = project::discover(&start, Arc::new(SystemRunner), &options);
    bar.finish_and_clear();
    let executor = executor.context("failed to load Django project")?;

    if !executor.project().database.is_usable {
        eprintln!(
            "{} {}: {}",
            "!".yellow().bold(),
            "Warning".yellow(),
            "database settings could not be determined; pass --engine and --db-name"
        );
    }
    SnapshotManager::new(executor).context("failed to open snapshot directory")
}

pub fn do_snapshot(cli: &Cli, name: Option<&str>) -> Result<()> {
    let mut manager = open_manager(cli)?;
    let strategy = manager.create_strategy();

    let bar = create_progress_bar("Creating snapshot");
    bar.set_message(format!("Dumping database ({})", strategy.name()));
    let snapshot = manager.create_snapshot(name);
    bar.finish_and_clear();
    let snapshot = snapshot?;

    println!(
        "{} {}",
        "✔".green().bold(),
        format!("Snapshot '{}' created", snapshot.name).green()
    );
    println!("  {} {}", "id:".dimmed(), snapshot.id);
    println!("  {} {}", "file:".dimmed(), snapshot.file_path);
    Ok(())
}

pub fn do_list(cli: &Cli) -> Result<()> {
    let manager = open_manager(cli)?;
    let snapshots = manager.list_snapshots()?;

    if snapshots.is_empty() {
        println!("{} {}", "i".yellow().bold(), "No snapshots found".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").add_attribute(Attribute::Bold),
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Created").add_attribute(Attribute::Bold),
            Cell::new("Engine").add_attribute(Attribute::Bold),
            Cell::new("Branch").add_attribute(Attribute::Bold),
            Cell::new("Size").add_attribute(Attribute::Bold),
        ]);

    for s in &snapshots {
        table.add_row(vec![
            Cell::new(&s.id),
            Cell::new(&s.name),
            Cell::new(s.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(short_engine(&s.database_engine)),
            Cell::new(or_dash(&s.git_branch)),
            Cell::new(payload_size(&s.file_path)),
        ]);
    }

    println!("{}", table);
    Ok(())
}

pub fn do_show(cli: &Cli, id: &str) -> Result<()> {
    let manager = open_manager(cli)?;
    let snapshot = manager.get_snapshot(id)?;
    print_snapshot(&snapshot);
    Ok(())
}

pub fn do_restore(cli: &Cli, id: Option<&str>, latest: bool, yes: bool) -> Result<()> {
    let mut manager = open_manager(cli)?;

    let snapshot = if latest {
        manager
            .latest_snapshot()?
            .ok_or_else(|| anyhow!("no snapshots available"))?
    } else {
        let id = id.ok_or_else(|| anyhow!("snapshot id required unless --latest"))?;
        manager.get_snapshot(id)?
    };

    if !yes
        && !prompt_confirm(&format!(
            "Restore '{}' ({})? This overwrites the current database. [y/N] ",
            snapshot.name, snapshot.id
        ))?
    {
        println!("Aborted.");
        return Ok(());
    }

    let bar = create_progress_bar("Restoring snapshot");
    bar.set_message(format!("Restoring {}", snapshot.name));
    let restored = manager.restore_snapshot(&snapshot.id);
    bar.finish_and_clear();
    let restored = restored?;

    println!(
        "{} {}",
        "✔".green().bold(),
        format!("Restored snapshot '{}'", restored.name).green()
    );
    if !restored.git_branch.is_empty() {
        println!(
            "{} {}",
            "i".yellow().bold(),
            format!(
                "Snapshot was taken on branch '{}' at {}",
                restored.git_branch,
                short_commit(&restored.git_commit)
            )
            .yellow()
        );
    }
    Ok(())
}

pub fn do_delete(cli: &Cli, id: &str, yes: bool) -> Result<()> {
    let mut manager = open_manager(cli)?;
    let snapshot = manager.get_snapshot(id)?;

    if !yes && !prompt_confirm(&format!("Delete snapshot '{}' ({})? [y/N] ", snapshot.name, snapshot.id))? {
        println!("Aborted.");
        return Ok(());
    }

    manager.delete_snapshot(id)?;
    println!(
        "{} {}",
        "✔".green().bold(),
        format!("Deleted snapshot '{}'", snapshot.name).green()
    );
    Ok(())
}

pub fn do_run(cli: &Cli, args: &[String]) -> Result<()> {
    let mut manager = open_manager(cli)?;
    let output = manager
        .executor_mut()
        .run(args)
        .with_context(|| format!("manage.py {} failed", args.join(" ")))?;
    print!("{}", output);
    Ok(())
}

pub fn do_services(cli: &Cli) -> Result<()> {
    let root = project::find_root(&start_dir(cli)?)?;
    let Some(file) = compose::find_compose_file(&root) else {
        println!("{} {}", "i".yellow().bold(), "No compose file found".yellow());
        return Ok(());
    };
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let services = compose::parse_services(&content);
    if services.is_empty() {
        println!("{} {}", "i".yellow().bold(), "No services defined".yellow());
        return Ok(());
    }

    let ranked = compose::rank_services(&services);
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Service", "Score"]);
    for (rank, name) in ranked.iter().enumerate() {
        let score = services
            .iter()
            .find(|s| s.name.trim() == name.as_str())
            .map(compose::score_service)
            .unwrap_or_default();
        table.add_row(vec![(rank + 1).to_string(), name.clone(), score.to_string()]);
    }
    println!("{} {}", "i".yellow().bold(), file.display().to_string().yellow());
    println!("{}", table);
    Ok(())
}

pub fn do_info(cli: &Cli) -> Result<()> {
    let manager = open_manager(cli)?;
    let project = manager.executor().project();
    let db = &project.database;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    let rows: Vec<(&str, String)> = vec![
        ("Project", project.root_dir.display().to_string()),
        ("Interpreter", project.interpreter.clone()),
        ("Docker", (if project.has_docker { "yes" } else { "no" }).to_string()),
        (
            "Compose file",
            project
                .compose_file()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".into()),
        ),
        ("Service", project.selected_service().unwrap_or("-").to_string()),
        ("Engine", or_dash(&db.engine)),
        ("Database", or_dash(&db.name)),
        ("Host", or_dash(&db.host)),
        ("Port", or_dash(&db.port)),
        ("User", or_dash(&db.user)),
        ("Strategy", manager.create_strategy().name().to_string()),
        ("Snapshots", manager.store().dir().display().to_string()),
    ];
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key).add_attribute(Attribute::Bold), Cell::new(value)]);
    }
    println!("{}", table);
    Ok(())
}

pub fn do_version() {
    println!("{} {}", "lazy-django".bold(), env!("CARGO_PKG_VERSION").cyan());
}

fn print_snapshot(s: &Snapshot) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    let migrations = if s.applied_migrations.is_empty() {
        "-".to_string()
    } else {
        s.applied_migrations.join("\n")
    };
    let rows = [
        ("ID", s.id.clone()),
        ("Name", s.name.clone()),
        ("Created", s.timestamp.to_rfc3339()),
        ("Engine", or_dash(&s.database_engine)),
        ("Branch", or_dash(&s.git_branch)),
        ("Commit", or_dash(&s.git_commit)),
        ("Payload", format!("{} ({})", s.file_path, payload_size(&s.file_path))),
        ("Metadata", s.metadata_path.clone()),
        ("Migrations", migrations),
    ];
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key).add_attribute(Attribute::Bold), Cell::new(value)]);
    }
    println!("{}", table);
}

fn create_progress_bar(prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");
    bar.set_style(style);
    bar.set_message(prefix.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(80));
    bar
}

fn prompt_confirm(message: &str) -> Result<bool> {
    use std::io::{self, Write};
    print!("{} {}", "?".cyan().bold(), message.cyan());
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let ans = input.trim().to_lowercase();
    Ok(ans == "y" || ans == "yes")
}

fn or_dash(value: &str) -> String {
    if value.is_empty() { "-".into() } else { value.to_string() }
}

/// `django.db.backends.postgresql` -> `postgresql`.
fn short_engine(engine: &str) -> &str {
    match engine.rsplit('.').next() {
        Some(last) if !last.is_empty() => last,
        _ => "-",
    }
}

fn short_commit(commit: &str) -> &str {
    commit.get(..8).unwrap_or(commit)
}

fn payload_size(path: &str) -> String {
    match std::fs::metadata(Path::new(path)) {
        Ok(meta) => human_size(meta.len()),
        Err(_) => "missing".into(),
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_and_commit_shorten() {
        assert_eq!(short_engine("django.db.backends.postgresql"), "postgresql");
        assert_eq!(short_engine(""), "-");
        assert_eq!(short_commit("0123456789abcdef"), "01234567");
        assert_eq!(short_commit("abc"), "abc");
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(payload_size("/nonexistent/lazy-django/1.sql"), "missing");
    }
}
