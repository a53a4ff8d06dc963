//! Log setup for the three client roles.
//!
//! Every role writes its own daily rolling file so a viewer and a console
//! running on the same machine do not interleave. Stdout belongs to frames
//! and operator output, so stderr only carries what the role's operator
//! needs to see; the file gets everything `RUST_LOG` allows.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_PREFIX: &str = "stagerunner";
const LOG_DIR_ENV: &str = "STAGERUNNER_LOG_PATH";
const STDERR_LEVEL_ENV: &str = "STAGERUNNER_STDERR_LEVEL";
const LOG_RETENTION: Duration = Duration::from_secs(60 * 60 * 24 * 7);

#[cfg(target_os = "macos")]
const OSLOG_SUBSYSTEM: &str = "dev.stagerunner.client";

/// Which client is logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRole {
    Viewer,
    Console,
    Watch,
}

impl LogRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Console => "console",
            Self::Watch => "watch",
        }
    }

    fn file_name(self) -> String {
        format!("{}-{}.log", LOG_PREFIX, self.as_str())
    }

    /// The viewer redraws the whole terminal and the console prints
    /// summaries, so both keep stderr to warnings. The watcher is read
    /// from the terminal.
    fn default_stderr_level(self) -> LevelFilter {
        match self {
            Self::Viewer | Self::Console => LevelFilter::WARN,
            Self::Watch => LevelFilter::INFO,
        }
    }
}

/// Stderr level for `role`, overridden by a valid level name
fn stderr_level(role: LogRole, configured: Option<&str>) -> LevelFilter {
    configured
        .and_then(|level| level.trim().parse().ok())
        .unwrap_or_else(|| role.default_stderr_level())
}

fn file_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Get the log directory path
pub fn get_log_dir() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(LOG_DIR_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    #[cfg(target_os = "macos")]
    {
        let base = directories::BaseDirs::new().context("No home directory for the log path")?;
        Ok(base.home_dir().join("Library").join("Logs").join("StageRunner"))
    }

    #[cfg(not(target_os = "macos"))]
    {
        let dirs = ProjectDirs::from("dev", "stagerunner", "stagerunner")
            .context("No home directory for the log path")?;
        Ok(dirs.state_dir().unwrap_or_else(|| dirs.data_local_dir()).join("logs"))
    }
}

/// Install the subscriber for `role`. The guard must live until exit.
pub fn init_logging(role: LogRole) -> Result<WorkerGuard> {
    let log_dir = get_log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;
    prune_old_logs(&log_dir, LOG_RETENTION);

    let file_appender = tracing_appender::rolling::daily(&log_dir, role.file_name());
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(file_filter());

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_level(
            role,
            std::env::var(STDERR_LEVEL_ENV).ok().as_deref(),
        ));

    let registry = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer);

    // `log stream --predicate 'subsystem == "dev.stagerunner.client"'`
    #[cfg(target_os = "macos")]
    let registry = registry.with(
        tracing_oslog::OsLogger::new(OSLOG_SUBSYSTEM, role.as_str()).with_filter(file_filter()),
    );

    registry
        .try_init()
        .context("Failed to install the log subscriber")?;
    Ok(guard)
}

/// Delete rotated log files of any role older than `max_age`
fn prune_old_logs(log_dir: &Path, max_age: Duration) {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return;
    };

    for entry in entries.flatten() {
        let is_log = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(LOG_PREFIX) && name.contains(".log"));
        if !is_log {
            continue;
        }
        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .is_ok_and(|modified| modified < cutoff);
        if expired && entry.path().is_file() {
            let _ = std::fs::remove_file(entry.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_role_has_its_own_file() {
        assert_eq!(LogRole::Viewer.file_name(), "stagerunner-viewer.log");
        assert_eq!(LogRole::Console.file_name(), "stagerunner-console.log");
        assert_eq!(LogRole::Watch.file_name(), "stagerunner-watch.log");
    }

    #[test]
    fn test_stderr_level_per_role() {
        assert_eq!(stderr_level(LogRole::Viewer, None), LevelFilter::WARN);
        assert_eq!(stderr_level(LogRole::Console, None), LevelFilter::WARN);
        assert_eq!(stderr_level(LogRole::Watch, None), LevelFilter::INFO);

        assert_eq!(stderr_level(LogRole::Viewer, Some("debug")), LevelFilter::DEBUG);
        assert_eq!(stderr_level(LogRole::Watch, Some("off")), LevelFilter::OFF);
        assert_eq!(stderr_level(LogRole::Watch, Some("loud")), LevelFilter::INFO);
    }

    #[test]
    fn test_prune_only_touches_log_files() {
        let dir = std::env::temp_dir().join(format!("stagerunner-logs-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let viewer_log = dir.join("stagerunner-viewer.log.2025-08-01");
        let console_log = dir.join("stagerunner-console.log.2025-08-01");
        let crash = dir.join("crash.log");
        for path in [&viewer_log, &console_log, &crash] {
            std::fs::write(path, "old").unwrap();
        }

        // Anything older than 1ms counts as expired
        std::thread::sleep(Duration::from_millis(20));
        prune_old_logs(&dir, Duration::from_millis(1));

        assert!(!viewer_log.exists());
        assert!(!console_log.exists());
        assert!(crash.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
