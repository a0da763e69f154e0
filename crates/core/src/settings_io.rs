use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::JobSettings;

const JOBS_SECTION: &str = "jobs";

pub fn settings_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".config/fj/settings.ini"))
}

/// Missing files yield the defaults.
pub fn load_job_settings(path: &Path) -> io::Result<JobSettings> {
    let mut settings = JobSettings::default();
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(settings),
        Err(error) => return Err(error),
    };
    apply_job_settings_ini(&mut settings, &source);
    Ok(settings)
}

pub fn save_job_settings(path: &Path, settings: &JobSettings) -> io::Result<()> {
    write_atomic(path, &render_job_settings_ini(settings))
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Applies recognised keys; unknown keys and unparsable values are ignored.
pub fn apply_job_settings_ini(settings: &mut JobSettings, source: &str) {
    let mut section = String::new();

    for raw_line in source.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(section_name) = parse_ini_section_name(line) {
            section = section_name.to_ascii_lowercase();
            continue;
        }
        if section != JOBS_SECTION {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            continue;
        };
        let key = raw_key.trim().to_ascii_lowercase();
        let value = raw_value.trim();

        match key.as_str() {
            "auto_unmark" => {
                if let Some(parsed) = parse_bool(value) {
                    settings.auto_unmark = parsed;
                }
            }
            "auto_skip_errors" => {
                if let Some(parsed) = parse_bool(value) {
                    settings.auto_skip_errors = parsed;
                }
            }
            "notify_on_completion" => {
                if let Some(parsed) = parse_bool(value) {
                    settings.notify_on_completion = parsed;
                }
            }
            "notify_on_error" => {
                if let Some(parsed) = parse_bool(value) {
                    settings.notify_on_error = parsed;
                }
            }
            "pause_folder_monitoring" => {
                if let Some(parsed) = parse_bool(value) {
                    settings.pause_folder_monitoring = parsed;
                }
            }
            "decision_poll_interval_ms" => {
                if let Ok(parsed) = value.parse::<u64>()
                    && parsed > 0
                {
                    settings.decision_poll_interval_ms = parsed;
                }
            }
            _ => {}
        }
    }
}

pub fn render_job_settings_ini(settings: &JobSettings) -> String {
    let mut lines = vec![format!("[{JOBS_SECTION}]")];
    lines.push(format!("auto_unmark={}", settings.auto_unmark));
    lines.push(format!("auto_skip_errors={}", settings.auto_skip_errors));
    lines.push(format!(
        "notify_on_completion={}",
        settings.notify_on_completion
    ));
    lines.push(format!("notify_on_error={}", settings.notify_on_error));
    lines.push(format!(
        "pause_folder_monitoring={}",
        settings.pause_folder_monitoring
    ));
    lines.push(format!(
        "decision_poll_interval_ms={}",
        settings.decision_poll_interval_ms
    ));

    let mut output = lines.join("\n");
    output.push('\n');
    output
}

fn parse_ini_section_name(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.starts_with('[') && line.ends_with(']') {
        return Some(line[1..line.len() - 1].trim());
    }
    None
}

fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let stem = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("settings");
    let tmp = path.with_file_name(format!("{stem}.tmp-{}", std::process::id()));
    fs::write(&tmp, content)?;
    #[cfg(windows)]
    {
        match fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                fs::remove_file(path)?;
                fs::rename(tmp, path)
            }
            Err(error) => Err(error),
        }
    }
    #[cfg(not(windows))]
    {
        fs::rename(tmp, path)
    }
}
