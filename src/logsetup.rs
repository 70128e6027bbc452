//! Logging setup for experiment runs.
//!
//! `init` installs the env_logger subscriber on stderr; `init_with_file`
//! additionally routes records into a timestamped log file under the result
//! directory. Both honor `RUST_LOG` and are safe to call more than once.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

pub fn make_log_name(name: &str) -> String {
    format!(
        "pred_age_{}_{}.log",
        name,
        Local::now().format("%Y%m%d-%H%M%S")
    )
}

pub fn init() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_secs()
    .try_init();
}

pub fn init_with_file(name: &str, result_dir: &Path) -> anyhow::Result<PathBuf> {
    let log_dir = result_dir.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join(make_log_name(name));
    let target = Box::new(fs::File::create(&log_file)?);

    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .target(env_logger::Target::Pipe(target))
    .format_timestamp_secs()
    .try_init();
    Ok(log_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_name_carries_the_experiment_name() {
        let name = make_log_name("modality");
        assert!(name.starts_with("pred_age_modality_"));
        assert!(name.ends_with(".log"));
    }
}
