//! `nfse config` - inspect and edit the JSON configuration.
//!
//! Every subcommand works on the file given with the global `--config` flag,
//! or on `<config dir>/nfse/config.json` when the flag is absent.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;
use serde_json::Value;
use tracing::debug;

use nfse_core::NfseConfig;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Where to write it (default: the active config path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print one value, addressed as "section.key" (e.g. "extraction.id_strategy")
    Get { key: String },

    /// Change one value; JSON literals are accepted ("false", "1024", "\"latin1\"")
    Set { key: String, value: String },

    /// Print where the configuration lives
    Path,
}

/// Location of the configuration file the command operates on.
struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    fn open(explicit: Option<&str>) -> Self {
        let path = explicit.map(PathBuf::from).unwrap_or_else(user_config_path);
        Self { path }
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Stored configuration, or defaults when nothing has been written yet.
    fn load(&self) -> anyhow::Result<NfseConfig> {
        if self.exists() {
            debug!("Reading configuration from {}", self.path.display());
            Ok(NfseConfig::from_file(&self.path)?)
        } else {
            Ok(NfseConfig::default())
        }
    }

    fn save(&self, config: &NfseConfig) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        config.save(&self.path)?;
        Ok(())
    }
}

fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nfse")
        .join("config.json")
}

/// Configuration for the extraction commands.
///
/// An explicit `--config` file must exist; the per-user file is optional.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<NfseConfig> {
    match config_path {
        Some(path) => Ok(NfseConfig::from_file(Path::new(path))?),
        None => ConfigStore::open(None).load(),
    }
}

pub fn run(args: ConfigArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let store = ConfigStore::open(config_path);

    match args.action {
        ConfigAction::Show => {
            if !store.exists() {
                eprintln!(
                    "{} {} does not exist, showing defaults.",
                    style("ℹ").blue(),
                    store.path.display()
                );
            }
            println!("{}", serde_json::to_string_pretty(&store.load()?)?);
        }
        ConfigAction::Init { output, force } => {
            let target = output.map(|path| ConfigStore { path }).unwrap_or(store);
            if target.exists() && !force {
                anyhow::bail!(
                    "{} already exists. Use --force to overwrite.",
                    target.path.display()
                );
            }
            target.save(&NfseConfig::default())?;
            println!(
                "{} Wrote default configuration to {}",
                style("✓").green(),
                target.path.display()
            );
        }
        ConfigAction::Get { key } => {
            let json = serde_json::to_value(store.load()?)?;
            println!("{}", serde_json::to_string_pretty(value_at(&json, &key)?)?);
        }
        ConfigAction::Set { key, value } => {
            let updated = with_value(&store.load()?, &key, &value)?;
            store.save(&updated)?;

            let json = serde_json::to_value(&updated)?;
            println!(
                "{} {} = {}",
                style("✓").green(),
                key,
                value_at(&json, &key)?
            );
        }
        ConfigAction::Path => {
            let status = if store.exists() {
                style("exists").green()
            } else {
                style("not created, run 'nfse config init'").yellow()
            };
            println!("{} ({})", store.path.display(), status);
        }
    }

    Ok(())
}

fn value_at<'a>(json: &'a Value, key: &str) -> anyhow::Result<&'a Value> {
    key.split('.')
        .try_fold(json, |node, part| node.get(part))
        .ok_or_else(|| anyhow::anyhow!("Unknown configuration key: {}", key))
}

/// Copy of `config` with `key` replaced.
///
/// The edit is made on the JSON form and read back through serde, so a value
/// the config file would reject is rejected here too.
fn with_value(config: &NfseConfig, key: &str, raw: &str) -> anyhow::Result<NfseConfig> {
    let new_value: Value =
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    let mut json = serde_json::to_value(config)?;
    let (section, leaf) = key.rsplit_once('.').unwrap_or(("", key));

    let parent = if section.is_empty() {
        Some(&mut json)
    } else {
        section
            .split('.')
            .try_fold(&mut json, |node, part| node.get_mut(part))
    };

    match parent.and_then(Value::as_object_mut) {
        Some(fields) if fields.contains_key(leaf) => {
            fields.insert(leaf.to_string(), new_value);
        }
        _ => anyhow::bail!("Unknown configuration key: {}", key),
    }

    serde_json::from_value(json).map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfse_core::IdStrategy;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_with_value_enum() {
        let updated =
            with_value(&NfseConfig::default(), "extraction.id_strategy", "deterministic").unwrap();
        assert_eq!(updated.extraction.id_strategy, IdStrategy::Deterministic);
    }

    #[test]
    fn test_with_value_parses_json_literals() {
        let updated = with_value(&NfseConfig::default(), "input.max_file_size", "1024").unwrap();
        assert_eq!(updated.input.max_file_size, 1024);

        let updated = with_value(&updated, "extraction.sanitize_text", "false").unwrap();
        assert!(!updated.extraction.sanitize_text);
        assert_eq!(updated.input.max_file_size, 1024);
    }

    #[test]
    fn test_with_value_rejects_unknown_key() {
        assert!(with_value(&NfseConfig::default(), "extraction.nope", "1").is_err());
        assert!(with_value(&NfseConfig::default(), "nope.key", "1").is_err());
        assert!(with_value(&NfseConfig::default(), "extraction", "1").is_err());
    }

    #[test]
    fn test_with_value_rejects_bad_value() {
        let err = with_value(&NfseConfig::default(), "extraction.id_strategy", "sequential")
            .unwrap_err();
        assert!(err.to_string().contains("Invalid value"));
    }

    #[test]
    fn test_value_at() {
        let json = serde_json::to_value(NfseConfig::default()).unwrap();
        assert_eq!(
            value_at(&json, "input.fallback_encoding").unwrap(),
            &Value::String("windows-1252".to_string())
        );
        assert!(value_at(&json, "input.missing").is_err());
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = ConfigStore::open(path.to_str());

        assert!(!store.exists());
        assert_eq!(store.load().unwrap(), NfseConfig::default());

        let updated = with_value(&NfseConfig::default(), "input.read_zip_archives", "false").unwrap();
        store.save(&updated).unwrap();
        assert!(!store.load().unwrap().input.read_zip_archives);
    }

    #[test]
    fn test_load_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"extraction":{"id_strategy":"deterministic"}}"#).unwrap();

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.extraction.id_strategy, IdStrategy::Deterministic);
        assert!(config.extraction.sanitize_text);
    }
}
