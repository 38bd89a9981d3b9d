use std::{fs, path::Path};

use anyhow::{Context, Result};
use chipnotes_core::{ClipMetadata, EngineTuning, PackDefinition};
use serde::de::DeserializeOwned;

/// Reads a pack definition record.
pub(crate) fn load_pack_definition(path: &Path) -> Result<PackDefinition> {
    read_json(path).with_context(|| format!("failed to load pack definition {}", path.display()))
}

/// Reads the clip records a pack draws from.
pub(crate) fn load_clips(path: &Path) -> Result<Vec<ClipMetadata>> {
    read_json(path).with_context(|| format!("failed to load clip records {}", path.display()))
}

/// Reads engine tuning from a TOML file, or the defaults when no file is given.
pub(crate) fn load_tuning(path: Option<&Path>) -> Result<EngineTuning> {
    let Some(path) = path else {
        return Ok(EngineTuning::default());
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read tuning file {}", path.display()))?;
    parse_tuning(&contents).with_context(|| format!("invalid tuning file {}", path.display()))
}

fn parse_tuning(contents: &str) -> Result<EngineTuning> {
    toml::from_str(contents).context("failed to parse tuning toml contents")
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).context("failed to parse json contents")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tuning_keeps_remaining_defaults() {
        let tuning = parse_tuning(
            r#"
            [scoring]
            perfect_band_fraction = 0.2

            [scheduler]
            high_gap_ms = 1200
            "#,
        )
        .expect("valid toml");

        assert_eq!(tuning.scoring.perfect_band_fraction, 0.2);
        assert_eq!(tuning.scoring.perfect_points, 100);
        assert_eq!(tuning.scheduler.high_gap_ms, 1_200);
        assert_eq!(tuning.scheduler.low_gap_ms, 3_500);
    }

    #[test]
    fn malformed_tuning_is_rejected() {
        assert!(parse_tuning("[scoring]\nperfect_points = \"lots\"").is_err());
    }

    #[test]
    fn missing_tuning_path_uses_defaults() {
        assert_eq!(load_tuning(None).expect("defaults"), EngineTuning::default());
    }

    #[test]
    fn missing_files_report_their_path() {
        let error = load_pack_definition(Path::new("does/not/exist.json")).expect_err("missing");
        assert!(format!("{error:#}").contains("does/not/exist.json"));
    }
}
