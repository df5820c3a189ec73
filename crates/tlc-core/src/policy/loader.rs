//! Reading configuration documents from disk.

use std::path::Path;

use super::{load, RawConfig, ReleaseConfig};
use crate::domain::{PipelineError, Result};

/// Parse a `.json` or `.toml` document without validating it.
pub fn read_raw(path: &Path) -> Result<RawConfig> {
    let text = std::fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    match extension {
        "json" => serde_json::from_str(&text)
            .map_err(|e| PipelineError::Format(format!("{}: {e}", path.display()))),
        "toml" => toml::from_str(&text)
            .map_err(|e| PipelineError::Format(format!("{}: {e}", path.display()))),
        other => Err(PipelineError::Format(format!(
            "{}: unsupported configuration format '{other}' (expected .json or .toml)",
            path.display()
        ))),
    }
}

/// Read, validate and resolve a configuration file.
pub fn load_from_path(path: &Path) -> Result<ReleaseConfig> {
    load(read_raw(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tier;
    use crate::policy::NotificationEvent;

    #[test]
    fn loads_toml_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tlc.toml");
        std::fs::write(
            &path,
            r#"
tagPattern = "v[0-9]*"
previewDomain = "preview.example.com"

[tiers.rc]
coverageThreshold = 95
gates = ["tests", "security", "qa-approval"]

[notifications]
onPromote = ["slack:#releases"]

[gateCommands.tests]
command = ["cargo", "test", "--workspace"]
timeoutSecs = 900
"#,
        )
        .unwrap();

        let config = load_from_path(&path).unwrap();
        assert_eq!(config.tag_pattern, "v[0-9]*");
        assert_eq!(config.policy(Tier::Rc).unwrap().coverage_threshold, 95);
        assert_eq!(config.policy(Tier::Rc).unwrap().gates.len(), 3);
        assert_eq!(config.channels(NotificationEvent::OnPromote).len(), 1);
    }

    #[test]
    fn loads_json_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tlc.json");
        std::fs::write(&path, r#"{ "tiers": { "feature": { "autoDeploy": false } } }"#).unwrap();

        let config = load_from_path(&path).unwrap();
        assert!(!config.policy(Tier::Feature).unwrap().auto_deploy);
    }

    #[test]
    fn unsupported_extension_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tlc.yaml");
        std::fs::write(&path, "tagPattern: v*").unwrap();
        assert_eq!(load_from_path(&path).unwrap_err().kind(), "format");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_from_path(Path::new("/nonexistent/tlc.json")).unwrap_err();
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn syntax_error_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tlc.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_from_path(&path).unwrap_err().kind(), "format");
    }
}
