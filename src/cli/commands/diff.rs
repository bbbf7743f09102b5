//! Speclet diff CLI command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{Revision, Speclet, SpecletDocument};
use crate::services::speclet_differ::{diff_speclets, RESTART_TRIGGERING_FIELDS};

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Speclet currently applied (YAML or JSON)
    pub old: PathBuf,

    /// Speclet about to be applied (YAML or JSON)
    pub new: PathBuf,
}

#[derive(Debug, serde::Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
    pub triggers_restart: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct DiffOutput {
    pub changes: Vec<FieldChange>,
    pub restart_required: bool,
}

impl CommandOutput for DiffOutput {
    fn to_human(&self) -> String {
        if self.changes.is_empty() {
            return "Speclets are identical.".to_string();
        }

        let mut lines = vec![format!(
            "{:<28} {:<30} {:<30} {}",
            "FIELD", "OLD", "NEW", "RESTART"
        )];
        lines.push("-".repeat(98));
        for change in &self.changes {
            lines.push(format!(
                "{:<28} {:<30} {:<30} {}",
                change.field,
                truncate(&change.old.to_string(), 28),
                truncate(&change.new.to_string(), 28),
                if change.triggers_restart { "yes" } else { "no" },
            ));
        }
        lines.push(String::new());
        lines.push(if self.restart_required {
            "Applying this speclet restarts the cluster.".to_string()
        } else {
            "Applying this speclet does not restart the cluster.".to_string()
        });
        lines.join("\n")
    }
}

fn read_speclet(path: &Path) -> Result<Speclet> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let content: Value = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let document = SpecletDocument {
        revision: Revision::default(),
        content,
    };
    Speclet::from_document(&document).with_context(|| format!("Invalid speclet in {}", path.display()))
}

pub async fn execute(args: DiffArgs, json_mode: bool) -> Result<()> {
    let old = read_speclet(&args.old)?;
    let new = read_speclet(&args.new)?;

    let diff = diff_speclets(&old, &new).unwrap_or_default();
    let changes: Vec<FieldChange> = diff
        .into_iter()
        .map(|(field, change)| FieldChange {
            field: field.to_string(),
            old: change.old,
            new: change.new,
            triggers_restart: RESTART_TRIGGERING_FIELDS.contains(&field),
        })
        .collect();

    let out = DiffOutput {
        restart_required: new.restart_on_speclet_change && changes.iter().any(|c| c.triggers_restart),
        changes,
    };
    output(&out, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn speclet_file(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{yaml}").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_speclet_yaml() {
        let file = speclet_file("pool: analytics\ninstance_count: 4\n");
        let speclet = read_speclet(file.path()).unwrap();
        assert_eq!(speclet.pool.as_deref(), Some("analytics"));
        assert_eq!(speclet.resources.instance_count, 4);
    }

    #[test]
    fn test_read_speclet_rejects_unknown_shape() {
        let file = speclet_file("instance_count: lots\n");
        assert!(read_speclet(file.path()).is_err());
    }

    #[tokio::test]
    async fn test_execute_diff() {
        let old = speclet_file("pool: analytics\n");
        let new = speclet_file("pool: adhoc\n");
        let args = DiffArgs {
            old: old.path().to_path_buf(),
            new: new.path().to_path_buf(),
        };
        assert!(execute(args, true).await.is_ok());
    }
}
