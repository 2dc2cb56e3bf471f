//! Command execution against a migration manager.

use std::io::Read;
use std::path::Path;

use crate::commands::Command;
use crate::formatter::Formatter;
use custodian_core::migration::{MigrationDescription, MigrationError, MigrationManager, MigrationMetaDescription};
use thiserror::Error;
use tracing::debug;

/// Execution errors.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Engine error.
    #[error("{0}")]
    Migration(#[from] MigrationError),

    /// An input file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An input file is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The named object type does not exist.
    #[error("object '{0}' does not exist")]
    UnknownObject(String),

    /// Invalid combination of arguments.
    #[error("{0}")]
    Usage(String),
}

/// Execute a command and return formatted output.
pub fn execute(
    manager: &MigrationManager,
    command: Command,
    formatter: &dyn Formatter,
) -> Result<String, ExecuteError> {
    debug!(?command, "executing");
    match command {
        Command::Apply { file, fake, no_record } => {
            let description = MigrationDescription::from_json(&read_input(&file)?)?;
            let id = description.id.clone();
            let state = manager.apply(description, !no_record, fake)?;
            let message = match state {
                Some(meta) => format!("applied {} ({})", id, meta.name),
                None => format!("applied {}", id),
            };
            Ok(formatter.format_message(&message))
        }

        Command::Rollback {
            id,
            inclusive,
            fake,
            no_record,
        } => {
            let rolled_back = if inclusive {
                manager.rollback(&id, !no_record, fake)?
            } else {
                manager.rollback_to(&id, !no_record, fake)?
            };
            let message = if rolled_back.is_empty() {
                "nothing to roll back".to_string()
            } else {
                format!("rolled back {}", rolled_back.join(", "))
            };
            Ok(formatter.format_message(&message))
        }

        Command::History { object, frontier } => {
            let records = match (object, frontier) {
                (Some(object), true) => manager.preceding_migrations(&object)?,
                (Some(object), false) => manager.list()?.into_iter().filter(|r| r.object == object).collect(),
                (None, _) => manager.list()?,
            };
            Ok(formatter.format_history(&records))
        }

        Command::Show { id } => Ok(manager.get_description(&id)?.to_json()?),

        Command::Describe { name: None } => Ok(formatter.format_metas(&manager.list_metas()?)),
        Command::Describe { name: Some(name) } => {
            let meta = manager.describe(&name)?.ok_or(ExecuteError::UnknownObject(name))?;
            Ok(formatter.format_meta(&meta))
        }

        Command::Construct {
            file,
            apply_to,
            delete,
            apply,
        } => {
            let desired: Option<MigrationMetaDescription> = match (file, delete) {
                (Some(file), false) => Some(serde_json::from_str(&read_input(&file)?)?),
                (None, true) => None,
                _ => {
                    return Err(ExecuteError::Usage(
                        "construct needs either a description file or --delete".to_string(),
                    ))
                }
            };
            let description = manager.construct(apply_to.as_deref().unwrap_or_default(), desired.as_ref())?;
            let json = description.to_json()?;
            if apply {
                manager.apply(description, true, false)?;
            }
            Ok(json)
        }

        Command::Ddl { name, pending } => {
            if manager.describe(&name)?.is_none() {
                return Err(ExecuteError::UnknownObject(name));
            }
            if pending {
                Ok(formatter.format_statements(&manager.pending_ddl(&name)?))
            } else {
                Ok(formatter.format_schema(&manager.physical_schema(&name)?))
            }
        }

        Command::DropHistory => {
            let dropped = manager.drop_history()?;
            Ok(formatter.format_message(&format!("dropped {} history record(s)", dropped)))
        }
    }
}

/// Read a file, or stdin for `-`.
fn read_input(path: &Path) -> Result<String, ExecuteError> {
    let io_error = |source| ExecuteError::Io {
        path: path.display().to_string(),
        source,
    };
    if path == Path::new("-") {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input).map_err(io_error)?;
        Ok(input)
    } else {
        std::fs::read_to_string(path).map_err(io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{create_formatter, OutputFormat};
    use custodian_core::config::{ManagerConfig, StorageConfig};
    use std::path::PathBuf;

    struct TestContext {
        manager: MigrationManager,
        dir: tempfile::TempDir,
    }

    impl TestContext {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let manager =
                MigrationManager::open(StorageConfig::new(dir.path().join("data")), ManagerConfig::default()).unwrap();
            Self { manager, dir }
        }

        fn write(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, content).unwrap();
            path
        }

        fn run(&self, command: Command) -> Result<String, ExecuteError> {
            execute(&self.manager, command, &*create_formatter(OutputFormat::Json))
        }
    }

    const CREATE_A: &str = r#"{
        "id": "m1",
        "applyTo": "",
        "dependsOn": [],
        "operations": [{
            "type": "createObject",
            "object": {
                "name": "a",
                "key": "id",
                "fields": [
                    {"name": "id", "type": "number", "optional": true,
                     "default": {"func": "nextval"}}
                ]
            }
        }]
    }"#;

    #[test]
    fn test_apply_and_history() {
        let ctx = TestContext::new();
        let file = ctx.write("m1.json", CREATE_A);
        let output = ctx
            .run(Command::Apply {
                file,
                fake: false,
                no_record: false,
            })
            .unwrap();
        assert!(output.contains("applied m1 (a)"));

        let output = ctx
            .run(Command::History {
                object: Some("a".to_string()),
                frontier: true,
            })
            .unwrap();
        let history: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(history[0]["id"], "m1");
        assert_eq!(history[0]["metaState"]["name"], "a");

        let output = ctx.run(Command::Ddl {
            name: "a".to_string(),
            pending: true,
        });
        assert_eq!(output.unwrap(), "[]");
    }

    #[test]
    fn test_construct_delete() {
        let ctx = TestContext::new();
        let file = ctx.write("m1.json", CREATE_A);
        ctx.run(Command::Apply {
            file,
            fake: false,
            no_record: false,
        })
        .unwrap();

        let output = ctx
            .run(Command::Construct {
                file: None,
                apply_to: Some("a".to_string()),
                delete: true,
                apply: true,
            })
            .unwrap();
        let description = MigrationDescription::from_json(&output).unwrap();
        assert_eq!(description.depends_on, vec!["m1"]);
        assert_eq!(description.operations[0].kind(), "deleteObject");
        assert!(ctx.manager.describe("a").unwrap().is_none());
    }

    #[test]
    fn test_unknown_object() {
        let ctx = TestContext::new();
        let err = ctx
            .run(Command::Describe {
                name: Some("missing".to_string()),
            })
            .unwrap_err();
        assert!(matches!(err, ExecuteError::UnknownObject(_)));
    }

    #[test]
    fn test_missing_file() {
        let ctx = TestContext::new();
        let err = ctx
            .run(Command::Apply {
                file: ctx.dir.path().join("missing.json"),
                fake: false,
                no_record: false,
            })
            .unwrap_err();
        assert!(matches!(err, ExecuteError::Io { .. }));
    }
}
