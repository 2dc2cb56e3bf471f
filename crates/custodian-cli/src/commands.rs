//! Subcommands.

use clap::Subcommand;
use std::path::PathBuf;

/// A custodian subcommand.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Apply a migration description read from a JSON file (`-` for stdin)
    Apply {
        /// Migration description file
        file: PathBuf,

        /// Only record the migration, touching no description or table
        #[arg(long)]
        fake: bool,

        /// Do not write the migration to history
        #[arg(long)]
        no_record: bool,
    },

    /// Roll back every migration applied after a given one
    Rollback {
        /// Migration to roll back to
        id: String,

        /// Roll back the given migration too
        #[arg(long)]
        inclusive: bool,

        /// Only remove history records
        #[arg(long)]
        fake: bool,

        /// Keep history records
        #[arg(long)]
        no_record: bool,
    },

    /// List applied migrations
    History {
        /// Only migrations of this object type
        object: Option<String>,

        /// Only the frontier of the object type
        #[arg(long, requires = "object")]
        frontier: bool,
    },

    /// Show an applied migration as a description
    Show {
        /// Migration id
        id: String,
    },

    /// List object types, or describe one
    Describe {
        /// Object type name
        name: Option<String>,
    },

    /// Build the migration taking an object type to a desired description
    Construct {
        /// Desired description file (`-` for stdin); omit with --delete
        file: Option<PathBuf>,

        /// Existing object type to migrate; omit to create one
        #[arg(long)]
        apply_to: Option<String>,

        /// Build a migration deleting the object type
        #[arg(long, conflicts_with = "file", requires = "apply_to")]
        delete: bool,

        /// Apply the built migration right away
        #[arg(long)]
        apply: bool,
    },

    /// Show the physical schema of an object type
    Ddl {
        /// Object type name
        name: String,

        /// Show the statements that would bring the table in line instead
        #[arg(long)]
        pending: bool,
    },

    /// Forget every history record
    #[command(alias = "reset")]
    DropHistory,
}

impl Command {
    /// Whether the command writes to the store.
    pub fn is_write(&self) -> bool {
        match self {
            Command::Apply { .. } | Command::Rollback { .. } | Command::DropHistory => true,
            Command::Construct { apply, .. } => *apply,
            Command::History { .. } | Command::Show { .. } | Command::Describe { .. } | Command::Ddl { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(subcommand)]
        command: Command,
    }

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("custodian").chain(args.iter().copied())).map(|c| c.command)
    }

    #[test]
    fn test_parse_apply() {
        let command = parse(&["apply", "m1.json", "--fake", "--no-record"]).unwrap();
        assert_eq!(
            command,
            Command::Apply {
                file: PathBuf::from("m1.json"),
                fake: true,
                no_record: true,
            }
        );
        assert!(command.is_write());
    }

    #[test]
    fn test_parse_rollback() {
        let command = parse(&["rollback", "m1", "--inclusive"]).unwrap();
        assert!(matches!(command, Command::Rollback { inclusive: true, fake: false, .. }));
    }

    #[test]
    fn test_frontier_requires_object() {
        assert!(parse(&["history", "--frontier"]).is_err());
        assert!(parse(&["history", "a", "--frontier"]).is_ok());
    }

    #[test]
    fn test_construct_delete_conflicts_with_file() {
        assert!(parse(&["construct", "a.json", "--apply-to", "a", "--delete"]).is_err());
        let command = parse(&["construct", "--apply-to", "a", "--delete"]).unwrap();
        assert!(!command.is_write());
    }

    #[test]
    fn test_reset_alias() {
        assert_eq!(parse(&["reset"]).unwrap(), Command::DropHistory);
        assert_eq!(parse(&["drop-history"]).unwrap(), Command::DropHistory);
    }
}
