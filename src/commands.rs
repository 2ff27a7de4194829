//! Command-line surface.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::requests::{RequestStatus, ServiceCategory};

#[derive(Parser, Debug)]
#[command(name = "intake")]
#[command(about = "Request desk for a design studio: intake form, project board and client lookup")]
#[command(version)]
pub struct Cli {
  /// Path to config file (default: $XDG_CONFIG_HOME/intake/config.yaml)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  /// Log to stderr instead of the log file
  #[arg(short, long, global = true)]
  pub verbose: bool,

  /// Keep requests in memory for this run instead of the cache file
  #[arg(long, global = true)]
  pub ephemeral: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Send a new service request
  Submit(RequestForm),
  /// Show the status of your requests by access code
  Lookup { code: String },
  /// Log in as the studio admin
  Login {
    #[arg(short, long)]
    username: String,
    #[arg(short, long, env = "INTAKE_ADMIN_PASSWORD", hide_env_values = true)]
    password: String,
  },
  /// End the admin session
  Logout,
  /// Show the project board
  #[command(alias = "b")]
  Board,
  /// List requests, newest first
  #[command(alias = "ls")]
  List {
    #[arg(short, long, value_enum)]
    status: Option<RequestStatus>,
  },
  /// Show every field of one request
  Show { id: String },
  /// Add a request from the board
  New(RequestForm),
  /// Change fields of a request
  Edit(EditArgs),
  /// Move a request one column forward
  Advance { id: String },
  /// Move a request one column back
  Back { id: String },
  /// Set the status of a request
  Move {
    id: String,
    #[arg(value_enum)]
    status: RequestStatus,
  },
  /// Delete a request everywhere
  Delete {
    id: String,
    /// Confirm the deletion
    #[arg(long)]
    yes: bool,
  },
  /// Give all requests of a client one access code
  AssignCode { client_name: String },
  /// Push writes that have not reached the remote yet
  Sync {
    /// Keep running. Changes made by this process are pushed right away;
    /// writes queued by other runs are picked up every sync.interval_secs
    #[arg(short, long)]
    watch: bool,
  },
  /// Check the remote connection and table
  Check,
  /// Load a JSON array of requests exported from another device
  Import { file: PathBuf },
  /// Print all requests as a JSON array
  Export {
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
}

/// Intake form fields.
#[derive(Args, Debug)]
pub struct RequestForm {
  #[arg(long)]
  pub name: String,
  #[arg(long)]
  pub email: String,
  #[arg(long, value_enum)]
  pub service: ServiceCategory,
  #[arg(long)]
  pub description: String,
  #[arg(long)]
  pub budget: Option<String>,
  /// Name of a reference file (the file itself is not uploaded)
  #[arg(long)]
  pub reference_file: Option<String>,
  #[arg(long)]
  pub access_code: Option<String>,
  #[arg(long = "tag")]
  pub tags: Vec<String>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
  pub id: String,
  #[arg(long)]
  pub name: Option<String>,
  #[arg(long)]
  pub email: Option<String>,
  #[arg(long, value_enum)]
  pub service: Option<ServiceCategory>,
  #[arg(long)]
  pub description: Option<String>,
  /// New budget; an empty value clears it
  #[arg(long)]
  pub budget: Option<String>,
  /// Add the tag, or remove it if present (repeatable)
  #[arg(long = "tag")]
  pub tags: Vec<String>,
  /// New access code; an empty value clears it
  #[arg(long)]
  pub access_code: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  #[test]
  fn test_cli_definition() {
    Cli::command().debug_assert();
  }

  #[test]
  fn test_parse_submit() {
    let cli = Cli::try_parse_from([
      "intake",
      "submit",
      "--name",
      "Ana",
      "--email",
      "ana@example.com",
      "--service",
      "custom-wear",
      "--description",
      "logo",
    ])
    .unwrap();
    match cli.command {
      Command::Submit(form) => {
        assert_eq!(form.service, ServiceCategory::CustomWear);
        assert!(form.tags.is_empty());
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn test_parse_move_and_globals() {
    let cli = Cli::try_parse_from(["intake", "move", "3f2a", "in-progress", "--ephemeral"]).unwrap();
    assert!(cli.ephemeral);
    match cli.command {
      Command::Move { id, status } => {
        assert_eq!(id, "3f2a");
        assert_eq!(status, RequestStatus::InProgress);
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn test_edit_repeats_tags() {
    let cli =
      Cli::try_parse_from(["intake", "edit", "3f2a", "--tag", "Quote Sent", "--tag", "Rush"]).unwrap();
    match cli.command {
      Command::Edit(args) => assert_eq!(args.tags, vec!["Quote Sent", "Rush"]),
      other => panic!("unexpected command {:?}", other),
    }
  }
}
