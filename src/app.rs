use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::auth::Session;
use crate::board;
use crate::cache::{LocalCache, MemoryCache, SqliteCache};
use crate::commands::{Command, EditArgs, RequestForm};
use crate::config::Config;
use crate::remote::{Disconnected, PostgrestStore, RemoteError, RemoteStore};
use crate::requests::{normalize_access_code, NewRequest, RequestStatus, ServiceRequest};
use crate::service::{Listing, Reconciler, RequestService, SyncState};

/// Key the browser front end stored its request array under.
const LEGACY_STORAGE_KEY: &str = "dnldm_requests";

const CACHE_FILE: &str = "requests.db";

/// Main application state
pub struct App {
  config: Config,
  service: Arc<RequestService>,
  session: Session,
  remote_configured: bool,
}

impl App {
  pub fn new(config: Config, data_dir: &Path, ephemeral: bool) -> Result<Self> {
    let local: Arc<dyn LocalCache> = if ephemeral {
      Arc::new(MemoryCache::new())
    } else {
      Arc::new(SqliteCache::open(&data_dir.join(CACHE_FILE))?)
    };

    let remote: Arc<dyn RemoteStore> = match &config.remote {
      Some(remote) => {
        info!(url = %remote.url, table = %remote.table, "Using remote store");
        Arc::new(PostgrestStore::from_config(remote)?)
      }
      None => {
        info!("No remote configured, requests stay on this device");
        Arc::new(Disconnected)
      }
    };

    Ok(Self {
      remote_configured: config.remote.is_some(),
      service: Arc::new(RequestService::new(local, remote)),
      session: Session::new(data_dir),
      config,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Submit(form) => self.submit(form, false).await,
      Command::Lookup { code } => self.lookup(&code).await,
      Command::Login { username, password } => {
        self.session.login(&self.config.admin, &username, &password)?;
        println!("Logged in as {}.", username.trim());
        Ok(())
      }
      Command::Logout => {
        self.session.logout()?;
        println!("Logged out.");
        Ok(())
      }
      Command::Sync { watch } => self.sync(watch).await,
      Command::Check => self.check().await,
      admin => {
        self.session.require_admin()?;
        self.run_admin(admin).await
      }
    }
  }

  async fn run_admin(&self, command: Command) -> Result<()> {
    match command {
      Command::Board => {
        let listing = self.listing().await?;
        print!("{}", board::render_board(&listing.records));
      }
      Command::List { status } => {
        let mut records = self.listing().await?.records;
        if let Some(status) = status {
          records.retain(|r| r.status == status);
        }
        print!("{}", board::render_table(&records));
      }
      Command::Show { id } => {
        let record = self.resolve(&id).await?;
        print!("{}", board::render_detail(&record));
      }
      Command::New(form) => self.submit(form, true).await?,
      Command::Edit(args) => self.edit(args).await?,
      Command::Advance { id } => {
        let record = self.resolve(&id).await?;
        let next = record.status.next().ok_or_else(|| at_edge(&record))?;
        self.set_status(&record, next).await?;
      }
      Command::Back { id } => {
        let record = self.resolve(&id).await?;
        let previous = record.status.previous().ok_or_else(|| at_edge(&record))?;
        self.set_status(&record, previous).await?;
      }
      Command::Move { id, status } => {
        let record = self.resolve(&id).await?;
        self.set_status(&record, status).await?;
      }
      Command::Delete { id, yes } => {
        let record = self.resolve(&id).await?;
        if !yes {
          return Err(eyre!(
            "Refusing to delete request {} from {} without --yes",
            board::short_id(&record.id),
            record.client_name
          ));
        }
        let state = self.service.delete(&record.id).await?;
        println!("Deleted request {}.{}", board::short_id(&record.id), self.sync_note(state));
      }
      Command::AssignCode { client_name } => {
        let (code, changed) = self.service.assign_access_code(&client_name).await?;
        if changed == 0 {
          println!("{} already uses access code {}.", client_name.trim(), code);
        } else {
          println!(
            "Access code {} assigned to {} request(s) of {}.",
            code,
            changed,
            client_name.trim()
          );
        }
      }
      Command::Import { file } => self.import(&file).await?,
      Command::Export { output } => {
        let records = self.listing().await?.records;
        let json = serde_json::to_string_pretty(&records)
          .map_err(|e| eyre!("Failed to serialize requests: {}", e))?;
        match output {
          Some(path) => {
            std::fs::write(&path, json + "\n")
              .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
            println!("Exported {} request(s) to {}.", records.len(), path.display());
          }
          None => println!("{}", json),
        }
      }
      other => return Err(eyre!("Unexpected command {:?}", other)),
    }
    Ok(())
  }

  async fn submit(&self, form: RequestForm, from_board: bool) -> Result<()> {
    let mut request = NewRequest::new(form.name, form.email, form.service, form.description);
    request.budget = form.budget;
    request.reference_file_name = form.reference_file;
    request.client_access_code = form.access_code;
    request.tags = form.tags;
    request.validate()?;

    let (record, state) = self.service.create(request.into_request()).await?;
    if from_board {
      println!("Created request {}.{}", board::short_id(&record.id), self.sync_note(state));
    } else {
      println!(
        "Thanks, {}! Your request was received (reference {}).{}",
        record.client_name,
        board::short_id(&record.id),
        self.sync_note(state)
      );
    }
    Ok(())
  }

  async fn lookup(&self, code: &str) -> Result<()> {
    if normalize_access_code(code).is_none() {
      return Err(eyre!("Access code is empty"));
    }
    let listing = self.service.list_by_access_code(code).await?;
    self.note_source(&listing);
    print!("{}", board::render_status(&listing.records));
    Ok(())
  }

  async fn edit(&self, args: EditArgs) -> Result<()> {
    let mut record = self.resolve(&args.id).await?;

    if let Some(name) = args.name {
      record.client_name = name.trim().to_string();
    }
    if let Some(email) = args.email {
      record.client_email = email.trim().to_string();
    }
    if let Some(service) = args.service {
      record.service_type = service;
    }
    if let Some(description) = args.description {
      record.description = description;
    }
    if let Some(budget) = args.budget {
      record.budget = Some(budget).filter(|b| !b.trim().is_empty());
    }
    if let Some(code) = args.access_code {
      record.client_access_code = normalize_access_code(&code);
    }
    for tag in &args.tags {
      record.toggle_tag(tag);
    }

    if record.client_name.is_empty() || record.client_email.is_empty() {
      return Err(eyre!("Name and email cannot be empty"));
    }

    let state = self.service.update(&record).await?;
    println!("Updated request {}.{}", board::short_id(&record.id), self.sync_note(state));
    Ok(())
  }

  async fn set_status(&self, record: &ServiceRequest, status: RequestStatus) -> Result<()> {
    let state = self.service.update_status(&record.id, status).await?;
    println!(
      "Request {} from {} moved to {}.{}",
      board::short_id(&record.id),
      record.client_name,
      status,
      self.sync_note(state)
    );
    Ok(())
  }

  async fn import(&self, file: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(file)
      .map_err(|e| eyre!("Failed to read {}: {}", file.display(), e))?;
    let records = parse_export(&contents)?;
    let count = self.service.import(&records)?;
    println!("Imported {} request(s).", count);

    if self.remote_configured {
      let report = self.service.sync().await?;
      println!("Pushed {} to the remote, {} still pending.", report.pushed, report.failed);
    }
    Ok(())
  }

  async fn sync(&self, watch: bool) -> Result<()> {
    if !self.remote_configured {
      return Err(eyre!(
        "No remote configured. Add a `remote` section to the config or set INTAKE_REMOTE_URL."
      ));
    }

    if watch {
      let interval = Duration::from_secs(self.config.sync.interval_secs.max(1));
      println!("Syncing every {}s. Press Ctrl-C to stop.", interval.as_secs());
      let reconciler = Reconciler::new(self.service.clone(), interval);
      return reconciler
        .run(async {
          let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    }

    let report = self.service.sync().await?;
    if report.is_empty() {
      println!("Nothing to sync.");
      return Ok(());
    }
    println!(
      "Pushed {}, failed {}, dropped {}.",
      report.pushed, report.failed, report.dropped
    );
    match report.last_error {
      Some(e) if report.failed > 0 => Err(eyre!("Some writes are still pending: {}", e)),
      _ => Ok(()),
    }
  }

  async fn check(&self) -> Result<()> {
    let Some(remote) = &self.config.remote else {
      println!("No remote configured; requests are stored on this device only.");
      return Ok(());
    };

    match self.service.check_remote().await {
      Ok(()) => {
        println!("Remote table '{}' at {} is reachable.", remote.table, remote.url);
        Ok(())
      }
      Err(e @ RemoteError::TableMissing { .. }) => {
        println!("Table '{}' does not exist in the remote project.", remote.table);
        println!("Create it with these columns, then run `intake sync`:");
        for (column, kind) in TABLE_COLUMNS {
          println!("  {:<20} {}", column, kind);
        }
        Err(eyre!(e))
      }
      Err(e @ RemoteError::PermissionDenied(_)) => {
        println!("The remote rejected the API key for table '{}'.", remote.table);
        println!("Check INTAKE_REMOTE_KEY and the table's row level security policies.");
        Err(eyre!(e))
      }
      Err(e) => Err(eyre!("Remote check failed: {}", e)),
    }
  }

  async fn listing(&self) -> Result<Listing> {
    let listing = self.service.list().await?;
    self.note_source(&listing);
    Ok(listing)
  }

  /// Find a request by id or unique id prefix.
  async fn resolve(&self, id: &str) -> Result<ServiceRequest> {
    let id = id.trim();
    if id.is_empty() {
      return Err(eyre!("Request id is empty"));
    }

    let records = self.service.list().await?.records;
    let mut matches = records.into_iter().filter(|r| r.id.starts_with(id));
    match (matches.next(), matches.next()) {
      (Some(record), None) => Ok(record),
      (None, _) => Err(eyre!("No request with id {}", id)),
      (Some(_), Some(_)) => Err(eyre!("Id prefix {} matches more than one request", id)),
    }
  }

  fn note_source(&self, listing: &Listing) {
    if !self.remote_configured {
      return;
    }
    if let Some(e) = &listing.remote_error {
      if e.is_table_missing() {
        eprintln!("Remote table missing, showing local data. Run `intake check` for setup steps.");
      } else {
        eprintln!("Remote unavailable ({}), showing local data.", e);
      }
    }
  }

  fn sync_note(&self, state: SyncState) -> &'static str {
    match state {
      SyncState::Synced => "",
      _ if !self.remote_configured => "",
      SyncState::Queued => " Saved on this device; it will be sent once the remote is reachable.",
      SyncState::Unsynced => " The remote did not accept the change.",
    }
  }
}

fn at_edge(record: &ServiceRequest) -> color_eyre::Report {
  eyre!(
    "Request {} is already {}",
    board::short_id(&record.id),
    record.status
  )
}

const TABLE_COLUMNS: &[(&str, &str)] = &[
  ("id", "text primary key"),
  ("created_at", "bigint"),
  ("client_name", "text"),
  ("client_email", "text"),
  ("service_type", "text"),
  ("description", "text"),
  ("status", "text"),
  ("tags", "text[]"),
  ("budget", "text"),
  ("reference_file_name", "text"),
  ("client_access_code", "text"),
];

/// Parse an exported request list.
///
/// Accepts the bare JSON array written by `export`, or an object holding
/// the browser storage entry (whose value may itself be a JSON string).
/// Entries that don't parse are skipped.
fn parse_export(contents: &str) -> Result<Vec<ServiceRequest>> {
  let value: Value =
    serde_json::from_str(contents).map_err(|e| eyre!("Import file is not valid JSON: {}", e))?;

  let value = match value {
    Value::Object(mut map) => match map.remove(LEGACY_STORAGE_KEY) {
      Some(Value::String(inner)) => serde_json::from_str(&inner)
        .map_err(|e| eyre!("'{}' does not hold valid JSON: {}", LEGACY_STORAGE_KEY, e))?,
      Some(inner) => inner,
      None => return Err(eyre!("Import file has no '{}' entry", LEGACY_STORAGE_KEY)),
    },
    other => other,
  };

  let Value::Array(items) = value else {
    return Err(eyre!("Import file must hold a JSON array of requests"));
  };

  let total = items.len();
  let records: Vec<ServiceRequest> = items
    .into_iter()
    .filter_map(|item| match serde_json::from_value(item) {
      Ok(record) => Some(record),
      Err(e) => {
        warn!(error = %e, "Skipping unreadable request in import");
        None
      }
    })
    .collect();

  if records.len() < total {
    eprintln!("Skipped {} unreadable request(s).", total - records.len());
  }
  Ok(records)
}
