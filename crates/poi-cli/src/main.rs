//! `poi` — administrative command line for the POI catalogue.
//!
//! Reads `poi.toml` (or the path given with `--config`), opens the SQLite
//! store and runs one operation against it. Results are printed as JSON.
//!
//! ```sh
//! poi stage insert-poi '{"name": "Central Park", "tags": [{"tag_name": "park"}]}'
//! poi pending
//! poi apply 1
//! ```

mod config;

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use poi_core::{
  pending::apply_pending,
  poi::{PoiForm, TagRef},
  store::PoiStore,
};
use poi_store_sqlite::SqliteStore;
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "poi", author, version, about = "POI catalogue administration")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "poi.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Stage a change request without applying it.
  Stage {
    /// Event tag: add-new-tag, remove-tag, insert-poi or insert-history.
    event:     String,
    /// Payload; parsed as JSON when possible, otherwise taken as a string.
    data:      String,
    #[arg(long)]
    auth_code: Option<String>,
  },
  /// List staged change requests.
  Pending,
  /// Apply a staged change request and remove it from the log.
  Apply { id: i64 },
  /// Apply every staged change request in order, keeping the ones that fail.
  ApplyAll,
  /// Delete a staged change request without applying it.
  Discard { id: i64 },
  /// Insert or update a POI from a JSON form, applied immediately.
  Upsert { form: String },
  /// Search POIs by name or romanised initials.
  Search { keyword: String },
  /// Find POIs whose name matches exactly.
  ExactName { name: String },
  /// Show a POI with its parent, tags and recommendations.
  Show { id: i64 },
  /// List POIs carrying every given tag.
  Tagged {
    #[arg(required = true)]
    tags: Vec<String>,
  },
  /// List all tags.
  Tags,
  /// Create a tag.
  CreateTag { name: String },
  /// Delete a tag and detach it from every POI.
  DeleteTag { name: String },
  /// Replace the tag set of a POI.
  Retag { id: i64, tags: Vec<String> },
  /// Count POIs using a tag.
  TagUsage { name: String },
  /// List target audiences.
  Audiences,
  /// Add a target audience reference row.
  AddAudience { label: String },
  /// Depth of a POI in its parent chain.
  Level { id: i64 },
  /// List recorded tag usage history.
  History,
  /// Delete history older than the configured retention.
  PruneHistory,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?
    .with_max_depth(settings.max_depth)
    .with_span(tracing::info_span!("poi", store = %settings.store_path.display()));

  run(&store, &settings, cli.command).await
}

async fn run(store: &SqliteStore, settings: &Settings, command: Command) -> anyhow::Result<()> {
  match command {
    Command::Stage { event, data, auth_code } => {
      let payload = serde_json::from_str(&data).unwrap_or(serde_json::Value::String(data));
      let id = store
        .stage_update(&event, &payload, auth_code.as_deref())
        .await?;
      print_json(&serde_json::json!({ "id": id }))
    }
    Command::Pending => print_json(&store.list_pending_updates().await?),
    Command::Apply { id } => {
      let applied = apply_pending(store, id)
        .await
        .with_context(|| format!("pending update {id} was not applied"))?;
      tracing::info!(id, ?applied, "applied pending update");
      print_json(&serde_json::json!({ "id": id }))
    }
    Command::ApplyAll => {
      let mut failed = Vec::new();
      for update in store.list_pending_updates().await? {
        match apply_pending(store, update.id).await {
          Ok(applied) => tracing::info!(id = update.id, ?applied, "applied pending update"),
          Err(e) => {
            tracing::warn!(id = update.id, event = %update.event, error = %e, "pending update kept");
            failed.push(update.id);
          }
        }
      }
      print_json(&serde_json::json!({ "failed": failed }))
    }
    Command::Discard { id } => {
      let removed = store.discard_pending_update(id).await?;
      print_json(&serde_json::json!({ "id": id, "removed": removed }))
    }
    Command::Upsert { form } => {
      let form: PoiForm = serde_json::from_str(&form).context("invalid POI form")?;
      let id = store.upsert_poi(form).await?;
      print_json(&serde_json::json!({ "id": id }))
    }
    Command::Search { keyword } => print_json(&store.search_by_keyword(&keyword).await?),
    Command::ExactName { name } => print_json(&store.search_by_exact_name(&name).await?),
    Command::Show { id } => print_json(&store.get_by_id(id).await?),
    Command::Tagged { tags } => print_json(&store.find_by_tags(&tags).await?),
    Command::Tags => print_json(&store.list_tags().await?),
    Command::CreateTag { name } => print_json(&store.create_tag(&name).await?),
    Command::DeleteTag { name } => {
      let count = store.count_pois_for_tag(&name).await?;
      if count > 0 {
        tracing::warn!(tag = %name, count, "deleting a tag still in use");
      }
      store.delete_tag(&name).await?;
      print_json(&serde_json::json!({ "tag_name": name, "detached": count }))
    }
    Command::Retag { id, tags } => {
      let desired = tags.into_iter().map(TagRef::new).collect();
      print_json(&store.reconcile_tags(id, desired).await?)
    }
    Command::TagUsage { name } => {
      let count = store.count_pois_for_tag(&name).await?;
      print_json(&serde_json::json!({ "tag_name": name, "count": count }))
    }
    Command::Audiences => print_json(&store.list_target_audiences().await?),
    Command::AddAudience { label } => print_json(&store.add_target_audience(&label).await?),
    Command::Level { id } => {
      let level = store.compute_level(Some(id)).await?;
      print_json(&serde_json::json!({ "id": id, "level": level }))
    }
    Command::History => print_json(&store.fetch_history().await?),
    Command::PruneHistory => {
      let cutoff = Utc::now() - Duration::days(i64::from(settings.history_retention_days));
      let removed = store.prune_history(cutoff.timestamp()).await?;
      print_json(&serde_json::json!({ "cutoff": cutoff.timestamp(), "removed": removed }))
    }
  }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
