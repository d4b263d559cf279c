//! Command-line interface for depot.
//!
//! Provides commands for running reconciliation passes, inspecting catalog
//! status, and browsing the node tree and channel list.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::catalog::{AssessmentIndex, CatalogTree, ChannelStore, Database, FileRegistry};
use crate::config;
use crate::domain::{preset_label, ContentNode, ObjectId};
use crate::reconcile::Reconciler;
use crate::storage::BlobStore;

/// depot - offline content catalog with a deduplicated local file store
#[derive(Parser, Debug)]
#[command(name = "depot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile availability flags with disk contents and purge orphans
    Reconcile,

    /// Show catalog and storage counts
    Status,

    /// List root topics, or the children of a node
    Ls {
        /// Node ID (32 hex chars); lists forest roots if omitted
        node_id: Option<String>,
    },

    /// Show one node: path, files, assessment metadata
    Show {
        /// Node ID (32 hex chars)
        node_id: String,
    },

    /// List imported channels
    Channels,
}

impl Cli {
    pub fn execute(self) -> Result<()> {
        let cfg = config::config()?;
        let db = Database::open(&cfg.db_path()).context("Failed to open catalog database")?;
        let store = BlobStore::new(cfg.storage.clone());

        match self.command {
            Commands::Reconcile => reconcile(&db, &store),
            Commands::Status => status(&db, &store),
            Commands::Ls { node_id } => ls(&db, node_id.as_deref()),
            Commands::Show { node_id } => show(&db, &store, &node_id),
            Commands::Channels => channels(&db),
        }
    }
}

fn parse_id(s: &str) -> Result<ObjectId> {
    match ObjectId::parse(s) {
        Some(id) => Ok(id),
        None => bail!("not a valid node id (expected 32 hex chars): {s}"),
    }
}

fn reconcile(db: &Database, store: &BlobStore) -> Result<()> {
    let report = Reconciler::new(db, store).run()?;
    println!("{report}");
    for error in &report.errors {
        println!("  retry next pass: {error}");
    }
    Ok(())
}

fn status(db: &Database, store: &BlobStore) -> Result<()> {
    let count = |sql: &str| -> Result<i64> {
        Ok(db.conn().query_row(sql, [], |r| r.get(0))?)
    };

    let channels = count("SELECT COUNT(*) FROM channels")?;
    let nodes = count("SELECT COUNT(*) FROM content_nodes")?;
    let available_nodes = count("SELECT COUNT(*) FROM content_nodes WHERE available = 1")?;
    let files = count("SELECT COUNT(*) FROM files")?;
    let local_files = count("SELECT COUNT(*) FROM local_files")?;
    let available_local = count("SELECT COUNT(*) FROM local_files WHERE available = 1")?;
    let on_disk = store.list_present_hashes().count();

    println!("Channels:     {channels}");
    println!("Nodes:        {nodes} ({available_nodes} available)");
    println!("Files:        {files}");
    println!("Local files:  {local_files} ({available_local} available)");
    println!("Blobs:        {on_disk} on disk at {}", store.root().display());
    Ok(())
}

fn print_node_line(node: &ContentNode) {
    let marker = if node.available { "+" } else { "-" };
    println!("{marker} {} [{}] {}", node.id, node.kind, node.title);
}

fn ls(db: &Database, node_id: Option<&str>) -> Result<()> {
    let tree = CatalogTree::new(db);
    let nodes = match node_id {
        Some(raw) => tree.children(&parse_id(raw)?)?,
        None => tree.roots()?,
    };

    if nodes.is_empty() {
        println!("(empty)");
    }
    for node in &nodes {
        print_node_line(node);
    }
    Ok(())
}

fn show(db: &Database, store: &BlobStore, node_id: &str) -> Result<()> {
    let id = parse_id(node_id)?;
    let tree = CatalogTree::new(db);
    let registry = FileRegistry::new(db);
    let assessments = AssessmentIndex::new(db);

    let node = tree.node(&id)?;
    let path: Vec<String> = tree
        .ancestors(&id)?
        .into_iter()
        .map(|n| n.title)
        .collect();

    println!("{} [{}]", node.title, node.kind);
    println!("  id:        {}", node.id);
    println!("  channel:   {}", node.channel_id);
    println!("  path:      /{}", path.join("/"));
    println!("  available: {}", node.available);
    if let Some(description) = &node.description {
        println!("  about:     {description}");
    }

    for file in registry.files_for(&id)? {
        let local = registry.local_file(&file.local_file)?;
        let url = local
            .as_ref()
            .and_then(|l| store.storage_url(l))
            .unwrap_or_else(|| "unavailable".to_string());
        println!(
            "  file: {} ({}) -> {}",
            registry.download_filename(&file.id)?,
            preset_label(&file.preset),
            url
        );
    }

    if let Some(meta) = assessments.get(&id)? {
        println!(
            "  assessment: {} questions, randomize={}",
            meta.number_of_assessments, meta.randomize
        );
    }
    Ok(())
}

fn channels(db: &Database) -> Result<()> {
    let store = ChannelStore::new(db);
    for channel in store.channels()? {
        let updated = channel
            .last_updated
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{} v{} {} (updated {updated})",
            channel.id, channel.version, channel.name
        );
    }
    Ok(())
}
