mod graph;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use recon_core::{AttributeValue, CancelFlag, Document, EntityId, NodeStatus};
use recon_store::{SqliteDocument, Workspace};

#[derive(Parser)]
#[command(name = "recon", about = "Reconcile graph outputs with document entities")]
struct Cli {
    /// Document to operate on
    #[arg(long, global = true, default_value = "default")]
    document: String,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a graph definition against the document
    Solve {
        /// Graph definition (.toml)
        graph: PathBuf,
    },

    /// List document entities
    List,

    /// Show tracked slot bindings
    Slots,

    /// Delete an entity, as a user would
    Delete {
        /// Entity id (`7` or `#7`)
        id: EntityId,
    },

    /// Set an attribute on an entity
    Set {
        id: EntityId,
        attribute: String,
        /// `true`/`false`, numbers and `#id` references are typed; anything else is text
        value: String,
    },

    /// Rename an entity
    Rename { id: EntityId, name: String },

    /// Release an entity from engine control
    Unpin { id: EntityId },
}

fn open_workspace() -> Result<Workspace> {
    let base_dir = std::env::var("RECON_DATA_DIR").ok().map(PathBuf::from);
    Workspace::open(base_dir.as_deref()).context("failed to open workspace")
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Solve { graph } => cmd_solve(&cli, graph),
        Commands::List => cmd_list(&cli),
        Commands::Slots => cmd_slots(&cli),
        Commands::Delete { id } => user_edit(&cli, "delete", |d| d.delete_entity(*id))
            .map(|()| println!("deleted {id}")),
        Commands::Set {
            id,
            attribute,
            value,
        } => {
            let value = AttributeValue::parse_loose(value);
            user_edit(&cli, "set attribute", |d| {
                d.set_attribute(*id, attribute, value.clone())
            })
            .map(|()| println!("{id}.{attribute} = {value}"))
        }
        Commands::Rename { id, name } => user_edit(&cli, "rename", |d| d.set_name(*id, name))
            .map(|()| println!("{id} renamed to {name}")),
        Commands::Unpin { id } => user_edit(&cli, "unpin", |d| d.set_pinned(*id, false))
            .map(|()| println!("unpinned {id}")),
    }
}

fn cmd_solve(cli: &Cli, path: &Path) -> Result<()> {
    let nodes = graph::load(path)?;
    let workspace = open_workspace()?;
    let mut session = workspace
        .open_session(&cli.document)
        .context("failed to open document")?;

    for node in &nodes {
        session.register(node.spec.clone());
    }
    session.poll_document();
    for id in session.drain_expired() {
        println!("expired: {id}");
    }

    let report = session.evaluate_pass(&nodes, &CancelFlag::new());
    // expiries caused by this pass's own writes are already satisfied
    session.drain_expired();
    workspace
        .save_session(&session)
        .context("failed to save bindings")?;

    for node in &report.nodes {
        if node.status == NodeStatus::Skipped {
            println!("{}: skipped", node.node);
            continue;
        }
        for (slot, output) in &node.outputs {
            match output {
                Some(id) => {
                    let name = session
                        .document()
                        .entity(*id)
                        .map(|r| r.name)
                        .unwrap_or_default();
                    println!("{}/{slot}: {id} {name:?}", node.node);
                }
                None => println!("{}/{slot}: -", node.node),
            }
        }
        for diagnostic in &node.diagnostics {
            println!("  {diagnostic}");
        }
    }

    let failed = report.failed().count();
    println!(
        "solved {} of {} nodes",
        report
            .nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Solved)
            .count(),
        report.nodes.len()
    );
    if failed > 0 {
        bail!("{failed} node(s) failed");
    }
    Ok(())
}

fn cmd_list(cli: &Cli) -> Result<()> {
    let document = open_workspace()?.open_document(&cli.document)?;
    let entities = document.entities().context("failed to list entities")?;
    if entities.is_empty() {
        println!("no entities");
        return Ok(());
    }
    for record in entities {
        let pinned = if record.pinned { "pinned" } else { "unpinned" };
        println!(
            "{:<6} {:<6} {:<24} {:<20} {pinned}",
            record.id.to_string(),
            record.kind.as_str(),
            record.name,
            record.type_name,
        );
        for (attribute, value) in &record.attributes {
            println!("         {attribute} = {value}");
        }
    }
    Ok(())
}

fn cmd_slots(cli: &Cli) -> Result<()> {
    let document = open_workspace()?.open_document(&cli.document)?;
    let identity = document.load_bindings().context("failed to load bindings")?;
    if identity.is_empty() {
        println!("no tracked slots");
        return Ok(());
    }
    for slot in identity.slots() {
        let state = if document.is_valid(slot.entity) {
            ""
        } else {
            " (deleted)"
        };
        println!("{}/{} -> {}{state}", slot.node, slot.slot, slot.entity);
    }
    Ok(())
}

/// Apply one edit in its own transaction, logged as a user change so the
/// next `solve` sees it.
fn user_edit(
    cli: &Cli,
    label: &str,
    f: impl FnOnce(&mut SqliteDocument) -> Result<(), recon_core::DocumentError>,
) -> Result<()> {
    let mut document = open_workspace()?.open_document(&cli.document)?;
    document.set_source("user");
    document
        .edit(&format!("user {label}"), f)
        .with_context(|| format!("{label} failed"))
}
