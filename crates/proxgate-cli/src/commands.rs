use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::display::{BackupRow, NodeRow, ResourceRow, TaskRow, ToolRow};
use crate::logging::{self, LogFormat};
use crate::output::{self, OutputFormat};
use crate::server;
use crate::tools;
use crate::ui;

use proxgate_core::aggregate::NODE_LISTING_KEY;
use proxgate_core::config::{ConfigOverrides, ConnectMode, GatewayConfig};
use proxgate_core::resource::ResourceKind;
use proxgate_runtime::Gateway;
use proxgate_runtime::tasks::TaskTracker;

#[derive(Parser)]
#[command(
    name = "proxgate",
    version,
    about = "Safety-gated lifecycle and observability gateway for Proxmox VE clusters"
)]
struct Cli {
    /// Output format: table, json, yaml
    #[arg(long, short = 'o', global = true, default_value = "table")]
    output: String,

    /// Gateway config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cluster host, optionally host:port (overrides PROXMOX_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Cluster user, e.g. root@pam (overrides PROXMOX_USER)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    insecure: bool,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Permit snapshot delete/rollback and restore (overrides PROXMOX_DANGEROUS_MODE)
    #[arg(long, global = true)]
    dangerous_mode: bool,

    /// Start even if the cluster is unreachable; calls fail individually
    #[arg(long, global = true)]
    degraded: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve tool calls as newline-delimited JSON on stdin/stdout
    Serve,
    /// Invoke one tool and print its result
    Call {
        /// Tool name, e.g. start_vm or list_backups
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// List available tools and their parameters
    Tools,
    /// List cluster nodes
    Nodes,
    /// List VMs or containers across all online nodes
    Resources {
        /// vm or container
        #[arg(long, default_value = "vm")]
        kind: String,
    },
    /// List backup archives on a node
    Backups {
        /// Node name
        node: String,
        /// Only this storage
        #[arg(long)]
        storage: Option<String>,
        /// Only backups of this resource id
        #[arg(long)]
        vmid: Option<u32>,
    },
    /// Show the current status of a task
    Task {
        /// Task UPID
        upid: String,
        /// Node running the task (default: taken from the UPID)
        #[arg(long)]
        node: Option<String>,
        /// Print the task log instead of its status
        #[arg(long)]
        log: bool,
    },
}

// ============================================================================
// Command dispatch
// ============================================================================

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // JSON logs for the tool server, human-readable otherwise. Both go to stderr.
    let log_format = match cli.command {
        Commands::Serve => LogFormat::Json,
        _ => LogFormat::Human,
    };
    logging::init(log_format);

    let out_fmt = OutputFormat::from_str_arg(&cli.output);

    // Needs no cluster.
    if let Commands::Tools = cli.command {
        return cmd_tools(out_fmt);
    }

    let config = load_config(&cli)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .with_context(|| "Failed to create tokio runtime")?;

    runtime.block_on(async move {
        let gateway = Gateway::connect(&config)
            .await
            .with_context(|| "Cluster connectivity check failed")?;

        match cli.command {
            Commands::Serve => server::serve(gateway).await,
            Commands::Call { tool, args } => cmd_call(&gateway, &tool, &args, out_fmt).await,
            Commands::Nodes => cmd_nodes(&gateway, out_fmt).await,
            Commands::Resources { kind } => cmd_resources(&gateway, &kind, out_fmt).await,
            Commands::Backups {
                node,
                storage,
                vmid,
            } => cmd_backups(&gateway, &node, storage.as_deref(), vmid, out_fmt).await,
            Commands::Task { upid, node, log } => {
                cmd_task(&gateway, &upid, node.as_deref(), log, out_fmt).await
            }
            Commands::Tools => cmd_tools(out_fmt),
        }
    })
}

fn load_config(cli: &Cli) -> Result<GatewayConfig> {
    let overrides = ConfigOverrides {
        host: cli.host.clone(),
        port: None,
        user: cli.user.clone(),
        insecure: cli.insecure,
        timeout_secs: cli.timeout,
        // Absent flag leaves the environment in charge.
        dangerous_mode: cli.dangerous_mode.then_some(true),
        connect_mode: cli.degraded.then_some(ConnectMode::Degraded),
    };
    GatewayConfig::load(cli.config.as_deref(), &overrides)
}

// ============================================================================
// Handlers
// ============================================================================

fn cmd_tools(out_fmt: OutputFormat) -> Result<()> {
    let catalog = tools::catalog();
    match out_fmt {
        OutputFormat::Table => {
            let rows: Vec<ToolRow> = catalog.iter().map(ToolRow::from).collect();
            output::render_list(&rows, out_fmt);
        }
        _ => output::render_value(&catalog, out_fmt),
    }
    Ok(())
}

async fn cmd_call(gateway: &Gateway, tool: &str, args: &str, out_fmt: OutputFormat) -> Result<()> {
    let arguments: serde_json::Value =
        serde_json::from_str(args).with_context(|| format!("Invalid --args JSON: {}", args))?;

    match tools::invoke(gateway, tool, arguments).await {
        Ok(result) => {
            output::render_value(&result, out_fmt);
            Ok(())
        }
        Err(e) => {
            ui::error(&format!("{} ({})", e, e.code()));
            anyhow::bail!("Tool '{}' failed", tool)
        }
    }
}

async fn cmd_nodes(gateway: &Gateway, out_fmt: OutputFormat) -> Result<()> {
    let nodes = gateway.nodes().await?;
    let rows: Vec<NodeRow> = nodes.iter().map(NodeRow::from).collect();
    output::render_list(&rows, out_fmt);
    Ok(())
}

async fn cmd_resources(gateway: &Gateway, kind: &str, out_fmt: OutputFormat) -> Result<()> {
    let kind: ResourceKind = kind.parse()?;
    let result = gateway.list_resources(kind).await;

    if out_fmt != OutputFormat::Table {
        output::render_value(&result, out_fmt);
        return Ok(());
    }
    let rows: Vec<ResourceRow> = result.items.iter().map(ResourceRow::from).collect();
    output::render_list(&rows, out_fmt);
    for (node, reason) in &result.errors {
        if node == NODE_LISTING_KEY {
            ui::warn(&format!("Could not list cluster nodes: {}", reason));
        } else {
            ui::warn(&format!("Node {} did not answer: {}", node, reason));
        }
    }
    Ok(())
}

async fn cmd_backups(
    gateway: &Gateway,
    node: &str,
    storage: Option<&str>,
    vmid: Option<u32>,
    out_fmt: OutputFormat,
) -> Result<()> {
    let listing = gateway.list_backups(node, storage, vmid).await?;

    if out_fmt != OutputFormat::Table {
        output::render_value(&listing, out_fmt);
        return Ok(());
    }
    let rows: Vec<BackupRow> = listing.backups.iter().map(BackupRow::from).collect();
    output::render_list(&rows, out_fmt);
    for (storage, reason) in &listing.errors {
        ui::warn(&format!("Storage {} unreadable: {}", storage, reason));
    }
    Ok(())
}

async fn cmd_task(
    gateway: &Gateway,
    upid: &str,
    node: Option<&str>,
    log: bool,
    out_fmt: OutputFormat,
) -> Result<()> {
    let handle = TaskTracker::handle(upid, node)?;

    if log {
        let lines = gateway.task_log(&handle, None, None).await?;
        if out_fmt == OutputFormat::Table {
            for line in &lines {
                println!("{}", line.text);
            }
        } else {
            output::render_value(&lines, out_fmt);
        }
        return Ok(());
    }

    let status = gateway.task_status(&handle).await?;
    output::render_list(&[TaskRow::from(&status)], out_fmt);
    if status.is_running() {
        ui::info("Task still running; re-run to refresh.");
    }
    Ok(())
}
