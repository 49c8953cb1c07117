//! kube-deploy CLI - versioned deployments for Kubernetes namespaces

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use kube_deploy::commands::deploy::DeployArgs;
use kube_deploy::commands::logs::LogsArgs;
use kube_deploy::config::{Annotation, Settings, VersionMode};
use kube_deploy::utils::{display_error_and_exit, enhance_error};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kube-deploy")]
#[command(author, version, about = "Versioned deployments of Kubernetes manifests", long_about = None)]
struct Cli {
    /// Verbose output (can be used multiple times: -v, -vv, -vvv)
    /// -v: INFO, -vv: DEBUG, -vvv: TRACE
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Dry-run mode: show what would be done without making changes
    #[arg(long, global = true)]
    dry_run: bool,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to kubeconfig file (default: KUBECONFIG, then ~/.kube/config)
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply manifests as one release of an application
    Deploy {
        /// Manifest files (multi-document YAML)
        #[arg(required = true)]
        manifests: Vec<PathBuf>,

        /// Application name, matched against the `app` label
        #[arg(short, long)]
        app_name: String,

        /// Ignore version labels in the manifests
        #[arg(long, conflicts_with = "set_version")]
        no_version: bool,

        /// Stamp this version on every manifest
        #[arg(long, value_name = "VERSION")]
        set_version: Option<String>,

        /// Replace versioned objects that already exist
        #[arg(long)]
        overwrite: bool,

        /// Replica count for Deployments
        #[arg(long, default_value_t = 1)]
        replicas: u32,

        /// Delete objects of the application with a different version
        #[arg(long)]
        delete_old_versions: bool,

        /// Annotation to add to every object (KEY=VALUE, repeatable)
        #[arg(short = 'A', long = "set-annotation", value_name = "KEY=VALUE")]
        annotations: Vec<Annotation>,

        /// Target namespace
        #[arg(short, long, env = "KUBE_DEPLOY_NAMESPACE")]
        namespace: Option<String>,

        /// Wait for Deployments and Pods, optionally with a timeout in seconds
        #[arg(long, value_name = "SECONDS", num_args = 0..=1)]
        wait: Option<Option<u64>>,

        /// Do not wait for Deployments and Pods
        #[arg(long, conflicts_with = "wait")]
        no_wait: bool,
    },

    /// List the resource kinds kube-deploy can address
    ApiResources {
        /// Query the cluster's discovery endpoints instead of the built-in table
        #[arg(long)]
        refresh: bool,
    },

    /// Print the log of a pod container
    Logs {
        /// Pod name
        pod: String,

        /// Container name
        #[arg(short, long)]
        container: Option<String>,

        /// Number of lines from the end of the log
        #[arg(long)]
        tail: Option<u32>,

        /// Namespace of the pod
        #[arg(short, long, env = "KUBE_DEPLOY_NAMESPACE")]
        namespace: Option<String>,
    },

    /// Print an example configuration file
    Config,

    /// Generate shell completion scripts
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        display_error_and_exit(enhance_error(err));
    }
}

/// Set up tracing on stderr; RUST_LOG wins over the -v level
fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "warn",  // Default: only warnings and errors
        1 => "info",  // -v: info level
        2 => "debug", // -vv: debug level
        _ => "trace", // -vvv: trace level
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kube_deploy={}", log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Deploy {
            manifests,
            app_name,
            no_version,
            set_version,
            overwrite,
            replicas,
            delete_old_versions,
            annotations,
            namespace,
            wait,
            no_wait,
        } => {
            let version = match (no_version, set_version) {
                (true, _) => VersionMode::Disabled,
                (false, Some(version)) => VersionMode::Set(version),
                (false, None) => VersionMode::FromManifest,
            };
            let wait = match (no_wait, wait) {
                (true, _) => Some(None),
                (false, Some(Some(secs))) => Some(Some(secs)),
                (false, _) => None,
            };
            handle_deploy_command(DeployArgs {
                manifests,
                kubeconfig: cli.kubeconfig,
                namespace,
                app_name,
                version,
                overwrite,
                replicas,
                delete_old_versions,
                annotations,
                wait,
                dry_run: cli.dry_run,
                quiet: cli.quiet,
            })
        }
        Commands::ApiResources { refresh } => {
            handle_api_resources_command(cli.kubeconfig, refresh)
        }
        Commands::Logs {
            pod,
            container,
            tail,
            namespace,
        } => handle_logs_command(LogsArgs {
            pod: &pod,
            container: container.as_deref(),
            tail,
            namespace: namespace.as_deref(),
            kubeconfig: cli.kubeconfig.as_deref(),
        }),
        Commands::Config => handle_config_command(),
        Commands::Completion { shell } => handle_completion_command(shell),
        Commands::Version => handle_version_command(),
    }
}

fn handle_deploy_command(args: DeployArgs) -> Result<()> {
    let settings = Settings::load();
    kube_deploy::commands::deploy::deploy(args, &settings)
}

fn handle_api_resources_command(kubeconfig: Option<PathBuf>, refresh: bool) -> Result<()> {
    let settings = Settings::load();
    kube_deploy::commands::api_resources::list(kubeconfig.as_deref(), refresh, &settings)
}

fn handle_logs_command(args: LogsArgs<'_>) -> Result<()> {
    let settings = Settings::load();
    kube_deploy::commands::logs::show(args, &settings)
}

fn handle_config_command() -> Result<()> {
    print!("{}", Settings::example_config());
    Ok(())
}

fn handle_completion_command(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "kube-deploy", &mut io::stdout());
    Ok(())
}

fn handle_version_command() -> Result<()> {
    println!("kube-deploy {}", env!("CARGO_PKG_VERSION"));
    println!("Versioned deployments of Kubernetes manifests");
    Ok(())
}
