use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use svcupd_core::config::ManagerConfig;
use svcupd_core::{login, version, SvcUpdMgr};
use svcupd_platform::service::ServiceManager;

#[derive(Parser, Debug)]
#[command(name = "svcupdmgr")]
#[command(about = "Manage an OS service locally or through the remote update agent")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(long, env = "SVCUPD_CONFIG_PATH", global = true)]
    config_path: Option<String>,

    /// Port of the remote update agent (overrides the config file)
    #[arg(long, env = "SVCUPD_REMOTE_PORT", global = true)]
    remote_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "SVCUPD_LOG_LEVEL", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a service with the OS service manager
    Install {
        /// Service name, also used as display name and description
        #[arg(long)]
        name: String,
        /// Path to the service binary
        #[arg(long)]
        exe: String,
    },
    /// Remove a service registration
    Uninstall { name: String },
    /// Start a service
    Start { name: String },
    /// Stop a service
    Stop { name: String },
    /// Restart a service
    Restart { name: String },
    /// Show the current state of a service
    Status { name: String },
    /// Forward an operation to the remote update agent
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
    /// Print a QR login page as JSON
    LoginPage {
        #[arg(long)]
        app_id: String,
        #[arg(long)]
        redirect_uri: String,
        /// Opaque state; generated when omitted
        #[arg(long, default_value = "")]
        state: String,
    },
    /// Print the version declared in an application source tree
    Version {
        /// Application root directory
        #[arg(long)]
        root: String,
    },
}

#[derive(Subcommand, Debug)]
enum RemoteCommands {
    /// Query the agent
    Info,
    /// Restart a service through the agent
    Restart { name: String },
    /// Update a service through the agent
    Update {
        name: String,
        /// Installation path of the service
        #[arg(long)]
        path: String,
        /// Update archive name
        #[arg(long)]
        update_file: String,
        /// Directory holding the update archive
        #[arg(long)]
        update_folder: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config_path
        .map(std::path::PathBuf::from)
        .unwrap_or_else(ManagerConfig::default_path);

    let mut config = ManagerConfig::load_or_default(&config_path)?;

    // CLI args override config file
    if let Some(port) = cli.remote_port {
        config.remote.port = port;
    }

    let manager = create_platform_service_manager();
    let mgr = SvcUpdMgr::from_config(manager, &config)
        .context("failed to set up service manager")?;

    run_command(&mgr, &config, cli.command).await
}

async fn run_command(mgr: &SvcUpdMgr, config: &ManagerConfig, command: Commands) -> Result<()> {
    match command {
        Commands::Install { name, exe } => {
            mgr.install(&name, &exe)?;
            info!("service {} installed", name);
        }
        Commands::Uninstall { name } => {
            mgr.uninstall(&name)?;
            info!("service {} uninstalled", name);
        }
        Commands::Start { name } => {
            mgr.start(&name)?;
            info!("service {} started", name);
        }
        Commands::Stop { name } => {
            mgr.stop(&name)?;
            info!("service {} stopped", name);
        }
        Commands::Restart { name } => {
            mgr.restart(&name)?;
            info!("service {} restarted", name);
        }
        Commands::Status { name } => {
            let report = mgr.status(&name);
            println!("{}: {}", name, report.status());
            if report.is_lookup_failure() {
                warn!("service {} could not be located", name);
            }
            report.into_result()?;
        }
        Commands::Remote { command } => run_remote_command(mgr, command).await?,
        Commands::LoginPage {
            app_id,
            redirect_uri,
            state,
        } => {
            let page = login::get_login_page(&config.login, &app_id, &redirect_uri, &state)?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Commands::Version { root } => {
            let root = std::path::Path::new(&root);
            let declared = version::get_version_from(root, &config.version_file)?;
            println!("{}", declared);
        }
    }
    Ok(())
}

async fn run_remote_command(mgr: &SvcUpdMgr, command: RemoteCommands) -> Result<()> {
    match command {
        RemoteCommands::Info => {
            let result = mgr.remote_info().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        RemoteCommands::Restart { name } => {
            mgr.remote_restart(&name).await?;
            info!("remote agent restarted {}", name);
        }
        RemoteCommands::Update {
            name,
            path,
            update_file,
            update_folder,
        } => {
            mgr.remote_update(&name, &path, &update_file, &update_folder).await?;
            info!("remote agent updated {}", name);
        }
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn create_platform_service_manager() -> Box<dyn ServiceManager> {
    Box::new(svcupd_linux::service::SystemdServiceManager::new())
}

#[cfg(target_os = "windows")]
fn create_platform_service_manager() -> Box<dyn ServiceManager> {
    Box::new(svcupd_windows::service::WindowsServiceManager::new())
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
fn create_platform_service_manager() -> Box<dyn ServiceManager> {
    Box::new(unsupported::UnsupportedServiceManager)
}

/// Stand-in on platforms without a service manager implementation, so the
/// remote surface keeps working.
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
mod unsupported {
    use svcupd_platform::service::{
        ServiceAction, ServiceDescriptor, ServiceError, ServiceErrorKind, ServiceManager,
        ServiceStatus,
    };

    pub struct UnsupportedServiceManager;

    fn unsupported(action: ServiceAction, name: &str) -> ServiceError {
        ServiceError::new(
            action,
            name,
            ServiceErrorKind::ManagerUnavailable,
            format!("not supported on {}", std::env::consts::OS),
        )
    }

    impl ServiceManager for UnsupportedServiceManager {
        fn install(&self, descriptor: &ServiceDescriptor) -> Result<(), ServiceError> {
            Err(unsupported(ServiceAction::Install, &descriptor.name))
        }

        fn uninstall(&self, name: &str) -> Result<(), ServiceError> {
            Err(unsupported(ServiceAction::Uninstall, name))
        }

        fn start(&self, name: &str) -> Result<(), ServiceError> {
            Err(unsupported(ServiceAction::Start, name))
        }

        fn stop(&self, name: &str) -> Result<(), ServiceError> {
            Err(unsupported(ServiceAction::Stop, name))
        }

        fn restart(&self, name: &str) -> Result<(), ServiceError> {
            Err(unsupported(ServiceAction::Restart, name))
        }

        fn query_status(&self, name: &str) -> Result<ServiceStatus, ServiceError> {
            Err(unsupported(ServiceAction::Status, name))
        }
    }
}
