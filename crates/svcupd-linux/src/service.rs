//! Linux systemd service management: install/uninstall/start/stop/restart/query units via systemctl.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, info, warn};

use svcupd_platform::service::{
    RestartSemantics, ServiceAction, ServiceDescriptor, ServiceError, ServiceErrorKind,
    ServiceManager, ServiceStatus,
};

pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

const SYSTEMCTL: &str = "systemctl";

pub struct SystemdServiceManager {
    /// Directory unit files are written to
    unit_dir: PathBuf,
    /// Whether install/uninstall require an effective uid of root
    require_root: bool,
    /// Program invoked for every systemctl call
    systemctl: PathBuf,
}

impl SystemdServiceManager {
    pub fn new() -> Self {
        Self {
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
            require_root: true,
            systemctl: PathBuf::from(SYSTEMCTL),
        }
    }

    /// Manager writing unit files to `unit_dir` instead of the system unit directory.
    pub fn with_unit_dir(unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            unit_dir: unit_dir.into(),
            require_root: false,
            systemctl: PathBuf::from(SYSTEMCTL),
        }
    }

    /// Use `program` in place of `systemctl` on the PATH.
    pub fn with_systemctl(mut self, program: impl Into<PathBuf>) -> Self {
        self.systemctl = program.into();
        self
    }

    fn unit_path(&self, name: &str) -> PathBuf {
        self.unit_dir.join(unit_name(name))
    }

    fn ensure_root(&self, action: ServiceAction, name: &str) -> Result<(), ServiceError> {
        if self.require_root && !nix::unistd::Uid::effective().is_root() {
            return Err(ServiceError::new(
                action,
                name,
                ServiceErrorKind::PermissionDenied,
                format!("writing to {} requires root", self.unit_dir.display()),
            ));
        }
        Ok(())
    }

    /// Run systemctl and return its output regardless of exit status.
    fn systemctl(
        &self,
        action: ServiceAction,
        name: &str,
        args: &[&str],
    ) -> Result<Output, ServiceError> {
        debug!("running {} {}", self.systemctl.display(), args.join(" "));
        Command::new(&self.systemctl).args(args).output().map_err(|e| {
            ServiceError::new(
                action,
                name,
                ServiceErrorKind::ManagerUnavailable,
                format!("failed to run {}: {}", self.systemctl.display(), e),
            )
        })
    }

    /// Run systemctl and fail on a non-zero exit status.
    fn run(&self, action: ServiceAction, name: &str, args: &[&str]) -> Result<(), ServiceError> {
        let output = self.systemctl(action, name, args)?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ServiceError::new(
            action,
            name,
            classify_stderr(&stderr),
            format!("systemctl {} failed: {}", args[0], stderr.trim()),
        ))
    }

    /// Make systemd pick up a freshly written unit and enable it.
    fn register(&self, name: &str) -> Result<(), ServiceError> {
        self.run(ServiceAction::Install, name, &["daemon-reload"])?;
        self.run(ServiceAction::Install, name, &["enable", &unit_name(name)])
    }
}

impl Default for SystemdServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager for SystemdServiceManager {
    fn install(&self, descriptor: &ServiceDescriptor) -> Result<(), ServiceError> {
        let name = descriptor.name.as_str();
        info!("installing systemd service: {}", name);

        validate_descriptor(descriptor)?;
        self.ensure_root(ServiceAction::Install, name)?;

        let unit_path = self.unit_path(name);
        if unit_path.exists() {
            return Err(ServiceError::new(
                ServiceAction::Install,
                name,
                ServiceErrorKind::AlreadyExists,
                format!("{} already exists", unit_path.display()),
            ));
        }

        std::fs::write(&unit_path, generate_unit_file(descriptor))
            .map_err(|e| io_error(ServiceAction::Install, name, &unit_path, e))?;

        if let Err(e) = self.register(name) {
            // A failed install leaves no unit behind
            if let Err(remove_err) = std::fs::remove_file(&unit_path) {
                warn!(
                    "failed to remove {} after install failure: {}",
                    unit_path.display(),
                    remove_err
                );
            }
            return Err(e);
        }

        info!("service installed and enabled: {}", name);
        Ok(())
    }

    fn uninstall(&self, name: &str) -> Result<(), ServiceError> {
        info!("uninstalling systemd service: {}", name);
        validate_unit_name(ServiceAction::Uninstall, name)?;
        self.ensure_root(ServiceAction::Uninstall, name)?;

        let unit_path = self.unit_path(name);
        if !unit_path.exists() {
            return Err(ServiceError::new(
                ServiceAction::Uninstall,
                name,
                ServiceErrorKind::NotFound,
                format!("{} does not exist", unit_path.display()),
            ));
        }

        let unit = unit_name(name);
        if let Err(e) = self.run(ServiceAction::Uninstall, name, &["stop", &unit]) {
            warn!("{}", e);
        }
        if let Err(e) = self.run(ServiceAction::Uninstall, name, &["disable", &unit]) {
            warn!("{}", e);
        }

        std::fs::remove_file(&unit_path)
            .map_err(|e| io_error(ServiceAction::Uninstall, name, &unit_path, e))?;

        self.run(ServiceAction::Uninstall, name, &["daemon-reload"])?;

        info!("service uninstalled: {}", name);
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), ServiceError> {
        info!("starting service: {}", name);
        validate_unit_name(ServiceAction::Start, name)?;
        self.run(ServiceAction::Start, name, &["start", &unit_name(name)])
    }

    fn stop(&self, name: &str) -> Result<(), ServiceError> {
        info!("stopping service: {}", name);
        validate_unit_name(ServiceAction::Stop, name)?;
        self.run(ServiceAction::Stop, name, &["stop", &unit_name(name)])
    }

    fn restart(&self, name: &str) -> Result<(), ServiceError> {
        info!("restarting service: {}", name);
        validate_unit_name(ServiceAction::Restart, name)?;
        self.run(ServiceAction::Restart, name, &["restart", &unit_name(name)])
    }

    fn query_status(&self, name: &str) -> Result<ServiceStatus, ServiceError> {
        validate_unit_name(ServiceAction::Status, name)?;
        let unit = unit_name(name);
        let output = self.systemctl(
            ServiceAction::Status,
            name,
            &["show", &unit, "--property=LoadState,ActiveState"],
        )?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ServiceError::new(
                ServiceAction::Status,
                name,
                classify_stderr(&stderr),
                format!("systemctl show failed: {}", stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let props = parse_show_output(&stdout);

        if props.load_state.as_deref() == Some("not-found") {
            return Err(ServiceError::new(
                ServiceAction::Status,
                name,
                ServiceErrorKind::NotFound,
                format!("unit {} not found", unit),
            ));
        }

        match props.active_state {
            Some(state) => Ok(map_active_state(&state)),
            None => Err(ServiceError::new(
                ServiceAction::Status,
                name,
                ServiceErrorKind::Other,
                "systemctl show did not report ActiveState",
            )),
        }
    }

    fn restart_semantics(&self) -> RestartSemantics {
        RestartSemantics::Atomic
    }
}

/// Properties read from `systemctl show`
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UnitProperties {
    pub load_state: Option<String>,
    pub active_state: Option<String>,
}

pub fn parse_show_output(output: &str) -> UnitProperties {
    let mut props = UnitProperties::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "LoadState" => props.load_state = Some(value),
            "ActiveState" => props.active_state = Some(value),
            _ => {}
        }
    }
    props
}

pub fn map_active_state(state: &str) -> ServiceStatus {
    match state {
        "active" | "reloading" => ServiceStatus::Running,
        "inactive" => ServiceStatus::Stopped,
        "activating" => ServiceStatus::StartPending,
        "deactivating" => ServiceStatus::StopPending,
        "failed" => ServiceStatus::Failed,
        _ => ServiceStatus::Unknown,
    }
}

/// Map systemctl's stderr onto an error kind.
pub fn classify_stderr(stderr: &str) -> ServiceErrorKind {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("access denied")
        || lower.contains("authentication required")
        || lower.contains("permission denied")
    {
        ServiceErrorKind::PermissionDenied
    } else if lower.contains("failed to connect to bus")
        || lower.contains("has not been booted with systemd")
    {
        ServiceErrorKind::ManagerUnavailable
    } else if lower.contains("not found")
        || lower.contains("not loaded")
        || lower.contains("does not exist")
    {
        ServiceErrorKind::NotFound
    } else {
        ServiceErrorKind::Other
    }
}

pub fn unit_name(name: &str) -> String {
    if name.ends_with(".service") {
        name.to_string()
    } else {
        format!("{}.service", name)
    }
}

pub fn generate_unit_file(descriptor: &ServiceDescriptor) -> String {
    let exec = if descriptor.executable_path.contains(char::is_whitespace) {
        format!("\"{}\"", descriptor.executable_path)
    } else {
        descriptor.executable_path.clone()
    };
    format!(
        r#"[Unit]
Description={description}
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart={exec}
Restart=always
RestartSec=10

[Install]
WantedBy=multi-user.target
"#,
        description = descriptor.description,
        exec = exec,
    )
}

// Unit names and paths end up inside a unit file; reject anything that could
// break out of a line or the unit namespace.
fn validate_descriptor(descriptor: &ServiceDescriptor) -> Result<(), ServiceError> {
    let name = descriptor.name.as_str();
    validate_unit_name(ServiceAction::Install, name)?;
    let fields = [
        &descriptor.display_name,
        &descriptor.description,
        &descriptor.executable_path,
    ];
    if fields
        .iter()
        .any(|f| f.contains(|c: char| matches!(c, '\n' | '\r' | '"')))
    {
        return Err(ServiceError::new(
            ServiceAction::Install,
            name,
            ServiceErrorKind::Other,
            "descriptor contains line breaks or quotes",
        ));
    }
    Ok(())
}

/// Names are passed to systemctl as arguments and joined onto the unit
/// directory. A leading `-` would be parsed as an option.
///
/// Installing under such a name is invalid input (`Other`); any other action
/// reports `NotFound`, since no unit can carry that name.
fn validate_unit_name(action: ServiceAction, name: &str) -> Result<(), ServiceError> {
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '.' | '@' | '-'))
        && !name.contains("..");
    if valid {
        return Ok(());
    }
    let kind = match action {
        ServiceAction::Install => ServiceErrorKind::Other,
        _ => ServiceErrorKind::NotFound,
    };
    Err(ServiceError::new(
        action,
        name,
        kind,
        "unit name contains invalid characters",
    ))
}

fn io_error(action: ServiceAction, name: &str, path: &Path, e: std::io::Error) -> ServiceError {
    let kind = match e.kind() {
        std::io::ErrorKind::PermissionDenied => ServiceErrorKind::PermissionDenied,
        std::io::ErrorKind::NotFound => ServiceErrorKind::NotFound,
        _ => ServiceErrorKind::Other,
    };
    ServiceError::new(action, name, kind, format!("{}: {}", path.display(), e))
}
