use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How often the stop-then-start fallback polls for the stopped state
pub const RESTART_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on how long the stop-then-start fallback waits for the stop
pub const RESTART_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Attributes used to register or identify a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub executable_path: String,
}

impl ServiceDescriptor {
    /// Descriptor that reuses `name` for the display name and description.
    pub fn named(name: &str, executable_path: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: name.to_string(),
            description: name.to_string(),
            executable_path: executable_path.to_string(),
        }
    }
}

/// Normalized service state across platforms.
///
/// `Unknown` means the state could not be determined; it is never used for
/// an OS-reported stopped service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Unknown,
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
    Failed,
}

impl ServiceStatus {
    /// True for states in which the service is not running and not transitioning
    pub fn is_stopped(self) -> bool {
        matches!(self, ServiceStatus::Stopped | ServiceStatus::Failed)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServiceStatus::Unknown => "unknown",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::StartPending => "start pending",
            ServiceStatus::StopPending => "stop pending",
            ServiceStatus::Running => "running",
            ServiceStatus::ContinuePending => "continue pending",
            ServiceStatus::PausePending => "pause pending",
            ServiceStatus::Paused => "paused",
            ServiceStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Operation attempted against the service manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Install,
    Uninstall,
    Start,
    Stop,
    Restart,
    Status,
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            ServiceAction::Install => "install",
            ServiceAction::Uninstall => "uninstall",
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
            ServiceAction::Status => "query",
        };
        f.write_str(verb)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// The OS service manager could not be reached
    ManagerUnavailable,
    /// No service is registered under the name
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Timeout,
    Other,
}

/// Failure reported by a platform service manager
#[derive(Debug, Clone, Error)]
#[error("failed to {action} service '{name}': {message}")]
pub struct ServiceError {
    pub action: ServiceAction,
    pub name: String,
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(
        action: ServiceAction,
        name: &str,
        kind: ServiceErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            action,
            name: name.to_string(),
            kind,
            message: message.into(),
        }
    }

    /// True when the failure happened while locating the service, before any query
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self.kind,
            ServiceErrorKind::ManagerUnavailable | ServiceErrorKind::NotFound
        )
    }

    /// Same failure, reported under a different action.
    pub fn during(mut self, action: ServiceAction) -> Self {
        self.action = action;
        self
    }
}

/// What a manager's `restart` actually guarantees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartSemantics {
    /// The manager restarts the service in a single primitive
    Atomic,
    /// Stop, wait for the stopped state, then start; another caller may
    /// observe or act on the service in between
    StopThenStart,
}

pub trait ServiceManager: Send + Sync {
    /// Register a service with the OS service manager
    fn install(&self, descriptor: &ServiceDescriptor) -> Result<(), ServiceError>;

    /// Remove the service registration
    fn uninstall(&self, name: &str) -> Result<(), ServiceError>;

    /// Start the service
    fn start(&self, name: &str) -> Result<(), ServiceError>;

    /// Stop the service
    fn stop(&self, name: &str) -> Result<(), ServiceError>;

    /// Query the current state of the service.
    ///
    /// Lookup failures are reported with a kind for which
    /// [`ServiceError::is_lookup_failure`] holds.
    fn query_status(&self, name: &str) -> Result<ServiceStatus, ServiceError>;

    /// Restart the service.
    ///
    /// The default is the non-atomic fallback: stop, wait for a stopped
    /// state, then start. Managers with their own restart primitive
    /// override this together with [`ServiceManager::restart_semantics`].
    fn restart(&self, name: &str) -> Result<(), ServiceError> {
        self.stop(name)
            .map_err(|e| e.during(ServiceAction::Restart))?;

        let deadline = Instant::now() + RESTART_STOP_TIMEOUT;
        loop {
            let status = self
                .query_status(name)
                .map_err(|e| e.during(ServiceAction::Restart))?;
            if status.is_stopped() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(ServiceError::new(
                    ServiceAction::Restart,
                    name,
                    ServiceErrorKind::Timeout,
                    format!(
                        "service still {} after {}s",
                        status,
                        RESTART_STOP_TIMEOUT.as_secs()
                    ),
                ));
            }
            std::thread::sleep(RESTART_POLL_INTERVAL);
        }

        self.start(name)
            .map_err(|e| e.during(ServiceAction::Restart))
    }

    fn restart_semantics(&self) -> RestartSemantics {
        RestartSemantics::StopThenStart
    }
}
