//! Local service lifecycle on top of the platform service manager.

use tracing::{info, warn};

use svcupd_platform::service::{
    RestartSemantics, ServiceAction, ServiceDescriptor, ServiceError, ServiceErrorKind,
    ServiceManager, ServiceStatus,
};

use crate::error::{Error, Result};

/// Outcome of a status query.
///
/// Always carries a status to display. When `error` is set the status is
/// [`ServiceStatus::Unknown`].
#[derive(Debug)]
pub struct StatusReport {
    status: ServiceStatus,
    error: Option<ServiceError>,
}

impl StatusReport {
    fn observed(status: ServiceStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    fn unobserved(error: ServiceError) -> Self {
        Self {
            status: ServiceStatus::Unknown,
            error: Some(error),
        }
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    pub fn error(&self) -> Option<&ServiceError> {
        self.error.as_ref()
    }

    /// The service could not be located at all (unknown name or manager unreachable),
    /// as opposed to a located service whose query failed.
    pub fn is_lookup_failure(&self) -> bool {
        self.error.as_ref().is_some_and(ServiceError::is_lookup_failure)
    }

    pub fn into_result(self) -> Result<ServiceStatus> {
        match self.error {
            Some(e) => Err(e.into()),
            None => Ok(self.status),
        }
    }
}

pub struct ServiceController {
    manager: Box<dyn ServiceManager>,
}

impl ServiceController {
    pub fn new(manager: Box<dyn ServiceManager>) -> Self {
        Self { manager }
    }

    /// Register `name` with the OS, running `executable_path`.
    ///
    /// The name doubles as display name and description.
    pub fn install(&self, name: &str, executable_path: &str) -> Result<()> {
        let name = required("service name", name)?;
        let executable_path = required("executable path", executable_path)?;

        let descriptor = ServiceDescriptor::named(name, executable_path);
        self.manager.install(&descriptor)?;
        info!("installed service {} ({})", name, executable_path);
        Ok(())
    }

    pub fn uninstall(&self, name: &str) -> Result<()> {
        let name = required("service name", name)?;
        self.manager.uninstall(name)?;
        Ok(())
    }

    pub fn start(&self, name: &str) -> Result<()> {
        let name = required("service name", name)?;
        self.manager.start(name)?;
        Ok(())
    }

    pub fn stop(&self, name: &str) -> Result<()> {
        let name = required("service name", name)?;
        self.manager.stop(name)?;
        Ok(())
    }

    /// Restart through the manager's own restart, which may be stop-then-start.
    pub fn restart(&self, name: &str) -> Result<()> {
        let name = required("service name", name)?;
        if self.manager.restart_semantics() == RestartSemantics::StopThenStart {
            info!("restarting {} as stop then start; not atomic", name);
        }
        self.manager.restart(name)?;
        Ok(())
    }

    pub fn restart_semantics(&self) -> RestartSemantics {
        self.manager.restart_semantics()
    }

    /// Query the service state. Never fails outright; see [`StatusReport`].
    pub fn status(&self, name: &str) -> StatusReport {
        let name = name.trim();
        if name.is_empty() {
            return StatusReport::unobserved(ServiceError::new(
                ServiceAction::Status,
                name,
                ServiceErrorKind::NotFound,
                "service name is empty",
            ));
        }

        match self.manager.query_status(name) {
            Ok(status) => StatusReport::observed(status),
            Err(e) => {
                warn!("{}", e);
                StatusReport::unobserved(e)
            }
        }
    }
}

fn required<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::config(format!("{} is required", what)));
    }
    Ok(value)
}
