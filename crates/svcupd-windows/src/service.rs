//! Windows Service Control Manager (SCM): install/uninstall/start/stop/query services.

#[cfg(target_os = "windows")]
use std::ffi::{OsStr, OsString};
#[cfg(target_os = "windows")]
use std::path::PathBuf;

#[cfg(target_os = "windows")]
use tracing::{info, warn};
#[cfg(target_os = "windows")]
use windows_service::service::{
    Service, ServiceAccess, ServiceErrorControl, ServiceInfo, ServiceStartType, ServiceState,
    ServiceType,
};
#[cfg(target_os = "windows")]
use windows_service::service_manager::{ServiceManager as Scm, ServiceManagerAccess};

#[cfg(target_os = "windows")]
use svcupd_platform::service::{
    ServiceAction, ServiceDescriptor, ServiceError, ServiceErrorKind, ServiceManager,
    ServiceStatus,
};

#[cfg(target_os = "windows")]
const ERROR_ACCESS_DENIED: i32 = 5;
#[cfg(target_os = "windows")]
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;
#[cfg(target_os = "windows")]
const ERROR_SERVICE_NOT_ACTIVE: i32 = 1062;
#[cfg(target_os = "windows")]
const ERROR_SERVICE_EXISTS: i32 = 1073;
#[cfg(target_os = "windows")]
const ERROR_SERVICE_MARKED_FOR_DELETE: i32 = 1072;

/// SCM-backed manager. The SCM has no restart primitive, so `restart` uses
/// the trait's stop-then-start fallback.
#[cfg(target_os = "windows")]
#[derive(Default)]
pub struct WindowsServiceManager;

#[cfg(target_os = "windows")]
impl WindowsServiceManager {
    pub fn new() -> Self {
        Self
    }

    fn connect(
        &self,
        action: ServiceAction,
        name: &str,
        access: ServiceManagerAccess,
    ) -> Result<Scm, ServiceError> {
        Scm::local_computer(None::<&str>, access).map_err(|e| {
            let kind = match os_code(&e) {
                Some(ERROR_ACCESS_DENIED) => ServiceErrorKind::PermissionDenied,
                _ => ServiceErrorKind::ManagerUnavailable,
            };
            ServiceError::new(action, name, kind, format!("cannot connect to SCM: {}", e))
        })
    }

    fn open(
        &self,
        action: ServiceAction,
        name: &str,
        access: ServiceAccess,
    ) -> Result<Service, ServiceError> {
        let manager = self.connect(action, name, ServiceManagerAccess::CONNECT)?;
        manager
            .open_service(name, access)
            .map_err(|e| scm_error(action, name, e))
    }
}

#[cfg(target_os = "windows")]
impl ServiceManager for WindowsServiceManager {
    fn install(&self, descriptor: &ServiceDescriptor) -> Result<(), ServiceError> {
        let name = descriptor.name.as_str();
        info!("installing Windows service: {}", name);

        let manager = self.connect(
            ServiceAction::Install,
            name,
            ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE,
        )?;

        let service_info = ServiceInfo {
            name: OsString::from(name),
            display_name: OsString::from(&descriptor.display_name),
            service_type: ServiceType::OWN_PROCESS,
            start_type: ServiceStartType::AutoStart,
            error_control: ServiceErrorControl::Normal,
            executable_path: PathBuf::from(&descriptor.executable_path),
            launch_arguments: vec![],
            dependencies: vec![],
            account_name: None,
            account_password: None,
        };

        let service = manager
            .create_service(
                &service_info,
                ServiceAccess::CHANGE_CONFIG | ServiceAccess::DELETE,
            )
            .map_err(|e| scm_error(ServiceAction::Install, name, e))?;

        if let Err(e) = service.set_description(&descriptor.description) {
            // A failed install leaves no registration behind
            if let Err(delete_err) = service.delete() {
                warn!(
                    "failed to delete service {} after install failure: {}",
                    name, delete_err
                );
            }
            return Err(scm_error(ServiceAction::Install, name, e));
        }

        info!("service installed: {}", name);
        Ok(())
    }

    fn uninstall(&self, name: &str) -> Result<(), ServiceError> {
        info!("uninstalling Windows service: {}", name);

        let service = self.open(
            ServiceAction::Uninstall,
            name,
            ServiceAccess::QUERY_STATUS | ServiceAccess::STOP | ServiceAccess::DELETE,
        )?;

        // Deletion completes once the last handle is closed and the service stops
        if let Err(e) = service.stop() {
            if os_code(&e) != Some(ERROR_SERVICE_NOT_ACTIVE) {
                return Err(scm_error(ServiceAction::Uninstall, name, e));
            }
        }
        service
            .delete()
            .map_err(|e| scm_error(ServiceAction::Uninstall, name, e))?;

        info!("service uninstalled: {}", name);
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), ServiceError> {
        info!("starting service: {}", name);
        let service = self.open(ServiceAction::Start, name, ServiceAccess::START)?;
        service
            .start(&[] as &[&OsStr])
            .map_err(|e| scm_error(ServiceAction::Start, name, e))
    }

    fn stop(&self, name: &str) -> Result<(), ServiceError> {
        info!("stopping service: {}", name);
        let service = self.open(ServiceAction::Stop, name, ServiceAccess::STOP)?;
        match service.stop() {
            Ok(_) => Ok(()),
            // Not an error if already stopped
            Err(e) if os_code(&e) == Some(ERROR_SERVICE_NOT_ACTIVE) => Ok(()),
            Err(e) => Err(scm_error(ServiceAction::Stop, name, e)),
        }
    }

    fn query_status(&self, name: &str) -> Result<ServiceStatus, ServiceError> {
        let service = self.open(ServiceAction::Status, name, ServiceAccess::QUERY_STATUS)?;
        let status = service
            .query_status()
            .map_err(|e| scm_error(ServiceAction::Status, name, e))?;
        Ok(map_state(status.current_state))
    }
}

#[cfg(target_os = "windows")]
fn map_state(state: ServiceState) -> ServiceStatus {
    match state {
        ServiceState::Stopped => ServiceStatus::Stopped,
        ServiceState::StartPending => ServiceStatus::StartPending,
        ServiceState::StopPending => ServiceStatus::StopPending,
        ServiceState::Running => ServiceStatus::Running,
        ServiceState::ContinuePending => ServiceStatus::ContinuePending,
        ServiceState::PausePending => ServiceStatus::PausePending,
        ServiceState::Paused => ServiceStatus::Paused,
    }
}

#[cfg(target_os = "windows")]
fn os_code(e: &windows_service::Error) -> Option<i32> {
    match e {
        windows_service::Error::Winapi(io) => io.raw_os_error(),
        _ => None,
    }
}

#[cfg(target_os = "windows")]
fn scm_error(action: ServiceAction, name: &str, e: windows_service::Error) -> ServiceError {
    let kind = match os_code(&e) {
        Some(ERROR_ACCESS_DENIED) => ServiceErrorKind::PermissionDenied,
        Some(ERROR_SERVICE_DOES_NOT_EXIST) | Some(ERROR_SERVICE_MARKED_FOR_DELETE) => {
            ServiceErrorKind::NotFound
        }
        Some(ERROR_SERVICE_EXISTS) => ServiceErrorKind::AlreadyExists,
        _ => ServiceErrorKind::Other,
    };
    ServiceError::new(action, name, kind, e.to_string())
}
