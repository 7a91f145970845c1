use svcupd_platform::service::ServiceManager;

use crate::config::{ManagerConfig, RemoteConfig};
use crate::controller::{ServiceController, StatusReport};
use crate::error::Result;
use crate::protocol::RemoteUpdateResult;
use crate::remote::RemoteUpdateClient;

/// Service lifecycle facade.
///
/// The local operations talk to the OS service manager directly; the
/// `remote_*` operations forward to the privileged remote update agent.
/// Callers choose the surface that matches their privileges. Holds no
/// mutable state.
pub struct SvcUpdMgr {
    controller: ServiceController,
    remote: RemoteUpdateClient,
}

impl SvcUpdMgr {
    pub fn new(manager: Box<dyn ServiceManager>, remote: RemoteConfig) -> Result<Self> {
        Ok(Self {
            controller: ServiceController::new(manager),
            remote: RemoteUpdateClient::new(remote)?,
        })
    }

    pub fn from_config(manager: Box<dyn ServiceManager>, config: &ManagerConfig) -> Result<Self> {
        Self::new(manager, config.remote.clone())
    }

    pub fn controller(&self) -> &ServiceController {
        &self.controller
    }

    pub fn install(&self, name: &str, executable_path: &str) -> Result<()> {
        self.controller.install(name, executable_path)
    }

    pub fn uninstall(&self, name: &str) -> Result<()> {
        self.controller.uninstall(name)
    }

    pub fn start(&self, name: &str) -> Result<()> {
        self.controller.start(name)
    }

    pub fn stop(&self, name: &str) -> Result<()> {
        self.controller.stop(name)
    }

    pub fn restart(&self, name: &str) -> Result<()> {
        self.controller.restart(name)
    }

    pub fn status(&self, name: &str) -> StatusReport {
        self.controller.status(name)
    }

    pub async fn remote_info(&self) -> Result<RemoteUpdateResult> {
        self.remote.info().await
    }

    pub async fn remote_restart(&self, name: &str) -> Result<()> {
        self.remote.restart(name).await
    }

    pub async fn remote_update(
        &self,
        name: &str,
        path: &str,
        update_file: &str,
        update_folder: &str,
    ) -> Result<()> {
        self.remote
            .update(name, path, update_file, update_folder)
            .await
    }
}
