//! Test doubles: an in-memory service manager and a one-shot remote agent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::{header, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use svcupd_platform::service::{
    RestartSemantics, ServiceAction, ServiceDescriptor, ServiceError, ServiceErrorKind,
    ServiceManager, ServiceStatus,
};

/// Service manager backed by a map of registered services. Clones share state.
#[derive(Clone, Default)]
pub struct MockServiceManager {
    services: Arc<Mutex<HashMap<String, ServiceStatus>>>,
    calls: Arc<Mutex<Vec<(ServiceAction, String)>>>,
    /// Actions that fail with `Other` for every service
    failing: Arc<Mutex<Vec<ServiceAction>>>,
    manager_down: bool,
}

impl MockServiceManager {
    pub fn with_service(name: &str, status: ServiceStatus) -> Self {
        let mgr = Self::default();
        mgr.services.lock().unwrap().insert(name.to_string(), status);
        mgr
    }

    pub fn unreachable() -> Self {
        Self {
            manager_down: true,
            ..Self::default()
        }
    }

    pub fn fail(self, action: ServiceAction) -> Self {
        self.failing.lock().unwrap().push(action);
        self
    }

    pub fn calls(&self) -> Vec<(ServiceAction, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn status_of(&self, name: &str) -> Option<ServiceStatus> {
        self.services.lock().unwrap().get(name).copied()
    }

    fn enter(&self, action: ServiceAction, name: &str) -> Result<(), ServiceError> {
        self.calls.lock().unwrap().push((action, name.to_string()));
        if self.manager_down {
            return Err(ServiceError::new(
                action,
                name,
                ServiceErrorKind::ManagerUnavailable,
                "manager offline",
            ));
        }
        if self.failing.lock().unwrap().contains(&action) {
            return Err(ServiceError::new(
                action,
                name,
                ServiceErrorKind::Other,
                "injected failure",
            ));
        }
        Ok(())
    }

    fn set(
        &self,
        action: ServiceAction,
        name: &str,
        status: ServiceStatus,
    ) -> Result<(), ServiceError> {
        match self.services.lock().unwrap().get_mut(name) {
            Some(current) => {
                *current = status;
                Ok(())
            }
            None => Err(ServiceError::new(
                action,
                name,
                ServiceErrorKind::NotFound,
                "no such service",
            )),
        }
    }
}

impl ServiceManager for MockServiceManager {
    fn install(&self, descriptor: &ServiceDescriptor) -> Result<(), ServiceError> {
        self.enter(ServiceAction::Install, &descriptor.name)?;
        let mut services = self.services.lock().unwrap();
        if services.contains_key(&descriptor.name) {
            return Err(ServiceError::new(
                ServiceAction::Install,
                &descriptor.name,
                ServiceErrorKind::AlreadyExists,
                "already registered",
            ));
        }
        services.insert(descriptor.name.clone(), ServiceStatus::Stopped);
        Ok(())
    }

    fn uninstall(&self, name: &str) -> Result<(), ServiceError> {
        self.enter(ServiceAction::Uninstall, name)?;
        match self.services.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(ServiceError::new(
                ServiceAction::Uninstall,
                name,
                ServiceErrorKind::NotFound,
                "no such service",
            )),
        }
    }

    fn start(&self, name: &str) -> Result<(), ServiceError> {
        self.enter(ServiceAction::Start, name)?;
        self.set(ServiceAction::Start, name, ServiceStatus::Running)
    }

    fn stop(&self, name: &str) -> Result<(), ServiceError> {
        self.enter(ServiceAction::Stop, name)?;
        self.set(ServiceAction::Stop, name, ServiceStatus::Stopped)
    }

    fn restart(&self, name: &str) -> Result<(), ServiceError> {
        self.enter(ServiceAction::Restart, name)?;
        self.set(ServiceAction::Restart, name, ServiceStatus::Running)
    }

    fn query_status(&self, name: &str) -> Result<ServiceStatus, ServiceError> {
        self.enter(ServiceAction::Status, name)?;
        self.services
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .ok_or_else(|| {
                ServiceError::new(
                    ServiceAction::Status,
                    name,
                    ServiceErrorKind::NotFound,
                    "no such service",
                )
            })
    }

    fn restart_semantics(&self) -> RestartSemantics {
        RestartSemantics::Atomic
    }
}

/// Remote agent that answers the first request with `response` and then
/// yields the JSON body it received.
pub async fn serve_once(response: &'static str) -> (u16, JoinHandle<serde_json::Value>) {
    serve_once_with_status(StatusCode::OK, response).await
}

pub async fn serve_once_with_status(
    status: StatusCode,
    response: &'static str,
) -> (u16, JoinHandle<serde_json::Value>) {
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));

    let app = Router::new().route(
        "/",
        post(move |Json(body): Json<serde_json::Value>| async move {
            let sender = tx.lock().unwrap().take();
            if let Some(sender) = sender {
                let _ = sender.send(body);
            }
            (status, [(header::CONTENT_TYPE, "application/json")], response)
        }),
    );
    let port = serve(app).await;

    let handle = tokio::spawn(async move { rx.await.unwrap() });
    (port, handle)
}

/// Remote agent that accepts requests and never answers.
pub async fn serve_silently() -> u16 {
    let app = Router::new().route(
        "/",
        post(|| async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            StatusCode::OK
        }),
    );
    serve(app).await
}

/// A loopback port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn serve(app: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    port
}
