//! Container runtime seam.
//!
//! The starter never talks to Docker or Kubernetes directly. Everything it
//! needs from the backend goes through [`ContainerRuntime`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by runtime operations.
pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Everything needed to create one worker container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRequest {
    /// Container name, `<base>_<service port>`.
    pub name: String,
    /// Fully resolved image reference.
    pub image: String,
    pub env: HashMap<String, String>,
    /// Service port, rendered as a string for labelling.
    pub port_label: String,
}

/// Backend that creates and inspects worker containers.
///
/// Implementations are shared across provisioning tasks and must tolerate
/// concurrent calls.
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a container. An `Err` means nothing usable was created.
    fn create_container<'a>(&'a self, request: &'a ContainerRequest) -> RuntimeFuture<'a, ()>;

    /// Address of a container, or `None` while it has not been assigned one.
    fn container_ip<'a>(&'a self, name: &'a str) -> RuntimeFuture<'a, Option<String>>;

    /// Number of running worker containers created from `image`.
    fn running_containers<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, u32>;

    /// Newest locally available reference for `image`, e.g. `elgalu/selenium:3.14`.
    fn latest_downloaded_image<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, String>;

    /// Value of an image label, if the image carries it.
    fn label_value<'a>(
        &'a self,
        image: &'a str,
        label: &'a str,
    ) -> RuntimeFuture<'a, Option<String>>;

    /// One-time backend preparation before any container is created.
    fn initialise_environment(&self) -> RuntimeFuture<'_, ()>;

    /// Prefix used to identify this node in backend logs.
    fn set_node_id(&self, prefix: &str);

    /// Whether workers can be reached from here for status probes.
    ///
    /// Backends that cannot route to their containers return `false`, and
    /// readiness is then assumed right after creation.
    fn supports_direct_probing(&self) -> bool {
        true
    }
}
