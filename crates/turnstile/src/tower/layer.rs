//! Tower Layer implementation for the authorization gate

use std::fmt;
use std::sync::Arc;

use tower::Layer;

use super::service::GateService;
use super::{DefaultRejectionHandler, RejectionHandler};
use crate::gate::AuthorizationGate;

/// Tower Layer that puts an [`AuthorizationGate`] in front of services
///
/// # Example
///
/// ```rust,ignore
/// use tower::ServiceBuilder;
/// use turnstile::tower::GateLayer;
///
/// let service = ServiceBuilder::new()
///     .layer(GateLayer::new(gate))
///     .service(my_inner_service);
/// ```
#[derive(Clone)]
pub struct GateLayer {
    gate: Arc<AuthorizationGate>,
    rejection: Arc<dyn RejectionHandler>,
}

impl GateLayer {
    /// Create a layer answering rejections with `401 Unauthorized`
    pub fn new(gate: AuthorizationGate) -> Self {
        Self::from_arc(Arc::new(gate))
    }

    /// Create a layer from a shared gate
    pub fn from_arc(gate: Arc<AuthorizationGate>) -> Self {
        Self {
            gate,
            rejection: Arc::new(DefaultRejectionHandler),
        }
    }

    /// Build rejection responses with `handler`
    #[must_use]
    pub fn rejection_handler(mut self, handler: impl RejectionHandler) -> Self {
        self.rejection = Arc::new(handler);
        self
    }
}

impl<S> Layer<S> for GateLayer {
    type Service = GateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GateService::new(inner, Arc::clone(&self.gate), Arc::clone(&self.rejection))
    }
}

impl fmt::Debug for GateLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateLayer")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}
