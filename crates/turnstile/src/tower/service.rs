//! Tower Service implementation for the authorization gate

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tower_service::Service;

use super::RejectionHandler;
use crate::gate::{AuthorizationGate, GateOutcome};
use crate::header::authorization_header;

/// Tower Service that evaluates the gate before calling the inner service
///
/// Allowed requests are forwarded, with the verified
/// [`ClaimsView`](crate::ClaimsView) in their extensions when the route was
/// protected. Rejected requests never reach the inner service.
#[derive(Clone)]
pub struct GateService<S> {
    inner: S,
    gate: Arc<AuthorizationGate>,
    rejection: Arc<dyn RejectionHandler>,
}

impl<S> GateService<S> {
    /// Create a new gate service
    pub fn new(
        inner: S,
        gate: Arc<AuthorizationGate>,
        rejection: Arc<dyn RejectionHandler>,
    ) -> Self {
        Self {
            inner,
            gate,
            rejection,
        }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the inner service
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

/// Future type for [`GateService`] responses
pub type GateServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

impl<S, B, ResBody> Service<http::Request<B>> for GateService<S>
where
    S: Service<http::Request<B>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = S::Error;
    type Future = GateServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        // Owned copies so the future does not borrow a possibly !Sync body
        let path = req.uri().path().to_string();
        let method = req.method().as_str().to_string();
        let authorization = authorization_header(req.headers()).map(str::to_string);

        let gate = Arc::clone(&self.gate);
        let rejection = Arc::clone(&self.rejection);
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            match gate.evaluate(&path, &method, authorization.as_deref()).await {
                GateOutcome::Allowed(claims) => {
                    if let Some(claims) = claims {
                        req.extensions_mut().insert(claims);
                    }
                    inner.call(req).await
                }
                GateOutcome::TokenMissing => Ok(with_default_body(rejection.missing_token())),
                GateOutcome::TokenInvalid(failure) => {
                    Ok(with_default_body(rejection.invalid_token(failure)))
                }
            }
        })
    }
}

fn with_default_body<ResBody: Default>(response: http::Response<()>) -> http::Response<ResBody> {
    let (parts, ()) = response.into_parts();
    http::Response::from_parts(parts, ResBody::default())
}

impl<S: fmt::Debug> fmt::Debug for GateService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateService")
            .field("inner", &self.inner)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}
