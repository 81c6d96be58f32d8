use super::{HttpRequest, HttpResponse, Transport};
use crate::error::Result;

use futures::future::BoxFuture;

/// Object-safe `Transport`.
pub(crate) trait BoxedTransport: Send + Sync + 'static {
    /// Send one request.
    fn send_boxed(&self, req: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>>;
}

/// Implements `BoxedTransport` for the public `Transport`.
pub(super) struct TransportInner<T>(T);

impl<T: Transport> TransportInner<T> {
    pub(super) fn new(inner: T) -> Self {
        Self(inner)
    }
}

impl<T: Transport + 'static> BoxedTransport for TransportInner<T> {
    fn send_boxed(&self, req: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(self.0.send(req))
    }
}
