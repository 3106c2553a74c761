//! Connection to a ledger node, as seen by the client.

use std::future::Future;

use futures::stream::BoxStream;
use tessera_core::{AccessRequest, ChangeEvent, GridSnapshot};

use crate::error::Result;

/// Live change events. The stream ends when the subscription is lost.
pub type ChangeStream = BoxStream<'static, ChangeEvent>;

/// Read side of a ledger plus the moderation endpoint.
///
/// Writes go through a [`Capability`](crate::capability::Capability)
/// instead, since they need a signer.
pub trait LedgerConnection: Send + Sync + 'static {
    /// Full copy of the grid.
    fn snapshot(&self) -> impl Future<Output = Result<GridSnapshot>> + Send;

    /// Subscribe to committed change events.
    fn subscribe(&self) -> impl Future<Output = Result<ChangeStream>> + Send;

    /// Hand a signed whitelist request to the grid owner.
    ///
    /// Fire-and-forget: success only means the request was delivered.
    fn request_access(&self, request: AccessRequest) -> impl Future<Output = Result<()>> + Send;
}
