use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::errors::{DomainError, GatewayError};
use super::list_query::{FetchParams, Page};
use super::order::{NewOrder, OrderView};

/// Order storage behind the order API.
pub trait OrderRepository: Send + Sync + 'static {
    fn create(&self, order: NewOrder) -> Result<OrderView, DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError>;
    fn list(&self, params: &FetchParams) -> Result<Page<OrderView>, DomainError>;
    fn update(&self, id: Uuid, order: NewOrder) -> Result<OrderView, DomainError>;
    fn delete(&self, id: Uuid) -> Result<(), DomainError>;
}

/// Loads one page of a list. Implementations should stop work once
/// `cancel` fires and report [`GatewayError::Cancelled`].
#[async_trait]
pub trait PageFetcher: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    async fn fetch_page(
        &self,
        params: &FetchParams,
        cancel: CancellationToken,
    ) -> Result<Page<Self::Item>, GatewayError>;
}

/// Create, update and delete orders on the remote order API.
#[async_trait]
pub trait OrderGateway: Send + Sync + 'static {
    async fn create(&self, order: &NewOrder) -> Result<OrderView, GatewayError>;
    async fn update(&self, id: Uuid, order: &NewOrder) -> Result<OrderView, GatewayError>;
    async fn delete(&self, id: Uuid) -> Result<(), GatewayError>;
}

/// The persisted form of a list view's query (a URL query string in a
/// browser, a file or an in-memory map elsewhere). Writing must not reset
/// any view state.
pub trait QueryStore: Send + Sync + 'static {
    fn read(&self) -> BTreeMap<String, String>;
    fn write(&self, query: &BTreeMap<String, String>);
}

/// Supplies the bearer credential for outbound requests and performs the
/// sign-out side effect when the remote side rejects it.
pub trait SessionProvider: Send + Sync + 'static {
    fn bearer_token(&self) -> Option<String>;
    fn sign_out(&self);
}

/// No credential; sign-out is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousSession;

impl SessionProvider for AnonymousSession {
    fn bearer_token(&self) -> Option<String> {
        None
    }

    fn sign_out(&self) {}
}

impl<R: OrderRepository + ?Sized> OrderRepository for Box<R> {
    fn create(&self, order: NewOrder) -> Result<OrderView, DomainError> {
        (**self).create(order)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError> {
        (**self).find_by_id(id)
    }

    fn list(&self, params: &FetchParams) -> Result<Page<OrderView>, DomainError> {
        (**self).list(params)
    }

    fn update(&self, id: Uuid, order: NewOrder) -> Result<OrderView, DomainError> {
        (**self).update(id, order)
    }

    fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        (**self).delete(id)
    }
}
