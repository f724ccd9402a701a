use log::debug;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::list_query::{FetchParams, Page};
use crate::domain::order::{OrderDraft, OrderView};
use crate::domain::ports::OrderRepository;
use crate::domain::pricing::PricingConfig;

pub const MAX_PER_PAGE: u32 = 100;

/// Page numbers start at 1 and page sizes are clamped to `1..=100`.
pub fn clamp_params(params: &FetchParams) -> FetchParams {
    FetchParams {
        page: params.page.max(1),
        per_page: params.per_page.clamp(1, MAX_PER_PAGE),
        ..params.clone()
    }
}

/// Server-side order use cases. Every payload is validated and re-priced
/// here, so client-supplied totals are never trusted.
pub struct OrderService<R> {
    repo: R,
    pricing: PricingConfig,
}

impl<R: OrderRepository> OrderService<R> {
    pub fn new(repo: R, pricing: PricingConfig) -> Self {
        Self { repo, pricing }
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    pub fn create_order(&self, draft: &OrderDraft) -> Result<OrderView, DomainError> {
        let order = draft.to_new_order(&self.pricing)?;
        debug!(
            "creating order for customer {} with {} lines",
            order.customer_id,
            order.items.len()
        );
        self.repo.create(order)
    }

    pub fn get_order(&self, id: Uuid) -> Result<Option<OrderView>, DomainError> {
        self.repo.find_by_id(id)
    }

    /// Lists with [`clamp_params`] applied.
    pub fn list_orders(&self, params: &FetchParams) -> Result<Page<OrderView>, DomainError> {
        self.repo.list(&clamp_params(params))
    }

    pub fn update_order(&self, id: Uuid, draft: &OrderDraft) -> Result<OrderView, DomainError> {
        let order = draft.to_new_order(&self.pricing)?;
        self.repo.update(id, order)
    }

    pub fn delete_order(&self, id: Uuid) -> Result<(), DomainError> {
        self.repo.delete(id)
    }
}
