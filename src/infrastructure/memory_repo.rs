use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::list_query::{FetchParams, Page, SortType};
use crate::domain::order::{NewOrder, OrderFilter, OrderSort, OrderSortField, OrderView};
use crate::domain::ports::OrderRepository;

/// Process-local order storage, used when no database is configured.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<Vec<OrderView>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn orders(&self) -> MutexGuard<'_, Vec<OrderView>> {
        self.orders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn compare(a: &OrderView, b: &OrderView, sort: OrderSort) -> Ordering {
    let ordering = match sort.field {
        OrderSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        OrderSortField::Total => a.totals.grand_total.total_cmp(&b.totals.grand_total),
        OrderSortField::Customer => a
            .customer_name
            .to_lowercase()
            .cmp(&b.customer_name.to_lowercase()),
        OrderSortField::Status => a.status.code().cmp(&b.status.code()),
    };
    match sort.direction {
        SortType::Asc => ordering,
        SortType::Desc => ordering.reverse(),
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn create(&self, order: NewOrder) -> Result<OrderView, DomainError> {
        let now = Utc::now();
        let view = OrderView {
            id: Uuid::new_v4(),
            customer_id: order.customer_id,
            customer_name: order.customer_name,
            customer_type: order.customer_type,
            status: order.status,
            payment_method: order.payment_method,
            notes: order.notes,
            auto_delivery_cost: order.auto_delivery_cost,
            totals: order.totals,
            items: order.items,
            created_at: now,
            updated_at: now,
        };
        self.orders().push(view.clone());
        Ok(view)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError> {
        Ok(self.orders().iter().find(|o| o.id == id).cloned())
    }

    fn list(&self, params: &FetchParams) -> Result<Page<OrderView>, DomainError> {
        let filter = OrderFilter::from_filters(&params.filters);
        let sort = OrderSort::from_params(params);

        let mut matching: Vec<OrderView> = self
            .orders()
            .iter()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        // Stable, so ties keep insertion order.
        matching.sort_by(|a, b| compare(a, b, sort));

        let total = matching.len() as u64;
        let offset = usize::try_from(params.offset()).unwrap_or(usize::MAX);
        let data = matching
            .into_iter()
            .skip(offset)
            .take(params.per_page as usize)
            .collect();
        Ok(Page { data, total })
    }

    fn update(&self, id: Uuid, order: NewOrder) -> Result<OrderView, DomainError> {
        let mut orders = self.orders();
        let existing = orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(DomainError::NotFound)?;

        existing.customer_id = order.customer_id;
        existing.customer_name = order.customer_name;
        existing.customer_type = order.customer_type;
        existing.status = order.status;
        existing.payment_method = order.payment_method;
        existing.notes = order.notes;
        existing.auto_delivery_cost = order.auto_delivery_cost;
        existing.totals = order.totals;
        existing.items = order.items;
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        let mut orders = self.orders();
        let before = orders.len();
        orders.retain(|o| o.id != id);
        if orders.len() == before {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }
}
