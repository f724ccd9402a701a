use log::warn;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::errors::{FieldErrors, GatewayError};
use crate::domain::order::{OrderDraft, OrderView};
use crate::domain::ports::OrderGateway;
use crate::domain::pricing::PricingConfig;

pub const SAVE_ERROR_MESSAGE: &str = "The order could not be saved. Please try again.";
pub const DELETE_ERROR_MESSAGE: &str = "The order could not be deleted. Please try again.";

/// Why a submission did not go through. Field errors are keyed the same
/// way whether they come from local validation or from the order API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    /// Local validation failed; nothing was sent.
    #[error("Invalid order: {0}")]
    Invalid(FieldErrors),
    /// The order API rejected the payload.
    #[error("Rejected: {0}")]
    Rejected(FieldErrors),
    /// The session was rejected and has been signed out.
    #[error("Session expired")]
    Unauthorized,
    #[error("{0}")]
    Failed(String),
}

impl SubmitError {
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            SubmitError::Invalid(errors) | SubmitError::Rejected(errors) => Some(errors),
            _ => None,
        }
    }

    fn from_gateway(err: GatewayError, generic: &str) -> Self {
        match err {
            GatewayError::Validation(errors) => SubmitError::Rejected(errors),
            GatewayError::Unauthorized => SubmitError::Unauthorized,
            GatewayError::NotFound => SubmitError::Failed("The order no longer exists.".to_string()),
            other => {
                warn!("order request failed: {}", other);
                SubmitError::Failed(generic.to_string())
            }
        }
    }
}

/// Submission boundary of the order form: validates and prices the draft,
/// then hands it to the order API.
pub struct OrderForm<G> {
    gateway: G,
    pricing: PricingConfig,
}

impl<G: OrderGateway> OrderForm<G> {
    pub fn new(gateway: G, pricing: PricingConfig) -> Self {
        Self { gateway, pricing }
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// Create a new order, or update `existing` when editing.
    pub async fn submit(
        &self,
        existing: Option<Uuid>,
        draft: &OrderDraft,
    ) -> Result<OrderView, SubmitError> {
        let order = draft
            .to_new_order(&self.pricing)
            .map_err(SubmitError::Invalid)?;
        let result = match existing {
            Some(id) => self.gateway.update(id, &order).await,
            None => self.gateway.create(&order).await,
        };
        result.map_err(|e| SubmitError::from_gateway(e, SAVE_ERROR_MESSAGE))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), SubmitError> {
        self.gateway
            .delete(id)
            .await
            .map_err(|e| SubmitError::from_gateway(e, DELETE_ERROR_MESSAGE))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::domain::order::{CustomerRef, CustomerType, NewOrder, OrderLineItem};

    #[derive(Default)]
    struct FakeGateway {
        fail_with: Mutex<Option<GatewayError>>,
        calls: AtomicUsize,
        last_update: Mutex<Option<Uuid>>,
    }

    impl FakeGateway {
        fn failing(err: GatewayError) -> Self {
            Self {
                fail_with: Mutex::new(Some(err)),
                ..Self::default()
            }
        }

        fn respond(&self, id: Uuid, order: &NewOrder) -> Result<OrderView, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.fail_with.lock().expect("lock").clone() {
                return Err(err);
            }
            let now = Utc::now();
            Ok(OrderView {
                id,
                customer_id: order.customer_id.clone(),
                customer_name: order.customer_name.clone(),
                customer_type: order.customer_type,
                status: order.status,
                payment_method: order.payment_method,
                notes: order.notes.clone(),
                auto_delivery_cost: order.auto_delivery_cost,
                totals: order.totals,
                items: order.items.clone(),
                created_at: now,
                updated_at: now,
            })
        }
    }

    #[async_trait]
    impl OrderGateway for FakeGateway {
        async fn create(&self, order: &NewOrder) -> Result<OrderView, GatewayError> {
            self.respond(Uuid::new_v4(), order)
        }

        async fn update(&self, id: Uuid, order: &NewOrder) -> Result<OrderView, GatewayError> {
            *self.last_update.lock().expect("lock") = Some(id);
            self.respond(id, order)
        }

        async fn delete(&self, _id: Uuid) -> Result<(), GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with.lock().expect("lock").clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn valid_draft() -> OrderDraft {
        OrderDraft {
            customer: Some(CustomerRef {
                id: "c-1".to_string(),
                name: "Ana".to_string(),
                customer_type: CustomerType::Wholesale,
            }),
            items: vec![OrderLineItem::new(
                "p-1",
                "Yerba",
                2.0,
                "99.5",
                &PricingConfig::default(),
            )],
            ..OrderDraft::default()
        }
    }

    #[tokio::test]
    async fn invalid_drafts_never_reach_the_gateway() {
        let form = OrderForm::new(FakeGateway::default(), PricingConfig::default());
        let err = form
            .submit(None, &OrderDraft::default())
            .await
            .expect_err("must fail");

        assert!(matches!(err, SubmitError::Invalid(_)));
        assert!(err.field_errors().expect("has fields").contains("customer"));
        assert_eq!(form.gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn submit_creates_or_updates() {
        let form = OrderForm::new(FakeGateway::default(), PricingConfig::default());

        let created = form.submit(None, &valid_draft()).await.expect("create");
        assert_eq!(created.totals.grand_total, 199.0);
        assert!(form.gateway.last_update.lock().expect("lock").is_none());

        let id = Uuid::new_v4();
        let updated = form.submit(Some(id), &valid_draft()).await.expect("update");
        assert_eq!(updated.id, id);
        assert_eq!(*form.gateway.last_update.lock().expect("lock"), Some(id));
    }

    #[tokio::test]
    async fn server_validation_errors_surface_as_field_errors() {
        let mut errors = FieldErrors::new();
        errors.add("customer", "Unknown customer");
        let form = OrderForm::new(
            FakeGateway::failing(GatewayError::Validation(errors.clone())),
            PricingConfig::default(),
        );

        let err = form.submit(None, &valid_draft()).await.expect_err("must fail");
        assert_eq!(err, SubmitError::Rejected(errors));
    }

    #[tokio::test]
    async fn unauthorized_is_reported_distinctly() {
        let form = OrderForm::new(
            FakeGateway::failing(GatewayError::Unauthorized),
            PricingConfig::default(),
        );
        assert_eq!(
            form.submit(None, &valid_draft()).await,
            Err(SubmitError::Unauthorized)
        );
        assert_eq!(form.delete(Uuid::new_v4()).await, Err(SubmitError::Unauthorized));
    }

    #[tokio::test]
    async fn other_failures_become_a_generic_message() {
        let form = OrderForm::new(
            FakeGateway::failing(GatewayError::Failed("connection reset".to_string())),
            PricingConfig::default(),
        );
        assert_eq!(
            form.submit(None, &valid_draft()).await,
            Err(SubmitError::Failed(SAVE_ERROR_MESSAGE.to_string()))
        );
        assert_eq!(
            form.delete(Uuid::new_v4()).await,
            Err(SubmitError::Failed(DELETE_ERROR_MESSAGE.to_string()))
        );
    }
}
