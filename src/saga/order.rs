//! Order fulfilment saga.

use super::error::SagaError;
use crate::collaborators::{PaymentGateway, PaymentRequest};
use crate::config::{FlowstateConfig, PaymentConfig};
use crate::core::{Event, Payload, Status};
use crate::domain::order::{
    keys, order_actions, order_table, Order, OrderDraft, OrderEvent, OrderServices,
};
use crate::engine::{Emission, EntitySession, WorkflowEngine, WorkflowError};
use crate::enforcement::CallPolicy;
use crate::store::EntityStore;
use crate::table::BuildError;
use crate::telemetry::saga_span;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use stillwater::validation::Validation;
use tracing::{info, warn, Instrument};

/// Drives orders through payment, fulfilment, cancellation and returns.
///
/// Each public step takes the order's [`EntitySession`] so nothing else
/// emits on that order while the step runs, and runs on a spawned task so
/// a caller that goes away cannot interrupt a payment half way.
#[derive(Clone)]
pub struct OrderSaga {
    engine: WorkflowEngine<Order>,
    payments: Arc<dyn PaymentGateway>,
    policy: CallPolicy,
    config: PaymentConfig,
}

impl fmt::Debug for OrderSaga {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderSaga")
            .field("policy", &self.policy)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OrderSaga {
    pub fn new(
        engine: WorkflowEngine<Order>,
        payments: Arc<dyn PaymentGateway>,
        policy: CallPolicy,
        config: PaymentConfig,
    ) -> Self {
        Self {
            engine,
            payments,
            policy,
            config,
        }
    }

    /// Wire the order table, its actions and an engine over `store`.
    pub fn assemble<S>(
        store: Arc<S>,
        services: OrderServices,
        config: &FlowstateConfig,
    ) -> Result<Self, BuildError>
    where
        S: EntityStore<Order> + 'static,
    {
        let engine = WorkflowEngine::builder(order_table()?, store)
            .actions(order_actions(&services))
            .config(config.engine.clone())
            .build();
        Ok(Self::new(
            engine,
            services.payments,
            services.policy,
            config.payments.clone(),
        ))
    }

    pub fn engine(&self) -> &WorkflowEngine<Order> {
        &self.engine
    }

    /// Validate and price a draft, then persist it as a new order.
    pub async fn create_order(&self, draft: OrderDraft) -> Result<Order, SagaError> {
        if let Validation::Failure(errors) = draft.validate() {
            let problems: Vec<String> = errors.iter().cloned().collect();
            return Err(SagaError::InvalidOrder(problems.join("; ")));
        }
        let order = self
            .engine
            .create(|order| order.apply_draft(&draft, &self.config))
            .await?;
        info!(urn = %order.urn, order_number = %order.order_number, total = order.total, "order created");
        Ok(order)
    }

    /// Capture payment and, once paid, start processing.
    pub async fn initiate_payment(&self, urn: &str) -> Result<Order, SagaError> {
        self.run("initiate_payment", urn, |saga, session| async move {
            saga.pay(&session, OrderEvent::InitiatePayment).await
        })
        .await
    }

    pub async fn retry_payment(&self, urn: &str) -> Result<Order, SagaError> {
        self.run("retry_payment", urn, |saga, session| async move {
            saga.pay(&session, OrderEvent::RetryPayment).await
        })
        .await
    }

    /// Reserve stock for a paid order. A shortage cancels the order.
    pub async fn start_processing(&self, urn: &str) -> Result<Order, SagaError> {
        self.run("start_processing", urn, |saga, session| async move {
            saga.process(&session).await
        })
        .await
    }

    pub async fn complete_processing(&self, urn: &str) -> Result<Order, SagaError> {
        self.single(urn, OrderEvent::CompleteProcessing, Payload::new())
            .await
    }

    pub async fn ship(&self, urn: &str) -> Result<Order, SagaError> {
        self.single(urn, OrderEvent::Ship, Payload::new()).await
    }

    pub async fn out_for_delivery(&self, urn: &str) -> Result<Order, SagaError> {
        self.single(urn, OrderEvent::OutForDelivery, Payload::new())
            .await
    }

    pub async fn deliver(&self, urn: &str) -> Result<Order, SagaError> {
        self.single(urn, OrderEvent::Deliver, Payload::new()).await
    }

    /// Cancel, releasing reserved stock and refunding captured payment
    /// before the cancellation commits.
    pub async fn cancel(&self, urn: &str, reason: impl Into<String>) -> Result<Order, SagaError> {
        let payload = Payload::new().with(keys::CANCELLATION_REASON, reason.into());
        self.single(urn, OrderEvent::Cancel, payload).await
    }

    /// Refund `amount`, or everything still refundable when `None`.
    pub async fn process_refund(&self, urn: &str, amount: Option<f64>) -> Result<Order, SagaError> {
        let payload = match amount {
            Some(amount) => Payload::new().with(keys::REFUND_AMOUNT, amount),
            None => Payload::new(),
        };
        self.single(urn, OrderEvent::ProcessRefund, payload).await
    }

    pub async fn initiate_return(
        &self,
        urn: &str,
        reason: impl Into<String>,
    ) -> Result<Order, SagaError> {
        let payload = Payload::new().with(keys::RETURN_REASON, reason.into());
        self.single(urn, OrderEvent::InitiateReturn, payload).await
    }

    /// Close a return by refunding exactly `amount`.
    pub async fn complete_return(&self, urn: &str, amount: f64) -> Result<Order, SagaError> {
        let payload = Payload::new().with(keys::REFUND_AMOUNT, amount);
        self.single(urn, OrderEvent::CompleteReturn, payload).await
    }

    /// Route any order event to its step.
    ///
    /// Payment triggers and `StartProcessing` run their full chains; every
    /// other event is emitted as is with `payload`.
    pub async fn handle(
        &self,
        urn: &str,
        event: OrderEvent,
        payload: Payload,
    ) -> Result<Order, SagaError> {
        match event {
            OrderEvent::InitiatePayment => self.initiate_payment(urn).await,
            OrderEvent::RetryPayment => self.retry_payment(urn).await,
            OrderEvent::StartProcessing => self.start_processing(urn).await,
            other => self.single(urn, other, payload).await,
        }
    }

    async fn single(
        &self,
        urn: &str,
        event: OrderEvent,
        payload: Payload,
    ) -> Result<Order, SagaError> {
        self.run(event.name(), urn, move |saga, session| async move {
            saga.step(&session, event, payload).await
        })
        .await
    }

    /// Take the order's session and run `body` on a detached task.
    async fn run<F, Fut>(&self, name: &str, urn: &str, body: F) -> Result<Order, SagaError>
    where
        F: FnOnce(OrderSaga, EntitySession<Order>) -> Fut,
        Fut: Future<Output = Result<Order, SagaError>> + Send + 'static,
    {
        let session = self.engine.session(urn).await?;
        let task = body(self.clone(), session).instrument(saga_span(name, urn));
        tokio::spawn(task).await.map_err(|e| SagaError::Aborted {
            urn: urn.to_string(),
            reason: e.to_string(),
        })?
    }

    async fn step(
        &self,
        session: &EntitySession<Order>,
        event: OrderEvent,
        payload: Payload,
    ) -> Result<Order, SagaError> {
        match session.emit(event, payload).await? {
            Emission::Transitioned { entity, .. } => Ok(entity),
            Emission::Unmatched { entity } => {
                warn!(urn = %entity.urn, event = event.name(), status = entity.status.name(), "step rejected");
                Err(SagaError::Rejected {
                    urn: entity.urn,
                    event: event.name().to_string(),
                    status: entity.status.name().to_string(),
                })
            }
        }
    }

    async fn pay(
        &self,
        session: &EntitySession<Order>,
        trigger: OrderEvent,
    ) -> Result<Order, SagaError> {
        let order = self.step(session, trigger, Payload::new()).await?;
        let request = PaymentRequest {
            order_urn: order.urn.clone(),
            order_number: order.order_number.clone(),
            amount: order.payment.amount,
            currency: order.payment.currency.clone(),
            method: order.payment.method.clone(),
            idempotency_key: format!("{}:capture:{}", order.urn, order.payment.attempts),
        };

        let payments = &self.payments;
        let request = &request;
        let captured = self
            .policy
            .without_timeout_retries()
            .run("payments.process_payment", move || {
                payments.process_payment(request)
            })
            .await;

        match captured {
            Ok(receipt) => {
                info!(urn = %order.urn, transaction_id = %receipt.transaction_id, amount = receipt.amount, "payment captured");
                let payload = Payload::new()
                    .with(keys::TRANSACTION_ID, receipt.transaction_id)
                    .with(keys::AMOUNT, receipt.amount);
                self.step(session, OrderEvent::PaymentSuccess, payload)
                    .await?;
                self.process(session).await
            }
            Err(error) => {
                warn!(urn = %order.urn, %error, "payment failed");
                let payload = Payload::new().with(keys::FAILURE_REASON, error.to_string());
                let failed = self
                    .step(session, OrderEvent::PaymentFailed, payload)
                    .await?;
                if failed.payment.attempts_exhausted() {
                    let reason = format!(
                        "payment failed after {} attempts",
                        failed.payment.attempts
                    );
                    self.cancel_within(session, reason).await
                } else {
                    Ok(failed)
                }
            }
        }
    }

    async fn process(&self, session: &EntitySession<Order>) -> Result<Order, SagaError> {
        match session.emit(OrderEvent::StartProcessing, Payload::new()).await {
            Ok(Emission::Transitioned { entity, .. }) => Ok(entity),
            Ok(Emission::Unmatched { entity }) => Err(SagaError::Rejected {
                urn: entity.urn,
                event: OrderEvent::StartProcessing.name().to_string(),
                status: entity.status.name().to_string(),
            }),
            Err(WorkflowError::ActionFailed { urn, source, .. }) => {
                warn!(urn = %urn, error = %source, "processing failed; cancelling order");
                self.cancel_within(session, format!("inventory unavailable: {source}"))
                    .await
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn cancel_within(
        &self,
        session: &EntitySession<Order>,
        reason: String,
    ) -> Result<Order, SagaError> {
        let payload = Payload::new().with(keys::CANCELLATION_REASON, reason);
        self.step(session, OrderEvent::Cancel, payload).await
    }
}
