//! In-memory fakes for scenario tests of the billing passes.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crates::domain::{
    entities::{
        subscription_histories::{InsertSubscriptionHistoryEntity, SubscriptionHistoryEntity},
        subscriptions::SubscriptionEntity,
        users::UserEntity,
    },
    repositories::{
        payment_gateway::PaymentGateway, subscription_histories::SubscriptionHistoryRepository,
        subscriptions::SubscriptionRepository, users::UserAccountRepository,
    },
    value_objects::{
        billing_cycle::BillingCycleEngine,
        enums::{
            billing_cycles::BillingCycle, subscription_statuses::SubscriptionStatus,
            user_subscription_statuses::UserSubscriptionStatus,
        },
        payments::{ChargeRequest, PaymentError, PaymentResult},
    },
};
use serde_json::json;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::usecases::subscription_billing::SubscriptionBillingUseCase;

pub fn subscription_due(customer_id: Uuid, next_billing_date: DateTime<Utc>) -> SubscriptionEntity {
    let start_date = next_billing_date - Duration::days(30);
    SubscriptionEntity {
        id: Uuid::new_v4(),
        customer_id,
        plan_id: "premium_monthly".to_string(),
        plan_name: "Premium".to_string(),
        customer_email: Some("agent@example.com".to_string()),
        customer_name: Some("Agent Kim".to_string()),
        price: 9_900,
        billing_cycle: BillingCycle::Monthly.to_string(),
        billing_key: Some("billing-key".to_string()),
        status: SubscriptionStatus::Active.to_string(),
        auto_renew: true,
        start_date,
        next_billing_date,
        last_payment_date: Some(start_date),
        last_payment_attempt: None,
        grace_period_end_date: None,
        end_date: None,
        suspended_at: None,
        retry_count: 0,
        payment_history: json!([]),
        created_at: start_date,
        updated_at: start_date,
    }
}

pub fn premium_user(id: Uuid) -> UserEntity {
    let created_at = Utc::now() - Duration::days(90);
    UserEntity {
        id,
        name: Some("Agent Kim".to_string()),
        email: Some("agent@example.com".to_string()),
        is_premium: true,
        subscription_status: UserSubscriptionStatus::Active.to_string(),
        last_payment_date: None,
        next_payment_date: None,
        subscription_end_date: None,
        free_trial_used: false,
        free_trial_end_date: None,
        created_at,
        updated_at: created_at,
    }
}

/// Applies the same predicates as the Postgres repositories.
#[derive(Default)]
pub struct InMemoryBillingStore {
    subscriptions: Mutex<Vec<SubscriptionEntity>>,
    users: Mutex<Vec<UserEntity>>,
    histories: Mutex<Vec<SubscriptionHistoryEntity>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_subscription(&self, subscription: SubscriptionEntity) {
        self.subscriptions.lock().unwrap().push(subscription);
    }

    pub fn insert_user(&self, user: UserEntity) {
        self.users.lock().unwrap().push(user);
    }

    pub fn subscription(&self, id: Uuid) -> SubscriptionEntity {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .expect("subscription exists")
    }

    pub fn user(&self, id: Uuid) -> UserEntity {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .expect("user exists")
    }

    pub fn history_actions_for(&self, subscription_id: Uuid) -> Vec<String> {
        self.histories
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.subscription_id == subscription_id)
            .map(|h| h.action.clone())
            .collect()
    }

    pub fn history_count(&self) -> usize {
        self.histories.lock().unwrap().len()
    }

    fn select_subscriptions(
        &self,
        predicate: impl Fn(&SubscriptionEntity) -> bool,
    ) -> Vec<SubscriptionEntity> {
        let mut selected: Vec<_> = self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| predicate(*s))
            .cloned()
            .collect();
        selected.sort_by_key(|s| s.next_billing_date);
        selected
    }

    fn update_user(&self, user_id: Uuid, apply: impl FnOnce(&mut UserEntity)) -> bool {
        let mut users = self.users.lock().unwrap();
        match users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                apply(user);
                user.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

fn has_status(subscription: &SubscriptionEntity, status: SubscriptionStatus) -> bool {
    subscription.status == status.as_str()
}

#[async_trait]
impl SubscriptionRepository for InMemoryBillingStore {
    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == subscription_id)
            .cloned())
    }

    async fn list_due_for_billing(&self, now: DateTime<Utc>) -> Result<Vec<SubscriptionEntity>> {
        Ok(self.select_subscriptions(|s| {
            has_status(s, SubscriptionStatus::Active) && s.auto_renew && s.next_billing_date <= now
        }))
    }

    async fn list_retry_eligible(
        &self,
        attempted_before: DateTime<Utc>,
        max_retry_count: i32,
    ) -> Result<Vec<SubscriptionEntity>> {
        Ok(self.select_subscriptions(|s| {
            has_status(s, SubscriptionStatus::Suspended)
                && s.retry_count < max_retry_count
                && s.last_payment_attempt.is_some_and(|at| at <= attempted_before)
        }))
    }

    async fn list_grace_period_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionEntity>> {
        Ok(self.select_subscriptions(|s| {
            has_status(s, SubscriptionStatus::Cancelled)
                && s.grace_period_end_date.is_some_and(|end| end <= now)
        }))
    }

    async fn list_active_auto_renew(&self) -> Result<Vec<SubscriptionEntity>> {
        Ok(self.select_subscriptions(|s| has_status(s, SubscriptionStatus::Active) && s.auto_renew))
    }

    async fn list_billing_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionEntity>> {
        Ok(self.select_subscriptions(|s| {
            has_status(s, SubscriptionStatus::Active)
                && s.auto_renew
                && s.next_billing_date >= from
                && s.next_billing_date <= to
        }))
    }

    async fn save_billing_state(&self, subscription: &SubscriptionEntity) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let stored = subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| anyhow!("subscription {} not found", subscription.id))?;

        stored.status = subscription.status.clone();
        stored.next_billing_date = subscription.next_billing_date;
        stored.last_payment_date = subscription.last_payment_date;
        stored.last_payment_attempt = subscription.last_payment_attempt;
        stored.suspended_at = subscription.suspended_at;
        stored.retry_count = subscription.retry_count;
        stored.payment_history = subscription.payment_history.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_expired(&self, subscription_id: Uuid) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        if let Some(stored) = subscriptions.iter_mut().find(|s| s.id == subscription_id) {
            stored.status = SubscriptionStatus::Expired.to_string();
        }
        Ok(())
    }

    async fn cancel_by_customer_and_plan(
        &self,
        customer_id: Uuid,
        plan_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let mut cancelled = Vec::new();
        for stored in subscriptions.iter_mut() {
            let cancellable = has_status(stored, SubscriptionStatus::Active)
                || has_status(stored, SubscriptionStatus::Suspended);
            if stored.customer_id == customer_id && stored.plan_id == plan_id && cancellable {
                stored.status = SubscriptionStatus::Cancelled.to_string();
                stored.end_date = Some(ended_at);
                cancelled.push(stored.id);
            }
        }
        Ok(cancelled)
    }
}

#[async_trait]
impl UserAccountRepository for InMemoryBillingStore {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntity>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == user_id)
            .cloned())
    }

    async fn record_payment_success(
        &self,
        user_id: Uuid,
        paid_at: DateTime<Utc>,
        next_payment_date: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.update_user(user_id, |user| {
            user.is_premium = true;
            user.subscription_status = UserSubscriptionStatus::Active.to_string();
            user.last_payment_date = Some(paid_at);
            user.next_payment_date = Some(next_payment_date);
        }))
    }

    async fn update_subscription_status(
        &self,
        user_id: Uuid,
        status: UserSubscriptionStatus,
    ) -> Result<bool> {
        Ok(self.update_user(user_id, |user| {
            user.subscription_status = status.to_string();
        }))
    }

    async fn expire_premium(&self, user_id: Uuid, ended_at: DateTime<Utc>) -> Result<bool> {
        Ok(self.update_user(user_id, |user| {
            user.is_premium = false;
            user.subscription_status = UserSubscriptionStatus::Expired.to_string();
            user.subscription_end_date = Some(ended_at);
        }))
    }

    async fn list_free_trials_ending_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UserEntity>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| {
                u.free_trial_used
                    && u.subscription_status == UserSubscriptionStatus::Active.as_str()
                    && u.free_trial_end_date.is_some_and(|end| end >= from && end < to)
            })
            .cloned()
            .collect())
    }

    async fn end_free_trial(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.update_user(user_id, |user| {
            user.is_premium = false;
            user.subscription_status = UserSubscriptionStatus::Inactive.to_string();
        }))
    }
}

#[async_trait]
impl SubscriptionHistoryRepository for InMemoryBillingStore {
    async fn append(&self, entry: InsertSubscriptionHistoryEntity) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.histories.lock().unwrap().push(SubscriptionHistoryEntity {
            id,
            user_id: entry.user_id,
            subscription_id: entry.subscription_id,
            action: entry.action,
            description: entry.description,
            amount: entry.amount,
            currency: entry.currency,
            payment_key: entry.payment_key,
            order_id: entry.order_id,
            status: entry.status,
            error_message: entry.error_message,
            metadata: entry.metadata,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<SubscriptionHistoryEntity>> {
        Ok(self
            .histories
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_by_subscription(
        &self,
        subscription_id: Uuid,
        limit: i64,
    ) -> Result<Vec<SubscriptionHistoryEntity>> {
        Ok(self
            .histories
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|h| h.subscription_id == subscription_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

/// Succeeds unless the customer is scripted to fail. Optionally parks every charge on a gate.
#[derive(Default)]
pub struct ScriptedGateway {
    failing_customers: Mutex<HashSet<Uuid>>,
    calls: Mutex<Vec<ChargeRequest>>,
    gate: Option<Notify>,
    pub entered: Notify,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Notify::new()),
            ..Default::default()
        })
    }

    pub fn fail_for(&self, customer_id: Uuid) {
        self.failing_customers.lock().unwrap().insert(customer_id);
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> Vec<ChargeRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<PaymentResult, PaymentError> {
        self.calls.lock().unwrap().push(request.clone());
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if request.billing_key.is_none() {
            return Err(PaymentError::MissingCredential);
        }

        let customer_id: Uuid = request.customer_key.parse().expect("customer key is a uuid");
        if self.failing_customers.lock().unwrap().contains(&customer_id) {
            return Err(PaymentError::Gateway {
                status: 400,
                code: Some("REJECT_CARD_COMPANY".to_string()),
                message: "card declined".to_string(),
            });
        }

        Ok(PaymentResult {
            payment_key: format!("pay_{}", request.order_id),
            total_amount: request.amount,
            order_id: request.order_id,
        })
    }
}

pub fn billing_usecase(
    store: &Arc<InMemoryBillingStore>,
    gateway: &Arc<ScriptedGateway>,
) -> SubscriptionBillingUseCase {
    SubscriptionBillingUseCase::new(
        Arc::clone(store) as Arc<dyn SubscriptionRepository + Send + Sync>,
        Arc::clone(store) as Arc<dyn UserAccountRepository + Send + Sync>,
        Arc::clone(store) as Arc<dyn SubscriptionHistoryRepository + Send + Sync>,
        Arc::clone(gateway) as Arc<dyn PaymentGateway + Send + Sync>,
        BillingCycleEngine::default(),
    )
}
