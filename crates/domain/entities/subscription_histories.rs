use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::infra::db::postgres::schema::subscription_histories;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscription_histories)]
pub struct SubscriptionHistoryEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub action: String,
    pub description: String,
    pub amount: Option<i64>,
    pub currency: String,
    pub payment_key: Option<String>,
    pub order_id: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = subscription_histories)]
pub struct InsertSubscriptionHistoryEntity {
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub action: String,
    pub description: String,
    pub amount: Option<i64>,
    pub currency: String,
    pub payment_key: Option<String>,
    pub order_id: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub metadata: Value,
}
