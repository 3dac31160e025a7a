use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{Coupon, CouponAnalytics, CouponPatch, DiscountType, NewCoupon, UpdateCoupon};
use crate::domain::value_objects::CouponCode;
use crate::{CouponError, Result};
use super::CouponStore;

#[derive(Clone)]
pub struct PgCouponStore {
    pool: PgPool,
}

impl PgCouponStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: Uuid, code: String, discount_type: String, discount_value: Decimal, active: bool,
    expires_at: Option<DateTime<Utc>>, max_uses: Option<i64>, max_usage_per_user: i64, usage_count: i64,
    user_usages: Option<Json<BTreeMap<String, u32>>>, applied_orders: Json<BTreeSet<String>>,
    analytics: Option<Json<CouponAnalytics>>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = CouponError;
    fn try_from(row: CouponRow) -> Result<Self> {
        Ok(Coupon {
            id: row.id,
            code: CouponCode::new(&row.code).map_err(|e| CouponError::StorageError(e.to_string()))?,
            discount_type: parse_discount_type(&row.discount_type)?,
            discount_value: row.discount_value,
            active: row.active,
            expires_at: row.expires_at,
            max_uses: row.max_uses.map(count_from_db),
            max_usage_per_user: count_from_db(row.max_usage_per_user),
            usage_count: count_from_db(row.usage_count),
            user_usages: row.user_usages.map(|j| j.0),
            applied_orders: row.applied_orders.0,
            analytics: row.analytics.map(|j| j.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_discount_type(raw: &str) -> Result<DiscountType> {
    match raw.trim().to_lowercase().as_str() {
        "percentage" | "percent" => Ok(DiscountType::Percentage),
        "fixed" | "fixed_amount" => Ok(DiscountType::Fixed),
        other => Err(CouponError::StorageError(format!("unknown discount type {other}"))),
    }
}

fn discount_type_str(discount_type: DiscountType) -> &'static str {
    match discount_type { DiscountType::Percentage => "percentage", DiscountType::Fixed => "fixed" }
}

fn count_from_db(value: i64) -> u32 { u32::try_from(value.max(0)).unwrap_or(u32::MAX) }

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().and_then(|e| e.code()).is_some_and(|code| code == "23505")
}

#[async_trait]
impl CouponStore for PgCouponStore {
    async fn get_by_code(&self, code: &CouponCode, active_only: bool) -> Result<Option<Coupon>> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE lower(code) = $1 AND (active OR NOT $2)")
            .bind(code.as_str()).bind(active_only)
            .fetch_optional(&self.pool).await?
            .map(Coupon::try_from).transpose()
    }

    async fn create(&self, coupon: NewCoupon) -> Result<Coupon> {
        coupon.validate().map_err(|e| CouponError::InvalidCoupon(e.to_string()))?;
        let code = CouponCode::new(&coupon.code).map_err(|e| CouponError::InvalidCoupon(e.to_string()))?;
        let c = coupon.into_coupon(code);
        let row = sqlx::query_as::<_, CouponRow>("INSERT INTO coupons (id, code, discount_type, discount_value, active, expires_at, max_uses, max_usage_per_user, usage_count, user_usages, applied_orders, analytics, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, NULL, '[]', NULL, $9, $9) RETURNING *")
            .bind(c.id).bind(c.code.as_str()).bind(discount_type_str(c.discount_type)).bind(c.discount_value)
            .bind(c.active).bind(c.expires_at).bind(c.max_uses.map(i64::from)).bind(i64::from(c.max_usage_per_user))
            .bind(c.created_at)
            .fetch_one(&self.pool).await
            .map_err(|e| if is_unique_violation(&e) { CouponError::DuplicateCode } else { e.into() })?;
        row.try_into()
    }

    async fn update_definition(&self, code: &CouponCode, update: UpdateCoupon) -> Result<Coupon> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE lower(code) = $1 FOR UPDATE")
            .bind(code.as_str())
            .fetch_optional(&mut *tx).await?
            .ok_or(CouponError::CouponNotFound)?;
        let mut coupon = Coupon::try_from(row)?;
        coupon.apply_definition(update).map_err(|e| CouponError::InvalidCoupon(e.to_string()))?;
        let row = sqlx::query_as::<_, CouponRow>("UPDATE coupons SET discount_type = $2, discount_value = $3, active = $4, expires_at = $5, max_uses = $6, max_usage_per_user = $7, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(coupon.id).bind(discount_type_str(coupon.discount_type)).bind(coupon.discount_value).bind(coupon.active)
            .bind(coupon.expires_at).bind(coupon.max_uses.map(i64::from)).bind(i64::from(coupon.max_usage_per_user))
            .fetch_one(&mut *tx).await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn update_fields(&self, code: &CouponCode, patch: CouponPatch) -> Result<Coupon> {
        let row = sqlx::query_as::<_, CouponRow>(
            "UPDATE coupons SET \
                usage_count = COALESCE($2, usage_count), \
                user_usages = COALESCE($3, user_usages), \
                applied_orders = CASE \
                    WHEN $6::text[] IS NOT NULL THEN (SELECT coalesce(jsonb_agg(id), '[]'::jsonb) \
                        FROM jsonb_array_elements_text(applied_orders) AS id WHERE id = ANY($6)) \
                    WHEN $4::text IS NULL OR applied_orders @> jsonb_build_array($4::text) THEN applied_orders \
                    ELSE applied_orders || jsonb_build_array($4::text) END, \
                analytics = COALESCE($5, analytics), \
                updated_at = NOW() \
             WHERE lower(code) = $1 RETURNING *")
            .bind(code.as_str())
            .bind(patch.usage_count().map(i64::from))
            .bind(patch.user_usages().map(Json))
            .bind(patch.applied_order())
            .bind(patch.analytics().map(Json))
            .bind(patch.counted_orders().map(|ids| ids.iter().cloned().collect::<Vec<String>>()))
            .fetch_optional(&self.pool).await?
            .ok_or(CouponError::CouponNotFound)?;
        row.try_into()
    }
}
