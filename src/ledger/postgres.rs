use async_trait::async_trait;
use sqlx::PgPool;
use crate::domain::aggregates::{LedgerOrder, COUPON_CODE_FIELDS, EMAIL_FIELDS};
use crate::Result;
use super::{OrderLedger, OrderQuery};

/// Orders stored as JSONB documents in the `orders` table.
#[derive(Clone)]
pub struct PgOrderLedger {
    pool: PgPool,
}

impl PgOrderLedger {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

/// First non-blank synonym, lowercased. Mirrors `LedgerOrder::from_document`.
pub(crate) fn synonym_expr(fields: &[&str]) -> String {
    let parts: Vec<String> = fields.iter().map(|f| format!("nullif(btrim(document->>'{f}'), '')")).collect();
    format!("lower(coalesce({}))", parts.join(", "))
}

const STATUS_EXPR: &str = "translate(lower(coalesce(nullif(btrim(document->>'status'), ''), 'pending')), '- ', '__')";

fn filter_clause() -> String {
    format!(
        "{code} = $1 AND ($2::text IS NULL OR {email} = $2) AND NOT ({STATUS_EXPR} = ANY($3))",
        code = synonym_expr(&COUPON_CODE_FIELDS),
        email = synonym_expr(&EMAIL_FIELDS),
    )
}

#[async_trait]
impl OrderLedger for PgOrderLedger {
    async fn find_orders(&self, query: &OrderQuery) -> Result<Vec<LedgerOrder>> {
        let sql = format!("SELECT id, document FROM orders WHERE {} ORDER BY created_at, id", filter_clause());
        let rows = sqlx::query_as::<_, (String, serde_json::Value)>(&sql)
            .bind(query.coupon_code.as_str())
            .bind(query.email.as_ref().map(|e| e.as_str()))
            .bind(query.excluded_spellings())
            .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id, doc)| LedgerOrder::from_document(id, &doc)).collect())
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<LedgerOrder>> {
        let row = sqlx::query_as::<_, (String, serde_json::Value)>("SELECT id, document FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool).await?;
        Ok(row.map(|(id, doc)| LedgerOrder::from_document(id, &doc)))
    }

    async fn count_orders(&self, query: &OrderQuery) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM orders WHERE {}", filter_clause());
        let count: (i64,) = sqlx::query_as(&sql)
            .bind(query.coupon_code.as_str())
            .bind(query.email.as_ref().map(|e| e.as_str()))
            .bind(query.excluded_spellings())
            .fetch_one(&self.pool).await?;
        Ok(u64::try_from(count.0).unwrap_or_default())
    }
}
