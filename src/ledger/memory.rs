use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use crate::domain::aggregates::{LedgerOrder, OrderStatus};
use crate::Result;
use super::{OrderLedger, OrderQuery};

/// Order documents held in memory, stored as raw JSON so legacy field names are
/// exercised exactly as they would be in the document database.
#[derive(Clone, Default)]
pub struct InMemoryOrderLedger {
    documents: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl InMemoryOrderLedger {
    pub fn new() -> Self { Self::default() }

    pub async fn insert(&self, order_id: impl Into<String>, document: Value) {
        self.documents.write().await.insert(order_id.into(), document);
    }

    /// Returns false when the order does not exist.
    pub async fn set_status(&self, order_id: &str, status: OrderStatus) -> bool {
        let mut documents = self.documents.write().await;
        match documents.get_mut(order_id).and_then(Value::as_object_mut) {
            Some(doc) => { doc.insert("status".into(), Value::String(status.as_str().to_string())); true }
            None => false,
        }
    }

    pub async fn remove(&self, order_id: &str) -> Option<Value> {
        self.documents.write().await.remove(order_id)
    }

    pub async fn get(&self, order_id: &str) -> Option<LedgerOrder> {
        self.documents.read().await.get(order_id).map(|doc| LedgerOrder::from_document(order_id, doc))
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrderLedger {
    async fn find_orders(&self, query: &OrderQuery) -> Result<Vec<LedgerOrder>> {
        let documents = self.documents.read().await;
        Ok(documents.iter()
            .map(|(id, doc)| LedgerOrder::from_document(id.clone(), doc))
            .filter(|order| query.matches(order))
            .collect())
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<LedgerOrder>> {
        Ok(self.get(order_id).await)
    }
}
