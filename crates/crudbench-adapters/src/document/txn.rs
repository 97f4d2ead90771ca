//! Transaction-centric shape: one document per invoice.
//!
//! ```json
//! { "_id": "536365", "invoice_date": "...",
//!   "customer": { "id": 17850, "country": "United Kingdom" },
//!   "items": [ { "stock_code": "85123A", "description": "...", "quantity": 6, "unit_price": 2.55 } ],
//!   "amount": 15.3, "is_cancellation": false }
//! ```

use crudbench_core::{
    async_trait, is_cancellation, AdapterError, Condition, Field, ModelAdapter, OperationKind,
    OperationSpec, Outcome, Payload,
};
use serde_json::{json, Value};
use sled::transaction::{ConflictableTransactionError, TransactionResult};
use sled::{Batch, IVec, Transactional};
use tempfile::TempDir;

use super::{
    assign, decode, encode, line_item, matches_all, payload_value, pick_index, to_filter,
    DocumentStoreConfig, Index, ScanStats, Stage,
};
use crate::error::{StoreError, StoreResult};

/// Database directory name inside the data directory.
pub const DB_DIR: &str = "doc_txn";

const DOCS_TREE: &str = "invoices_txn";
const CUSTOMER_INDEX_TREE: &str = "invoices_txn.customer_id";
const DATE_INDEX_TREE: &str = "invoices_txn.invoice_date";

fn path(field: Field) -> &'static str {
    match field {
        Field::InvoiceNo => "_id",
        Field::CustomerId => "customer.id",
        Field::Country => "customer.country",
        Field::InvoiceDate => "invoice_date",
        Field::StockCode => "items.0.stock_code",
        Field::Description => "items.0.description",
        Field::Quantity => "items.0.quantity",
        Field::UnitPrice => "items.0.unit_price",
        Field::Amount => "amount",
        Field::IsCancellation => "is_cancellation",
    }
}

fn invoice_document(invoice_no: &str, payload: &Payload) -> Value {
    json!({
        "_id": invoice_no,
        "invoice_date": payload_value(payload, Field::InvoiceDate),
        "customer": {
            "id": payload_value(payload, Field::CustomerId),
            "country": payload_value(payload, Field::Country),
        },
        "items": [line_item(payload)],
        "amount": payload_value(payload, Field::Amount),
        "is_cancellation": is_cancellation(invoice_no),
    })
}

/// Pending changes to every tree of the store.
#[derive(Default)]
struct Writes {
    docs: Batch,
    by_customer: Batch,
    by_date: Batch,
}

struct Store {
    db: sled::Db,
    docs: sled::Tree,
    by_customer: Index,
    by_date: Index,
}

impl Store {
    fn open(db: sled::Db) -> StoreResult<Self> {
        let docs = db.open_tree(DOCS_TREE)?;
        let by_customer = Index::open(
            &db,
            CUSTOMER_INDEX_TREE,
            "customer.id_1",
            Field::CustomerId,
            path(Field::CustomerId),
        )?;
        let by_date = Index::open(
            &db,
            DATE_INDEX_TREE,
            "invoice_date_1",
            Field::InvoiceDate,
            path(Field::InvoiceDate),
        )?;
        Ok(Self {
            db,
            docs,
            by_customer,
            by_date,
        })
    }

    fn reindex(
        &self,
        writes: &mut Writes,
        key: &[u8],
        before: Option<&Value>,
        after: Option<&Value>,
    ) {
        self.by_customer
            .reindex(&mut writes.by_customer, key, before, after);
        self.by_date.reindex(&mut writes.by_date, key, before, after);
    }

    /// Apply `writes` to all trees at once. With `new_id`, abort if a
    /// document already has that id.
    fn commit(&self, writes: &Writes, new_id: Option<&str>) -> StoreResult<()> {
        let result: TransactionResult<(), StoreError> =
            (&self.docs, &self.by_customer.tree, &self.by_date.tree).transaction(
                |(docs, by_customer, by_date)| {
                    if let Some(id) = new_id {
                        if docs.get(id.as_bytes())?.is_some() {
                            return Err(ConflictableTransactionError::Abort(
                                StoreError::DuplicateKey(format!("_id {}", id)),
                            ));
                        }
                    }
                    docs.apply_batch(&writes.docs)?;
                    by_customer.apply_batch(&writes.by_customer)?;
                    by_date.apply_batch(&writes.by_date)?;
                    Ok(())
                },
            );
        Ok(result?)
    }

    fn create(&self, op: &OperationSpec) -> StoreResult<Outcome> {
        let invoice_no = op
            .target()
            .invoice_no()
            .ok_or_else(|| StoreError::Unsupported("create requires an invoice target".into()))?;
        let empty = Payload::new();
        let doc = invoice_document(invoice_no, op.payload().unwrap_or(&empty));

        let mut writes = Writes::default();
        writes.docs.insert(invoice_no.as_bytes(), encode(&doc)?);
        self.reindex(&mut writes, invoice_no.as_bytes(), None, Some(&doc));
        self.commit(&writes, Some(invoice_no))?;

        Ok(Outcome::new(1))
    }

    /// Locate documents matching every condition.
    fn find(
        &self,
        conditions: &[Condition],
        filter: &[(&'static str, &Value)],
    ) -> StoreResult<(Vec<(IVec, Value)>, ScanStats)> {
        let invoice_no = conditions
            .iter()
            .find(|c| c.field == Field::InvoiceNo)
            .and_then(|c| c.value.as_str());

        let mut found = Vec::new();
        let mut consider = |key: IVec, bytes: &[u8]| -> StoreResult<()> {
            let doc = decode(bytes)?;
            if matches_all(&doc, filter) {
                found.push((key, doc));
            }
            Ok(())
        };

        let mut stats;
        if let Some(invoice_no) = invoice_no {
            stats = ScanStats::new(Stage::IdHack);
            if let Some(bytes) = self.docs.get(invoice_no.as_bytes())? {
                stats.keys_examined = 1;
                stats.docs_examined = 1;
                consider(IVec::from(invoice_no.as_bytes()), &bytes)?;
            }
        } else if let Some((index, value)) =
            pick_index(&[&self.by_customer, &self.by_date], conditions)
        {
            stats = ScanStats::new(index.stage());
            for key in index.scan(value, &mut stats)? {
                if let Some(bytes) = self.docs.get(&key)? {
                    stats.docs_examined += 1;
                    consider(key, &bytes)?;
                }
            }
        } else {
            stats = ScanStats::new(Stage::CollScan);
            for entry in self.docs.iter() {
                let (key, bytes) = entry?;
                stats.docs_examined += 1;
                consider(key, &bytes)?;
            }
        }

        stats.returned = found.len() as u64;
        Ok((found, stats))
    }

    fn update(&self, payload: &Payload, matched: &[(IVec, Value)]) -> StoreResult<u64> {
        let mut writes = Writes::default();
        for (key, before) in matched {
            let mut after = before.clone();
            for (field, value) in payload {
                assign(&mut after, path(*field), value.clone())?;
            }
            self.reindex(&mut writes, key, Some(before), Some(&after));
            writes.docs.insert(key.clone(), encode(&after)?);
        }
        self.commit(&writes, None)?;
        Ok(matched.len() as u64)
    }

    fn delete(&self, matched: &[(IVec, Value)]) -> StoreResult<u64> {
        let mut writes = Writes::default();
        for (key, doc) in matched {
            self.reindex(&mut writes, key, Some(doc), None);
            writes.docs.remove(key.clone());
        }
        self.commit(&writes, None)?;
        Ok(matched.len() as u64)
    }

    fn execute(&self, op: &OperationSpec, explain: bool) -> StoreResult<Outcome> {
        if op.kind() == OperationKind::Create {
            return self.create(op);
        }

        let conditions = op.conditions();
        let filter = to_filter(&conditions, |c| path(c.field));
        let (matched, stats) = self.find(&conditions, &filter)?;
        let count = match op.kind() {
            OperationKind::Update => {
                let empty = Payload::new();
                self.update(op.payload().unwrap_or(&empty), &matched)?
            }
            OperationKind::Delete => self.delete(&matched)?,
            _ => matched.len() as u64,
        };

        let plan = explain.then(|| stats.into_plan(&filter));
        Ok(Outcome::new(count).with_plan(plan))
    }
}

/// One document per invoice, with the customer embedded.
pub struct TransactionCentricAdapter {
    config: DocumentStoreConfig,
    scratch: Option<TempDir>,
    store: Option<Store>,
}

impl TransactionCentricAdapter {
    pub fn new(config: DocumentStoreConfig) -> Self {
        Self {
            config,
            scratch: None,
            store: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    /// Number of stored invoice documents.
    pub fn document_count(&self) -> usize {
        self.store.as_ref().map_or(0, |store| store.docs.len())
    }

    fn connect(&mut self) -> StoreResult<()> {
        if self.store.is_none() {
            let db = self.config.open_db(&mut self.scratch, DB_DIR)?;
            self.store = Some(Store::open(db)?);
        }
        Ok(())
    }

    /// Flush and drop the database, releasing its lock. Data stays on disk
    /// for the next `connect`.
    fn disconnect(&mut self) -> StoreResult<()> {
        if let Some(store) = self.store.take() {
            store.db.flush()?;
            tracing::debug!("transaction-centric store closed");
        }
        Ok(())
    }

    fn execute_op(&self, op: &OperationSpec) -> StoreResult<Outcome> {
        self.store
            .as_ref()
            .ok_or(StoreError::NotOpen)?
            .execute(op, self.config.explain)
    }
}

impl Default for TransactionCentricAdapter {
    fn default() -> Self {
        Self::new(DocumentStoreConfig::default())
    }
}

#[async_trait]
impl ModelAdapter for TransactionCentricAdapter {
    async fn open(&mut self) -> Result<(), AdapterError> {
        self.connect().map_err(Into::into)
    }

    async fn execute(&mut self, op: &OperationSpec) -> Result<Outcome, AdapterError> {
        self.execute_op(op).map_err(Into::into)
    }

    async fn close(&mut self) -> Result<(), AdapterError> {
        self.disconnect().map_err(Into::into)
    }
}
