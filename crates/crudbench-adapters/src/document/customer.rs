//! Customer-centric shape: one document per customer, invoices embedded.
//!
//! ```json
//! { "_id": 17850, "country": "United Kingdom",
//!   "invoices": [ { "invoice_no": "536365", "invoice_date": "...", "items": [ ... ],
//!                   "amount": 15.3, "is_cancellation": false } ] }
//! ```
//!
//! Reads count customer documents; writes count embedded invoices.

use crudbench_core::{
    async_trait, is_cancellation, AdapterError, Condition, Field, ModelAdapter, OperationKind,
    OperationSpec, Outcome, Payload,
};
use serde_json::{json, Value};
use sled::transaction::{ConflictableTransactionError, TransactionResult};
use sled::{Batch, IVec, Transactional};
use tempfile::TempDir;

use super::{
    assign, customer_key, decode, encode, line_item, matches_all, payload_value, pick_index,
    to_filter, DocumentStoreConfig, Index, ScanStats, Stage,
};
use crate::error::{StoreError, StoreResult};

/// Database directory name inside the data directory.
pub const DB_DIR: &str = "doc_customer";

const DOCS_TREE: &str = "customers_centric";
const INVOICE_INDEX_TREE: &str = "customers_centric.invoices.invoice_no";
const INVOICE_INDEX_NAME: &str = "invoices.invoice_no_1";
const COUNTRY_INDEX_TREE: &str = "customers_centric.country";

/// Path from the customer document root.
fn path(field: Field) -> &'static str {
    match field {
        Field::CustomerId => "_id",
        Field::Country => "country",
        Field::InvoiceNo => "invoices.invoice_no",
        Field::InvoiceDate => "invoices.invoice_date",
        Field::StockCode => "invoices.items.0.stock_code",
        Field::Description => "invoices.items.0.description",
        Field::Quantity => "invoices.items.0.quantity",
        Field::UnitPrice => "invoices.items.0.unit_price",
        Field::Amount => "invoices.amount",
        Field::IsCancellation => "invoices.is_cancellation",
    }
}

/// Path from an embedded invoice.
fn invoice_path(field: Field) -> &'static str {
    let full = path(field);
    full.strip_prefix("invoices.").unwrap_or(full)
}

fn embedded_invoice(invoice_no: &str, payload: &Payload) -> Value {
    json!({
        "invoice_no": invoice_no,
        "invoice_date": payload_value(payload, Field::InvoiceDate),
        "items": [line_item(payload)],
        "amount": payload_value(payload, Field::Amount),
        "is_cancellation": is_cancellation(invoice_no),
    })
}

fn invoices_mut(doc: &mut Value) -> StoreResult<&mut Vec<Value>> {
    doc.get_mut("invoices")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| StoreError::InvalidDocument("customer document has no invoices array".into()))
}

/// A customer document together with the embedded invoices the predicate
/// selected.
struct Matched {
    key: IVec,
    doc: Value,
    invoices: Vec<usize>,
}

/// Pending changes to every tree of the store.
#[derive(Default)]
struct Writes {
    docs: Batch,
    by_invoice: Batch,
    by_country: Batch,
}

struct Store {
    db: sled::Db,
    docs: sled::Tree,
    /// Unique: invoice number to customer key.
    by_invoice: sled::Tree,
    by_country: Index,
}

impl Store {
    fn open(db: sled::Db) -> StoreResult<Self> {
        let docs = db.open_tree(DOCS_TREE)?;
        let by_invoice = db.open_tree(INVOICE_INDEX_TREE)?;
        let by_country = Index::open(
            &db,
            COUNTRY_INDEX_TREE,
            "country_1",
            Field::Country,
            path(Field::Country),
        )?;
        Ok(Self {
            db,
            docs,
            by_invoice,
            by_country,
        })
    }

    fn commit(&self, writes: &Writes) -> StoreResult<()> {
        let result: TransactionResult<(), StoreError> =
            (&self.docs, &self.by_invoice, &self.by_country.tree).transaction(
                |(docs, by_invoice, by_country)| {
                    docs.apply_batch(&writes.docs)?;
                    by_invoice.apply_batch(&writes.by_invoice)?;
                    by_country.apply_batch(&writes.by_country)?;
                    Ok(())
                },
            );
        Ok(result?)
    }

    /// Upsert the customer and push the invoice onto it.
    fn create(&self, op: &OperationSpec) -> StoreResult<Outcome> {
        let invoice_no = op
            .target()
            .invoice_no()
            .ok_or_else(|| StoreError::Unsupported("create requires an invoice target".into()))?;
        let empty = Payload::new();
        let payload = op.payload().unwrap_or(&empty);
        let customer_id = payload
            .get(&Field::CustomerId)
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                StoreError::Unsupported("customer-centric documents are keyed by customer_id".into())
            })?;

        let key = customer_key(customer_id);
        let invoice = embedded_invoice(invoice_no, payload);
        let country = payload_value(payload, Field::Country);

        let result: TransactionResult<(), StoreError> =
            (&self.docs, &self.by_invoice, &self.by_country.tree).transaction(
                |(docs, by_invoice, by_country)| {
                    if by_invoice.get(invoice_no.as_bytes())?.is_some() {
                        return Err(ConflictableTransactionError::Abort(StoreError::DuplicateKey(
                            format!("invoices.invoice_no {}", invoice_no),
                        )));
                    }

                    let before = match docs.get(key)? {
                        Some(bytes) => Some(decode(&bytes).map_err(ConflictableTransactionError::Abort)?),
                        None => None,
                    };
                    // Country is only taken from the first invoice of a customer.
                    let mut after = before.clone().unwrap_or_else(|| {
                        json!({
                            "_id": customer_id,
                            "country": country.clone(),
                            "invoices": [],
                        })
                    });
                    invoices_mut(&mut after)
                        .map_err(ConflictableTransactionError::Abort)?
                        .push(invoice.clone());

                    let mut country_entries = Batch::default();
                    self.by_country
                        .reindex(&mut country_entries, &key, before.as_ref(), Some(&after));

                    docs.insert(&key[..], encode(&after).map_err(ConflictableTransactionError::Abort)?)?;
                    by_invoice.insert(invoice_no.as_bytes(), &key[..])?;
                    by_country.apply_batch(&country_entries)?;
                    Ok(())
                },
            );
        result?;

        Ok(Outcome::new(1))
    }

    fn find(
        &self,
        conditions: &[Condition],
        customer_filter: &[(&'static str, &Value)],
        invoice_filter: &[(&'static str, &Value)],
    ) -> StoreResult<(Vec<Matched>, ScanStats)> {
        let customer_id = conditions
            .iter()
            .find(|c| c.field == Field::CustomerId)
            .and_then(|c| c.value.as_i64());
        let invoice_no = conditions
            .iter()
            .find(|c| c.field == Field::InvoiceNo)
            .and_then(|c| c.value.as_str());

        let mut found = Vec::new();
        let mut consider = |key: IVec, bytes: &[u8]| -> StoreResult<()> {
            let doc = decode(bytes)?;
            if !matches_all(&doc, customer_filter) {
                return Ok(());
            }
            let invoices: Vec<usize> = doc
                .get("invoices")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .enumerate()
                        .filter(|(_, invoice)| matches_all(invoice, invoice_filter))
                        .map(|(i, _)| i)
                        .collect()
                })
                .unwrap_or_default();
            if invoice_filter.is_empty() || !invoices.is_empty() {
                found.push(Matched { key, doc, invoices });
            }
            Ok(())
        };

        let mut stats;
        if let Some(customer_id) = customer_id {
            stats = ScanStats::new(Stage::IdHack);
            let key = customer_key(customer_id);
            if let Some(bytes) = self.docs.get(key)? {
                stats.keys_examined = 1;
                stats.docs_examined = 1;
                consider(IVec::from(&key[..]), &bytes)?;
            }
        } else if let Some(invoice_no) = invoice_no {
            stats = ScanStats::new(Stage::IxScan(INVOICE_INDEX_NAME));
            if let Some(key) = self.by_invoice.get(invoice_no.as_bytes())? {
                stats.keys_examined = 1;
                if let Some(bytes) = self.docs.get(&key)? {
                    stats.docs_examined = 1;
                    consider(key, &bytes)?;
                }
            }
        } else if let Some((index, value)) = pick_index(&[&self.by_country], conditions) {
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

    fn update(&self, payload: &Payload, matched: Vec<Matched>) -> StoreResult<u64> {
        let mut writes = Writes::default();
        let mut updated = 0;
        for Matched {
            key,
            doc: before,
            invoices,
        } in matched
        {
            let mut after = before.clone();
            if let Some(country) = payload.get(&Field::Country) {
                assign(&mut after, path(Field::Country), country.clone())?;
            }

            let embedded = invoices_mut(&mut after)?;
            for &index in &invoices {
                let Some(invoice) = embedded.get_mut(index) else {
                    continue;
                };
                for (field, value) in payload.iter().filter(|(f, _)| !f.is_customer_level()) {
                    assign(invoice, invoice_path(*field), value.clone())?;
                }
                updated += 1;
            }

            self.by_country
                .reindex(&mut writes.by_country, &key, Some(&before), Some(&after));
            writes.docs.insert(key, encode(&after)?);
        }
        self.commit(&writes)?;
        Ok(updated)
    }

    /// Pull the selected invoices; the customer document stays.
    fn delete(&self, matched: Vec<Matched>) -> StoreResult<u64> {
        let mut writes = Writes::default();
        let mut deleted = 0;
        for Matched {
            key,
            mut doc,
            invoices,
        } in matched
        {
            let embedded = invoices_mut(&mut doc)?;
            for &index in invoices.iter().rev() {
                if index >= embedded.len() {
                    continue;
                }
                let pulled = embedded.remove(index);
                if let Some(invoice_no) = pulled.get("invoice_no").and_then(Value::as_str) {
                    writes.by_invoice.remove(invoice_no.as_bytes());
                }
                deleted += 1;
            }

            writes.docs.insert(key, encode(&doc)?);
        }
        self.commit(&writes)?;
        Ok(deleted)
    }

    fn execute(&self, op: &OperationSpec, explain: bool) -> StoreResult<Outcome> {
        match op.kind() {
            OperationKind::Create => return self.create(op),
            OperationKind::Update if op.payload_value(Field::CustomerId).is_some() => {
                return Err(StoreError::Unsupported(
                    "moving an embedded invoice to another customer".into(),
                ));
            }
            _ => {}
        }

        let conditions = op.conditions();
        let (customer_conditions, invoice_conditions): (Vec<Condition>, Vec<Condition>) =
            conditions
                .iter()
                .cloned()
                .partition(|c| c.field.is_customer_level());
        let customer_filter = to_filter(&customer_conditions, |c| path(c.field));
        let invoice_filter = to_filter(&invoice_conditions, |c| invoice_path(c.field));

        let (matched, stats) = self.find(&conditions, &customer_filter, &invoice_filter)?;
        let count = match op.kind() {
            OperationKind::Update => {
                let empty = Payload::new();
                self.update(op.payload().unwrap_or(&empty), matched)?
            }
            OperationKind::Delete => self.delete(matched)?,
            _ => matched.len() as u64,
        };

        let plan = explain.then(|| {
            let filter = to_filter(&conditions, |c| path(c.field));
            stats.into_plan(&filter)
        });
        Ok(Outcome::new(count).with_plan(plan))
    }
}

/// One document per customer holding all of their invoices.
pub struct CustomerCentricAdapter {
    config: DocumentStoreConfig,
    scratch: Option<TempDir>,
    store: Option<Store>,
}

impl CustomerCentricAdapter {
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

    /// Number of stored customer documents.
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

    fn disconnect(&mut self) -> StoreResult<()> {
        if let Some(store) = self.store.take() {
            store.db.flush()?;
            tracing::debug!("customer-centric store closed");
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

impl Default for CustomerCentricAdapter {
    fn default() -> Self {
        Self::new(DocumentStoreConfig::default())
    }
}

#[async_trait]
impl ModelAdapter for CustomerCentricAdapter {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crudbench_core::{Plan, Predicate, Target};

    fn open_adapter() -> CustomerCentricAdapter {
        let mut adapter = CustomerCentricAdapter::default();
        adapter.connect().unwrap();
        adapter
    }

    fn create(adapter: &CustomerCentricAdapter, no: &str, customer: i64, country: &str) {
        let op = OperationSpec::create(
            Target::invoice(no),
            [
                (Field::CustomerId, json!(customer)),
                (Field::Country, json!(country)),
                (Field::StockCode, json!("85123A")),
                (Field::Quantity, json!(6)),
            ],
        )
        .unwrap();
        assert_eq!(adapter.execute_op(&op).unwrap().count, 1);
    }

    fn count(adapter: &CustomerCentricAdapter, op: OperationSpec) -> u64 {
        adapter.execute_op(&op).unwrap().count
    }

    #[test]
    fn test_invoices_embed_under_customer() {
        let adapter = open_adapter();
        create(&adapter, "536365", 17850, "United Kingdom");
        create(&adapter, "536366", 17850, "France");
        assert_eq!(adapter.document_count(), 1);

        let store = adapter.store.as_ref().unwrap();
        let doc = decode(&store.docs.get(customer_key(17850)).unwrap().unwrap()).unwrap();
        assert_eq!(doc["country"], "United Kingdom");
        assert_eq!(doc["invoices"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_create_requires_customer() {
        let adapter = open_adapter();
        let op = OperationSpec::create(Target::invoice("1"), [(Field::Amount, 10)]).unwrap();
        let err = AdapterError::from(adapter.execute_op(&op).unwrap_err());
        assert!(matches!(err, AdapterError::Unsupported(_)));
    }

    #[test]
    fn test_invoice_numbers_unique_across_customers() {
        let adapter = open_adapter();
        create(&adapter, "536365", 17850, "United Kingdom");

        let op = OperationSpec::create(
            Target::invoice("536365"),
            [(Field::CustomerId, json!(13047))],
        )
        .unwrap();
        assert!(matches!(adapter.execute_op(&op), Err(StoreError::DuplicateKey(_))));
    }

    #[test]
    fn test_read_counts_customer_documents() {
        let adapter = open_adapter();
        create(&adapter, "536365", 17850, "United Kingdom");
        create(&adapter, "536366", 17850, "United Kingdom");
        create(&adapter, "536367", 13047, "United Kingdom");

        let by_stock = OperationSpec::read(
            Target::invoice("536365"),
            Predicate::eq(Field::StockCode, "85123A"),
        )
        .unwrap();
        assert_eq!(count(&adapter, by_stock), 2);

        let by_invoice = OperationSpec::read(Target::invoice("536366"), Predicate::target()).unwrap();
        let outcome = adapter.execute_op(&by_invoice).unwrap();
        assert_eq!(outcome.count, 1);
        match outcome.plan {
            Some(Plan::Structured(plan)) => {
                assert_eq!(plan["stage"], "IXSCAN");
                assert_eq!(plan["indexName"], INVOICE_INDEX_NAME);
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_update_counts_embedded_invoices() {
        let adapter = open_adapter();
        create(&adapter, "536365", 17850, "United Kingdom");
        create(&adapter, "536366", 17850, "United Kingdom");

        let op = OperationSpec::update(
            Target::customer(17850),
            [(Field::Quantity, 12)],
            Predicate::target(),
        )
        .unwrap();
        assert_eq!(count(&adapter, op), 2);

        let check = OperationSpec::read(
            Target::invoice("536366"),
            Predicate::target().and(Predicate::eq(Field::Quantity, 12)),
        )
        .unwrap();
        assert_eq!(count(&adapter, check), 1);
    }

    #[test]
    fn test_rekeying_is_unsupported() {
        let adapter = open_adapter();
        create(&adapter, "536365", 17850, "United Kingdom");

        let op = OperationSpec::update(
            Target::invoice("536365"),
            [(Field::CustomerId, 13047)],
            Predicate::target(),
        )
        .unwrap();
        let err = AdapterError::from(adapter.execute_op(&op).unwrap_err());
        assert!(matches!(err, AdapterError::Unsupported(_)));
    }

    #[test]
    fn test_delete_pulls_invoice() {
        let adapter = open_adapter();
        create(&adapter, "536365", 17850, "United Kingdom");

        let op = OperationSpec::delete(Target::invoice("536365"), Predicate::target()).unwrap();
        assert_eq!(count(&adapter, op), 1);

        let by_invoice = OperationSpec::read(Target::invoice("536365"), Predicate::target()).unwrap();
        assert_eq!(count(&adapter, by_invoice), 0);

        // The emptied customer document remains.
        let by_customer = OperationSpec::read(Target::customer(17850), Predicate::target()).unwrap();
        assert_eq!(count(&adapter, by_customer), 1);
        assert_eq!(adapter.document_count(), 1);
    }

    #[test]
    fn test_country_predicate_uses_index() {
        let adapter = open_adapter();
        create(&adapter, "536365", 17850, "United Kingdom");
        create(&adapter, "536366", 13047, "United Kingdom");
        create(&adapter, "536367", 12583, "France");

        let op = OperationSpec::read(Target::customer(0), Predicate::eq(Field::Country, "France"))
            .unwrap();
        let outcome = adapter.execute_op(&op).unwrap();
        assert_eq!(outcome.count, 1);
        match outcome.plan {
            Some(Plan::Structured(plan)) => {
                assert_eq!(plan["stage"], "IXSCAN");
                assert_eq!(plan["indexName"], "country_1");
                assert_eq!(plan["docsExamined"], 1);
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_country_update_moves_index_entry() {
        let adapter = open_adapter();
        create(&adapter, "536365", 17850, "United Kingdom");

        let op = OperationSpec::update(
            Target::invoice("536365"),
            [(Field::Country, "France")],
            Predicate::target(),
        )
        .unwrap();
        assert_eq!(count(&adapter, op), 1);

        let uk = OperationSpec::read(Target::customer(0), Predicate::eq(Field::Country, "United Kingdom"))
            .unwrap();
        let fr = OperationSpec::read(Target::customer(0), Predicate::eq(Field::Country, "France"))
            .unwrap();
        assert_eq!(count(&adapter, uk), 0);
        assert_eq!(count(&adapter, fr), 1);
        assert_eq!(adapter.store.as_ref().unwrap().by_country.tree.len(), 1);
    }

    #[test]
    fn test_duplicate_invoice_leaves_store_unchanged() {
        let adapter = open_adapter();
        create(&adapter, "536365", 17850, "United Kingdom");

        let op = OperationSpec::create(
            Target::invoice("536365"),
            [(Field::CustomerId, json!(13047)), (Field::Country, json!("France"))],
        )
        .unwrap();
        assert!(adapter.execute_op(&op).is_err());

        let store = adapter.store.as_ref().unwrap();
        assert_eq!(adapter.document_count(), 1);
        assert_eq!(store.by_invoice.len(), 1);
        assert_eq!(store.by_country.tree.len(), 1);
    }

    #[test]
    fn test_delete_removes_invoice_index_entry() {
        let adapter = open_adapter();
        create(&adapter, "536365", 17850, "United Kingdom");
        create(&adapter, "536366", 17850, "United Kingdom");

        let op = OperationSpec::delete(Target::invoice("536365"), Predicate::target()).unwrap();
        assert_eq!(count(&adapter, op), 1);

        let store = adapter.store.as_ref().unwrap();
        assert!(store.by_invoice.get("536365").unwrap().is_none());
        assert!(store.by_invoice.get("536366").unwrap().is_some());
        // The invoice number can be reused once pulled.
        create(&adapter, "536365", 13047, "France");
    }

    #[test]
    fn test_close_releases_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = DocumentStoreConfig::new().with_data_dir(dir.path());

        let mut first = CustomerCentricAdapter::new(config.clone());
        first.connect().unwrap();
        create(&first, "536365", 17850, "United Kingdom");
        first.disconnect().unwrap();
        assert!(!first.is_open());

        let mut second = CustomerCentricAdapter::new(config);
        second.connect().unwrap();
        assert_eq!(second.document_count(), 1);
        second.disconnect().unwrap();

        first.connect().unwrap();
        let by_invoice = OperationSpec::read(Target::invoice("536365"), Predicate::target()).unwrap();
        assert_eq!(count(&first, by_invoice), 1);
    }
}
