//! Relational model on SQLite.
//!
//! Customers and invoices live in separate tables; the `invoice_lines` view
//! joins them back into the logical invoice record that predicates address.

use std::path::PathBuf;

use crudbench_core::{
    async_trait, is_cancellation, AdapterError, Condition, Field, ModelAdapter, OperationKind,
    OperationSpec, Outcome, Payload, Plan,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use serde_json::Value;
use tempfile::TempDir;

use crate::error::{StoreError, StoreResult};
use crate::location;

/// SQLite database file name inside the data directory.
pub const DB_FILE: &str = "relational.db";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    customer_id INTEGER PRIMARY KEY,
    country TEXT
);

CREATE TABLE IF NOT EXISTS invoices (
    invoice_no TEXT PRIMARY KEY,
    customer_id INTEGER REFERENCES customers(customer_id),
    invoice_date TEXT,
    stock_code TEXT,
    description TEXT,
    quantity INTEGER,
    unit_price REAL,
    amount REAL,
    is_cancellation INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_invoices_customer ON invoices(customer_id);
CREATE INDEX IF NOT EXISTS idx_invoices_date ON invoices(invoice_date);
CREATE INDEX IF NOT EXISTS idx_customers_country ON customers(country);

CREATE TEMP TABLE IF NOT EXISTS matched_invoices (invoice_no TEXT PRIMARY KEY);

CREATE VIEW IF NOT EXISTS invoice_lines AS
SELECT
    i.invoice_no, i.customer_id, c.country, i.invoice_date, i.stock_code,
    i.description, i.quantity, i.unit_price, i.amount, i.is_cancellation
FROM invoices i
LEFT JOIN customers c ON c.customer_id = i.customer_id;
"#;

const LINE_COLUMNS: &str = "invoice_no, customer_id, country, invoice_date, stock_code, \
                            description, quantity, unit_price, amount, is_cancellation";

/// Fields stored on the `invoices` table, in insert order after `invoice_no`.
const INVOICE_FIELDS: [Field; 7] = [
    Field::CustomerId,
    Field::InvoiceDate,
    Field::StockCode,
    Field::Description,
    Field::Quantity,
    Field::UnitPrice,
    Field::Amount,
];

/// Relational adapter configuration.
#[derive(Debug, Clone)]
pub struct RelationalConfig {
    /// Directory holding the database file. `None` uses a scratch directory.
    pub data_dir: Option<PathBuf>,

    /// Enforce foreign keys between invoices and customers.
    pub foreign_keys: bool,

    /// Capture `EXPLAIN QUERY PLAN` output for predicate queries.
    pub explain: bool,
}

impl RelationalConfig {
    pub fn new() -> Self {
        Self {
            data_dir: None,
            foreign_keys: true,
            explain: true,
        }
    }

    /// Keep the database file in `dir`.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn with_explain(mut self, enabled: bool) -> Self {
        self.explain = enabled;
        self
    }
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One row of the `invoice_lines` view.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceLine {
    pub invoice_no: String,
    pub customer_id: Option<i64>,
    pub country: Option<String>,
    pub invoice_date: Option<String>,
    pub stock_code: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<f64>,
    pub amount: Option<f64>,
    pub is_cancellation: bool,
}

impl InvoiceLine {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            invoice_no: row.get(0)?,
            customer_id: row.get(1)?,
            country: row.get(2)?,
            invoice_date: row.get(3)?,
            stock_code: row.get(4)?,
            description: row.get(5)?,
            quantity: row.get(6)?,
            unit_price: row.get(7)?,
            amount: row.get(8)?,
            is_cancellation: row.get(9)?,
        })
    }
}

/// SQLite-backed relational model.
pub struct RelationalAdapter {
    config: RelationalConfig,
    scratch: Option<TempDir>,
    conn: Option<Connection>,
}

impl RelationalAdapter {
    pub fn new(config: RelationalConfig) -> Self {
        Self {
            config,
            scratch: None,
            conn: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn connect(&mut self) -> StoreResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        let path = location::resolve(self.config.data_dir.as_deref(), &mut self.scratch, DB_FILE)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "foreign_keys", self.config.foreign_keys)?;
        conn.execute_batch(SCHEMA)?;

        tracing::debug!(path = %path.display(), "relational store opened");
        self.conn = Some(conn);
        Ok(())
    }

    fn disconnect(&mut self) -> StoreResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| StoreError::Sqlite(err))?;
            tracing::debug!("relational store closed");
        }
        Ok(())
    }

    fn execute_op(&mut self, op: &OperationSpec) -> StoreResult<Outcome> {
        let explain = self.config.explain;
        let conn = self.conn.as_mut().ok_or(StoreError::NotOpen)?;
        match op.kind() {
            OperationKind::Create => create(conn, op),
            OperationKind::Read => read(conn, op, explain),
            OperationKind::Update => update(conn, op, explain),
            OperationKind::Delete => delete(conn, op, explain),
        }
    }
}

impl Default for RelationalAdapter {
    fn default() -> Self {
        Self::new(RelationalConfig::default())
    }
}

#[async_trait]
impl ModelAdapter for RelationalAdapter {
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

// -----------------------------------------------------------------------------
// Operations
// -----------------------------------------------------------------------------

fn create(conn: &mut Connection, op: &OperationSpec) -> StoreResult<Outcome> {
    let invoice_no = op
        .target()
        .invoice_no()
        .ok_or_else(|| StoreError::Unsupported("create requires an invoice target".into()))?;
    let empty = Payload::new();
    let payload = op.payload().unwrap_or(&empty);

    let customer_id = payload.get(&Field::CustomerId).and_then(Value::as_i64);
    let country = payload.get(&Field::Country).filter(|v| !v.is_null());
    if customer_id.is_none() && country.is_some() {
        return Err(StoreError::Unsupported(
            "country is stored on the customer row and requires customer_id".into(),
        ));
    }

    let tx = conn.transaction()?;
    if let Some(id) = customer_id {
        let country = country.map(to_sql).unwrap_or(SqlValue::Null);
        tx.execute(
            "INSERT OR IGNORE INTO customers (customer_id, country) VALUES (?1, ?2)",
            rusqlite::params![id, country],
        )?;
    }

    let mut values = Vec::with_capacity(INVOICE_FIELDS.len() + 2);
    values.push(SqlValue::Text(invoice_no.to_string()));
    values.extend(
        INVOICE_FIELDS
            .iter()
            .map(|field| payload.get(field).map(to_sql).unwrap_or(SqlValue::Null)),
    );
    values.push(SqlValue::Integer(i64::from(is_cancellation(invoice_no))));

    let inserted = tx.execute(
        "INSERT INTO invoices (invoice_no, customer_id, invoice_date, stock_code, description, \
         quantity, unit_price, amount, is_cancellation) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params_from_iter(values),
    );
    match inserted {
        Err(rusqlite::Error::SqliteFailure(failure, _))
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            return Err(StoreError::DuplicateKey(format!("invoice {}", invoice_no)));
        }
        other => other?,
    };
    tx.commit()?;

    Ok(Outcome::new(1))
}

fn read(conn: &mut Connection, op: &OperationSpec, explain: bool) -> StoreResult<Outcome> {
    let (filter, params) = where_clause(&op.conditions());
    let sql = format!("SELECT {} FROM invoice_lines WHERE {}", LINE_COLUMNS, filter);
    let plan = if explain {
        explain_query_plan(conn, &sql, &params)?
    } else {
        None
    };

    let mut stmt = conn.prepare(&sql)?;
    let lines = stmt
        .query_map(params_from_iter(params.iter()), InvoiceLine::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Outcome::new(lines.len() as u64).with_plan(plan))
}

fn update(conn: &mut Connection, op: &OperationSpec, explain: bool) -> StoreResult<Outcome> {
    let empty = Payload::new();
    let payload = op.payload().unwrap_or(&empty);
    let (filter, params) = where_clause(&op.conditions());
    let select = format!("SELECT invoice_no FROM invoice_lines WHERE {}", filter);
    let plan = if explain {
        explain_query_plan(conn, &select, &params)?
    } else {
        None
    };

    let assignments: Vec<(&Field, &Value)> = payload
        .iter()
        .filter(|(field, _)| !field.is_customer_level() || **field == Field::CustomerId)
        .collect();
    let country = payload.get(&Field::Country);

    let tx = conn.transaction()?;

    if let Some(id) = payload.get(&Field::CustomerId).and_then(Value::as_i64) {
        tx.execute(
            "INSERT OR IGNORE INTO customers (customer_id) VALUES (?1)",
            [id],
        )?;
    }

    // A country change writes two tables, and the invoice write may change
    // what the filter selects, so the matches are pinned first.
    let (pinned, matches, bound) = if country.is_some() {
        tx.execute("DELETE FROM temp.matched_invoices", [])?;
        let pinned = tx.execute(
            &format!("INSERT INTO temp.matched_invoices {}", select),
            params_from_iter(params.iter()),
        )?;
        (
            Some(pinned),
            "SELECT invoice_no FROM temp.matched_invoices".to_string(),
            Vec::new(),
        )
    } else {
        (None, select, params)
    };

    let mut updated = 0;
    if !assignments.is_empty() {
        let offset = bound.len();
        let set_clause: Vec<String> = assignments
            .iter()
            .enumerate()
            .map(|(i, (field, _))| format!("{} = ?{}", field.name(), offset + i + 1))
            .collect();
        let sql = format!(
            "UPDATE invoices SET {} WHERE invoice_no IN ({})",
            set_clause.join(", "),
            matches
        );
        let values = bound
            .into_iter()
            .chain(assignments.iter().map(|(_, value)| to_sql(value)));
        updated = tx.execute(&sql, params_from_iter(values))?;
    }

    if let Some(country) = country {
        let sql = format!(
            "UPDATE customers SET country = ?1 WHERE customer_id IN \
             (SELECT customer_id FROM invoices WHERE invoice_no IN ({}))",
            matches
        );
        tx.execute(&sql, [to_sql(country)])?;
    }

    tx.commit()?;
    let count = pinned.unwrap_or(updated);
    Ok(Outcome::new(count as u64).with_plan(plan))
}

fn delete(conn: &mut Connection, op: &OperationSpec, explain: bool) -> StoreResult<Outcome> {
    let (filter, params) = where_clause(&op.conditions());
    let sql = format!(
        "DELETE FROM invoices WHERE invoice_no IN (SELECT invoice_no FROM invoice_lines WHERE {})",
        filter
    );
    let plan = if explain {
        explain_query_plan(conn, &sql, &params)?
    } else {
        None
    };

    let deleted = conn.execute(&sql, params_from_iter(params.iter()))?;
    Ok(Outcome::new(deleted as u64).with_plan(plan))
}

// -----------------------------------------------------------------------------
// SQL helpers
// -----------------------------------------------------------------------------

/// Build `a = ?1 AND b = ?2` over the `invoice_lines` columns.
///
/// Column names come from [`Field::name`], never from caller input.
fn where_clause(conditions: &[Condition]) -> (String, Vec<SqlValue>) {
    if conditions.is_empty() {
        return ("1 = 1".to_string(), Vec::new());
    }

    let clauses: Vec<String> = conditions
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", c.field.name(), i + 1))
        .collect();
    let params = conditions.iter().map(|c| to_sql(&c.value)).collect();
    (clauses.join(" AND "), params)
}

fn explain_query_plan(
    conn: &Connection,
    sql: &str,
    params: &[SqlValue],
) -> StoreResult<Option<Plan>> {
    let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {}", sql))?;
    let details = stmt
        .query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(3))?
        .collect::<Result<Vec<_>, _>>()?;

    if details.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Plan::Text(details.join("\n"))))
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
