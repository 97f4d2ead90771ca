//! Document-store models on sled.
//!
//! Documents are serde_json values stored under a primary key, with
//! secondary indexes kept in separate trees. Both shapes share the path
//! helpers and access-path statistics defined here.

mod customer;
mod txn;

pub use customer::CustomerCentricAdapter;
pub use txn::TransactionCentricAdapter;

use std::fmt;
use std::path::{Path, PathBuf};

use crudbench_core::{Condition, Field, Payload, Plan};
use serde_json::{json, Map, Value};
use sled::IVec;
use tempfile::TempDir;

use crate::error::{StoreError, StoreResult};
use crate::location;

/// Configuration shared by both document adapters.
#[derive(Debug, Clone)]
pub struct DocumentStoreConfig {
    /// Directory holding the sled database. `None` uses a scratch directory.
    pub data_dir: Option<PathBuf>,

    /// Sled page cache size in bytes.
    pub cache_capacity: u64,

    /// Attach access-path statistics to each predicate operation.
    pub explain: bool,
}

impl DocumentStoreConfig {
    pub fn new() -> Self {
        Self {
            data_dir: None,
            cache_capacity: 64 * 1024 * 1024,
            explain: true,
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    pub fn with_explain(mut self, enabled: bool) -> Self {
        self.explain = enabled;
        self
    }

    pub(crate) fn open_db(&self, scratch: &mut Option<TempDir>, name: &str) -> StoreResult<sled::Db> {
        let path = location::resolve(self.data_dir.as_deref(), scratch, name)?;
        open_sled(&path, self.cache_capacity)
    }
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn open_sled(path: &Path, cache_capacity: u64) -> StoreResult<sled::Db> {
    let db = sled::Config::new()
        .path(path)
        .cache_capacity(cache_capacity)
        .open()?;
    tracing::debug!(path = %path.display(), "document store opened");
    Ok(db)
}

pub(crate) const EMPTY: &[u8] = &[];

/// Primary key of a customer document.
pub(crate) fn customer_key(customer_id: i64) -> [u8; 8] {
    customer_id.to_be_bytes()
}

/// Key prefix a secondary index files `value` under. Nulls and composite
/// values are not indexed.
pub(crate) fn index_prefix(value: &Value) -> Option<Vec<u8>> {
    let mut prefix = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?
            .to_be_bytes()
            .to_vec(),
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Bool(b) => vec![u8::from(*b)],
        _ => return None,
    };
    prefix.push(0);
    Some(prefix)
}

/// Non-unique secondary index over one document path.
///
/// Entries are `prefix(value) ++ primary key` with an empty value, so all
/// documents sharing a value are found with one prefix scan.
pub(crate) struct Index {
    pub name: &'static str,
    pub field: Field,
    pub path: &'static str,
    pub tree: sled::Tree,
}

impl Index {
    pub fn open(
        db: &sled::Db,
        tree: &str,
        name: &'static str,
        field: Field,
        path: &'static str,
    ) -> StoreResult<Self> {
        Ok(Self {
            name,
            field,
            path,
            tree: db.open_tree(tree)?,
        })
    }

    pub fn stage(&self) -> Stage {
        Stage::IxScan(self.name)
    }

    /// Entry for `doc` stored under `key`, if the indexed path holds a value.
    pub fn entry(&self, doc: &Value, key: &[u8]) -> Option<Vec<u8>> {
        let mut entry = index_prefix(lookup(doc, self.path)?)?;
        entry.extend_from_slice(key);
        Some(entry)
    }

    /// Record in `batch` the move of `key` from its entry in `before` to its
    /// entry in `after`. Removals must come first in a batch.
    pub fn reindex(
        &self,
        batch: &mut sled::Batch,
        key: &[u8],
        before: Option<&Value>,
        after: Option<&Value>,
    ) {
        let old = before.and_then(|doc| self.entry(doc, key));
        let new = after.and_then(|doc| self.entry(doc, key));
        if old == new {
            return;
        }
        if let Some(old) = old {
            batch.remove(old);
        }
        if let Some(new) = new {
            batch.insert(new, EMPTY);
        }
    }

    /// Primary keys filed under `value`.
    pub fn scan(&self, value: &Value, stats: &mut ScanStats) -> StoreResult<Vec<IVec>> {
        let Some(prefix) = index_prefix(value) else {
            return Ok(Vec::new());
        };
        let mut keys = Vec::new();
        for entry in self.tree.scan_prefix(&prefix) {
            let (key, _) = entry?;
            stats.keys_examined += 1;
            keys.push(IVec::from(&key[prefix.len()..]));
        }
        Ok(keys)
    }
}

/// The first index with a usable equality condition, and its value.
pub(crate) fn pick_index<'a>(
    indexes: &[&'a Index],
    conditions: &'a [Condition],
) -> Option<(&'a Index, &'a Value)> {
    indexes.iter().find_map(|index| {
        conditions
            .iter()
            .find(|c| c.field == index.field && index_prefix(&c.value).is_some())
            .map(|c| (*index, &c.value))
    })
}

pub(crate) fn decode(bytes: &[u8]) -> StoreResult<Value> {
    Ok(serde_json::from_slice(bytes)?)
}

pub(crate) fn encode(doc: &Value) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(doc)?)
}

/// Payload value for `field`, or null when absent.
pub(crate) fn payload_value(payload: &Payload, field: Field) -> Value {
    payload.get(&field).cloned().unwrap_or(Value::Null)
}

/// The single line item an invoice is created with.
pub(crate) fn line_item(payload: &Payload) -> Value {
    json!({
        "stock_code": payload_value(payload, Field::StockCode),
        "description": payload_value(payload, Field::Description),
        "quantity": payload_value(payload, Field::Quantity),
        "unit_price": payload_value(payload, Field::UnitPrice),
    })
}

/// Equality as a document store compares it: numbers by value regardless
/// of integer or float encoding.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => left == right,
    }
}

/// Resolve a dotted path such as `items.0.quantity`.
pub(crate) fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Set a dotted path, creating intermediate objects.
///
/// Array segments must address an existing element.
pub(crate) fn assign(doc: &mut Value, path: &str, value: Value) -> StoreResult<()> {
    let mut segments = path.split('.').peekable();
    let mut node = doc;

    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();
        node = match node {
            Value::Object(map) => {
                if last {
                    map.insert(segment.to_string(), value);
                    return Ok(());
                }
                map.entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()))
            }
            Value::Array(items) => {
                let slot = segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| {
                        StoreError::InvalidDocument(format!("no element `{}` in `{}`", segment, path))
                    })?;
                if last {
                    *slot = value;
                    return Ok(());
                }
                slot
            }
            _ => {
                return Err(StoreError::InvalidDocument(format!(
                    "cannot descend into `{}` of `{}`",
                    segment, path
                )))
            }
        };
    }

    Err(StoreError::InvalidDocument("empty path".into()))
}

/// Whether every `(path, value)` pair matches `doc`.
pub(crate) fn matches_all(doc: &Value, filter: &[(&'static str, &Value)]) -> bool {
    filter
        .iter()
        .all(|(path, value)| lookup(doc, path).is_some_and(|found| values_equal(found, value)))
}

/// How candidates were located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    /// Direct primary-key lookup.
    IdHack,
    /// Secondary index scan.
    IxScan(&'static str),
    /// Full collection scan.
    CollScan,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::IdHack => write!(f, "IDHACK"),
            Stage::IxScan(_) => write!(f, "IXSCAN"),
            Stage::CollScan => write!(f, "COLLSCAN"),
        }
    }
}

/// Execution statistics for one predicate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScanStats {
    pub stage: Stage,
    pub keys_examined: u64,
    pub docs_examined: u64,
    pub returned: u64,
}

impl ScanStats {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            keys_examined: 0,
            docs_examined: 0,
            returned: 0,
        }
    }

    pub fn into_plan(self, filter: &[(&'static str, &Value)]) -> Plan {
        let filter: Map<String, Value> = filter
            .iter()
            .map(|(path, value)| (path.to_string(), (*value).clone()))
            .collect();

        let mut plan = json!({
            "stage": self.stage.to_string(),
            "keysExamined": self.keys_examined,
            "docsExamined": self.docs_examined,
            "nReturned": self.returned,
            "filter": filter,
        });
        if let (Stage::IxScan(index), Value::Object(map)) = (self.stage, &mut plan) {
            map.insert("indexName".into(), Value::String(index.to_string()));
        }
        Plan::Structured(plan)
    }
}

/// Pair each condition with its document path.
pub(crate) fn to_filter<'a>(
    conditions: &'a [Condition],
    path: impl Fn(&Condition) -> &'static str,
) -> Vec<(&'static str, &'a Value)> {
    conditions.iter().map(|c| (path(c), &c.value)).collect()
}
