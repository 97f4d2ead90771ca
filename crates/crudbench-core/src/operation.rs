//! Storage-model independent description of one CRUD action.
//!
//! An [`OperationSpec`] is validated when it is built. A malformed operation
//! never reaches an adapter, so one model can never apply a write that
//! another model rejects.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The four CRUD operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Read,
    Update,
    Delete,
}

impl OperationKind {
    /// All kinds in CRUD order.
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Create,
        OperationKind::Read,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    /// Lowercase name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Read => "read",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    /// Whether operations of this kind carry a payload.
    pub fn requires_payload(&self) -> bool {
        matches!(self, OperationKind::Create | OperationKind::Update)
    }

    /// Whether operations of this kind carry a predicate.
    pub fn requires_predicate(&self) -> bool {
        !matches!(self, OperationKind::Create)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of the entity an operation addresses.
///
/// An invoice target names a single invoice; a customer target names every
/// invoice belonging to that customer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Invoice(String),
    Customer(i64),
}

impl Target {
    /// Target a single invoice by number.
    pub fn invoice(invoice_no: impl Into<String>) -> Self {
        Target::Invoice(invoice_no.into())
    }

    /// Target the invoices of a customer.
    pub fn customer(customer_id: i64) -> Self {
        Target::Customer(customer_id)
    }

    pub fn invoice_no(&self) -> Option<&str> {
        match self {
            Target::Invoice(no) => Some(no),
            Target::Customer(_) => None,
        }
    }

    pub fn customer_id(&self) -> Option<i64> {
        match self {
            Target::Customer(id) => Some(*id),
            Target::Invoice(_) => None,
        }
    }

    /// The equality condition that selects this target.
    pub fn condition(&self) -> Condition {
        match self {
            Target::Invoice(no) => Condition::new(Field::InvoiceNo, Value::String(no.clone())),
            Target::Customer(id) => Condition::new(Field::CustomerId, Value::from(*id)),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Invoice(no) => write!(f, "invoice {}", no),
            Target::Customer(id) => write!(f, "customer {}", id),
        }
    }
}

/// Logical invoice fields shared by every storage model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    InvoiceNo,
    CustomerId,
    Country,
    InvoiceDate,
    StockCode,
    Description,
    Quantity,
    UnitPrice,
    Amount,
    IsCancellation,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::InvoiceNo,
        Field::CustomerId,
        Field::Country,
        Field::InvoiceDate,
        Field::StockCode,
        Field::Description,
        Field::Quantity,
        Field::UnitPrice,
        Field::Amount,
        Field::IsCancellation,
    ];

    /// Snake-case field name.
    pub fn name(&self) -> &'static str {
        match self {
            Field::InvoiceNo => "invoice_no",
            Field::CustomerId => "customer_id",
            Field::Country => "country",
            Field::InvoiceDate => "invoice_date",
            Field::StockCode => "stock_code",
            Field::Description => "description",
            Field::Quantity => "quantity",
            Field::UnitPrice => "unit_price",
            Field::Amount => "amount",
            Field::IsCancellation => "is_cancellation",
        }
    }

    /// Whether a payload may set this field.
    ///
    /// The invoice number comes from the target and the cancellation flag is
    /// derived from it, so neither can be written directly.
    pub fn is_writable(&self) -> bool {
        !matches!(self, Field::InvoiceNo | Field::IsCancellation)
    }

    /// Whether the field belongs to the customer rather than the invoice.
    pub fn is_customer_level(&self) -> bool {
        matches!(self, Field::CustomerId | Field::Country)
    }

    fn is_nullable(&self) -> bool {
        !matches!(
            self,
            Field::InvoiceNo | Field::CustomerId | Field::IsCancellation
        )
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            Field::InvoiceNo
            | Field::Country
            | Field::InvoiceDate
            | Field::StockCode
            | Field::Description => value.is_string(),
            Field::CustomerId | Field::Quantity => value.is_i64(),
            Field::UnitPrice | Field::Amount => value.is_number(),
            Field::IsCancellation => value.is_boolean(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.name() == s)
            .ok_or_else(|| Error::InvalidOperation(format!("unknown field `{}`", s)))
    }
}

/// One equality condition on a logical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: Field,
    pub value: Value,
}

impl Condition {
    pub fn new(field: Field, value: Value) -> Self {
        Self { field, value }
    }
}

/// Filter selecting the records an operation applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Match the operation's target.
    Target,
    /// Match records whose field equals the value.
    FieldEq { field: Field, value: Value },
    /// Match records satisfying every inner predicate.
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn target() -> Self {
        Predicate::Target
    }

    pub fn eq(field: Field, value: impl Into<Value>) -> Self {
        Predicate::FieldEq {
            field,
            value: value.into(),
        }
    }

    /// Conjoin another predicate.
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::All(mut parts) => {
                parts.push(other);
                Predicate::All(parts)
            }
            first => Predicate::All(vec![first, other]),
        }
    }

    /// Flatten into a conjunction of equality conditions, resolving
    /// [`Predicate::Target`] against `target`.
    pub fn conditions(&self, target: &Target) -> Vec<Condition> {
        let mut out = Vec::new();
        self.collect(target, &mut out);
        out
    }

    fn collect(&self, target: &Target, out: &mut Vec<Condition>) {
        match self {
            Predicate::Target => out.push(target.condition()),
            Predicate::FieldEq { field, value } => out.push(Condition::new(*field, value.clone())),
            Predicate::All(parts) => {
                for part in parts {
                    part.collect(target, out);
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Predicate::Target => Ok(()),
            Predicate::FieldEq { field, value } => {
                if value.is_null() {
                    return Err(Error::InvalidOperation(format!(
                        "cannot compare `{}` with null",
                        field
                    )));
                }
                if !field.accepts(value) {
                    return Err(Error::InvalidOperation(format!(
                        "value {} is not valid for `{}`",
                        value, field
                    )));
                }
                Ok(())
            }
            Predicate::All(parts) => {
                if parts.is_empty() {
                    return Err(Error::InvalidOperation("empty predicate conjunction".into()));
                }
                parts.iter().try_for_each(Predicate::validate)
            }
        }
    }
}

/// Field values written by a create or update.
pub type Payload = BTreeMap<Field, Value>;

/// A validated, immutable CRUD operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    kind: OperationKind,
    target: Target,
    payload: Option<Payload>,
    predicate: Option<Predicate>,
}

impl OperationSpec {
    /// Build an operation, checking that payload and predicate presence
    /// matches the kind and that every field and value is acceptable.
    pub fn new(
        kind: OperationKind,
        target: Target,
        payload: Option<Payload>,
        predicate: Option<Predicate>,
    ) -> Result<Self> {
        match (kind.requires_payload(), &payload) {
            (true, None) => {
                return Err(Error::InvalidOperation(format!("{} requires a payload", kind)))
            }
            (false, Some(_)) => {
                return Err(Error::InvalidOperation(format!(
                    "{} does not take a payload",
                    kind
                )))
            }
            _ => {}
        }
        match (kind.requires_predicate(), &predicate) {
            (true, None) => {
                return Err(Error::InvalidOperation(format!(
                    "{} requires a predicate",
                    kind
                )))
            }
            (false, Some(_)) => {
                return Err(Error::InvalidOperation(format!(
                    "{} does not take a predicate",
                    kind
                )))
            }
            _ => {}
        }

        match &target {
            Target::Invoice(no) if no.is_empty() => {
                return Err(Error::InvalidOperation(
                    "invoice number must not be empty".into(),
                ))
            }
            Target::Customer(_) if kind == OperationKind::Create => {
                return Err(Error::InvalidOperation(
                    "create requires an invoice target".into(),
                ))
            }
            _ => {}
        }

        if let Some(payload) = &payload {
            validate_payload(payload)?;
        }
        if let Some(predicate) = &predicate {
            predicate.validate()?;
        }

        Ok(Self {
            kind,
            target,
            payload,
            predicate,
        })
    }

    pub fn create<I, V>(target: Target, payload: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Field, V)>,
        V: Into<Value>,
    {
        Self::new(
            OperationKind::Create,
            target,
            Some(collect_payload(payload)),
            None,
        )
    }

    pub fn read(target: Target, predicate: Predicate) -> Result<Self> {
        Self::new(OperationKind::Read, target, None, Some(predicate))
    }

    pub fn update<I, V>(target: Target, payload: I, predicate: Predicate) -> Result<Self>
    where
        I: IntoIterator<Item = (Field, V)>,
        V: Into<Value>,
    {
        Self::new(
            OperationKind::Update,
            target,
            Some(collect_payload(payload)),
            Some(predicate),
        )
    }

    pub fn delete(target: Target, predicate: Predicate) -> Result<Self> {
        Self::new(OperationKind::Delete, target, None, Some(predicate))
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Value written to `field`, if the payload sets it.
    pub fn payload_value(&self, field: Field) -> Option<&Value> {
        self.payload.as_ref().and_then(|payload| payload.get(&field))
    }

    /// The predicate flattened into equality conditions. Empty for creates.
    pub fn conditions(&self) -> Vec<Condition> {
        self.predicate
            .as_ref()
            .map(|predicate| predicate.conditions(&self.target))
            .unwrap_or_default()
    }
}

impl fmt::Display for OperationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.target)
    }
}

fn collect_payload<I, V>(payload: I) -> Payload
where
    I: IntoIterator<Item = (Field, V)>,
    V: Into<Value>,
{
    payload
        .into_iter()
        .map(|(field, value)| (field, value.into()))
        .collect()
}

fn validate_payload(payload: &Payload) -> Result<()> {
    if payload.is_empty() {
        return Err(Error::InvalidOperation(
            "payload must set at least one field".into(),
        ));
    }
    for (field, value) in payload {
        if !field.is_writable() {
            return Err(Error::InvalidOperation(format!(
                "`{}` cannot be written",
                field
            )));
        }
        if value.is_null() {
            if !field.is_nullable() {
                return Err(Error::InvalidOperation(format!(
                    "`{}` cannot be null",
                    field
                )));
            }
            continue;
        }
        if !field.accepts(value) {
            return Err(Error::InvalidOperation(format!(
                "value {} is not valid for `{}`",
                value, field
            )));
        }
    }
    Ok(())
}

/// Whether an invoice number denotes a cancellation (`C` prefix).
pub fn is_cancellation(invoice_no: &str) -> bool {
    invoice_no.starts_with('C')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_requires_payload() {
        let err = OperationSpec::new(OperationKind::Create, Target::invoice("1"), None, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_read_rejects_payload() {
        let mut payload = Payload::new();
        payload.insert(Field::Amount, json!(10));
        let err = OperationSpec::new(
            OperationKind::Read,
            Target::invoice("1"),
            Some(payload),
            Some(Predicate::target()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_predicate_required_for_read_update_delete() {
        for kind in [OperationKind::Read, OperationKind::Delete] {
            assert!(OperationSpec::new(kind, Target::invoice("1"), None, None).is_err());
        }
        let mut payload = Payload::new();
        payload.insert(Field::Amount, json!(20));
        assert!(OperationSpec::new(
            OperationKind::Update,
            Target::invoice("1"),
            Some(payload),
            None
        )
        .is_err());
    }

    #[test]
    fn test_create_rejects_predicate() {
        let mut payload = Payload::new();
        payload.insert(Field::Amount, json!(10));
        let err = OperationSpec::new(
            OperationKind::Create,
            Target::invoice("1"),
            Some(payload),
            Some(Predicate::target()),
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidOperation("create does not take a predicate".into())
        );
    }

    #[test]
    fn test_create_requires_invoice_target() {
        let err = OperationSpec::create(Target::customer(17850), [(Field::Amount, 1)]).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_payload_validation() {
        assert!(OperationSpec::create(Target::invoice("1"), Vec::<(Field, Value)>::new()).is_err());
        assert!(OperationSpec::create(Target::invoice("1"), [(Field::InvoiceNo, "2")]).is_err());
        assert!(OperationSpec::create(Target::invoice("1"), [(Field::Quantity, "many")]).is_err());
        assert!(OperationSpec::create(Target::invoice("1"), [(Field::CustomerId, Value::Null)]).is_err());
        assert!(OperationSpec::create(Target::invoice("1"), [(Field::Description, Value::Null)]).is_ok());
        assert!(OperationSpec::create(Target::invoice("1"), [(Field::UnitPrice, json!(2.55))]).is_ok());
    }

    #[test]
    fn test_predicate_validation() {
        let empty = Predicate::All(vec![]);
        assert!(OperationSpec::read(Target::invoice("1"), empty).is_err());

        let null = Predicate::eq(Field::Country, Value::Null);
        assert!(OperationSpec::read(Target::invoice("1"), null).is_err());

        let mistyped = Predicate::eq(Field::CustomerId, "abc");
        assert!(OperationSpec::read(Target::invoice("1"), mistyped).is_err());
    }

    #[test]
    fn test_conditions_resolve_target() {
        let op = OperationSpec::update(
            Target::invoice("536365"),
            [(Field::Quantity, 9)],
            Predicate::target().and(Predicate::eq(Field::StockCode, "85123A")),
        )
        .unwrap();

        assert_eq!(
            op.conditions(),
            vec![
                Condition::new(Field::InvoiceNo, json!("536365")),
                Condition::new(Field::StockCode, json!("85123A")),
            ]
        );
        assert_eq!(op.payload_value(Field::Quantity), Some(&json!(9)));

        let by_customer = OperationSpec::read(Target::customer(17850), Predicate::target()).unwrap();
        assert_eq!(
            by_customer.conditions(),
            vec![Condition::new(Field::CustomerId, json!(17850))]
        );
    }

    #[test]
    fn test_field_from_str() {
        assert_eq!("unit_price".parse::<Field>().unwrap(), Field::UnitPrice);
        assert!("price".parse::<Field>().is_err());
    }

    #[test]
    fn test_is_cancellation() {
        assert!(is_cancellation("C536379"));
        assert!(!is_cancellation("536365"));
    }
}
