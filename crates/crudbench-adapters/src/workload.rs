//! Operation sequences for benchmark runs.
//!
//! Invoice data is generated from a seeded RNG so every run of the same
//! workload issues identical operations.

use chrono::{DateTime, Duration as ChronoDuration};
use crudbench_core::{Field, OperationSpec, Predicate, Result, Target};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

/// First invoice number handed out by the generator.
const FIRST_INVOICE: u64 = 536_365;

/// Unix timestamp of 2010-12-01 08:26.
const FIRST_INVOICE_AT: i64 = 1_291_191_960;

const COUNTRIES: [&str; 8] = [
    "United Kingdom",
    "France",
    "Germany",
    "EIRE",
    "Spain",
    "Netherlands",
    "Belgium",
    "Switzerland",
];

const PRODUCTS: [(&str, &str); 8] = [
    ("85123A", "WHITE HANGING HEART T-LIGHT HOLDER"),
    ("71053", "WHITE METAL LANTERN"),
    ("84406B", "CREAM CUPID HEARTS COAT HANGER"),
    ("84029G", "KNITTED UNION FLAG HOT WATER BOTTLE"),
    ("22752", "SET 7 BABUSHKA NESTING BOXES"),
    ("21730", "GLASS STAR FROSTED T-LIGHT HOLDER"),
    ("22633", "HAND WARMER UNION JACK"),
    ("22632", "HAND WARMER RED POLKA DOT"),
];

/// Workload size presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scale {
    /// 10 invoices, for quick checks.
    Tiny,
    /// 100 invoices.
    #[default]
    Small,
    /// 1,000 invoices.
    Medium,
    /// 10,000 invoices.
    Large,
}

impl Scale {
    pub fn invoices(&self) -> usize {
        match self {
            Scale::Tiny => 10,
            Scale::Small => 100,
            Scale::Medium => 1_000,
            Scale::Large => 10_000,
        }
    }
}

/// One generated invoice with a single line item.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceData {
    pub invoice_no: String,
    pub customer_id: i64,
    pub country: String,
    pub invoice_date: String,
    pub stock_code: String,
    pub description: String,
    pub quantity: i64,
    pub unit_price: f64,
}

impl InvoiceData {
    /// Line total rounded to cents.
    pub fn amount(&self) -> f64 {
        (self.quantity as f64 * self.unit_price * 100.0).round() / 100.0
    }

    pub fn payload(&self) -> Vec<(Field, Value)> {
        vec![
            (Field::CustomerId, json!(self.customer_id)),
            (Field::Country, json!(self.country)),
            (Field::InvoiceDate, json!(self.invoice_date)),
            (Field::StockCode, json!(self.stock_code)),
            (Field::Description, json!(self.description)),
            (Field::Quantity, json!(self.quantity)),
            (Field::UnitPrice, json!(self.unit_price)),
            (Field::Amount, json!(self.amount())),
        ]
    }
}

/// Generate `count` invoices.
///
/// Customers repeat across invoices (roughly four invoices each) and keep
/// one country. About one invoice in twenty is a cancellation.
pub fn generate_invoices(seed: u64, count: usize) -> Vec<InvoiceData> {
    let mut rng = StdRng::seed_from_u64(seed);
    let customers = (count / 4).max(1) as i64;
    let base_customer = 12_346 + rng.gen_range(0..1_000);

    (0..count)
        .map(|i| {
            let cancelled = rng.gen_ratio(1, 20);
            let number = FIRST_INVOICE + i as u64;
            let invoice_no = if cancelled {
                format!("C{}", number)
            } else {
                number.to_string()
            };

            let customer_id = base_customer + rng.gen_range(0..customers);
            let country = COUNTRIES[(customer_id as usize) % COUNTRIES.len()].to_string();
            let (stock_code, description) = PRODUCTS[rng.gen_range(0..PRODUCTS.len())];

            let offset = ChronoDuration::minutes(i as i64 * 17 + rng.gen_range(0..17));
            let invoice_date = DateTime::from_timestamp(FIRST_INVOICE_AT, 0)
                .map(|start| (start + offset).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();

            let quantity = rng.gen_range(1..=24);
            let unit_price = f64::from(rng.gen_range(29..=1_295u32)) / 100.0;

            InvoiceData {
                invoice_no,
                customer_id,
                country,
                invoice_date,
                stock_code: stock_code.to_string(),
                description: description.to_string(),
                quantity: if cancelled { -quantity } else { quantity },
                unit_price,
            }
        })
        .collect()
}

/// An ordered list of operations to run against every model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workload {
    operations: Vec<OperationSpec>,
}

impl Workload {
    pub fn new(operations: Vec<OperationSpec>) -> Self {
        Self { operations }
    }

    /// The CRUD cycle for each generated invoice: create it, read it back,
    /// bump the quantity of its line, read the customer's invoices, delete it.
    ///
    /// Every invoice created is deleted again, so the workload can be
    /// repeated against the same stores.
    pub fn standard(seed: u64, invoices: usize) -> Result<Self> {
        let mut operations = Vec::with_capacity(invoices * 5);
        for invoice in generate_invoices(seed, invoices) {
            let target = Target::invoice(invoice.invoice_no.as_str());
            operations.push(OperationSpec::create(target.clone(), invoice.payload())?);
            operations.push(OperationSpec::read(target.clone(), Predicate::target())?);
            operations.push(OperationSpec::update(
                target.clone(),
                [(Field::Quantity, invoice.quantity + 1)],
                Predicate::target().and(Predicate::eq(Field::StockCode, invoice.stock_code.as_str())),
            )?);
            operations.push(OperationSpec::read(
                Target::customer(invoice.customer_id),
                Predicate::target(),
            )?);
            operations.push(OperationSpec::delete(target, Predicate::target())?);
        }
        Ok(Self { operations })
    }

    /// Create, read, update and delete invoice `1`.
    pub fn example() -> Result<Self> {
        let target = Target::invoice("1");
        Ok(Self::new(vec![
            OperationSpec::create(target.clone(), [(Field::Amount, 10)])?,
            OperationSpec::read(target.clone(), Predicate::target())?,
            OperationSpec::update(target.clone(), [(Field::Amount, 20)], Predicate::target())?,
            OperationSpec::delete(target, Predicate::target())?,
        ]))
    }

    pub fn push(&mut self, operation: OperationSpec) {
        self.operations.push(operation);
    }

    /// The sequence played `times` times back to back.
    pub fn repeat(self, times: usize) -> Self {
        let operations = self
            .operations
            .iter()
            .cloned()
            .cycle()
            .take(self.operations.len() * times)
            .collect();
        Self { operations }
    }

    pub fn operations(&self) -> &[OperationSpec] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<OperationSpec> {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crudbench_core::OperationKind;

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(generate_invoices(7, 50), generate_invoices(7, 50));
        assert_ne!(generate_invoices(7, 50), generate_invoices(8, 50));
    }

    #[test]
    fn test_invoice_numbers_are_unique() {
        let invoices = generate_invoices(42, 500);
        let mut numbers: Vec<_> = invoices.iter().map(|i| i.invoice_no.clone()).collect();
        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers.len(), 500);
    }

    #[test]
    fn test_cancellations_have_negative_quantity() {
        for invoice in generate_invoices(42, 500) {
            assert_eq!(
                crudbench_core::is_cancellation(&invoice.invoice_no),
                invoice.quantity < 0
            );
        }
    }

    #[test]
    fn test_customers_keep_their_country() {
        let invoices = generate_invoices(3, 200);
        for a in &invoices {
            for b in invoices.iter().filter(|b| b.customer_id == a.customer_id) {
                assert_eq!(a.country, b.country);
            }
        }
    }

    #[test]
    fn test_standard_cycle() {
        let workload = Workload::standard(1, 3).unwrap();
        assert_eq!(workload.len(), 15);

        let kinds: Vec<_> = workload.operations()[..5].iter().map(|op| op.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::Create,
                OperationKind::Read,
                OperationKind::Update,
                OperationKind::Read,
                OperationKind::Delete,
            ]
        );
        assert!(workload.operations()[3].target().customer_id().is_some());
    }

    #[test]
    fn test_example_workload() {
        let workload = Workload::example().unwrap();
        assert_eq!(workload.len(), 4);
        assert_eq!(workload.operations()[0].payload_value(Field::Amount), Some(&json!(10)));
    }

    #[test]
    fn test_repeat() {
        let workload = Workload::example().unwrap();
        let repeated = workload.clone().repeat(3);
        assert_eq!(repeated.len(), 12);
        assert_eq!(repeated.operations()[4], workload.operations()[0]);
        assert!(workload.repeat(0).is_empty());
    }

    #[test]
    fn test_scale() {
        assert_eq!(Scale::default().invoices(), 100);
        assert_eq!(Scale::Tiny.invoices(), 10);
    }
}
