//! Template System - Outbound Document Shapes
//!
//! Each document type has exactly one wire shape. Values missing from a
//! source record become "", 0 or an empty list, never an absent key.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::aggregate::{self, InvoiceTotals, APPROVAL_LIMIT, QUANTITY_FIELD, UNIT_PRICE_FIELD};
use crate::config::SessionConfig;
use crate::numbering::resolve_doc_no_app;
use crate::pipeline::PipelineError;
use crate::records::{Record, RecordSet};

pub const INVOICE_DUE_DAYS: i64 = 30;
pub const DELIVERY_LEAD_DAYS: i64 = 14;
pub const CUSTOM_TEMPLATE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Disbursement,
    /// "Penerusan" batch relay.
    Forwarding,
    Invoice,
    PurchaseOrder,
    Custom,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        Self::Disbursement,
        Self::Forwarding,
        Self::Invoice,
        Self::PurchaseOrder,
        Self::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disbursement => "DISBURSEMENT",
            Self::Forwarding => "FORWARDING",
            Self::Invoice => "INVOICE",
            Self::PurchaseOrder => "PURCHASE_ORDER",
            Self::Custom => "CUSTOM",
        }
    }
}

impl FromStr for DocumentType {
    type Err = PipelineError;

    /// Unknown selectors are an error; there is no fallback variant.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DISBURSE" | "DISBURSEMENT" => Ok(Self::Disbursement),
            "PENERUSAN" | "FORWARDING" => Ok(Self::Forwarding),
            "INVOICE" => Ok(Self::Invoice),
            "PURCHASE_ORDER" => Ok(Self::PurchaseOrder),
            "CUSTOM" => Ok(Self::Custom),
            _ => Err(PipelineError::UnsupportedTemplate(s.to_string())),
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub document_number: String,
    pub document_type: DocumentType,
    /// The `jsonName` carried into the payload.
    pub document_name: String,
    pub source_system: String,
    pub issue_date: NaiveDate,
}

/// A generated document. Serializes as its body only.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub metadata: DocumentMetadata,
    pub body: DocumentBody,
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DocumentBody {
    Disbursement(DisbursementBatch),
    Forwarding(ForwardingBatch),
    Invoice(InvoiceDocument),
    PurchaseOrder(PurchaseOrderDocument),
    Custom(CustomDocument),
}

// --- Disbursement ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisbursementBatch {
    pub data: Vec<DisbursementEntry>,
    pub jumlah_row: usize,
    #[serde(serialize_with = "aggregate::serialize_amount")]
    pub jumlah_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisbursementEntry {
    pub fast_seq_no: String,
    /// The raw records, unnumbered.
    pub msg_content: Vec<Record>,
    pub json_name: String,
    pub source_system: String,
    pub sender_doc_no: String,
}

// --- Forwarding ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardingBatch {
    pub doc_no_app: String,
    pub jumlah_row: usize,
    #[serde(serialize_with = "aggregate::serialize_amount")]
    pub jumlah_amount: f64,
    pub user_nik: String,
    pub data: Vec<Record>,
}

// --- Invoice ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    pub invoice: Invoice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub document_number: String,
    pub template_type: String,
    pub source_system: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub items: Vec<InvoiceItem>,
    pub summary: InvoiceTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub line_number: usize,
    pub item_code: String,
    pub description: String,
    #[serde(serialize_with = "aggregate::serialize_amount")]
    pub quantity: f64,
    #[serde(serialize_with = "aggregate::serialize_amount")]
    pub unit_price: f64,
    #[serde(serialize_with = "aggregate::serialize_amount")]
    pub total_price: f64,
}

// --- Purchase order ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderDocument {
    pub purchase_order: PurchaseOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Draft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    pub order_number: String,
    pub order_type: String,
    pub requesting_system: String,
    pub order_date: NaiveDate,
    pub requested_delivery_date: NaiveDate,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_items: usize,
    pub approval_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub line_item: usize,
    pub product_code: String,
    pub product_name: String,
    #[serde(serialize_with = "aggregate::serialize_amount")]
    pub requested_quantity: f64,
    #[serde(serialize_with = "aggregate::serialize_amount")]
    pub unit_price: f64,
    pub expected_delivery_date: String,
}

// --- Custom ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomDocument {
    pub metadata: CustomMetadata,
    pub payload: CustomPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMetadata {
    pub version: String,
    pub generated: DateTime<Utc>,
    pub source: String,
    pub document_number: String,
    pub template_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPayload {
    pub total_records: usize,
    pub records: Vec<CustomRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRecord {
    pub id: usize,
    pub timestamp: DateTime<Utc>,
    pub payload: Record,
    pub status: RecordStatus,
}

/// Build a document of `document_type` from `records`.
///
/// Pure: the same inputs give the same document. Numbering comes from `config`.
pub fn generate(
    document_type: DocumentType,
    config: &SessionConfig,
    records: &RecordSet,
    now: DateTime<Utc>,
) -> Document {
    let rows = records.records.as_slice();
    let issue_date = now.date_naive();

    let (document_number, body) = match document_type {
        DocumentType::Disbursement => (
            config.sender_doc_no.clone(),
            DocumentBody::Disbursement(disbursement(config, rows)),
        ),
        DocumentType::Forwarding => {
            let batch = forwarding(config, rows);
            (batch.doc_no_app.clone(), DocumentBody::Forwarding(batch))
        }
        DocumentType::Invoice => (
            config.sender_doc_no.clone(),
            DocumentBody::Invoice(invoice(config, rows, issue_date)),
        ),
        DocumentType::PurchaseOrder => (
            config.sender_doc_no.clone(),
            DocumentBody::PurchaseOrder(purchase_order(config, rows, issue_date)),
        ),
        DocumentType::Custom => (
            config.sender_doc_no.clone(),
            DocumentBody::Custom(custom(config, rows, now)),
        ),
    };

    Document {
        metadata: DocumentMetadata {
            document_number,
            document_type,
            document_name: config.json_name.clone(),
            source_system: config.source_system.clone(),
            issue_date,
        },
        body,
    }
}

fn disbursement(config: &SessionConfig, rows: &[Record]) -> DisbursementBatch {
    DisbursementBatch {
        data: vec![DisbursementEntry {
            fast_seq_no: config.fast_seq_no.clone(),
            msg_content: rows.to_vec(),
            json_name: config.json_name.clone(),
            source_system: config.source_system.clone(),
            sender_doc_no: config.sender_doc_no.clone(),
        }],
        jumlah_row: aggregate::row_count(rows),
        jumlah_amount: aggregate::sum_field(rows, &config.amount_field),
    }
}

fn forwarding(config: &SessionConfig, rows: &[Record]) -> ForwardingBatch {
    ForwardingBatch {
        doc_no_app: resolve_doc_no_app(rows, &config.doc_no_app_field, &config.doc_no_app),
        jumlah_row: aggregate::row_count(rows),
        jumlah_amount: aggregate::sum_field(rows, &config.amount_field),
        user_nik: config.user_nik.clone(),
        data: rows.to_vec(),
    }
}

fn invoice(config: &SessionConfig, rows: &[Record], issue_date: NaiveDate) -> InvoiceDocument {
    let items: Vec<InvoiceItem> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let quantity = aggregate::field(r, QUANTITY_FIELD);
            let unit_price = aggregate::field(r, UNIT_PRICE_FIELD);
            InvoiceItem {
                line_number: i + 1,
                item_code: text(r, "itemCode"),
                description: text(r, "description"),
                quantity,
                unit_price,
                total_price: quantity * unit_price,
            }
        })
        .collect();

    let summary = InvoiceTotals::from_line_totals(items.iter().map(|i| i.total_price));

    InvoiceDocument {
        invoice: Invoice {
            document_number: config.sender_doc_no.clone(),
            template_type: config.json_name.clone(),
            source_system: config.source_system.clone(),
            issue_date,
            due_date: issue_date + Duration::days(INVOICE_DUE_DAYS),
            items,
            summary,
        },
    }
}

fn purchase_order(config: &SessionConfig, rows: &[Record], order_date: NaiveDate) -> PurchaseOrderDocument {
    let default_delivery = order_date + Duration::days(DELIVERY_LEAD_DAYS);

    let items: Vec<OrderItem> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let explicit = text(r, "deliveryDate");
            OrderItem {
                line_item: i + 1,
                product_code: text(r, "productCode"),
                product_name: text(r, "productName"),
                requested_quantity: aggregate::field(r, QUANTITY_FIELD),
                unit_price: aggregate::field(r, UNIT_PRICE_FIELD),
                expected_delivery_date: if explicit.is_empty() {
                    default_delivery.to_string()
                } else {
                    explicit
                },
            }
        })
        .collect();

    PurchaseOrderDocument {
        purchase_order: PurchaseOrder {
            order_number: config.sender_doc_no.clone(),
            order_type: config.json_name.clone(),
            requesting_system: config.source_system.clone(),
            order_date,
            requested_delivery_date: default_delivery,
            status: OrderStatus::Draft,
            total_items: items.len(),
            approval_required: aggregate::exceeds_limit(items.iter().map(|i| i.unit_price), APPROVAL_LIMIT),
            items,
        },
    }
}

fn custom(config: &SessionConfig, rows: &[Record], now: DateTime<Utc>) -> CustomDocument {
    let records: Vec<CustomRecord> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| CustomRecord {
            id: i + 1,
            timestamp: now,
            payload: r.clone(),
            status: RecordStatus::Pending,
        })
        .collect();

    CustomDocument {
        metadata: CustomMetadata {
            version: CUSTOM_TEMPLATE_VERSION.to_string(),
            generated: now,
            source: config.source_system.clone(),
            document_number: config.sender_doc_no.clone(),
            template_name: config.json_name.clone(),
        },
        payload: CustomPayload {
            total_records: records.len(),
            records,
        },
    }
}

/// String view of a field; absent or null is "".
fn text(record: &Record, name: &str) -> String {
    match record.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl Document {
    pub fn document_type(&self) -> DocumentType {
        self.metadata.document_type
    }

    /// Identifier used in export filenames.
    pub fn identifier(&self) -> &str {
        &self.metadata.document_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::SourceKind;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 9, 30, 0).unwrap()
    }

    fn config() -> SessionConfig {
        SessionConfig {
            sender_doc_no: "070325R000042".into(),
            doc_no_app: "25J000000123456".into(),
            ..Default::default()
        }
    }

    fn set(v: Value) -> RecordSet {
        RecordSet::from_records(SourceKind::Json, serde_json::from_value(v).unwrap())
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!("invoice".parse::<DocumentType>().unwrap(), DocumentType::Invoice);
        assert_eq!("PENERUSAN".parse::<DocumentType>().unwrap(), DocumentType::Forwarding);
        assert_eq!("Disburse".parse::<DocumentType>().unwrap(), DocumentType::Disbursement);
        for t in DocumentType::ALL {
            assert_eq!(t.as_str().parse::<DocumentType>().unwrap(), t);
        }
        let err = "MASTER".parse::<DocumentType>().unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedTemplate(ref s) if s == "MASTER"));
    }

    #[test]
    fn test_disbursement_wraps_raw_records() {
        let records = set(json!([{"AIT_AMOUNT1": 100, "n": 1}, {"AIT_AMOUNT1": "bad"}]));
        let doc = generate(DocumentType::Disbursement, &config(), &records, now());

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["data"][0]["fastSeqNo"], json!("1"));
        assert_eq!(value["data"][0]["jsonName"], json!("MASTER"));
        assert_eq!(value["data"][0]["senderDocNo"], json!("070325R000042"));
        assert_eq!(value["data"][0]["msgContent"][0], json!({"AIT_AMOUNT1": 100, "n": 1}));
        assert_eq!(value["jumlahRow"], json!(2));
        assert_eq!(value["jumlahAmount"], json!(100));
        assert_eq!(doc.identifier(), "070325R000042");
    }

    #[test]
    fn test_forwarding_prefers_record_doc_no_app() {
        let cfg = config();
        let records = set(json!([{"AIT_AMOUNT1": 5}, {"docNoApp": "25J000000999999", "AIT_AMOUNT1": 7}]));
        let doc = generate(DocumentType::Forwarding, &cfg, &records, now());
        let DocumentBody::Forwarding(batch) = &doc.body else { panic!("wrong body") };
        assert_eq!(batch.doc_no_app, "25J000000999999");
        assert_eq!(batch.jumlah_amount, 12.0);
        assert_eq!(batch.user_nik, "1000082742");
        assert_eq!(doc.identifier(), "25J000000999999");

        let doc = generate(DocumentType::Forwarding, &cfg, &set(json!([])), now());
        assert_eq!(doc.identifier(), "25J000000123456");
    }

    #[test]
    fn test_invoice_lines_and_dates() {
        let records = set(json!([
            {"itemCode": "A1", "description": "Widget", "quantity": 2, "unitPrice": 15000},
            {"itemCode": 7, "quantity": 3}
        ]));
        let doc = generate(DocumentType::Invoice, &config(), &records, now());
        let DocumentBody::Invoice(InvoiceDocument { invoice }) = &doc.body else { panic!("wrong body") };

        assert_eq!(invoice.items[0].line_number, 1);
        assert_eq!(invoice.items[0].total_price, 30000.0);
        assert_eq!(invoice.items[1].item_code, "7");
        assert_eq!(invoice.items[1].description, "");
        assert_eq!(invoice.items[1].total_price, 0.0);
        assert_eq!(invoice.summary.subtotal, 30000.0);
        assert_eq!(invoice.summary.tax, 3300.0);
        assert_eq!(invoice.summary.total, 33300.0);
        assert_eq!(invoice.due_date, NaiveDate::from_ymd_opt(2025, 4, 6).unwrap());
    }

    #[test]
    fn test_purchase_order_approval_and_delivery() {
        let records = set(json!([
            {"productCode": "P1", "productName": "Bolt", "quantity": 5, "unitPrice": 9000},
            {"productCode": "P2", "unitPrice": 10001, "deliveryDate": "2025-05-01"}
        ]));
        let doc = generate(DocumentType::PurchaseOrder, &config(), &records, now());
        let DocumentBody::PurchaseOrder(PurchaseOrderDocument { purchase_order: po }) = &doc.body else {
            panic!("wrong body")
        };

        assert!(po.approval_required);
        assert_eq!(po.total_items, 2);
        assert_eq!(po.items[0].expected_delivery_date, "2025-03-21");
        assert_eq!(po.items[1].expected_delivery_date, "2025-05-01");
        assert_eq!(po.items[1].requested_quantity, 0.0);
        assert_eq!(po.requested_delivery_date, NaiveDate::from_ymd_opt(2025, 3, 21).unwrap());

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["purchaseOrder"]["status"], json!("draft"));
    }

    #[test]
    fn test_custom_wraps_each_record() {
        let records = set(json!([{"a": 1}, {"b": 2}]));
        let doc = generate(DocumentType::Custom, &config(), &records, now());
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["metadata"]["version"], json!("1.0"));
        assert_eq!(value["metadata"]["templateName"], json!("MASTER"));
        assert_eq!(value["payload"]["totalRecords"], json!(2));
        assert_eq!(value["payload"]["records"][1]["id"], json!(2));
        assert_eq!(value["payload"]["records"][1]["status"], json!("pending"));
        assert_eq!(value["payload"]["records"][1]["payload"], json!({"b": 2}));
    }

    #[test]
    fn test_empty_record_set_yields_zero_summaries() {
        let empty = RecordSet::empty(SourceKind::Tabular);
        for t in DocumentType::ALL {
            let doc = generate(t, &config(), &empty, now());
            assert_eq!(doc.document_type(), t);
        }

        let doc = generate(DocumentType::Invoice, &config(), &empty, now());
        let DocumentBody::Invoice(InvoiceDocument { invoice }) = &doc.body else { panic!("wrong body") };
        assert_eq!(invoice.summary, InvoiceTotals::default());

        let doc = generate(DocumentType::PurchaseOrder, &config(), &empty, now());
        let DocumentBody::PurchaseOrder(PurchaseOrderDocument { purchase_order: po }) = &doc.body else {
            panic!("wrong body")
        };
        assert!(!po.approval_required);
        assert_eq!(po.total_items, 0);
    }

    #[test]
    fn test_whole_numbers_stay_integers_on_the_wire() {
        let records = set(json!([
            {"itemCode": "A1", "quantity": 2, "unitPrice": 15000, "AIT_AMOUNT1": 100},
            {"itemCode": "B2", "quantity": 1.5, "unitPrice": 3}
        ]));

        let value = serde_json::to_value(generate(DocumentType::Invoice, &config(), &records, now())).unwrap();
        let items = &value["invoice"]["items"];
        assert_eq!(items[0]["quantity"], json!(2));
        assert_eq!(items[0]["unitPrice"], json!(15000));
        assert_eq!(items[0]["totalPrice"], json!(30000));
        assert_eq!(items[1]["quantity"], json!(1.5));
        assert_eq!(items[1]["totalPrice"], json!(4.5));

        let value = serde_json::to_value(generate(DocumentType::PurchaseOrder, &config(), &records, now())).unwrap();
        assert_eq!(value["purchaseOrder"]["items"][0]["requestedQuantity"], json!(2));
        assert_eq!(value["purchaseOrder"]["items"][0]["unitPrice"], json!(15000));

        let value = serde_json::to_value(generate(DocumentType::Forwarding, &config(), &records, now())).unwrap();
        assert_eq!(value["jumlahAmount"], json!(100));
    }
}
