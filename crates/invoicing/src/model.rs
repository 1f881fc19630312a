//! Canonical (normalized) invoice entities.
//!
//! Every field name here serializes as camelCase; the normalizer is the only
//! place that knows about snake_case or legacy wire names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradedesk_core::{Entity, Money, RecordId};

/// Invoice lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Proforma,
    Issued,
    Sent,
    Cancelled,
    Void,
}

impl InvoiceStatus {
    /// Lenient wire parsing (`"issued"`, `"STATUS_ISSUED"`, `" Sent "`).
    pub fn from_wire(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        let key = lowered.strip_prefix("status_").unwrap_or(&lowered);
        match key {
            "draft" => Some(Self::Draft),
            "proforma" | "pro_forma" => Some(Self::Proforma),
            "issued" => Some(Self::Issued),
            "sent" => Some(Self::Sent),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "void" | "voided" => Some(Self::Void),
            _ => None,
        }
    }

    /// Issued and sent invoices are finalized documents sent to the customer.
    pub fn is_issued_like(self) -> bool {
        matches!(self, Self::Issued | Self::Sent)
    }

    /// Cancelled and void invoices accept no further money movements.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Cancelled | Self::Void)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Proforma => "proforma",
            Self::Issued => "issued",
            Self::Sent => "sent",
            Self::Cancelled => "cancelled",
            Self::Void => "void",
        }
    }
}

/// Derived payment status; never set independently of the balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
    Overdue,
}

impl PaymentStatus {
    /// Lenient wire parsing (`"PAYMENT_STATUS_PAID"`, `"fully_paid"`, `"partial"`).
    pub fn from_wire(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let key = lowered.strip_prefix("payment_status_").unwrap_or(&lowered);
        match key {
            "unpaid" => Some(Self::Unpaid),
            "partially_paid" | "partial" | "partiallypaid" => Some(Self::PartiallyPaid),
            "paid" | "fully_paid" | "overpaid" => Some(Self::Paid),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }

    /// Statuses that still expect money from the customer.
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Paid)
    }
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Cheque,
    Pdc,
    BankTransfer,
    CreditCard,
    DebitCard,
    Online,
    WireTransfer,
    MobileWallet,
    Other,
}

impl PaymentMethod {
    /// Lenient parsing by value or label; unknown or empty input is `Other`.
    pub fn from_wire(raw: &str) -> Self {
        let key = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "cash" => Self::Cash,
            "cheque" | "check" => Self::Cheque,
            "pdc" | "post_dated_cheque" => Self::Pdc,
            "bank_transfer" => Self::BankTransfer,
            "credit_card" => Self::CreditCard,
            "debit_card" => Self::DebitCard,
            "online" | "online_payment" => Self::Online,
            "wire_transfer" => Self::WireTransfer,
            "mobile_wallet" => Self::MobileWallet,
            _ => Self::Other,
        }
    }

    /// Methods that must carry a reference number (cheque no., transfer id).
    pub fn requires_reference(self) -> bool {
        matches!(
            self,
            Self::Cheque | Self::Pdc | Self::BankTransfer | Self::WireTransfer
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cash => "Cash",
            Self::Cheque => "Cheque",
            Self::Pdc => "Post-Dated Cheque",
            Self::BankTransfer => "Bank Transfer",
            Self::CreditCard => "Credit Card",
            Self::DebitCard => "Debit Card",
            Self::Online => "Online Payment",
            Self::WireTransfer => "Wire Transfer",
            Self::MobileWallet => "Mobile Wallet",
            Self::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: RecordId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub vat_number: Option<String>,
}

impl Customer {
    /// Placeholder used when the payload carries no usable customer.
    pub fn unknown() -> Self {
        Self {
            id: RecordId::from("0"),
            name: "Unknown Customer".to_string(),
            email: None,
            phone: None,
            address: None,
            vat_number: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.id.as_str() == "0"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: Option<RecordId>,
    pub name: String,
    pub quantity: f64,
    pub rate: Money,
    pub amount: Money,
}

/// One ledger entry. Append-only: voiding adds audit metadata, nothing else changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: RecordId,
    pub amount: Money,
    pub payment_date: DateTime<Utc>,
    pub method: PaymentMethod,
    pub reference_no: Option<String>,
    pub notes: Option<String>,
    pub voided: bool,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
    pub voided_by: Option<String>,
}

impl PaymentRecord {
    /// Amount counted toward `received` (zero once voided).
    pub fn counted_amount(&self) -> Money {
        if self.voided { Money::ZERO } else { self.amount }
    }
}

impl Entity for PaymentRecord {
    type Id = RecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatus {
    pub has_notes: bool,
    pub count: u32,
}

/// The ledger root: a cached, possibly stale copy of the server's invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: RecordId,
    pub invoice_number: String,
    pub status: InvoiceStatus,
    pub payment_status: PaymentStatus,
    pub customer: Customer,
    pub items: Vec<LineItem>,
    pub payments: Vec<PaymentRecord>,
    pub currency: String,
    pub subtotal: Money,
    pub vat_amount: Money,
    pub total: Money,
    pub received: Money,
    pub outstanding: Money,
    pub invoice_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deletion_reason: Option<String>,
    pub sales_agent_id: Option<RecordId>,
    pub sales_agent_name: Option<String>,
    pub delivery_status: DeliveryStatus,
    pub notes: Option<String>,
}

impl Invoice {
    /// Sum over non-voided payment records, saturating at the `Decimal` range.
    pub fn sum_received(&self) -> Money {
        self.payments.iter().map(PaymentRecord::counted_amount).sum()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn has_sales_agent(&self) -> bool {
        self.sales_agent_id.is_some()
    }

    pub fn payment(&self, payment_id: &RecordId) -> Option<&PaymentRecord> {
        self.payments.iter().find(|p| &p.id == payment_id)
    }

    pub fn active_payments(&self) -> impl Iterator<Item = &PaymentRecord> {
        self.payments.iter().filter(|p| !p.voided)
    }

    pub fn last_payment_date(&self) -> Option<DateTime<Utc>> {
        self.active_payments().map(|p| p.payment_date).max()
    }
}

impl Entity for Invoice {
    type Id = RecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
