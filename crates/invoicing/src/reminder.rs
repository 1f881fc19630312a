//! Payment reminder classification by distance to the due date.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use tradedesk_core::Money;

use crate::model::{Invoice, PaymentStatus};
use crate::policy::LedgerPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    /// 7+ days before due.
    Advance,
    /// 1 to 6 days before due.
    DueSoon,
    DueToday,
    /// 1 to 7 days overdue.
    PoliteOverdue,
    /// 8 to 30 days overdue.
    UrgentOverdue,
    /// More than 30 days overdue.
    FinalOverdue,
}

impl ReminderType {
    pub fn for_days_until_due(days: i64) -> Self {
        match days {
            7.. => Self::Advance,
            1..=6 => Self::DueSoon,
            0 => Self::DueToday,
            -7..=-1 => Self::PoliteOverdue,
            -30..=-8 => Self::UrgentOverdue,
            _ => Self::FinalOverdue,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Advance => "Advance Reminder",
            Self::DueSoon => "Due Soon",
            Self::DueToday => "Due Today",
            Self::PoliteOverdue => "Overdue",
            Self::UrgentOverdue => "Urgent Overdue",
            Self::FinalOverdue => "Final Notice",
        }
    }

    pub fn tone(self) -> &'static str {
        match self {
            Self::Advance => "friendly",
            Self::DueSoon => "gentle",
            Self::DueToday => "courtesy",
            Self::PoliteOverdue => "polite",
            Self::UrgentOverdue => "urgent",
            Self::FinalOverdue => "final",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderInfo {
    pub reminder_type: ReminderType,
    pub days_until_due: i64,
    pub is_overdue: bool,
    pub balance_due: Money,
    pub payment_status: PaymentStatus,
}

impl ReminderInfo {
    pub fn message(&self) -> String {
        format_days_message(self.days_until_due)
    }
}

/// Calendar days from today to the due date, both taken at `offset`.
///
/// Negative when overdue; a missing due date counts as due today.
pub fn days_until_due(due: Option<DateTime<Utc>>, now: DateTime<Utc>, offset: FixedOffset) -> i64 {
    let Some(due) = due else {
        return 0;
    };
    let due_day = due.with_timezone(&offset).date_naive();
    let today = now.with_timezone(&offset).date_naive();
    (due_day - today).num_days()
}

/// Reminder details for issued/sent invoices that still expect money.
pub fn reminder_info(invoice: &Invoice, now: DateTime<Utc>, policy: &LedgerPolicy) -> Option<ReminderInfo> {
    if !invoice.status.is_issued_like() || !invoice.payment_status.is_open() {
        return None;
    }

    let days = days_until_due(invoice.due_date, now, policy.business_offset);
    Some(ReminderInfo {
        reminder_type: ReminderType::for_days_until_due(days),
        days_until_due: days,
        is_overdue: days < 0,
        balance_due: invoice.outstanding,
        payment_status: invoice.payment_status,
    })
}

pub fn format_days_message(days_until_due: i64) -> String {
    match days_until_due {
        0 => "Due Today".to_string(),
        1 => "Payment due in 1 day".to_string(),
        d if d > 0 => format!("Payment due in {d} days"),
        -1 => "1 day overdue".to_string(),
        d => format!("{} days overdue", d.unsigned_abs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InvoiceStatus;
    use crate::reconcile::tests::invoice_with_total;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn buckets_match_day_ranges() {
        let cases = [
            (30, ReminderType::Advance),
            (7, ReminderType::Advance),
            (6, ReminderType::DueSoon),
            (1, ReminderType::DueSoon),
            (0, ReminderType::DueToday),
            (-1, ReminderType::PoliteOverdue),
            (-7, ReminderType::PoliteOverdue),
            (-8, ReminderType::UrgentOverdue),
            (-30, ReminderType::UrgentOverdue),
            (-31, ReminderType::FinalOverdue),
        ];
        for (days, expected) in cases {
            assert_eq!(ReminderType::for_days_until_due(days), expected, "days = {days}");
        }
    }

    #[test]
    fn days_are_counted_in_business_time() {
        let policy = LedgerPolicy::default();
        // 21:00 UTC is already the next calendar day at +04:00.
        let now = at("2025-03-09T21:00:00Z");
        let due = at("2025-03-10T00:00:00Z");
        assert_eq!(days_until_due(Some(due), now, policy.business_offset), 0);
        assert_eq!(days_until_due(None, now, policy.business_offset), 0);
    }

    #[test]
    fn only_open_issued_invoices_get_reminders() {
        let policy = LedgerPolicy::default();
        let now = at("2025-05-20T08:00:00Z");
        let mut inv = invoice_with_total(10_000);
        inv.due_date = Some(at("2025-05-10T08:00:00Z"));

        let info = reminder_info(&inv, now, &policy).unwrap();
        assert_eq!(info.reminder_type, ReminderType::UrgentOverdue);
        assert!(info.is_overdue);
        assert_eq!(info.message(), "10 days overdue");

        inv.payment_status = PaymentStatus::Paid;
        assert!(reminder_info(&inv, now, &policy).is_none());

        inv.payment_status = PaymentStatus::Unpaid;
        inv.status = InvoiceStatus::Draft;
        assert!(reminder_info(&inv, now, &policy).is_none());
    }

    #[test]
    fn messages_read_naturally() {
        assert_eq!(format_days_message(1), "Payment due in 1 day");
        assert_eq!(format_days_message(5), "Payment due in 5 days");
        assert_eq!(format_days_message(-1), "1 day overdue");
    }
}
