//! Money and tax calculator.
//!
//! Pure functions over `Decimal`; every derived money field stored on a
//! document comes from here and from nowhere else. Discount is a
//! percentage of the line subtotal (0-100), applied before tax.

use crate::models::{CreateItem, PaymentMethod};
use rust_decimal::Decimal;

/// Derived money fields for one line item, rounded to the centime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemAmounts {
    pub total_excl: Decimal,
    pub total_tax: Decimal,
    pub total: Decimal,
}

/// Document-level aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub stamp_tax: Decimal,
    pub total: Decimal,
}

/// Compute the derived fields for one line.
///
/// `tax_rate` and `discount` are percentages (0-100).
pub fn item_amounts(
    quantity: i32,
    unit_price: Decimal,
    tax_rate: Decimal,
    discount: Decimal,
) -> ItemAmounts {
    let gross = Decimal::from(quantity) * unit_price;
    let total_excl = (gross * (Decimal::ONE - discount / Decimal::ONE_HUNDRED)).round_dp(2);
    let total_tax = (total_excl * tax_rate / Decimal::ONE_HUNDRED).round_dp(2);
    ItemAmounts {
        total_excl,
        total_tax,
        total: total_excl + total_tax,
    }
}

/// Stamp duty rate tier for a cash subtotal. Thresholds are exclusive
/// lower bounds, highest tier first.
fn stamp_rate(subtotal: Decimal) -> Decimal {
    if subtotal > Decimal::from(100_000) {
        Decimal::new(2, 2)
    } else if subtotal > Decimal::from(30_000) {
        Decimal::new(15, 3)
    } else if subtotal > Decimal::from(300) {
        Decimal::new(1, 2)
    } else {
        Decimal::ZERO
    }
}

/// Stamp duty for a document. Zero for anything other than cash.
pub fn stamp_tax(subtotal: Decimal, method: PaymentMethod) -> Decimal {
    if method != PaymentMethod::Cash {
        return Decimal::ZERO;
    }
    (subtotal * stamp_rate(subtotal)).round_dp(2)
}

/// Aggregate line amounts into document totals.
pub fn document_totals(items: &[ItemAmounts], method: PaymentMethod) -> DocumentTotals {
    let subtotal: Decimal = items.iter().map(|i| i.total_excl).sum();
    let tax_total: Decimal = items.iter().map(|i| i.total_tax).sum();
    let stamp = stamp_tax(subtotal, method);
    DocumentTotals {
        subtotal,
        tax_total,
        stamp_tax: stamp,
        total: subtotal + tax_total + stamp,
    }
}

/// Compute line amounts and document totals for a set of item inputs.
pub fn compute(items: &[CreateItem], method: PaymentMethod) -> (Vec<ItemAmounts>, DocumentTotals) {
    let amounts: Vec<ItemAmounts> = items
        .iter()
        .map(|i| item_amounts(i.quantity, i.unit_price, i.tax_rate, i.discount))
        .collect();
    let totals = document_totals(&amounts, method);
    (amounts, totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).expect("valid decimal literal")
    }

    #[test]
    fn line_amounts_without_discount() {
        let amounts = item_amounts(10, dec("100"), dec("19"), Decimal::ZERO);
        assert_eq!(amounts.total_excl, dec("1000"));
        assert_eq!(amounts.total_tax, dec("190"));
        assert_eq!(amounts.total, dec("1190"));
    }

    #[test]
    fn discount_is_a_percentage_of_the_line() {
        let amounts = item_amounts(4, dec("250"), dec("19"), dec("10"));
        assert_eq!(amounts.total_excl, dec("900"));
        assert_eq!(amounts.total_tax, dec("171"));
        assert_eq!(amounts.total, dec("1071"));
    }

    #[test]
    fn line_invariant_total_is_excl_plus_tax() {
        for (qty, price, rate, discount) in [
            (1, "19.99", "19", "0"),
            (3, "7.33", "9", "5"),
            (120, "1450.50", "19", "2.5"),
        ] {
            let a = item_amounts(qty, dec(price), dec(rate), dec(discount));
            assert_eq!(a.total, a.total_excl + a.total_tax);
        }
    }

    #[test]
    fn calculator_is_deterministic() {
        let a = item_amounts(7, dec("13.37"), dec("19"), dec("3"));
        let b = item_amounts(7, dec("13.37"), dec("19"), dec("3"));
        assert_eq!(a, b);
    }

    #[test]
    fn stamp_tax_only_applies_to_cash() {
        for method in [PaymentMethod::BankTransfer, PaymentMethod::Check] {
            assert_eq!(stamp_tax(dec("150000"), method), Decimal::ZERO);
        }
    }

    #[test]
    fn stamp_tax_tiers_are_exclusive_lower_bounds() {
        assert_eq!(
            stamp_tax(dec("100001"), PaymentMethod::Cash),
            (dec("100001") * dec("0.02")).round_dp(2)
        );
        assert_eq!(
            stamp_tax(dec("30001"), PaymentMethod::Cash),
            (dec("30001") * dec("0.015")).round_dp(2)
        );
        assert_eq!(
            stamp_tax(dec("300.01"), PaymentMethod::Cash),
            (dec("300.01") * dec("0.01")).round_dp(2)
        );
        // Boundary values sit below their tier.
        assert_eq!(stamp_tax(dec("300"), PaymentMethod::Cash), Decimal::ZERO);
        assert_eq!(
            stamp_tax(dec("30000"), PaymentMethod::Cash),
            dec("30000") * dec("0.01")
        );
        assert_eq!(
            stamp_tax(dec("100000"), PaymentMethod::Cash),
            dec("100000") * dec("0.015")
        );
    }

    #[test]
    fn document_totals_cash_below_stamp_threshold() {
        let items = vec![CreateItem {
            product_id: None,
            name: "Service".to_string(),
            quantity: 10,
            unit_price: dec("100"),
            tax_rate: dec("19"),
            discount: Decimal::ZERO,
            sort_order: 0,
        }];
        let (amounts, totals) = compute(&items, PaymentMethod::Cash);
        assert_eq!(amounts[0].total_excl, dec("1000"));
        assert_eq!(totals.subtotal, dec("1000"));
        assert_eq!(totals.tax_total, dec("190"));
        // 1000 exceeds the 300 threshold, so the 1% tier applies.
        assert_eq!(totals.stamp_tax, dec("10"));
        assert_eq!(totals.total, dec("1200"));
    }

    #[test]
    fn document_totals_cash_high_tier() {
        let items = vec![CreateItem {
            product_id: None,
            name: "Bulk order".to_string(),
            quantity: 100,
            unit_price: dec("1500"),
            tax_rate: dec("19"),
            discount: Decimal::ZERO,
            sort_order: 0,
        }];
        let (_, totals) = compute(&items, PaymentMethod::Cash);
        assert_eq!(totals.subtotal, dec("150000"));
        assert_eq!(totals.stamp_tax, dec("3000"));
        assert_eq!(
            totals.total,
            totals.subtotal + totals.tax_total + dec("3000")
        );
    }

    #[test]
    fn document_totals_sum_multiple_lines() {
        let items = vec![
            CreateItem {
                product_id: None,
                name: "A".to_string(),
                quantity: 2,
                unit_price: dec("149.99"),
                tax_rate: dec("19"),
                discount: Decimal::ZERO,
                sort_order: 0,
            },
            CreateItem {
                product_id: None,
                name: "B".to_string(),
                quantity: 1,
                unit_price: dec("80"),
                tax_rate: dec("9"),
                discount: dec("50"),
                sort_order: 1,
            },
        ];
        let (amounts, totals) = compute(&items, PaymentMethod::BankTransfer);
        assert_eq!(totals.subtotal, amounts[0].total_excl + amounts[1].total_excl);
        assert_eq!(totals.tax_total, amounts[0].total_tax + amounts[1].total_tax);
        assert_eq!(totals.stamp_tax, Decimal::ZERO);
        assert_eq!(totals.total, totals.subtotal + totals.tax_total);
    }
}
