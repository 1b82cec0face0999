//! Order arithmetic.
//!
//! An [`OrderDraft`] is the only way an order row gets built. Persisting a draft always goes
//! through [`recompute_totals`], so `subtotal == Σ line totals` and
//! `total_amount == subtotal + shipping_cost + tax` hold for every stored order no matter what
//! the caller put in those fields.

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sea_orm::ActiveValue::Set;
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, OrderStatus, PaymentMethod, PaymentStatus},
        order_item,
    },
    errors::ServiceError,
};

/// Shipping and tax rules applied to an order subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Subtotals strictly above this ship for free.
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_cost: Decimal,
    /// Fraction of the subtotal, e.g. `0.18`.
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: dec!(500),
            flat_shipping_cost: dec!(50),
            tax_rate: dec!(0.18),
        }
    }
}

impl PricingPolicy {
    pub fn shipping_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal > self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.flat_shipping_cost
        }
    }

    /// Tax rounded to the nearest whole currency unit, halves away from zero.
    pub fn tax_for(&self, subtotal: Decimal) -> Decimal {
        (subtotal * self.tax_rate).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingAddress {
    pub name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub total: Decimal,
}

impl OrderLine {
    pub fn new(product_id: Uuid, name: impl Into<String>, quantity: i32, price: Decimal) -> Self {
        Self {
            product_id,
            name: name.into(),
            quantity,
            price,
            total: price * Decimal::from(quantity),
        }
    }
}

/// An order that has not been written yet.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub user_id: Uuid,
    pub lines: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax: Decimal,
    pub total_amount: Decimal,
}

impl OrderDraft {
    /// Builds a draft and prices it with `policy`.
    pub fn priced(
        user_id: Uuid,
        lines: Vec<OrderLine>,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
        notes: Option<String>,
        policy: &PricingPolicy,
    ) -> Self {
        let mut draft = Self {
            user_id,
            lines,
            shipping_address,
            payment_method,
            notes,
            subtotal: Decimal::ZERO,
            shipping_cost: Decimal::ZERO,
            tax: Decimal::ZERO,
            total_amount: Decimal::ZERO,
        };
        apply_pricing(&mut draft, policy);
        draft
    }

    /// Active models for the order row and its lines, with a fresh order number.
    ///
    /// Totals are recomputed here unconditionally; shipping cost and tax are taken as they stand.
    pub fn into_active_models(
        mut self,
        now: DateTime<Utc>,
    ) -> (order::ActiveModel, Vec<order_item::ActiveModel>) {
        recompute_totals(&mut self);

        let order_id = Uuid::new_v4();
        let items = self
            .lines
            .iter()
            .map(|line| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                name: Set(line.name.clone()),
                quantity: Set(line.quantity),
                price: Set(line.price),
                total: Set(line.total),
            })
            .collect();

        let address = self.shipping_address;
        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(derive_order_number(now)),
            user_id: Set(self.user_id),
            status: Set(OrderStatus::Pending),
            shipping_name: Set(address.name),
            shipping_street: Set(address.street),
            shipping_city: Set(address.city),
            shipping_state: Set(address.state),
            shipping_postal_code: Set(address.postal_code),
            shipping_country: Set(address.country),
            shipping_phone: Set(address.phone),
            payment_method: Set(self.payment_method),
            payment_status: Set(PaymentStatus::Pending),
            razorpay_order_id: Set(None),
            stripe_payment_intent_id: Set(None),
            transaction_id: Set(None),
            subtotal: Set(self.subtotal),
            shipping_cost: Set(self.shipping_cost),
            tax: Set(self.tax),
            total_amount: Set(self.total_amount),
            notes: Set(self.notes),
            tracking_number: Set(None),
            estimated_delivery: Set(None),
            delivered_at: Set(None),
            cancelled_at: Set(None),
            cancellation_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        (order, items)
    }
}

/// Recomputes each line total, the subtotal and the grand total.
///
/// `shipping_cost` and `tax` are inputs; `subtotal`, `total_amount` and line totals are
/// overwritten.
pub fn recompute_totals(draft: &mut OrderDraft) {
    for line in &mut draft.lines {
        line.total = line.price * Decimal::from(line.quantity);
    }
    draft.subtotal = draft.lines.iter().map(|l| l.total).sum();
    draft.total_amount = draft.subtotal + draft.shipping_cost + draft.tax;
}

/// Sets shipping and tax from `policy` and recomputes the totals.
pub fn apply_pricing(draft: &mut OrderDraft, policy: &PricingPolicy) {
    recompute_totals(draft);
    draft.shipping_cost = policy.shipping_for(draft.subtotal);
    draft.tax = policy.tax_for(draft.subtotal);
    recompute_totals(draft);
}

/// `ORD-<unix millis>-<5 uppercase alphanumerics>`.
pub fn derive_order_number(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("ORD-{}-{}", now.timestamp_millis(), suffix)
}

/// Amount in the currency's minor unit (paise, cents), rounded half away from zero.
///
/// Fails with `BadRequest` when the amount does not fit the gateway's integer amount.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    use rust_decimal::prelude::ToPrimitive;
    amount
        .checked_mul(dec!(100))
        .map(|minor| minor.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| ServiceError::BadRequest(format!("Amount {amount} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Asha Rao".into(),
            street: "12 MG Road".into(),
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            postal_code: "560001".into(),
            country: "India".into(),
            phone: "9876543210".into(),
        }
    }

    fn draft(lines: Vec<OrderLine>) -> OrderDraft {
        OrderDraft::priced(
            Uuid::new_v4(),
            lines,
            address(),
            PaymentMethod::Cod,
            None,
            &PricingPolicy::default(),
        )
    }

    #[rstest]
    #[case(dec!(600), dec!(0), dec!(108), dec!(708))]
    #[case(dec!(500), dec!(50), dec!(90), dec!(640))]
    #[case(dec!(100), dec!(50), dec!(18), dec!(168))]
    #[case(dec!(2.50), dec!(50), dec!(0), dec!(52.50))]
    #[case(dec!(2.78), dec!(50), dec!(1), dec!(53.78))]
    fn prices_single_line(
        #[case] price: Decimal,
        #[case] shipping: Decimal,
        #[case] tax: Decimal,
        #[case] total: Decimal,
    ) {
        let d = draft(vec![OrderLine::new(Uuid::new_v4(), "Kettle", 1, price)]);
        assert_eq!(d.subtotal, price);
        assert_eq!(d.shipping_cost, shipping);
        assert_eq!(d.tax, tax);
        assert_eq!(d.total_amount, total);
    }

    #[test]
    fn recompute_overwrites_caller_supplied_totals() {
        let mut d = draft(vec![
            OrderLine::new(Uuid::new_v4(), "Mug", 2, dec!(150)),
            OrderLine::new(Uuid::new_v4(), "Plate", 1, dec!(99.5)),
        ]);
        d.subtotal = dec!(1);
        d.total_amount = dec!(1);
        d.lines[0].total = dec!(0);
        recompute_totals(&mut d);
        assert_eq!(d.lines[0].total, dec!(300));
        assert_eq!(d.subtotal, dec!(399.5));
        assert_eq!(d.total_amount, d.subtotal + d.shipping_cost + d.tax);
    }

    #[test]
    fn active_models_carry_recomputed_totals() {
        let mut d = draft(vec![OrderLine::new(Uuid::new_v4(), "Chair", 5, dec!(40))]);
        d.total_amount = dec!(999999);
        let (order, items) = d.into_active_models(Utc::now());
        assert_eq!(order.subtotal.clone().unwrap(), dec!(200));
        assert_eq!(order.total_amount.clone().unwrap(), dec!(200) + dec!(50) + dec!(36));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].order_id.clone().unwrap(), order.id.clone().unwrap());
        assert_eq!(order.status.clone().unwrap(), OrderStatus::Pending);
    }

    #[test]
    fn order_numbers_have_expected_shape() {
        let now = Utc::now();
        let number = derive_order_number(now);
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 5);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn minor_units_round_to_nearest() {
        assert_eq!(to_minor_units(dec!(708)).unwrap(), 70_800);
        assert_eq!(to_minor_units(dec!(10.005)).unwrap(), 1_001);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
    }

    #[rstest]
    #[case::beyond_i64(Decimal::from(i64::MAX))]
    #[case::beyond_decimal(Decimal::MAX)]
    fn oversized_amounts_are_rejected(#[case] amount: Decimal) {
        assert!(matches!(
            to_minor_units(amount),
            Err(ServiceError::BadRequest(_))
        ));
    }

    proptest! {
        #[test]
        fn totals_invariant_holds_for_any_lines(
            lines in prop::collection::vec((1i32..=10, 0i64..100_000i64), 1..8)
        ) {
            let lines = lines
                .into_iter()
                .map(|(q, cents)| OrderLine::new(Uuid::new_v4(), "Item", q, Decimal::new(cents, 2)))
                .collect::<Vec<_>>();
            let d = draft(lines);
            let sum: Decimal = d.lines.iter().map(|l| l.price * Decimal::from(l.quantity)).sum();
            prop_assert_eq!(d.subtotal, sum);
            prop_assert_eq!(d.total_amount, d.subtotal + d.shipping_cost + d.tax);
            prop_assert!(d.tax >= Decimal::ZERO);
            prop_assert_eq!(d.tax.scale(), 0);
            if d.subtotal > dec!(500) {
                prop_assert_eq!(d.shipping_cost, Decimal::ZERO);
            } else {
                prop_assert_eq!(d.shipping_cost, dec!(50));
            }
        }
    }
}
