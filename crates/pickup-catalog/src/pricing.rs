//! Pricing rules for order lines.
//!
//! Pricing is a pure function of a product snapshot and the customer's
//! selections. It performs no I/O, so it is safe to call concurrently and
//! repeatedly, and the same inputs always price the same way.

use pickup_types::{OrderLine, ProductSnapshot, SelectedAddOn, SelectedSize};
use rust_decimal::Decimal;
use thiserror::Error;

/// Default upper bound for the quantity of a single line.
pub const DEFAULT_MAX_QUANTITY: u32 = 20;

/// Errors that can occur while pricing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
	/// Quantity outside `1..=max`.
	#[error("Quantity must be between 1 and {max}, got {quantity}")]
	InvalidQuantity { quantity: u32, max: u32 },
	/// An amount exceeded the representable range.
	#[error("Amount overflow while pricing {0}")]
	Overflow(String),
}

/// A priced order line together with the requested add-ons that did not
/// match the product.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
	pub line: OrderLine,
	pub ignored_add_ons: Vec<String>,
}

/// Computes line and order totals from catalog snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingEngine {
	max_quantity: u32,
}

impl Default for PricingEngine {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_QUANTITY)
	}
}

impl PricingEngine {
	/// Creates a pricing engine accepting quantities up to `max_quantity`.
	pub fn new(max_quantity: u32) -> Self {
		Self { max_quantity }
	}

	/// Returns the largest accepted quantity per line.
	pub fn max_quantity(&self) -> u32 {
		self.max_quantity
	}

	/// Prices one line as `(base + size delta + add-ons) * quantity`.
	///
	/// A size that the product does not offer prices as no modifier and is
	/// not recorded on the line. Add-on names the product does not offer
	/// contribute nothing and are returned in `ignored_add_ons`. Each
	/// occurrence of a matching add-on is charged.
	pub fn compute_line_total(
		&self,
		product: &ProductSnapshot,
		size: Option<&str>,
		add_on_names: &[String],
		quantity: u32,
	) -> Result<PricedLine, PricingError> {
		if quantity == 0 || quantity > self.max_quantity {
			return Err(PricingError::InvalidQuantity {
				quantity,
				max: self.max_quantity,
			});
		}

		let size = size.and_then(|name| {
			product.sizes.get(name).map(|delta| SelectedSize {
				name: name.to_string(),
				price_delta: *delta,
			})
		});

		let mut add_ons = Vec::new();
		let mut ignored_add_ons = Vec::new();
		for name in add_on_names {
			match product.add_ons.get(name) {
				Some(price) => add_ons.push(SelectedAddOn {
					name: name.clone(),
					price: *price,
				}),
				None => ignored_add_ons.push(name.clone()),
			}
		}

		let overflow = || PricingError::Overflow(product.id.clone());
		let mut unit_price = product.base_price;
		if let Some(size) = &size {
			unit_price = unit_price.checked_add(size.price_delta).ok_or_else(overflow)?;
		}
		for add_on in &add_ons {
			unit_price = unit_price.checked_add(add_on.price).ok_or_else(overflow)?;
		}
		let line_total = unit_price
			.checked_mul(Decimal::from(quantity))
			.ok_or_else(overflow)?;

		Ok(PricedLine {
			line: OrderLine {
				product_id: product.id.clone(),
				product_name: product.name.clone(),
				base_price: product.base_price,
				size,
				add_ons,
				quantity,
				line_total,
			},
			ignored_add_ons,
		})
	}

	/// Sums the line totals of an order.
	pub fn compute_order_total(&self, lines: &[OrderLine]) -> Result<Decimal, PricingError> {
		lines.iter().try_fold(Decimal::ZERO, |total, line| {
			total
				.checked_add(line.line_total)
				.ok_or_else(|| PricingError::Overflow("order total".to_string()))
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;
	use std::collections::BTreeMap;

	fn latte() -> ProductSnapshot {
		ProductSnapshot {
			id: "latte".into(),
			name: "Latte".into(),
			base_price: dec!(3.50),
			sizes: BTreeMap::from([("small".into(), dec!(0)), ("large".into(), dec!(0.50))]),
			add_ons: BTreeMap::from([
				("Extra Shot".into(), dec!(1.00)),
				("Oat Milk".into(), dec!(0.60)),
			]),
			available: true,
		}
	}

	#[test]
	fn test_large_latte_with_extra_shot() {
		let engine = PricingEngine::default();
		let priced = engine
			.compute_line_total(&latte(), Some("large"), &["Extra Shot".into()], 2)
			.unwrap();

		assert_eq!(priced.line.line_total, dec!(10.00));
		assert_eq!(
			priced.line.size,
			Some(SelectedSize {
				name: "large".into(),
				price_delta: dec!(0.50)
			})
		);
		assert_eq!(priced.line.add_ons.len(), 1);
		assert!(priced.ignored_add_ons.is_empty());
		assert_eq!(
			engine.compute_order_total(&[priced.line]).unwrap(),
			dec!(10.00)
		);
	}

	#[test]
	fn test_unknown_size_prices_as_no_modifier() {
		let engine = PricingEngine::default();
		let priced = engine
			.compute_line_total(&latte(), Some("venti"), &[], 1)
			.unwrap();
		assert_eq!(priced.line.line_total, dec!(3.50));
		assert_eq!(priced.line.size, None);

		let mut plain = latte();
		plain.sizes.clear();
		let priced = engine
			.compute_line_total(&plain, Some("large"), &[], 1)
			.unwrap();
		assert_eq!(priced.line.line_total, dec!(3.50));
	}

	#[test]
	fn test_unmatched_add_ons_ignored() {
		let engine = PricingEngine::default();
		let priced = engine
			.compute_line_total(
				&latte(),
				None,
				&["Oat Milk".into(), "Sprinkles".into(), "Oat Milk".into()],
				1,
			)
			.unwrap();

		assert_eq!(priced.line.line_total, dec!(4.70));
		assert_eq!(priced.ignored_add_ons, vec!["Sprinkles".to_string()]);
		assert_eq!(priced.line.add_ons.len(), 2);
	}

	#[test]
	fn test_quantity_bounds() {
		let engine = PricingEngine::new(20);
		assert_eq!(
			engine.compute_line_total(&latte(), None, &[], 0),
			Err(PricingError::InvalidQuantity {
				quantity: 0,
				max: 20
			})
		);
		assert!(engine.compute_line_total(&latte(), None, &[], 21).is_err());
		let priced = engine.compute_line_total(&latte(), None, &[], 20).unwrap();
		assert_eq!(priced.line.line_total, dec!(70.00));
	}

	#[test]
	fn test_pricing_is_deterministic() {
		let engine = PricingEngine::default();
		let product = latte();
		let add_ons = vec!["Extra Shot".to_string(), "Unknown".to_string()];
		let first = engine
			.compute_line_total(&product, Some("large"), &add_ons, 3)
			.unwrap();
		for _ in 0..10 {
			let again = engine
				.compute_line_total(&product, Some("large"), &add_ons, 3)
				.unwrap();
			assert_eq!(again, first);
		}
	}

	#[test]
	fn test_priced_line_is_a_snapshot() {
		let engine = PricingEngine::default();
		let mut product = latte();
		let priced = engine
			.compute_line_total(&product, Some("large"), &["Extra Shot".into()], 1)
			.unwrap();

		product.base_price = dec!(9.99);
		product.add_ons.insert("Extra Shot".into(), dec!(5.00));

		assert_eq!(priced.line.base_price, dec!(3.50));
		assert_eq!(priced.line.add_ons[0].price, dec!(1.00));
		assert_eq!(priced.line.line_total, dec!(5.00));
	}

	#[test]
	fn test_empty_order_total_is_zero() {
		let engine = PricingEngine::default();
		assert_eq!(engine.compute_order_total(&[]).unwrap(), Decimal::ZERO);
	}
}
