//! String formatting utilities.
//!
//! Provides functions for shortening identifiers and tokens before they are
//! written to logs, and for rendering money amounts consistently.

use rust_decimal::Decimal;

/// Utility function to truncate an identifier for display purposes.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

/// Masks a pickup token so that it can be logged without being replayable.
///
/// Keeps the first 4 characters and replaces the rest with a fixed marker.
/// Tokens are single-use bearer credentials until redeemed, so the full
/// value must never reach a log sink.
pub fn mask_token(token: &str) -> String {
	match token.char_indices().nth(4) {
		Some((idx, _)) => format!("{}****", &token[..idx]),
		None => "****".to_string(),
	}
}

/// Formats a money amount with exactly two decimal places.
pub fn format_money(amount: Decimal) -> String {
	format!("{:.2}", amount.round_dp(2))
}
