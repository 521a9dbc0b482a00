//! Pickup token issuance.
//!
//! Tokens are opaque: 128 random bits, hex encoded, with nothing derived
//! from the order. Uniqueness is enforced by storage at insertion; the
//! issuer only makes collisions vanishingly unlikely.

use rand::RngCore;
use std::fmt;
use std::sync::Arc;

/// Number of random bytes in a token.
pub const TOKEN_BYTES: usize = 16;

type TokenSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Issues single-use pickup tokens.
#[derive(Clone, Default)]
pub struct TokenIssuer {
	source: Option<TokenSource>,
}

impl TokenIssuer {
	/// Creates an issuer backed by the thread-local CSPRNG.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an issuer that takes tokens from `source` instead of the RNG.
	pub fn with_source<F>(source: F) -> Self
	where
		F: Fn() -> String + Send + Sync + 'static,
	{
		Self {
			source: Some(Arc::new(source)),
		}
	}

	/// Issues a new token.
	pub fn issue(&self) -> String {
		match &self.source {
			Some(source) => source(),
			None => {
				let mut bytes = [0u8; TOKEN_BYTES];
				rand::rng().fill_bytes(&mut bytes);
				hex::encode(bytes)
			},
		}
	}
}

impl fmt::Debug for TokenIssuer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TokenIssuer")
			.field("custom_source", &self.source.is_some())
			.finish()
	}
}
