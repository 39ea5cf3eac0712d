//! # handoff
//!
//! Password-sealed envelopes and a one-time, code-addressed relay.
//!
//! A sender seals data under a passphrase on their own device and parks the
//! envelope under a short handoff code. The server stores the envelope keyed
//! by a peppered hash of the code, so it never holds the plaintext, the
//! passphrase or the code. The receiver redeems the code once and opens the
//! envelope locally.
//!
//! ## Public API
//!
//! - [`policy::PasswordPolicy`]: passphrase rules checked before sealing.
//! - [`keys::derive_key`]: PBKDF2-HMAC-SHA256 under a named [`KdfProfile`].
//! - [`envelope::EnvelopeCodec`]: `base64(salt ‖ iv ‖ ciphertext)` envelopes.
//! - [`code::CodeHasher`]: peppered code hashes, the store's only key.
//! - [`store::HandoffStore`]: [`MemoryStore`] and [`SqliteStore`].
//! - [`reaper::ExpiryReaper`]: periodic purge of expired records.
//! - [`Relay`]: all of the above wired together.
//!
//! Primitives are reached only through a [`CryptoProvider`] value passed in
//! at construction; there is no global provider.

pub mod code;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod keys;
pub mod policy;
pub mod provider;
pub mod reaper;
pub mod relay;
pub mod store;

pub use code::{generate_code, CodeHash, CodeHasher};
pub use config::RelayConfig;
pub use envelope::{Envelope, EnvelopeCodec};
pub use error::{HandoffError, Result};
pub use keys::{derive_key, KdfProfile};
pub use policy::{PasswordPolicy, PolicyReport};
pub use provider::{Aead, CryptoProvider, RingProvider};
pub use reaper::ExpiryReaper;
pub use relay::{HandoffPayload, Relay};
pub use store::{Backend, HandoffStore, MemoryStore, RetrievalMode, SqliteStore, TakeResult, Taken};
