//! Timely - class attendance ledger with attendance suggestions
//!
//! Tracks attended/held sessions per subject for a signed-in user, persists
//! every change to a per-user document store, and asks an external
//! recommendation service which classes to prioritise.

pub mod app;
pub mod config;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod store;
pub mod suggest;

pub use app::App;
pub use error::{Error, Result};
pub use identity::{Credentials, Identity, IdentityProvider, UserId};
pub use ledger::{Ledger, SessionMark, Subject};
pub use store::{DocumentId, DocumentStore};
pub use suggest::{RecommendationService, SuggestionRequestor};
