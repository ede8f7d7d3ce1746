//! Guards applied before any provider mutation

pub mod card_guard;

pub use card_guard::CardGuard;
