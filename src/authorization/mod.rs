//! Ledger read authorization

pub mod gate;

pub use gate::AccessGate;
