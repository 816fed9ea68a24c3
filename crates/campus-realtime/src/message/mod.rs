//! Wire frames exchanged with the realtime service.

pub mod envelope;

pub use envelope::Envelope;
