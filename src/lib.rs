// REXL expression engine
//
// Calculations, skip logic, and validation rules over the answers of a
// structured form.

pub mod config;
pub mod context;
pub mod expr;

#[cfg(feature = "playground")]
pub mod playground;
