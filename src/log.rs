//! Logging facade, selects `log` or `defmt` macros

#[cfg(not(feature = "defmt"))]
pub(crate) use ::log::{trace, debug, info, warn, error};

#[cfg(feature = "defmt")]
pub(crate) use defmt::{trace, debug, info, warn, error};


/// Bound for errors that may be emitted via the active logger
#[cfg(not(feature = "defmt"))]
pub trait FmtError: core::fmt::Debug {}

#[cfg(not(feature = "defmt"))]
impl <T: core::fmt::Debug> FmtError for T {}

/// Bound for errors that may be emitted via the active logger
#[cfg(feature = "defmt")]
pub trait FmtError: core::fmt::Debug + defmt::Format {}

#[cfg(feature = "defmt")]
impl <T: core::fmt::Debug + defmt::Format> FmtError for T {}
