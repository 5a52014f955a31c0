//! Builtin preprocessing steps.
//!
//! Every builtin step leaves the flagged sync channel untouched: it is
//! excluded from any cross-channel statistic and its samples are never
//! modified. Sync-channel suppression therefore commutes with the whole
//! builtin chain and can be sequenced freely by the caller.

pub mod bandpass_filter;
pub mod common_reference;
pub mod notch_filter;
pub mod zscore;

pub use bandpass_filter::BandpassFilterFactory;
pub use common_reference::CommonReferenceFactory;
pub use notch_filter::NotchFilterFactory;
pub use zscore::ZscoreFactory;

use crate::registry::StepRegistry;

/// Registers every builtin step factory.
pub fn register_builtin_steps(registry: &mut StepRegistry) {
    registry.register(BandpassFilterFactory);
    registry.register(CommonReferenceFactory);
    registry.register(NotchFilterFactory);
    registry.register(ZscoreFactory);
}
