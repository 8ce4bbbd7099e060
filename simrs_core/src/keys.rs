//! Arena keys for the simulation kernel.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

simrs_tinymap::key_type! {
    /// Stable handle to an `Event` owned by an `Environment`.
    ///
    /// `EventKey`s are minted in insertion order and are never reused; an `Environment` never
    /// removes an event from its arena, so a key obtained from an `Environment` stays valid for
    /// the lifetime of that `Environment`.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub EventKey
}
