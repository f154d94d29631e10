//! Demo/test-double adapters. Concrete vendor integrations are out of
//! scope for this core (spec section 1's non-goals); `mock` is what
//! stands in for them so the binary runs end to end.

pub mod mock;
