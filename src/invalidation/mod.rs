//! Invalidation Module
//!
//! Mutation-triggered invalidation: rules as data, and the engine that
//! applies them to a store.

mod engine;
mod rule;

pub use engine::InvalidationEngine;
pub use rule::{FieldMatch, InvalidationRule, KeyMatcher, MutationContext, TargetRule};
