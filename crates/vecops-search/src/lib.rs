//! Consistency, provisioning, and probe core.
//!
//! Four pieces layered over [`vecops_store::DocumentStore`]:
//! - [`normalize`]: scan/repair embedding metadata against the canonical
//!   (model, dimension) pair
//! - [`index_repair`]: validate and idempotently repair vector indexes
//! - [`probe`]: approximate-similarity probing with a uniform result
//!   envelope on every path
//! - [`provision`]: the view/connection cache that skips redundant
//!   provisioning across repeated connect calls

#![deny(warnings)]
#![deny(unused_imports)]

pub mod index_repair;
pub mod normalize;
pub mod probe;
pub mod provision;
