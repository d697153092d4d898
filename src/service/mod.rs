// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service layer: seeding, change routing and the harvester facade.
//!
//! This module wires the ports together. [`Seeder`] resolves every field once at
//! startup, [`Monitor`] applies the changes watchers report afterwards, and
//! [`Harvester`] runs one after the other.

mod flags;
pub mod harvester;
pub mod monitor;
pub mod seeder;

// Re-export commonly used types
pub use harvester::{Harvester, HarvesterBuilder};
pub use monitor::Monitor;
pub use seeder::Seeder;
