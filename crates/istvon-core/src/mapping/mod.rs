//! Deterministic slot mapping into the ISTVON schema.

pub mod mapper;
pub mod rules;
pub mod schema;
pub mod templates;

pub use mapper::{SlotMapper, SlotMapping, SlotSource};
pub use rules::{ExtractionRules, Lexicon};
pub use schema::{IstvonMap, MilestoneStatus, Outcome, Slot};
pub use templates::{DomainTemplate, DomainsFile};
