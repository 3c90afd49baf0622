//! Studio Storage - staged-change storage core for the content studio
//!
//! Editors mutate records in a draft store; publishing projects approved
//! mutations into a live store consumed by the public site and a search
//! index.
//!
//! ## Architecture
//!
//! - **Record store adapter**: uniform CRUD over the two SQLite stores
//!   for every registered record kind, with fake delete and an index
//!   flag on saves
//! - **Change ledger**: copy-on-write snapshots and an append-only
//!   change log; commit projects staged state into the live store
//! - **Publisher**: groups commits into publish events, per record or
//!   in bulk
//! - **Index hook**: mirrors live-store writes of indexable kinds into
//!   the search index
//!
//! ## Storage layout
//!
//! ```text
//! ~/.local/share/studio-storage/
//! ├── draft.db     # Editing store: records + change ledger
//! ├── live.db      # Published store: records only
//! └── config.toml  # Configuration
//! ```
//!
//! ## Two stores, one identity
//!
//! Staging a mutation duplicates the record into a snapshot with a
//! fresh id; the original id (the base id) is what changes reference
//! and what the live store publishes under. Deleting is a fake delete -
//! the row stays, untracked - so every staged snapshot keeps resolving.

pub mod actor;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod ledger;
pub mod maintenance;
pub mod media;
pub mod publish;
pub mod registry;
pub mod relations;
pub mod store;

// Re-exports
pub use actor::Actor;
pub use config::Config;
pub use db::{ChangeGroupRow, ChangeRow, NewRecord, RecordRow, StageType, Store};
pub use error::StudioError;
pub use index::{InMemoryIndex, IndexDocument, SearchIndex};
pub use ledger::ChangeLedger;
pub use media::{MediaMove, MediaOrder};
pub use publish::{BulkCommitReceipt, Publisher, PublishReceipt, SkippedChange};
pub use registry::{FieldDef, FieldKind, RecordSchema, SchemaRegistry};
pub use relations::{RelEntry, RelLevel, RelMap};
pub use store::RecordStore;
