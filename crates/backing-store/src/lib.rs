//! Backing store access for the hub.
//!
//! Rows live in Supabase tables scoped by an owning `user_id` column. This
//! crate provides typed records, the [`BackingStore`] and [`ChangeFeed`]
//! seams, and three implementations:
//!
//! - [`SupabaseClient`]: PostgREST over HTTP, plus edge function invocation
//! - [`RealtimeClient`]: Supabase realtime change feed over a websocket
//! - [`MemoryBackingStore`]: in-process tables for tests and offline use

mod error;
mod memory;
mod phoenix;
mod query;
mod realtime;
mod records;
mod supabase;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryBackingStore;
pub use phoenix::PhoenixMessage;
pub use query::{ChangeFilter, Collection, RowQuery, OWNER_COLUMN};
pub use realtime::{ConnectionState, RealtimeClient};
pub use records::{
    decode_rows, Activity, AgentMetric, ChangeEvent, FileSnapshot, GeneratedChange, Installation,
    KnowledgeNode, RepositoryRef, RowChange, Task, TaskMetadata, TaskStats, TaskStatus,
};
pub use supabase::SupabaseClient;
pub use traits::{select_typed, BackingStore, ChangeFeed, ChangeSubscription};
