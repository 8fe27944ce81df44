//! Keeps local copies of the current user's collections fresh.
//!
//! Each tracked collection gets one [`SubscriptionHandle`]: subscribe to row
//! changes for the user, fetch immediately, and re-fetch the whole collection
//! on every change. Results are published as [`CollectionView`] snapshots
//! through `tokio::sync::watch`, so readers always see one complete list.
//!
//! Switching users stops and awaits every handle before the next user's
//! handles start, so two users are never subscribed at once.

mod error;
mod handle;
mod sync;
mod view;

#[cfg(test)]
mod tests;

pub use error::{SyncError, SyncResult};
pub use handle::SubscriptionHandle;
pub use sync::RealtimeStateSync;
pub use view::{CollectionView, SyncedRecord};
