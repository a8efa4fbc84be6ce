//! The engine as seen by external collaborators.
//!
//! A sync layer needs three things from a repository: the changes made
//! since some ref, a way to apply changes received from elsewhere, and a
//! report of what is left unresolved. A backup manager needs to capture
//! everything a user could lose and put it back later. Both talk to the
//! repository only through the operations here.

mod changes;
mod conflicts;
mod error;
mod snapshot;

pub use changes::{apply_changes, changes_since, ApplyReport, ChangeSet};
pub use conflicts::{report_conflicts, ConflictReport, Operation};
pub use error::SyncError;
pub use snapshot::{list_snapshots, restore, snapshot, HeadState, Snapshot, SnapshotId};

pub type Result<T> = std::result::Result<T, SyncError>;
