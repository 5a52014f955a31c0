//! On-disk session handling for spikeprep.
//!
//! This crate owns everything that touches the subject/session/run directory
//! tree: discovering raw runs, deriving canonical output paths, loading and
//! persisting recordings, and the sync-channel service.

pub mod discovery;
pub mod loader;
pub mod paths;
pub mod sync;

pub use discovery::{discover, discover_processed, DiscoveryError};
pub use loader::{
    read_recording, write_recording, JsonRecordingLoader, LoaderError, RecordingLoader,
};
pub use paths::OutputPathManager;
pub use sync::{SyncChannelService, SyncError};
