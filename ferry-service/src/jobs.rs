//! Remote job lifecycle: submit once, poll at a fixed interval, stop on a terminal state.
//!
//! Providers disagree on status vocabulary ("PROCESSED", "completed", "succeeded", ...);
//! [`StatusVocabulary`] is the single place raw strings become a [`JobStatus`].
//! [`run_job`] only ever reasons about the normalized enum.

mod poll;
mod status;
mod types;

pub use poll::{PollSettings, run_job};
pub use status::{JobStatus, StatusVocabulary};
pub use types::{
    ArtifactKind, FetchedArtifact, JobHandle, JobRequest, RawOutput, RawStatus, RemoteArtifactRef,
};
