//! File identity: exact content checksums and perceptual similarity digests.
//!
//! Both are pure functions of their input. Equality of either digest is the
//! only comparison offered; similarity tolerance lives in the reduction.

pub mod checksum;
pub mod similarity;

pub use checksum::{checksum_file, compute_checksum, ContentChecksum};
pub use similarity::{compute_similarity_fingerprint, SimilarityFingerprint};
