mod histogram;
mod verifier;

pub use histogram::{color_histogram, cosine_similarity, BINS_PER_CHANNEL, COMPARE_EDGE};
pub use verifier::{FileCodec, ImageCodec, PhotoVerifier, VerificationResult};
