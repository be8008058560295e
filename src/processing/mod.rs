//! Processing: snapshot → denoised, standardized series → window batch.

pub mod preprocess;
pub mod wavelet;
pub mod window;
