//! I/O modules for decoding imagery and fetching reference maps

pub mod codec;
pub mod cache;
pub mod rate_gate;
pub mod reference;

pub use codec::{ImageStatistics, ResizeFilter, EncodeFormat};
pub use cache::{CachedReference, InMemoryReferenceCache, ReferenceCache};
pub use rate_gate::{Clock, RateGate, SystemClock};
pub use reference::{FetchedImage, HttpMapImageSource, MapImageSource, ReferenceImageProvider};
