//! reelcap project model
//!
//! Defines the core data contracts for reelcap projects:
//! - **Captions:** Timed caption chunks and the ordered track that owns them
//! - **Style:** Caption font, colors, opacity, and vertical placement
//! - **Geometry:** The two supported output presets (9:16 and 16:9)
//! - **Playback:** Current time, duration, source orientation, and crop
//! - **Project:** On-disk project metadata and caption storage
//!
//! All times are in seconds.

pub mod caption;
pub mod geometry;
pub mod playback;
pub mod project;
pub mod style;

pub use caption::*;
pub use geometry::*;
pub use playback::*;
pub use project::*;
pub use style::*;
