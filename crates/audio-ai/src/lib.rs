//! reelcap audio intelligence
//!
//! - **Transcription:** Mono 16 kHz PCM decode, the speech-recognition
//!   collaborator contract, and the isolated worker that runs it
//! - **Subtitle Generation:** SRT/VTT output from caption chunks

pub mod subtitles;
pub mod transcription;

pub use subtitles::*;
pub use transcription::*;
