//! The media sub-stream carried inside the payloads of video messages
//!
//! Once a preview is running the camera sends a continuous stream of BcMedia
//! units inside binary video payloads. Units do not align with message
//! boundaries, so the [`framer`] re-assembles them from the concatenated
//! payload bytes. Every unit starts with a 32 bit magic and ends with
//! padding to an 8 byte boundary.

/// Contains the media frame structures
pub mod model;

pub(crate) mod de;
pub(crate) mod framer;
