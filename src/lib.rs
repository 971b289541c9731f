#![warn(missing_docs)]
//! # Baichuan
//!
//! A client library for Reolink and family cameras speaking the proprietary
//! Baichuan protocol on TCP port 9000.
//!
//! High level camera controls live in the [`bc_protocol`] module. A session
//! is opened with
//!
//! ```no_run
//! use baichuan::bc_protocol::{BcCamera, MaxEncryption, DEFAULT_PORT};
//! let camera = BcCamera::connect(("camera_ip_address", DEFAULT_PORT)).unwrap();
//! let login = camera.login("admin", Some("password"), MaxEncryption::Aes).unwrap();
//! ```
//!
//! after which a video stream can be started with
//! [`bc_protocol::BcCamera::start_stream`]. Frames are delivered as
//! [`bcmedia::model::BcMedia`] values through caller supplied callbacks,
//! invoked on the stream's receive thread.

/// Contains the low level BC wire structures: headers, XML bodies and ciphers
pub mod bc;
/// Contains the high level interfaces for the camera: login and streaming
pub mod bc_protocol;
/// Contains the media sub-stream carried inside video messages
pub mod bcmedia;

pub use bc_protocol::Error;

pub(crate) use bc_protocol::Result;

pub(crate) type NomErrorType<'a> = nom::error::VerboseError<&'a [u8]>;

use std::time::Duration;

/// How long to wait on a reply during the login handshake
pub(crate) const RX_TIMEOUT: Duration = Duration::from_secs(10);
