//! The Baichuan message format is a 20 or 24 byte header followed by the
//! message body. The header's `msg_class` dictates its size: `0x6514`
//! (legacy) and `0x6614` (modern) headers are 20 bytes, while `0x6414` and
//! `0x0000` headers carry an extra word, the `payload_offset`.
//!
//! # Payloads
//!
//! The `payload_offset` splits the body into up to two payloads.
//!
//! ## Extension payload
//!
//! The bytes before the `payload_offset` are the extension xml. It carries
//! metadata about the payload proper, such as the channel id or whether the
//! payload is binary.
//!
//! ## Payload
//!
//! The bytes after the `payload_offset` are the primary payload. It is
//! "encrypted" xml (a simple XOR routine or AES depending on the login
//! negotiation) except for video messages, whose payloads are binary data
//! in the bc media format.

/// Contains the structure of the messages such as headers and payloads
pub mod model;

/// Contains code related to the deserialisation of bc packets
pub mod de;
/// Contains code related to the serialisation of bc packets
pub mod ser;
/// Contains the structs for the known xmls of payloads and extensions
pub mod xml;

pub(crate) mod crypto;
