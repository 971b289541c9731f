pub use super::xml::{BcPayloads, BcXml, Extension};
use std::collections::HashSet;

/// Magic leading every BC header
pub(super) const MAGIC_HEADER: u32 = 0x0abcdef0;
/// Byte reversed magic some firmwares emit. Accepted on receive only
pub(super) const MAGIC_HEADER_REV: u32 = 0x0fedcba0;

/// Login messages have this ID
pub const MSG_ID_LOGIN: u32 = 1;
/// Logout messages have this ID
pub const MSG_ID_LOGOUT: u32 = 2;
/// Video and audio stream messages have this ID
pub const MSG_ID_VIDEO: u32 = 3;
/// ID used to stop the video stream
pub const MSG_ID_VIDEO_STOP: u32 = 4;
/// Version messages have this ID
pub const MSG_ID_VERSION: u32 = 80;
/// Ping messages have this ID
pub const MSG_ID_PING: u32 = 93;

/// The camera accepted the request
pub const RESPONSE_CODE_OK: u16 = 200;

/// Request code advertising an unencrypted session
pub(crate) const ENC_REQUEST_NONE: u16 = 0xdc00;
/// Request code advertising at most BCEncrypt
pub(crate) const ENC_REQUEST_BCENCRYPT: u16 = 0xdc01;
/// Request code advertising at most AES (the camera picks regular or full)
pub(crate) const ENC_REQUEST_AES: u16 = 0xdc12;

/// Name a message ID for log lines
pub(crate) fn msg_id_name(msg_id: u32) -> &'static str {
    match msg_id {
        MSG_ID_LOGIN => "Login",
        MSG_ID_LOGOUT => "Logout",
        MSG_ID_VIDEO => "Video",
        MSG_ID_VIDEO_STOP => "VideoStop",
        MSG_ID_VERSION => "Version",
        MSG_ID_PING => "Ping",
        _ => "Unknown",
    }
}

/// Top level bc message
#[derive(Debug, PartialEq)]
pub struct Bc {
    /// The header part of the message
    pub meta: BcMeta,
    /// Extension xml, present when the header's `payload_offset` is non zero.
    /// It describes the payload that follows, such as whether it is binary
    pub extension: Option<Extension>,
    /// The primary payload. Xml for control messages, binary for media.
    /// `None` on header-only messages, where the header `response_code`
    /// carries the reply
    pub payload: Option<BcPayloads>,
}

#[derive(Debug, PartialEq, Eq)]
pub(super) struct BcHeader {
    pub body_len: u32,
    pub msg_id: u32,
    pub channel_id: u8,
    pub stream_type: u8,
    pub msg_num: u16,
    pub response_code: u16,
    pub class: u16,
    pub payload_offset: Option<u32>,
}

/// The components of the Baichuan header that are not descriptions of the
/// body (the application dictates these)
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BcMeta {
    /// Message ID dictates the major content of the message
    pub msg_id: u32,
    /// In most cases 0 but can be other values for NVRs
    pub channel_id: u8,
    /// Stream selector: 0 main, 1 sub, 2 extern. Only meaningful on
    /// [`MSG_ID_VIDEO`] messages
    pub stream_type: u8,
    /// On requests this carries the encryption request magic during the
    /// legacy login and `0` otherwise. On replies it is the response code:
    /// `200` for OK, `400` for bad request, or one of the `0xDDxx`
    /// negotiation codes during login
    pub response_code: u16,
    /// Sequence tag used to match replies with requests; the camera parrots
    /// this number back. A message too long for one packet is split over
    /// several messages with the same `msg_num` (video streams do this)
    pub msg_num: u16,
    /// The class dictates the size of the header. Known values are
    ///
    /// - 0x6514: legacy, 20 bytes
    /// - 0x6614: modern, 20 bytes
    /// - 0x6414: modern, 24 bytes
    /// - 0x0000: modern, 24 bytes
    pub class: u16,
}

/// The encryption kinds a camera can negotiate during login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionKind {
    /// Older cameras use no encryption
    Unencrypted,
    /// Cameras/firmwares before 2021 use a simple XOR
    BCEncrypt,
    /// AES-CFB128 over the xml parts only
    Aes,
    /// AES-CFB128 that also covers a prefix of binary payloads
    FullAes,
}

impl EncryptionKind {
    /// Decode the camera's choice from the `0xDDxx` login reply code
    pub(crate) fn from_reply_code(code: u16) -> Option<EncryptionKind> {
        if (code >> 8) != 0xdd {
            return None;
        }
        match code & 0xff {
            0x00 => Some(EncryptionKind::Unencrypted),
            0x01 => Some(EncryptionKind::BCEncrypt),
            0x02 => Some(EncryptionKind::Aes),
            0x12 => Some(EncryptionKind::FullAes),
            _ => None,
        }
    }
}

/// The cipher installed on a connection
///
/// The mode is negotiated during login. Whatever the mode, headers are never
/// encrypted and neither is binary media, except for the `FullAes` prefix
/// convention
#[derive(Debug, Clone)]
pub enum EncryptionProtocol {
    /// No cipher. Everything is plaintext
    Unencrypted,
    /// XOR with a rotating key, keyed by the connection byte offset
    BCEncrypt,
    /// AES-CFB128 with the key derived from the password and the NONCE.
    /// Binary payloads pass through untouched
    Aes([u8; 16]),
    /// Same cipher as [`EncryptionProtocol::Aes`] but binary payloads have
    /// their first `encryptLen` bytes enciphered too
    FullAes([u8; 16]),
}

impl EncryptionProtocol {
    /// The kind of this protocol, without the key material
    pub fn kind(&self) -> EncryptionKind {
        match self {
            EncryptionProtocol::Unencrypted => EncryptionKind::Unencrypted,
            EncryptionProtocol::BCEncrypt => EncryptionKind::BCEncrypt,
            EncryptionProtocol::Aes(_) => EncryptionKind::Aes,
            EncryptionProtocol::FullAes(_) => EncryptionKind::FullAes,
        }
    }
}

/// The per-connection cipher state
///
/// Keeps the installed cipher, the send/receive byte counters that key
/// BCEncrypt, and the set of `msg_num`s known to carry binary payloads.
/// These are correctness-coupled, so they live behind the one type and the
/// connection guards it with a single mutex.
#[derive(Debug)]
pub(crate) struct BcContext {
    encryption_protocol: EncryptionProtocol,
    pub(crate) in_bin_mode: HashSet<u16>,
    /// Total body bytes sent on the connection since the last reset
    pub(crate) send_offset: u32,
    /// Total body bytes received on the connection since the last reset
    pub(crate) recv_offset: u32,
}

impl BcContext {
    pub(crate) fn new() -> BcContext {
        BcContext {
            encryption_protocol: EncryptionProtocol::Unencrypted,
            in_bin_mode: HashSet::new(),
            send_offset: 0,
            recv_offset: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_with_encryption(encryption_protocol: EncryptionProtocol) -> BcContext {
        BcContext {
            encryption_protocol,
            in_bin_mode: HashSet::new(),
            send_offset: 0,
            recv_offset: 0,
        }
    }

    pub(crate) fn set_encrypted(&mut self, encryption_protocol: EncryptionProtocol) {
        self.encryption_protocol = encryption_protocol;
    }

    pub(crate) fn get_encrypted(&self) -> &EncryptionProtocol {
        &self.encryption_protocol
    }

    pub(crate) fn binary_on(&mut self, msg_num: u16) {
        self.in_bin_mode.insert(msg_num);
    }

    pub(crate) fn clear_binary(&mut self) {
        self.in_bin_mode.clear();
    }

    pub(crate) fn reset_offsets(&mut self) {
        self.send_offset = 0;
        self.recv_offset = 0;
    }
}

impl Bc {
    /// Constructs an xml payload only Bc message
    pub fn new_from_xml(meta: BcMeta, xml: BcXml) -> Bc {
        Self::new(meta, None, Some(BcPayloads::BcXml(xml)))
    }

    /// Constructs a header only Bc message
    pub fn new_from_meta(meta: BcMeta) -> Bc {
        Self::new(meta, None, None)
    }

    /// Constructs a message with both extension and xml payload
    pub fn new_from_ext_xml(meta: BcMeta, ext: Extension, xml: BcXml) -> Bc {
        Self::new(meta, Some(ext), Some(BcPayloads::BcXml(xml)))
    }

    /// General method to construct a Bc message
    ///
    /// Use this when constructing a binary payload, otherwise the other
    /// constructors are better suited to the task
    pub fn new(meta: BcMeta, extension: Option<Extension>, payload: Option<BcPayloads>) -> Bc {
        Bc {
            meta,
            extension,
            payload,
        }
    }
}

impl BcHeader {
    /// Converts a header into a `BcMeta`, stripping the aspects that are
    /// descriptions of the wire data such as `body_len`
    pub fn to_meta(&self) -> BcMeta {
        BcMeta {
            msg_id: self.msg_id,
            msg_num: self.msg_num,
            channel_id: self.channel_id,
            response_code: self.response_code,
            stream_type: self.stream_type,
            class: self.class,
        }
    }

    /// Construct a [`BcHeader`] from a [`BcMeta`] plus the wire facts that
    /// only exist once the body is serialized
    pub fn from_meta(meta: &BcMeta, body_len: u32, payload_offset: Option<u32>) -> BcHeader {
        BcHeader {
            payload_offset,
            body_len,
            msg_id: meta.msg_id,
            channel_id: meta.channel_id,
            stream_type: meta.stream_type,
            response_code: meta.response_code,
            msg_num: meta.msg_num,
            class: meta.class,
        }
    }
}

pub(super) fn has_payload_offset(class: u16) -> bool {
    // 0x6514: legacy, no  bin offset (initial login message)
    // 0x6614: modern, no  bin offset (reply to the 0x6514 login)
    // 0x6414: modern, has bin offset (re-sent login message)
    // 0x0000: modern, has bin offset (most modern messages)
    class == 0x6414 || class == 0x0000
}
