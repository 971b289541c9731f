use crate::bc::model::msg_id_name;
use log::*;
use std::net::ToSocketAddrs;
use std::sync::{
    atomic::{AtomicBool, AtomicU16, Ordering},
    Arc,
};
use std::time::Duration;

mod connection;
mod credentials;
mod errors;
mod login;
mod stream;

pub(crate) use connection::Connection;
pub(crate) use credentials::Credentials;
pub use errors::Error;
pub use login::{LoginResult, MaxEncryption};
pub use stream::{Stream, StreamData, StreamHandlers, StreamStats};

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// The tcp port a Baichuan camera listens on
pub const DEFAULT_PORT: u16 = 9000;

/// How long to wait for the initial tcp connect
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cameras occasionally push unsolicited traffic; tolerate this many
/// messages before declaring a reply missing
pub(crate) const UNSOLICITED_SKIP_LIMIT: usize = 5;

///
/// This is the primary struct of this library when interacting with the
/// camera
///
pub struct BcCamera {
    connection: Arc<Connection>,
    logged_in: AtomicBool,
    message_num: AtomicU16,
}

impl Drop for BcCamera {
    fn drop(&mut self) {
        debug!("Dropping camera");
        self.disconnect();
    }
}

impl BcCamera {
    ///
    /// Create a new camera interface for this address
    ///
    /// # Parameters
    ///
    /// * `host` - The address of the camera, e.g. `("10.0.0.7", DEFAULT_PORT)`
    ///
    /// # Returns
    ///
    /// returns either an error or the camera
    ///
    pub fn connect<T: ToSocketAddrs>(host: T) -> Result<Self> {
        let addr_iter = match host.to_socket_addrs() {
            Ok(iter) => iter,
            Err(_) => return Err(Error::AddrResolutionError),
        };

        let mut last_err = None;
        for addr in addr_iter {
            debug!("Trying address {}", addr);
            match Connection::connect(addr, CONNECT_TIMEOUT) {
                Ok(conn) => {
                    debug!("Success");
                    return Ok(Self {
                        connection: Arc::new(conn),
                        message_num: AtomicU16::new(0),
                        logged_in: AtomicBool::new(false),
                    });
                }
                Err(err) => {
                    debug!("Connect to {} failed: {}", addr, err);
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or(Error::ConnectionUnavailable))
    }

    /// This method will get a new message number and increment the message
    /// count atomically
    pub(crate) fn new_message_num(&self) -> u16 {
        self.message_num.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn get_connection(&self) -> Arc<Connection> {
        self.connection.clone()
    }

    pub(crate) fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Relaxed)
    }

    pub(crate) fn set_logged_in(&self) {
        self.logged_in.store(true, Ordering::Relaxed);
    }

    /// This will shut the underlying socket down, unblocking any pending
    /// receive. The camera object is unusable afterwards
    pub fn disconnect(&self) {
        self.connection.shutdown();
    }
}

/// Hex of an MD5, truncated to 31 characters
///
/// The Baichuan library compares only 31 of the 32 hex characters, likely a
/// C string buffer retrofit. The camera expects the same truncation from us.
pub(crate) fn md5_string(input: &str) -> String {
    let mut md5 = format!("{:X}", md5::compute(input));
    md5.truncate(31);
    md5
}

#[cfg(test)]
pub(crate) mod test_utils {
    //! Helpers that play the camera's side of the wire in loopback tests

    use super::*;
    use crate::bc::model::*;
    use crate::bc::xml::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    /// Read one framed message the way the camera would
    pub(crate) fn read_one(
        mut stream: &TcpStream,
        context: &mut BcContext,
        buffer: &mut Vec<u8>,
    ) -> Bc {
        loop {
            if !buffer.is_empty() {
                match Bc::deserialize(context, &buffer[..]) {
                    Ok((bc, consumed)) => {
                        buffer.drain(..consumed);
                        return bc;
                    }
                    Err(Error::NomIncomplete(_)) => {}
                    Err(e) => panic!("camera side parse error: {:?}", e),
                }
            }
            let mut chunk = [0u8; 4096];
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "client hung up unexpectedly");
            buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Serialize and write one message the way the camera would
    pub(crate) fn write_one(mut stream: &TcpStream, context: &mut BcContext, bc: &Bc) {
        let buf = bc.serialize(Vec::new(), context).unwrap();
        stream.write_all(&buf).unwrap();
    }

    /// Play a minimal BCEncrypt login handshake from the camera's side
    pub(crate) fn fake_handshake(
        stream: &TcpStream,
        context: &mut BcContext,
        buffer: &mut Vec<u8>,
    ) {
        let legacy = read_one(stream, context, buffer);
        assert_eq!(legacy.meta.msg_id, MSG_ID_LOGIN);
        assert_eq!(legacy.meta.class, 0x6514);
        let msg_num = legacy.meta.msg_num;

        let negotiation = Bc::new_from_xml(
            BcMeta {
                msg_id: MSG_ID_LOGIN,
                channel_id: 0,
                stream_type: 0,
                response_code: 0xdd01,
                msg_num,
                class: 0x6514,
            },
            BcXml {
                encryption: Some(Encryption {
                    version: xml_ver(),
                    type_: "md5".to_string(),
                    nonce: "9E6D1FCB9E69846D".to_string(),
                }),
                ..Default::default()
            },
        );
        write_one(stream, context, &negotiation);

        let modern = read_one(stream, context, buffer);
        assert_eq!(modern.meta.msg_id, MSG_ID_LOGIN);

        let confirmation = Bc::new_from_meta(BcMeta {
            msg_id: MSG_ID_LOGIN,
            channel_id: 0,
            stream_type: 0,
            response_code: RESPONSE_CODE_OK,
            msg_num,
            class: 0x0000,
        });
        write_one(stream, context, &confirmation);
    }
}
