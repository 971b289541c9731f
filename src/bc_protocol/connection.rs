use crate::bc::model::*;
use crate::{Error, Result};
use log::*;
use socket2::{Domain, Socket, Type};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cameras burst whole video frames at us; a large kernel buffer rides out
/// stalls in the receive loop
const RECV_BUFFER_SIZE: usize = 256 * 1024;

/// A connection to a camera. Handles framing and the cipher
///
/// The connection owns the socket, the cipher context (cipher, send/receive
/// offsets and the binary-mode set) and a buffer of bytes received but not
/// yet framed. Sends are serialised by a mutex and atomic per message;
/// receives are expected from a single thread at a time.
pub(crate) struct Connection {
    stream: TcpStream,
    context: Mutex<BcContext>,
    send_lock: Mutex<()>,
    recv_buffer: Mutex<Vec<u8>>,
}

impl Connection {
    /// Open a tcp connection with the camera's socket options applied
    pub(crate) fn connect(addr: SocketAddr, timeout: Duration) -> Result<Connection> {
        let stream = connect_to(addr, timeout)?;
        info!("Connected to {}", addr);
        Ok(Connection {
            stream,
            context: Mutex::new(BcContext::new()),
            send_lock: Mutex::new(()),
            recv_buffer: Mutex::new(Vec::new()),
        })
    }

    /// Serialize, encrypt and write one message
    ///
    /// The write is atomic per message: concurrent senders queue on the send
    /// mutex, and the cipher offset is consumed in write order.
    pub(crate) fn send_message(&self, bc: &Bc) -> Result<()> {
        let _send_lock = self.send_lock.lock().unwrap();
        let buf = {
            let mut context = self.context.lock().unwrap();
            bc.serialize(Vec::new(), &mut context)?
        };
        trace!(
            "Sending {} message, {} bytes, msg_num={}",
            msg_id_name(bc.meta.msg_id),
            buf.len(),
            bc.meta.msg_num
        );
        (&self.stream).write_all(&buf)?;
        Ok(())
    }

    /// Read exactly one framed message, waiting at most `timeout`
    ///
    /// Bytes of a partial frame stay in the connection's buffer across
    /// calls, so a timeout mid-message loses nothing. A zero length read is
    /// a fatal peer close.
    pub(crate) fn receive_message(&self, timeout: Duration) -> Result<Bc> {
        let mut buffer = self.recv_buffer.lock().unwrap();
        let deadline = Instant::now() + timeout;

        loop {
            if !buffer.is_empty() {
                let mut context = self.context.lock().unwrap();
                match Bc::deserialize(&mut context, &buffer[..]) {
                    Ok((bc, consumed)) => {
                        drop(context);
                        buffer.drain(..consumed);
                        trace!(
                            "Received {} message, {} bytes, response={}, msg_num={}",
                            msg_id_name(bc.meta.msg_id),
                            consumed,
                            bc.meta.response_code,
                            bc.meta.msg_num
                        );
                        return Ok(bc);
                    }
                    Err(Error::NomIncomplete(_)) => {}
                    Err(e) => return Err(e),
                }
            }

            let remaining = deadline
                .checked_duration_since(Instant::now())
                .filter(|left| !left.is_zero())
                .ok_or(Error::Timeout)?;
            self.stream.set_read_timeout(Some(remaining))?;

            let mut chunk = [0u8; 4096];
            match (&self.stream).read(&mut chunk) {
                Ok(0) => {
                    return Err(Error::Io(std::sync::Arc::new(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "Connection closed by peer",
                    ))))
                }
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    return Err(Error::Timeout)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Install a cipher. Only legal while the connection is quiescent,
    /// between the login steps and before streaming starts
    pub(crate) fn set_encryption(&self, protocol: EncryptionProtocol) {
        debug!("Installing {:?} cipher", protocol.kind());
        self.context.lock().unwrap().set_encrypted(protocol);
    }

    /// Zero the send/receive offsets. Done exactly once, after a login that
    /// negotiated AES
    pub(crate) fn reset_offsets(&self) {
        self.context.lock().unwrap().reset_offsets();
    }

    /// Forget which message numbers were carrying binary payloads
    pub(crate) fn clear_binary_mode(&self) {
        self.context.lock().unwrap().clear_binary();
    }

    /// Shut the socket down, unblocking any pending receive
    pub(crate) fn shutdown(&self) {
        debug!("Shutting down connection");
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Helper to create a TcpStream with a connect timeout and the protocol's
/// socket options
fn connect_to(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let socket = match addr {
        SocketAddr::V4(_) => Socket::new(Domain::ipv4(), Type::stream(), None)?,
        SocketAddr::V6(_) => {
            let s = Socket::new(Domain::ipv6(), Type::stream(), None)?;
            s.set_only_v6(false)?;
            s
        }
    };

    socket.set_recv_buffer_size(RECV_BUFFER_SIZE)?;
    socket.connect_timeout(&addr.into(), timeout)?;

    let stream = socket.into_tcp_stream();
    stream.set_nodelay(true)?;

    Ok(stream)
}
