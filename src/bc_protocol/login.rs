use super::{
    md5_string, BcCamera, Connection, Credentials, Error, Result, UNSOLICITED_SKIP_LIMIT,
};
use crate::bc::{crypto, model::*, xml::*};
use crate::RX_TIMEOUT;
use log::*;
use std::sync::Arc;

/// The encryption ceiling advertised during the legacy login
///
/// The camera may downshift below the ceiling but must not exceed it. Note
/// that a camera offered [`MaxEncryption::Aes`] is free to pick FullAes;
/// the only way to avoid FullAes is to advertise
/// [`MaxEncryption::BCEncrypt`] or below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxEncryption {
    /// Plaintext only
    None,
    /// At most the XOR cipher
    BCEncrypt,
    /// At most AES (regular or full, at the camera's choice)
    Aes,
}

impl MaxEncryption {
    fn request_code(&self) -> u16 {
        match self {
            MaxEncryption::None => ENC_REQUEST_NONE,
            MaxEncryption::BCEncrypt => ENC_REQUEST_BCENCRYPT,
            MaxEncryption::Aes => ENC_REQUEST_AES,
        }
    }

    fn allows(&self, kind: EncryptionKind) -> bool {
        let ceiling = match self {
            MaxEncryption::None => 0,
            MaxEncryption::BCEncrypt => 1,
            MaxEncryption::Aes => 2,
        };
        let rank = match kind {
            EncryptionKind::Unencrypted => 0,
            EncryptionKind::BCEncrypt => 1,
            EncryptionKind::Aes | EncryptionKind::FullAes => 2,
        };
        rank <= ceiling
    }
}

/// The outcome of a successful login
#[derive(Debug)]
pub struct LoginResult {
    /// The encryption kind the session ended up with
    pub encryption: EncryptionKind,
    /// Device info the camera sent along with the final login reply
    pub device_info: Option<DeviceInfo>,
}

impl BcCamera {
    /// Login to the camera
    ///
    /// This must be called before a stream can be started. The login flow
    /// is: send a header-only legacy login advertising the encryption
    /// ceiling, receive the camera's choice and its nonce, then re-send the
    /// login as a modern message with nonce-salted credential hashes.
    /// An AES cipher is only installed once the camera confirms the login,
    /// with both byte offsets zeroed; until then every body is BCEncrypt'd.
    pub fn login(
        &self,
        username: &str,
        password: Option<&str>,
        max_encryption: MaxEncryption,
    ) -> Result<LoginResult> {
        let connection = self.get_connection();
        let msg_num = self.new_message_num();
        let credentials = Credentials::new(username, password);

        debug!("Logging in as {:?}", credentials);

        let legacy_login = Bc::new_from_meta(BcMeta {
            msg_id: MSG_ID_LOGIN,
            channel_id: 0,
            stream_type: 0,
            response_code: max_encryption.request_code(),
            msg_num,
            class: 0x6514,
        });
        connection.send_message(&legacy_login)?;

        let reply = receive_login_reply(&connection)?;
        let kind = EncryptionKind::from_reply_code(reply.meta.response_code)
            .ok_or(Error::UnknownEncryption(reply.meta.response_code))?;
        if !max_encryption.allows(kind) {
            return Err(Error::NegotiationMismatch(reply.meta.response_code));
        }
        debug!("Camera negotiated {:?}", kind);

        let nonce = extract_nonce(reply)?;

        // Key derivation needs the nonce, which arrived inside a body that
        // is itself BCEncrypt'd. The AES cipher therefore cannot go live
        // before the handshake ends: the modern login still rides BCEncrypt.
        let aes_key = match kind {
            EncryptionKind::Aes | EncryptionKind::FullAes => {
                Some(credentials.make_aeskey(&nonce))
            }
            _ => None,
        };
        match kind {
            EncryptionKind::Unencrypted => {}
            _ => connection.set_encryption(EncryptionProtocol::BCEncrypt),
        }

        let md5_username = md5_string(&format!("{}{}", username, nonce));
        let md5_password = md5_string(&format!("{}{}", password.unwrap_or(""), nonce));

        let modern_login = Bc::new_from_xml(
            BcMeta {
                msg_id: MSG_ID_LOGIN,
                channel_id: 0,
                stream_type: 0,
                response_code: 0,
                msg_num,
                class: 0x6414,
            },
            BcXml {
                login_user: Some(LoginUser {
                    version: xml_ver(),
                    user_name: md5_username,
                    password: md5_password,
                    user_ver: 1,
                }),
                login_net: Some(LoginNet::default()),
                ..Default::default()
            },
        );
        connection.send_message(&modern_login)?;

        let modern_reply = receive_login_reply(&connection)?;
        if modern_reply.meta.response_code != RESPONSE_CODE_OK {
            return Err(Error::AuthFailed);
        }

        let device_info = match modern_reply.payload {
            Some(BcPayloads::BcXml(BcXml {
                device_info: Some(info),
                ..
            })) => Some(info),
            _ => None,
        };

        // Login confirmed; swap in the negotiated cipher. The offsets are
        // zeroed exactly once, here
        match (kind, aes_key) {
            (EncryptionKind::Aes, Some(key)) => {
                connection.set_encryption(EncryptionProtocol::Aes(key));
                connection.reset_offsets();
            }
            (EncryptionKind::FullAes, Some(key)) => {
                connection.set_encryption(EncryptionProtocol::FullAes(key));
                connection.reset_offsets();
            }
            _ => {}
        }

        self.set_logged_in();
        info!("Login successful");

        Ok(LoginResult {
            encryption: kind,
            device_info,
        })
    }
}

fn receive_login_reply(connection: &Connection) -> Result<Bc> {
    let mut reply = connection.receive_message(RX_TIMEOUT)?;
    for _ in 0..UNSOLICITED_SKIP_LIMIT {
        if reply.meta.msg_id == MSG_ID_LOGIN {
            return Ok(reply);
        }
        debug!(
            "Skipping unsolicited {} message during login",
            super::msg_id_name(reply.meta.msg_id)
        );
        reply = connection.receive_message(RX_TIMEOUT)?;
    }
    Err(Error::UnintelligibleReply {
        reply: Arc::new(Box::new(reply)),
        why: "Not a login reply after skipping unsolicited messages",
    })
}

/// Pull the nonce out of the negotiation reply
///
/// The body is BCEncrypt'd regardless of the negotiated kind, and at this
/// point the connection has no cipher installed, so the payload arrives as
/// raw bytes to decrypt here. Unencrypted cameras send it in the clear and
/// some omit it entirely.
fn extract_nonce(reply: Bc) -> Result<String> {
    let nonce = match &reply.payload {
        Some(BcPayloads::BcXml(BcXml {
            encryption: Some(Encryption { nonce, .. }),
            ..
        })) => Some(nonce.clone()),
        Some(BcPayloads::Binary(raw)) => {
            let plain = crypto::decrypt(0, raw, &EncryptionProtocol::BCEncrypt);
            match BcXml::try_parse(plain.as_slice()) {
                Ok(BcXml {
                    encryption: Some(Encryption { nonce, .. }),
                    ..
                }) => Some(nonce),
                _ => None,
            }
        }
        None => Some(String::new()),
        _ => None,
    };

    nonce.ok_or_else(|| Error::UnintelligibleReply {
        reply: Arc::new(Box::new(reply)),
        why: "Expected an Encryption reply with a nonce",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bc_protocol::test_utils::{read_one, write_one};
    use assert_matches::assert_matches;
    use env_logger::Env;
    use std::net::TcpListener;
    use std::thread;

    fn init() {
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
            .is_test(true)
            .try_init();
    }

    const NONCE: &str = "9E6D1FCB9E69846D";

    /// A scripted camera for the FullAes happy path
    fn fake_camera(listener: TcpListener) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut context = BcContext::new_with_encryption(EncryptionProtocol::BCEncrypt);
            let mut buffer = Vec::new();

            // Step 1: the legacy login is a bare 20 byte header
            let legacy = read_one(&stream, &mut context, &mut buffer);
            assert_eq!(legacy.meta.msg_id, MSG_ID_LOGIN);
            assert_eq!(legacy.meta.class, 0x6514);
            assert_eq!(legacy.meta.response_code, ENC_REQUEST_AES);
            assert_eq!(legacy.extension, None);
            assert_eq!(legacy.payload, None);
            let msg_num = legacy.meta.msg_num;

            // Step 2: answer with FullAes and the nonce, BCEncrypt'd
            let negotiation = Bc::new_from_xml(
                BcMeta {
                    msg_id: MSG_ID_LOGIN,
                    channel_id: 0,
                    stream_type: 0,
                    response_code: 0xdd12,
                    msg_num,
                    class: 0x6514,
                },
                BcXml {
                    encryption: Some(Encryption {
                        version: xml_ver(),
                        type_: "md5".to_string(),
                        nonce: NONCE.to_string(),
                    }),
                    ..Default::default()
                },
            );
            write_one(&stream, &mut context, &negotiation);

            // Step 3: the modern login must carry 31-char nonce-salted
            // hashes, BCEncrypt'd even though AES was negotiated
            let modern = read_one(&stream, &mut context, &mut buffer);
            assert_eq!(modern.meta.msg_id, MSG_ID_LOGIN);
            assert_eq!(modern.meta.class, 0x6414);
            assert_eq!(modern.meta.msg_num, msg_num);
            let login_user = match modern.payload {
                Some(BcPayloads::BcXml(BcXml {
                    login_user: Some(login_user),
                    ..
                })) => login_user,
                other => panic!("expected a LoginUser payload, got {:?}", other),
            };
            assert_eq!(
                login_user.user_name,
                md5_string(&format!("admin{}", NONCE))
            );
            assert_eq!(login_user.user_name.len(), 31);
            assert_eq!(
                login_user.password,
                md5_string(&format!("123456{}", NONCE))
            );

            // Step 4: confirm with device info
            let confirmation = Bc::new_from_xml(
                BcMeta {
                    msg_id: MSG_ID_LOGIN,
                    channel_id: 0,
                    stream_type: 0,
                    response_code: RESPONSE_CODE_OK,
                    msg_num,
                    class: 0x0000,
                },
                BcXml {
                    device_info: Some(DeviceInfo {
                        version: None,
                        resolution: Some(Resolution {
                            name: "2304*1296".to_string(),
                            width: 2304,
                            height: 1296,
                        }),
                    }),
                    ..Default::default()
                },
            );
            write_one(&stream, &mut context, &confirmation);
        })
    }

    #[test]
    fn test_login_full_aes_happy_path() {
        init();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let camera_thread = fake_camera(listener);

        let camera = BcCamera::connect(addr).unwrap();
        let result = camera
            .login("admin", Some("123456"), MaxEncryption::Aes)
            .unwrap();

        assert_eq!(result.encryption, EncryptionKind::FullAes);
        let resolution = result.device_info.unwrap().resolution.unwrap();
        assert_eq!((resolution.width, resolution.height), (2304, 1296));
        assert!(camera.is_logged_in());

        camera_thread.join().unwrap();
    }

    #[test]
    fn test_login_rejected() {
        init();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let camera_thread = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut context = BcContext::new_with_encryption(EncryptionProtocol::BCEncrypt);
            let mut buffer = Vec::new();

            let legacy = read_one(&stream, &mut context, &mut buffer);
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
                        nonce: NONCE.to_string(),
                    }),
                    ..Default::default()
                },
            );
            write_one(&stream, &mut context, &negotiation);

            let _modern = read_one(&stream, &mut context, &mut buffer);
            // Bad credentials
            let rejection = Bc::new_from_meta(BcMeta {
                msg_id: MSG_ID_LOGIN,
                channel_id: 0,
                stream_type: 0,
                response_code: 400,
                msg_num,
                class: 0x0000,
            });
            write_one(&stream, &mut context, &rejection);
        });

        let camera = BcCamera::connect(addr).unwrap();
        let e = camera.login("admin", Some("wrong"), MaxEncryption::BCEncrypt);
        assert_matches!(e, Err(Error::AuthFailed));
        assert!(!camera.is_logged_in());

        camera_thread.join().unwrap();
    }

    #[test]
    fn test_login_rejects_overreaching_camera() {
        init();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let camera_thread = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut context = BcContext::new_with_encryption(EncryptionProtocol::BCEncrypt);
            let mut buffer = Vec::new();

            let legacy = read_one(&stream, &mut context, &mut buffer);
            // Camera picks FullAes although only BCEncrypt was on offer
            let negotiation = Bc::new_from_xml(
                BcMeta {
                    msg_id: MSG_ID_LOGIN,
                    channel_id: 0,
                    stream_type: 0,
                    response_code: 0xdd12,
                    msg_num: legacy.meta.msg_num,
                    class: 0x6514,
                },
                BcXml {
                    encryption: Some(Encryption {
                        version: xml_ver(),
                        type_: "md5".to_string(),
                        nonce: NONCE.to_string(),
                    }),
                    ..Default::default()
                },
            );
            write_one(&stream, &mut context, &negotiation);
        });

        let camera = BcCamera::connect(addr).unwrap();
        let e = camera.login("admin", Some("123456"), MaxEncryption::BCEncrypt);
        assert_matches!(e, Err(Error::NegotiationMismatch(0xdd12)));

        camera_thread.join().unwrap();
    }
}
