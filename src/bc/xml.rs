// YaSerde currently macro-expands names like __type__value from type_
#![allow(non_snake_case)]

use std::io::{Read, Write};
use yaserde::ser::Config;
use yaserde_derive::{YaDeserialize, YaSerialize};

#[cfg(test)]
use indoc::indoc;

/// There are two types of payloads, xml and binary
#[derive(PartialEq, Debug)]
pub enum BcPayloads {
    /// Xml payloads are the more common ones and include the login and
    /// preview bodies
    BcXml(BcXml),
    /// Binary payloads carry the media sub-stream of video messages. A
    /// non-binary payload that fails to parse as xml is also handed over
    /// raw, since the caller may hold the key the connection does not
    Binary(Vec<u8>),
}

/// The top level BC Xml
#[derive(PartialEq, Default, Debug, YaDeserialize, YaSerialize)]
#[yaserde(rename = "body")]
pub struct BcXml {
    /// Encryption xml is received during login and contains the NONCE
    #[yaserde(rename = "Encryption")]
    pub encryption: Option<Encryption>,
    /// LoginUser xml is used during the modern login
    #[yaserde(rename = "LoginUser")]
    pub login_user: Option<LoginUser>,
    /// LoginNet xml is used during the modern login
    #[yaserde(rename = "LoginNet")]
    pub login_net: Option<LoginNet>,
    /// The final part of a login sequence will return DeviceInfo xml
    #[yaserde(rename = "DeviceInfo")]
    pub device_info: Option<DeviceInfo>,
    /// Preview xml is used as part of the stream request to set the stream
    /// quality and channel
    #[yaserde(rename = "Preview")]
    pub preview: Option<Preview>,
}

impl BcXml {
    pub(crate) fn try_parse(mut s: impl Read) -> Result<Self, String> {
        let mut xml = String::new();
        s.read_to_string(&mut xml).map_err(|e| e.to_string())?;
        yaserde::de::from_str(&normalise_root(&xml))
    }
    pub(crate) fn serialize<W: Write>(&self, w: W) -> Result<W, String> {
        yaserde::ser::serialize_with_writer(self, w, &Config::default())
    }
}

impl Extension {
    pub(crate) fn try_parse(s: impl Read) -> Result<Self, String> {
        yaserde::de::from_reader(s)
    }
    pub(crate) fn serialize<W: Write>(&self, w: W) -> Result<W, String> {
        yaserde::ser::serialize_with_writer(self, w, &Config::default())
    }
}

/// Cameras root their replies in `<body>`, in `<BCAbility>`, or in the
/// element itself. Rewrite the latter two shapes into the `<body>` form the
/// deserializer expects.
fn normalise_root(xml: &str) -> String {
    let decl_end = xml.find("?>").map(|i| i + 2).unwrap_or(0);
    let (decl, rest) = xml.split_at(decl_end);
    let trimmed = rest.trim_start();
    if trimmed.starts_with("<body") {
        xml.to_string()
    } else if trimmed.starts_with("<BCAbility") {
        xml.replacen("<BCAbility", "<body", 1)
            .replacen("</BCAbility>", "</body>", 1)
    } else {
        format!("{}<body>{}</body>", decl, rest)
    }
}

/// Encryption xml
#[derive(PartialEq, Eq, Default, Debug, YaDeserialize, YaSerialize)]
pub struct Encryption {
    /// XML Version
    #[yaserde(attribute)]
    pub version: String,
    #[yaserde(rename = "type")]
    /// The hashing algorithm used. Only observed the value of "md5"
    pub type_: String,
    /// The nonce used to negotiate the login and to generate the AES key
    pub nonce: String,
}

/// LoginUser xml
#[derive(PartialEq, Eq, Default, Debug, YaDeserialize, YaSerialize)]
pub struct LoginUser {
    /// XML Version
    #[yaserde(attribute)]
    pub version: String,
    /// Username to login as. Hashed with the nonce on the wire
    #[yaserde(rename = "userName")]
    pub user_name: String,
    /// Password for login. Hashed with the nonce on the wire
    pub password: String,
    /// Unknown, always `1`
    #[yaserde(rename = "userVer")]
    pub user_ver: u32,
}

/// LoginNet xml
#[derive(PartialEq, Eq, Debug, YaDeserialize, YaSerialize)]
pub struct LoginNet {
    /// XML Version
    #[yaserde(attribute)]
    pub version: String,
    /// Type of connection, usually LAN (even on wifi)
    #[yaserde(rename = "type")]
    pub type_: String,
    /// The port for udp. `0` for tcp
    #[yaserde(rename = "udpPort")]
    pub udp_port: u16,
}

impl Default for LoginNet {
    fn default() -> Self {
        LoginNet {
            version: xml_ver(),
            type_: "LAN".to_string(),
            udp_port: 0,
        }
    }
}

/// DeviceInfo xml
///
/// There is more to this xml but we only deserialize what the login needs
#[derive(PartialEq, Eq, Default, Debug, YaDeserialize, YaSerialize)]
pub struct DeviceInfo {
    /// XML Version
    #[yaserde(attribute)]
    pub version: Option<String>,
    /// The resolution xml block
    pub resolution: Option<Resolution>,
}

/// Resolution xml
#[derive(PartialEq, Eq, Default, Debug, YaDeserialize, YaSerialize)]
pub struct Resolution {
    /// Resolution name is in the format "width*height" i.e. "2304*1296"
    #[yaserde(rename = "resolutionName")]
    pub name: String,
    /// Width of the stream in pixels
    pub width: u32,
    /// Height of the stream in pixels
    pub height: u32,
}

/// Preview xml
///
/// This xml is used to request a stream to start
#[derive(PartialEq, Eq, Default, Debug, YaDeserialize, YaSerialize)]
pub struct Preview {
    /// XML Version
    #[yaserde(attribute)]
    pub version: String,
    /// Channel id is usually zero unless using an NVR
    #[yaserde(rename = "channelId")]
    pub channel_id: u8,
    /// Handle is 0 for mainStream, 256 for subStream and 1024 for
    /// externStream
    pub handle: u32,
    /// `"mainStream"`, `"subStream"` or `"externStream"`
    #[yaserde(rename = "streamType")]
    pub stream_type: Option<String>,
}

/// Extension xml
///
/// This is used to describe the payload passed the `payload_offset`
#[derive(PartialEq, Eq, Debug, YaDeserialize, YaSerialize)]
pub struct Extension {
    /// XML Version
    #[yaserde(attribute)]
    pub version: String,
    /// Set to 1 when the subsequent payload is binary, otherwise omitted
    #[yaserde(rename = "binaryData")]
    pub binary_data: Option<u32>,
    /// Some requests require to know which user they are for
    #[yaserde(rename = "userName")]
    pub user_name: Option<String>,
    /// A comma separated list of abilities of interest
    pub token: Option<String>,
    /// The channel ID. Usually `0` unless using an NVR
    #[yaserde(rename = "channelId")]
    pub channel_id: Option<u8>,
    /// Under FullAes only the first `encryptLen` bytes of a binary payload
    /// are ciphertext
    #[yaserde(rename = "encryptLen")]
    pub encrypt_len: Option<u32>,
}

impl Default for Extension {
    fn default() -> Extension {
        Extension {
            version: xml_ver(),
            binary_data: None,
            user_name: None,
            token: None,
            channel_id: None,
            encrypt_len: None,
        }
    }
}

/// The version string always sent with our xmls
pub fn xml_ver() -> String {
    "1.1".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_deser() {
        let sample = indoc!(
            r#"
            <?xml version="1.0" encoding="UTF-8" ?>
            <body>
            <Encryption version="1.1">
            <type>md5</type>
            <nonce>9E6D1FCB9E69846D</nonce>
            </Encryption>
            </body>"#
        );
        let b: BcXml = BcXml::try_parse(sample.as_bytes()).unwrap();
        let enc = b.encryption.as_ref().unwrap();
        assert_eq!(enc.version, "1.1");
        assert_eq!(enc.type_, "md5");
        assert_eq!(enc.nonce, "9E6D1FCB9E69846D");
    }

    #[test]
    // Some firmwares reply with the element at the root instead of inside
    // a body wrapper
    fn test_bare_root_deser() {
        let sample = indoc!(
            r#"
            <?xml version="1.0" encoding="UTF-8" ?>
            <Encryption version="1.1">
            <type>md5</type>
            <nonce>0-AhnEZyUg6eKrJFIWgXPF</nonce>
            </Encryption>"#
        );
        let b = BcXml::try_parse(sample.as_bytes()).unwrap();
        assert_eq!(b.encryption.unwrap().nonce, "0-AhnEZyUg6eKrJFIWgXPF");
    }

    #[test]
    fn test_bcability_root_deser() {
        let sample = indoc!(
            r#"
            <?xml version="1.0" encoding="UTF-8" ?>
            <BCAbility version="1.1">
            <DeviceInfo>
            <resolution>
            <resolutionName>2304*1296</resolutionName>
            <width>2304</width>
            <height>1296</height>
            </resolution>
            </DeviceInfo>
            </BCAbility>"#
        );
        let b = BcXml::try_parse(sample.as_bytes()).unwrap();
        let res = b.device_info.unwrap().resolution.unwrap();
        assert_eq!(res.width, 2304);
        assert_eq!(res.height, 1296);
        assert_eq!(res.name, "2304*1296");
    }

    #[test]
    fn test_login_ser_roundtrip() {
        let b = BcXml {
            login_user: Some(LoginUser {
                version: xml_ver(),
                user_name: "9F07915E819A076E2E14D71F8CAE457".to_string(),
                password: "8EFF1EA4FA596CB8BE4D29407D31970".to_string(),
                user_ver: 1,
            }),
            login_net: Some(LoginNet::default()),
            ..Default::default()
        };
        let buf = b.serialize(vec![]).unwrap();
        let b2 = BcXml::try_parse(buf.as_slice()).unwrap();
        assert_eq!(b, b2);
    }

    #[test]
    fn test_preview_ser_roundtrip() {
        let b = BcXml {
            preview: Some(Preview {
                version: xml_ver(),
                channel_id: 0,
                handle: 1024,
                stream_type: Some("externStream".to_string()),
            }),
            ..Default::default()
        };
        let buf = b.serialize(vec![]).unwrap();
        let b2 = BcXml::try_parse(buf.as_slice()).unwrap();
        assert_eq!(b, b2);
    }

    #[test]
    fn test_extension_deser() {
        let sample = indoc!(
            r#"
            <?xml version="1.0" encoding="UTF-8" ?>
            <Extension version="1.1">
            <binaryData>1</binaryData>
            <encryptLen>32</encryptLen>
            <channelId>0</channelId>
            </Extension>"#
        );
        let ext = Extension::try_parse(sample.as_bytes()).unwrap();
        assert_eq!(ext.binary_data, Some(1));
        assert_eq!(ext.encrypt_len, Some(32));
        assert_eq!(ext.channel_id, Some(0));
        assert_eq!(ext.user_name, None);
    }
}
