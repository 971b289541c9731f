use super::crypto;
use super::model::*;
use super::xml::BcPayloads;
use crate::{Error, Result};
use cookie_factory::bytes::*;
use cookie_factory::sequence::tuple;
use cookie_factory::{combinator::*, gen};
use cookie_factory::{SerializeFn, WriteContext};
use std::io::Write;

impl Bc {
    /// Serialize a message, encrypting the body with the context's cipher
    ///
    /// The header is written in the clear. Xml parts are encrypted; a binary
    /// payload is encrypted only under FullAes and only up to the
    /// extension's `encryptLen`. The context's send offset advances by the
    /// body length.
    pub(crate) fn serialize<W: Write>(&self, buf: W, context: &mut BcContext) -> Result<W> {
        let protocol = context.get_encrypted().clone();
        let send_offset = context.send_offset;

        let ext_bytes = match &self.extension {
            Some(ext) => {
                let xml_bytes = ext.serialize(vec![]).map_err(Error::XmlSer)?;
                crypto::encrypt(send_offset, &xml_bytes, &protocol)
            }
            None => vec![],
        };
        let ext_len = ext_bytes.len() as u32;

        let payload_bytes = match &self.payload {
            Some(BcPayloads::BcXml(xml)) => {
                let xml_bytes = xml.serialize(vec![]).map_err(Error::XmlSer)?;
                // The payload's bytes start ext_len into the body
                crypto::encrypt(send_offset + ext_len, &xml_bytes, &protocol)
            }
            Some(BcPayloads::Binary(data)) => match (&protocol, &self.extension) {
                (
                    EncryptionProtocol::FullAes(_),
                    Some(super::xml::Extension {
                        encrypt_len: Some(len),
                        ..
                    }),
                ) if *len > 0 => crypto::encrypt_prefix(send_offset + ext_len, data, *len, &protocol),
                // Media is sent in the clear under the other modes
                _ => data.clone(),
            },
            None => vec![],
        };

        let body_len = ext_len + payload_bytes.len() as u32;
        let payload_offset = if has_payload_offset(self.meta.class) {
            // A class that demands the offset always carries one; zero means
            // the payload starts at the top of the body
            Some(if self.extension.is_some() { ext_len } else { 0 })
        } else {
            None
        };

        let header = BcHeader::from_meta(&self.meta, body_len, payload_offset);
        let (buf, _n) = gen(
            tuple((bc_header(&header), slice(ext_bytes), slice(payload_bytes))),
            buf,
        )
        .map_err(Error::from)?;

        context.send_offset += body_len;

        Ok(buf)
    }
}

fn bc_header<W: Write>(header: &BcHeader) -> impl SerializeFn<W> {
    tuple((
        le_u32(MAGIC_HEADER),
        le_u32(header.msg_id),
        le_u32(header.body_len),
        le_u8(header.channel_id),
        le_u8(header.stream_type),
        le_u16(header.msg_num),
        le_u16(header.response_code),
        le_u16(header.class),
        opt(header.payload_offset, le_u32),
    ))
}

/// Applies the supplied serializer with the Option's interior data if present
fn opt<W, T, F>(opt: Option<T>, ser: impl Fn(T) -> F) -> impl SerializeFn<W>
where
    F: SerializeFn<W>,
    T: Copy,
    W: Write,
{
    move |buf: WriteContext<W>| {
        if let Some(val) = opt {
            ser(val)(buf)
        } else {
            Ok(buf)
        }
    }
}
