use super::crypto;
use super::model::*;
use super::xml::{BcPayloads, BcXml, Extension};
use crate::NomErrorType;
use crate::{Error, Result};
use nom::{
    bytes::streaming::take, combinator::*, error::context as error_context,
    error::ContextError, error::ErrorKind, error::ParseError, number::streaming::*, sequence::*,
};

type IResult<'a, O> = std::result::Result<(&'a [u8], O), nom::Err<NomErrorType<'a>>>;

fn make_error<'a>(input: &'a [u8], ctx: &'static str, kind: ErrorKind) -> NomErrorType<'a> {
    NomErrorType::add_context(input, ctx, NomErrorType::from_error_kind(input, kind))
}

impl Bc {
    /// Parse exactly one message from the front of `buf`
    ///
    /// Returns the message and the number of bytes consumed. An incomplete
    /// buffer is reported as [`Error::NomIncomplete`]; the caller should
    /// read more bytes and retry with the same buffer. The context's
    /// receive offset only advances on success.
    pub(crate) fn deserialize(context: &mut BcContext, buf: &[u8]) -> Result<(Bc, usize)> {
        let (remaining, bc) = bc_msg(context, buf).map_err(Error::from)?;
        Ok((bc, buf.len() - remaining.len()))
    }
}

fn bc_msg<'a>(context: &mut BcContext, buf: &'a [u8]) -> IResult<'a, Bc> {
    let (buf, header) = bc_header(buf)?;
    let (buf, (extension, payload)) = bc_body(context, &header, buf)?;

    // The full framed unit is present, commit the receive offset
    context.recv_offset += header.body_len;

    let bc = Bc {
        meta: header.to_meta(),
        extension,
        payload,
    };

    Ok((buf, bc))
}

fn bc_header(buf: &[u8]) -> IResult<'_, BcHeader> {
    let (buf, _magic) = error_context(
        "Magic invalid",
        verify(le_u32, |x| *x == MAGIC_HEADER || *x == MAGIC_HEADER_REV),
    )(buf)?;
    let (buf, msg_id) = error_context("MsgID missing", le_u32)(buf)?;
    let (buf, body_len) = error_context("BodyLen missing", le_u32)(buf)?;
    let (buf, channel_id) = error_context("ChannelID missing", le_u8)(buf)?;
    let (buf, stream_type) = error_context("StreamType missing", le_u8)(buf)?;
    let (buf, msg_num) = error_context("MsgNum missing", le_u16)(buf)?;
    let (buf, (response_code, class)) =
        error_context("ResponseCode missing", tuple((le_u16, le_u16)))(buf)?;

    let (buf, payload_offset) = error_context(
        "Payload offset is missing",
        cond(has_payload_offset(class), le_u32),
    )(buf)?;

    if matches!(payload_offset, Some(offset) if offset > body_len) {
        // An offset pointing outside the body means the framing is already
        // lost; there is no way to resynchronise a bc stream
        return Err(nom::Err::Failure(make_error(
            buf,
            "Payload offset exceeds body length",
            ErrorKind::Verify,
        )));
    }

    Ok((
        buf,
        BcHeader {
            body_len,
            msg_id,
            channel_id,
            stream_type,
            msg_num,
            response_code,
            class,
            payload_offset,
        },
    ))
}

fn bc_body<'a>(
    context: &mut BcContext,
    header: &BcHeader,
    buf: &'a [u8],
) -> IResult<'a, (Option<Extension>, Option<BcPayloads>)> {
    let protocol = context.get_encrypted().clone();

    match header.payload_offset {
        Some(ext_len) => {
            let (buf, ext_buf) = take(ext_len)(buf)?;
            let payload_len = header.body_len - ext_len;
            let (buf, payload_buf) = take(payload_len)(buf)?;

            // The extension is always xml, decrypt it with whatever is
            // installed
            let extension = if ext_len > 0 {
                let decrypted = crypto::decrypt(context.recv_offset, ext_buf, &protocol);
                let parsed = Extension::try_parse(decrypted.as_slice()).map_err(|_| {
                    nom::Err::Error(make_error(
                        buf,
                        "Unable to parse Extension XML",
                        ErrorKind::MapRes,
                    ))
                })?;
                if let Extension {
                    binary_data: Some(1),
                    ..
                } = &parsed
                {
                    context.binary_on(header.msg_num);
                }
                Some(parsed)
            } else {
                None
            };

            let is_binary = matches!(
                extension,
                Some(Extension {
                    binary_data: Some(1),
                    ..
                })
            ) || context.in_bin_mode.contains(&header.msg_num);
            let encrypt_len = extension.as_ref().and_then(|ext| ext.encrypt_len);

            let payload = if payload_len > 0 {
                // The payload starts ext_len body bytes into the stream
                let crypto_offset = context.recv_offset + ext_len;
                Some(parse_payload(
                    &protocol,
                    crypto_offset,
                    is_binary,
                    encrypt_len,
                    payload_buf,
                ))
            } else {
                None
            };

            Ok((buf, (extension, payload)))
        }
        None => {
            // Without an offset the whole body is the payload. Binary is
            // decided by the sticky set alone, except that video messages
            // are always binary
            let (buf, payload_buf) = take(header.body_len)(buf)?;
            let is_binary = context.in_bin_mode.contains(&header.msg_num)
                || matches!(header.msg_id, MSG_ID_VIDEO | MSG_ID_VIDEO_STOP);

            let payload = if header.body_len > 0 {
                Some(parse_payload(
                    &protocol,
                    context.recv_offset,
                    is_binary,
                    None,
                    payload_buf,
                ))
            } else {
                None
            };

            Ok((buf, (None, payload)))
        }
    }
}

fn parse_payload(
    protocol: &EncryptionProtocol,
    crypto_offset: u32,
    is_binary: bool,
    encrypt_len: Option<u32>,
    payload_buf: &[u8],
) -> BcPayloads {
    if is_binary {
        match (protocol, encrypt_len) {
            // FullAes binary: only the leading encryptLen bytes are
            // ciphertext, the tail is already cleartext
            (EncryptionProtocol::FullAes(_), Some(len)) if len > 0 => BcPayloads::Binary(
                crypto::decrypt_prefix(crypto_offset, payload_buf, len, protocol),
            ),
            // Media is cleartext under every other mode
            _ => BcPayloads::Binary(payload_buf.to_vec()),
        }
    } else {
        let decrypted = crypto::decrypt(crypto_offset, payload_buf, protocol);
        match BcXml::try_parse(decrypted.as_slice()) {
            Ok(xml) => BcPayloads::BcXml(xml),
            // The login negotiation body arrives BCEncrypt'd before any
            // cipher is installed; hand it over raw for the caller to
            // decrypt
            Err(_) => BcPayloads::Binary(decrypted),
        }
    }
}
