use super::model::*;
use crate::NomErrorType;
use nom::{
    bytes::streaming::take, combinator::*, error::context, number::streaming::*,
};

type IResult<'a, O> = std::result::Result<(&'a [u8], O), nom::Err<NomErrorType<'a>>>;

// Media packets use 8 byte padding
const PAD_SIZE: u32 = 8;

fn pad_size(payload_size: u32) -> u32 {
    match payload_size % PAD_SIZE {
        0 => 0,
        n => PAD_SIZE - n,
    }
}

/// Parse one media unit off the front of `buf`
///
/// Incomplete input is reported through nom's streaming `Incomplete`; an
/// unrecognised magic is an error the framer recovers from by resyncing.
pub(crate) fn bcmedia(buf: &[u8]) -> IResult<'_, BcMedia> {
    let (buf, magic) = context(
        "Failed to match any known bcmedia",
        verify(le_u32, |x| {
            matches!(
                *x,
                MAGIC_HEADER_BCMEDIA_INFO_V1
                    | MAGIC_HEADER_BCMEDIA_INFO_V2
                    | MAGIC_HEADER_BCMEDIA_IFRAME..=MAGIC_HEADER_BCMEDIA_IFRAME_LAST
                    | MAGIC_HEADER_BCMEDIA_PFRAME..=MAGIC_HEADER_BCMEDIA_PFRAME_LAST
                    | MAGIC_HEADER_BCMEDIA_AAC
                    | MAGIC_HEADER_BCMEDIA_ADPCM
            )
        }),
    )(buf)?;

    match magic {
        MAGIC_HEADER_BCMEDIA_INFO_V1 | MAGIC_HEADER_BCMEDIA_INFO_V2 => {
            let (buf, payload) = bcmedia_info(buf)?;
            Ok((buf, BcMedia::Info(payload)))
        }
        MAGIC_HEADER_BCMEDIA_IFRAME..=MAGIC_HEADER_BCMEDIA_IFRAME_LAST => {
            let (buf, payload) = bcmedia_iframe(buf)?;
            Ok((buf, BcMedia::Iframe(payload)))
        }
        MAGIC_HEADER_BCMEDIA_PFRAME..=MAGIC_HEADER_BCMEDIA_PFRAME_LAST => {
            let (buf, payload) = bcmedia_pframe(buf)?;
            Ok((buf, BcMedia::Pframe(payload)))
        }
        MAGIC_HEADER_BCMEDIA_AAC => {
            let (buf, payload) = bcmedia_aac(buf)?;
            Ok((buf, BcMedia::Aac(payload)))
        }
        MAGIC_HEADER_BCMEDIA_ADPCM => {
            let (buf, payload) = bcmedia_adpcm(buf)?;
            Ok((buf, BcMedia::Adpcm(payload)))
        }
        _ => unreachable!(),
    }
}

fn bcmedia_info(buf: &[u8]) -> IResult<'_, BcMediaInfo> {
    let (buf, _header_size) = context(
        "Header size mismatch in BcMedia info",
        verify(le_u32, |x| *x == 32),
    )(buf)?;
    let (buf, video_width) = le_u32(buf)?;
    let (buf, video_height) = le_u32(buf)?;
    let (buf, _unknown) = le_u8(buf)?;
    let (buf, fps) = le_u8(buf)?;
    let (buf, start_year) = le_u8(buf)?;
    let (buf, start_month) = le_u8(buf)?;
    let (buf, start_day) = le_u8(buf)?;
    let (buf, start_hour) = le_u8(buf)?;
    let (buf, start_min) = le_u8(buf)?;
    let (buf, start_seconds) = le_u8(buf)?;
    let (buf, end_year) = le_u8(buf)?;
    let (buf, end_month) = le_u8(buf)?;
    let (buf, end_day) = le_u8(buf)?;
    let (buf, end_hour) = le_u8(buf)?;
    let (buf, end_min) = le_u8(buf)?;
    let (buf, end_seconds) = le_u8(buf)?;
    let (buf, _unknown_b) = le_u16(buf)?;

    Ok((
        buf,
        BcMediaInfo {
            video_width,
            video_height,
            fps,
            start_year,
            start_month,
            start_day,
            start_hour,
            start_min,
            start_seconds,
            end_year,
            end_month,
            end_day,
            end_hour,
            end_min,
            end_seconds,
        },
    ))
}

fn take4(buf: &[u8]) -> IResult<'_, &str> {
    map_res(take(4usize), std::str::from_utf8)(buf)
}

fn video_type(buf: &[u8]) -> IResult<'_, VideoType> {
    let (buf, tag) = context(
        "Video type is unrecognised",
        verify(take4, |x| matches!(x, "H264" | "H265")),
    )(buf)?;
    let video_type = match tag {
        "H264" => VideoType::H264,
        "H265" => VideoType::H265,
        _ => unreachable!(),
    };
    Ok((buf, video_type))
}

fn bcmedia_iframe(buf: &[u8]) -> IResult<'_, BcMediaIframe> {
    let (buf, video_type) = video_type(buf)?;
    let (buf, payload_size) = le_u32(buf)?;
    let (buf, additional_header_size) = le_u32(buf)?;
    let (buf, microseconds) = le_u32(buf)?;
    let (buf, _unknown) = le_u32(buf)?;
    // An additional header starts with POSIX seconds; whatever follows is
    // undocumented and must be skipped, not interpreted
    let (buf, time) = if additional_header_size >= 4 {
        let (buf, time_value) = le_u32(buf)?;
        let (buf, _unknown_remainder) = take(additional_header_size - 4)(buf)?;
        (buf, Some(time_value))
    } else {
        (buf, None)
    };

    let (buf, data_slice) = take(payload_size)(buf)?;
    let (buf, _padding) = take(pad_size(payload_size))(buf)?;

    Ok((
        buf,
        BcMediaIframe {
            video_type,
            microseconds,
            time,
            data: data_slice.to_vec(),
        },
    ))
}

fn bcmedia_pframe(buf: &[u8]) -> IResult<'_, BcMediaPframe> {
    let (buf, video_type) = video_type(buf)?;
    let (buf, payload_size) = le_u32(buf)?;
    let (buf, additional_header_size) = le_u32(buf)?;
    let (buf, microseconds) = le_u32(buf)?;
    let (buf, _unknown) = le_u32(buf)?;
    let (buf, _additional_header) = take(additional_header_size)(buf)?;
    let (buf, data_slice) = take(payload_size)(buf)?;
    let (buf, _padding) = take(pad_size(payload_size))(buf)?;

    Ok((
        buf,
        BcMediaPframe {
            video_type,
            microseconds,
            data: data_slice.to_vec(),
        },
    ))
}

fn bcmedia_aac(buf: &[u8]) -> IResult<'_, BcMediaAac> {
    let (buf, payload_size) = le_u16(buf)?;
    let (buf, _payload_size_b) = le_u16(buf)?;
    let (buf, data_slice) = take(payload_size)(buf)?;
    let (buf, _padding) = take(pad_size(payload_size as u32))(buf)?;

    Ok((
        buf,
        BcMediaAac {
            data: data_slice.to_vec(),
        },
    ))
}

fn bcmedia_adpcm(buf: &[u8]) -> IResult<'_, BcMediaAdpcm> {
    const SUB_HEADER_SIZE: u16 = 4;

    let (buf, payload_size) = context(
        "ADPCM payload too short for its sub header",
        verify(le_u16, |x| *x >= SUB_HEADER_SIZE),
    )(buf)?;
    let (buf, _payload_size_b) = le_u16(buf)?;
    let (buf, _magic) = context(
        "ADPCM data magic value is invalid",
        verify(le_u16, |x| *x == MAGIC_HEADER_BCMEDIA_ADPCM_DATA),
    )(buf)?;
    // On some cameras this is just 2, on others half the block size
    let (buf, _half_block_size) = le_u16(buf)?;
    let block_size = payload_size - SUB_HEADER_SIZE;
    let (buf, data_slice) = take(block_size)(buf)?;
    let (buf, _padding) = take(pad_size(payload_size as u32))(buf)?;

    Ok((
        buf,
        BcMediaAdpcm {
            data: data_slice.to_vec(),
        },
    ))
}
