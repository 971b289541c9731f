use std::time::Duration;

/// Video streams encapsulate a stream of BcMedia
#[derive(Debug, Clone)]
pub enum BcMedia {
    /// Holds info on the stream. Sent at the start of a session and ahead
    /// of the first I-frame
    Info(BcMediaInfo),
    /// Holds an IFrame either H264 or H265
    Iframe(BcMediaIframe),
    /// Holds a PFrame either H264 or H265
    Pframe(BcMediaPframe),
    /// Holds AAC audio
    Aac(BcMediaAac),
    /// Holds ADPCM audio
    Adpcm(BcMediaAdpcm),
}

pub(super) const MAGIC_HEADER_BCMEDIA_INFO_V1: u32 = 0x31303031;
pub(super) const MAGIC_HEADER_BCMEDIA_INFO_V2: u32 = 0x32303031;

/// Describes the stream. The v1 and v2 magics carry the same layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BcMediaInfo {
    /// Width of the video
    pub video_width: u32,
    /// Height of the video
    pub video_height: u32,
    /// Frames per second. On older cameras this seems to be an index into a
    /// lookup table of rates
    pub fps: u8,
    /// Start year of the stream
    pub start_year: u8,
    /// Start month of the stream
    pub start_month: u8,
    /// Start day of the stream
    pub start_day: u8,
    /// Start hour of the stream
    pub start_hour: u8,
    /// Start minute of the stream
    pub start_min: u8,
    /// Start seconds of the stream
    pub start_seconds: u8,
    /// End year, only useful for files recorded on the SD card
    pub end_year: u8,
    /// End month, only useful for files recorded on the SD card
    pub end_month: u8,
    /// End day, only useful for files recorded on the SD card
    pub end_day: u8,
    /// End hour, only useful for files recorded on the SD card
    pub end_hour: u8,
    /// End minute, only useful for files recorded on the SD card
    pub end_min: u8,
    /// End seconds, only useful for files recorded on the SD card
    pub end_seconds: u8,
}

// I/PFrame magics include the channel number in them
pub(super) const MAGIC_HEADER_BCMEDIA_IFRAME: u32 = 0x63643030;
pub(super) const MAGIC_HEADER_BCMEDIA_IFRAME_LAST: u32 = 0x63643039;
pub(super) const MAGIC_HEADER_BCMEDIA_PFRAME: u32 = 0x63643130;
pub(super) const MAGIC_HEADER_BCMEDIA_PFRAME_LAST: u32 = 0x63643139;

/// Video types for I/PFrames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoType {
    /// H264 video data
    H264,
    /// H265 video data
    H265,
}

/// This is a BcMedia video IFrame
#[derive(Clone)]
pub struct BcMediaIframe {
    /// "H264" or "H265"
    pub video_type: VideoType,
    /// Timestamp in microseconds
    pub microseconds: u32,
    /// POSIX time (seconds since 00:00:00 Jan 1 1970), when the camera
    /// sends one
    pub time: Option<u32>,
    /// Raw IFrame data
    pub data: Vec<u8>,
}

impl std::fmt::Debug for BcMediaIframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entry(&"video_type", &self.video_type)
            .entry(&"microseconds", &self.microseconds)
            .entry(&"time", &self.time)
            .entry(
                &"data[0..20]",
                &self.data[0..std::cmp::min(20, self.data.len())].to_vec(),
            )
            .entry(&"data.len()", &self.data.len())
            .finish()
    }
}

/// This is a BcMedia video PFrame
#[derive(Clone)]
pub struct BcMediaPframe {
    /// "H264" or "H265"
    pub video_type: VideoType,
    /// Timestamp in microseconds
    pub microseconds: u32,
    /// Raw PFrame data
    pub data: Vec<u8>,
}

impl std::fmt::Debug for BcMediaPframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entry(&"video_type", &self.video_type)
            .entry(&"microseconds", &self.microseconds)
            .entry(
                &"data[0..20]",
                &self.data[0..std::cmp::min(20, self.data.len())].to_vec(),
            )
            .entry(&"data.len()", &self.data.len())
            .finish()
    }
}

pub(super) const MAGIC_HEADER_BCMEDIA_AAC: u32 = 0x62773530;

/// This contains BcMedia audio data in AAC format
#[derive(Debug, Clone)]
pub struct BcMediaAac {
    /// Raw AAC data, one or more ADTS frames
    pub data: Vec<u8>,
}

impl BcMediaAac {
    /// Play duration of this frame, read from the ADTS header
    ///
    /// Returns `None` when the data does not start with an ADTS syncword or
    /// uses a reserved sample frequency index.
    pub fn duration(&self) -> Option<Duration> {
        const SAMPLE_RATES: [u32; 13] = [
            96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000,
            7350,
        ];

        if self.data.len() < 8 {
            return None;
        }
        if self.data[0] != 0xFF || (self.data[1] & 0xF0) != 0xF0 {
            return None;
        }

        let freq_index = ((self.data[2] & 0x3C) >> 2) as usize;
        let sample_rate = *SAMPLE_RATES.get(freq_index)?;
        // Raw AAC frame count within the ADTS frame, usually 1
        let frames = (self.data[6] & 0x03) as u64 + 1;
        let samples = frames * 1024;

        Some(Duration::from_micros(
            samples * 1_000_000 / sample_rate as u64,
        ))
    }
}

pub(super) const MAGIC_HEADER_BCMEDIA_ADPCM: u32 = 0x62773130;

pub(super) const MAGIC_HEADER_BCMEDIA_ADPCM_DATA: u16 = 0x0100;

/// This contains BcMedia audio data in ADPCM format
#[derive(Debug, Clone)]
pub struct BcMediaAdpcm {
    /// The raw adpcm data in DVI-4 layout: 4 bytes of predictor state then
    /// one block of samples, two samples per byte
    pub data: Vec<u8>,
}

impl BcMediaAdpcm {
    /// Play duration of this block. The camera's ADPCM is always 8 kHz
    pub fn duration(&self) -> Duration {
        const SAMPLE_RATE: u64 = 8000;
        let samples = self.data.len().saturating_sub(4) as u64 * 2;
        Duration::from_micros(samples * 1_000_000 / SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aac_duration_from_adts() {
        // Syncword, MPEG-4 AAC-LC, sample frequency index 11 (8000 Hz),
        // single raw frame
        let data = vec![0xFF, 0xF1, 0x6C, 0x40, 0x01, 0x20, 0x00, 0x00];
        let aac = BcMediaAac { data };
        assert_eq!(aac.duration(), Some(Duration::from_micros(1024 * 125)));
    }

    #[test]
    fn test_aac_duration_rejects_garbage() {
        let aac = BcMediaAac {
            data: vec![0x00; 16],
        };
        assert_eq!(aac.duration(), None);
    }

    #[test]
    fn test_adpcm_duration() {
        // 4 bytes of predictor state + 160 sample bytes = 320 samples at
        // 8 kHz = 40 ms
        let adpcm = BcMediaAdpcm {
            data: vec![0u8; 164],
        };
        assert_eq!(adpcm.duration(), Duration::from_millis(40));
    }
}
