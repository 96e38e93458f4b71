//! FLV container framing
//!
//! An HTTP-FLV response body is a plain FLV file that never ends:
//!
//! ```text
//! +============+==================+==============+==================+
//! | FLV Header | PrevTagSize0 (0) | Tag 1        | PrevTagSize1 ... |
//! | (9 bytes)  | (4 bytes)        | (11+N bytes) | (4 bytes)        |
//! +============+==================+==============+==================+
//! ```
//!
//! Tag layout:
//! ```text
//! +--------+-------------+-----------+-------------+---------+-------------+
//! | Type(1)| DataSize(3) | TS(3+1)   | StreamID(3) | Data(N) | PrevSize(4) |
//! +--------+-------------+-----------+-------------+---------+-------------+
//! ```
//!
//! A [`FlvTag`] keeps its fully encoded form so a tag produced once can be
//! handed to every subscriber without re-encoding.
//!
//! Video data:
//! ```text
//! +----------+----------+
//! | FrameType| CodecID  | CodecData...
//! | (4 bits) | (4 bits) |
//! +----------+----------+
//! ```
//!
//! Audio data:
//! ```text
//! +-----------+----------+----------+----------+
//! |SoundFormat|SoundRate |SoundSize |SoundType | AudioData...
//! | (4 bits)  | (2 bits) | (1 bit)  | (1 bit)  |
//! +-----------+----------+----------+----------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// FLV file header followed by PreviousTagSize0, announcing audio and video
pub const FLV_HEADER: [u8; 13] = [
    0x46, 0x4C, 0x56, // "FLV"
    0x01, // version
    0x05, // audio + video present
    0x00, 0x00, 0x00, 0x09, // header length
    0x00, 0x00, 0x00, 0x00, // PreviousTagSize0
];

/// Size of a tag header
pub const TAG_HEADER_SIZE: usize = 11;

/// Size of the PreviousTagSize trailer
pub const PREV_TAG_SIZE_LEN: usize = 4;

/// Largest body a tag can carry (24-bit length field)
pub const MAX_TAG_DATA_SIZE: usize = 0xFF_FFFF;

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio,
    Video,
    Script,
}

impl FlvTagType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            8 => Some(FlvTagType::Audio),
            9 => Some(FlvTagType::Video),
            18 => Some(FlvTagType::Script),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            FlvTagType::Audio => 8,
            FlvTagType::Video => 9,
            FlvTagType::Script => 18,
        }
    }
}

/// Encoded FLV tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlvTag {
    /// Tag type
    pub tag_type: FlvTagType,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Tag header + body + PreviousTagSize
    raw: Bytes,
}

/// Video frame type (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    /// Keyframe (for AVC, a seekable frame)
    Keyframe = 1,
    /// Inter frame (for AVC, a non-seekable frame)
    InterFrame = 2,
    /// Disposable inter frame (H.263 only)
    DisposableInterFrame = 3,
    /// Generated keyframe (reserved for server use)
    GeneratedKeyframe = 4,
    /// Video info/command frame
    VideoInfoFrame = 5,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            3 => Some(VideoFrameType::DisposableInterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            5 => Some(VideoFrameType::VideoInfoFrame),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            VideoFrameType::Keyframe | VideoFrameType::GeneratedKeyframe
        )
    }
}

/// Video codec ID (lower 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    SorensonH263 = 2,
    ScreenVideo = 3,
    Vp6 = 4,
    Vp6Alpha = 5,
    ScreenVideoV2 = 6,
    /// AVC (H.264)
    Avc = 7,
    /// HEVC (H.265), non-standard extension
    Hevc = 12,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            2 => Some(VideoCodec::SorensonH263),
            3 => Some(VideoCodec::ScreenVideo),
            4 => Some(VideoCodec::Vp6),
            5 => Some(VideoCodec::Vp6Alpha),
            6 => Some(VideoCodec::ScreenVideoV2),
            7 => Some(VideoCodec::Avc),
            12 => Some(VideoCodec::Hevc),
            _ => None,
        }
    }
}

/// Audio format (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    LinearPcmPlatform = 0,
    Adpcm = 1,
    Mp3 = 2,
    LinearPcmLe = 3,
    Nellymoser16kMono = 4,
    Nellymoser8kMono = 5,
    Nellymoser = 6,
    G711ALaw = 7,
    G711MuLaw = 8,
    Aac = 10,
    Speex = 11,
    Mp38k = 14,
    DeviceSpecific = 15,
}

impl AudioFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            0 => Some(AudioFormat::LinearPcmPlatform),
            1 => Some(AudioFormat::Adpcm),
            2 => Some(AudioFormat::Mp3),
            3 => Some(AudioFormat::LinearPcmLe),
            4 => Some(AudioFormat::Nellymoser16kMono),
            5 => Some(AudioFormat::Nellymoser8kMono),
            6 => Some(AudioFormat::Nellymoser),
            7 => Some(AudioFormat::G711ALaw),
            8 => Some(AudioFormat::G711MuLaw),
            10 => Some(AudioFormat::Aac),
            11 => Some(AudioFormat::Speex),
            14 => Some(AudioFormat::Mp38k),
            15 => Some(AudioFormat::DeviceSpecific),
            _ => None,
        }
    }
}

impl FlvTag {
    /// Encode a tag from its body
    pub fn new(tag_type: FlvTagType, timestamp: u32, data: &[u8]) -> Result<Self> {
        if data.len() > MAX_TAG_DATA_SIZE {
            return Err(Error::InvalidFlv("tag body exceeds 24-bit length"));
        }

        let mut buf = BytesMut::with_capacity(TAG_HEADER_SIZE + data.len() + PREV_TAG_SIZE_LEN);
        buf.put_u8(tag_type.to_byte());
        put_u24(&mut buf, data.len() as u32);
        put_u24(&mut buf, timestamp & 0x00FF_FFFF);
        buf.put_u8((timestamp >> 24) as u8);
        put_u24(&mut buf, 0); // stream id
        buf.put_slice(data);
        buf.put_u32((TAG_HEADER_SIZE + data.len()) as u32);

        Ok(Self {
            tag_type,
            timestamp,
            raw: buf.freeze(),
        })
    }

    /// Create a video tag
    pub fn video(timestamp: u32, data: &[u8]) -> Result<Self> {
        Self::new(FlvTagType::Video, timestamp, data)
    }

    /// Create an audio tag
    pub fn audio(timestamp: u32, data: &[u8]) -> Result<Self> {
        Self::new(FlvTagType::Audio, timestamp, data)
    }

    /// Create a script data (metadata) tag
    pub fn script(timestamp: u32, data: &[u8]) -> Result<Self> {
        Self::new(FlvTagType::Script, timestamp, data)
    }

    /// Take an already encoded tag, header and PreviousTagSize included
    pub fn parse(raw: Bytes) -> Result<Self> {
        if raw.len() < TAG_HEADER_SIZE + PREV_TAG_SIZE_LEN {
            return Err(Error::InvalidFlv("tag shorter than header"));
        }

        let tag_type =
            FlvTagType::from_byte(raw[0]).ok_or(Error::InvalidFlv("unknown tag type"))?;
        let data_size = read_u24(&raw[1..4]) as usize;
        if raw.len() != TAG_HEADER_SIZE + data_size + PREV_TAG_SIZE_LEN {
            return Err(Error::InvalidFlv("tag length mismatch"));
        }
        let timestamp = read_u24(&raw[4..7]) | (u32::from(raw[7]) << 24);

        Ok(Self {
            tag_type,
            timestamp,
            raw,
        })
    }

    /// The complete encoded tag, as written to subscribers
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Tag body without header or trailer
    pub fn data(&self) -> Bytes {
        self.raw
            .slice(TAG_HEADER_SIZE..self.raw.len() - PREV_TAG_SIZE_LEN)
    }

    fn body(&self) -> &[u8] {
        &self.raw[TAG_HEADER_SIZE..self.raw.len() - PREV_TAG_SIZE_LEN]
    }

    /// Check if this is a video tag
    pub fn is_video(&self) -> bool {
        self.tag_type == FlvTagType::Video
    }

    /// Check if this is an audio tag
    pub fn is_audio(&self) -> bool {
        self.tag_type == FlvTagType::Audio
    }

    /// Check if this is a script data tag
    pub fn is_script(&self) -> bool {
        self.tag_type == FlvTagType::Script
    }

    /// For video tags, get the frame type
    pub fn video_frame_type(&self) -> Option<VideoFrameType> {
        match self.body().first() {
            Some(&b) if self.is_video() => VideoFrameType::from_byte(b),
            _ => None,
        }
    }

    /// For video tags, get the codec
    pub fn video_codec(&self) -> Option<VideoCodec> {
        match self.body().first() {
            Some(&b) if self.is_video() => VideoCodec::from_byte(b),
            _ => None,
        }
    }

    /// For audio tags, get the format
    pub fn audio_format(&self) -> Option<AudioFormat> {
        match self.body().first() {
            Some(&b) if self.is_audio() => AudioFormat::from_byte(b),
            _ => None,
        }
    }

    /// Check if this is a keyframe
    pub fn is_keyframe(&self) -> bool {
        self.video_frame_type()
            .map(|ft| ft.is_keyframe())
            .unwrap_or(false)
    }

    /// Check if this is an AVC or HEVC sequence header
    pub fn is_video_sequence_header(&self) -> bool {
        matches!(
            self.video_codec(),
            Some(VideoCodec::Avc) | Some(VideoCodec::Hevc)
        ) && self.body().get(1) == Some(&0)
    }

    /// Check if this is an AAC sequence header
    pub fn is_aac_sequence_header(&self) -> bool {
        self.audio_format() == Some(AudioFormat::Aac) && self.body().get(1) == Some(&0)
    }

    /// Size of the tag body
    pub fn size(&self) -> usize {
        self.raw.len() - TAG_HEADER_SIZE - PREV_TAG_SIZE_LEN
    }
}

/// Sequential reader for an FLV byte stream
pub struct FlvReader<R> {
    inner: R,
    header_read: bool,
}

impl<R: AsyncRead + Unpin> FlvReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            header_read: false,
        }
    }

    /// Read and validate the file header and PreviousTagSize0
    pub async fn read_header(&mut self) -> Result<()> {
        let mut header = [0u8; 9];
        self.inner.read_exact(&mut header).await?;
        if &header[..3] != b"FLV" {
            return Err(Error::InvalidFlv("missing FLV signature"));
        }
        let header_len = u32::from_be_bytes([header[5], header[6], header[7], header[8]]) as usize;
        if header_len < 9 {
            return Err(Error::InvalidFlv("bad header length"));
        }
        if header_len > 9 {
            let mut skip = vec![0u8; header_len - 9];
            self.inner.read_exact(&mut skip).await?;
        }

        let mut prev_tag_size0 = [0u8; PREV_TAG_SIZE_LEN];
        self.inner.read_exact(&mut prev_tag_size0).await?;
        self.header_read = true;
        Ok(())
    }

    /// Read the next tag, `None` at a clean end of stream
    pub async fn read_tag(&mut self) -> Result<Option<FlvTag>> {
        if !self.header_read {
            self.read_header().await?;
        }

        let mut header = [0u8; TAG_HEADER_SIZE];
        match self.inner.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let data_size = read_u24(&header[1..4]) as usize;
        let mut raw = BytesMut::with_capacity(TAG_HEADER_SIZE + data_size + PREV_TAG_SIZE_LEN);
        raw.put_slice(&header);
        raw.resize(TAG_HEADER_SIZE + data_size + PREV_TAG_SIZE_LEN, 0);
        self.inner.read_exact(&mut raw[TAG_HEADER_SIZE..]).await?;

        FlvTag::parse(raw.freeze()).map(Some)
    }
}

fn put_u24(buf: &mut BytesMut, v: u32) {
    buf.put_u8((v >> 16) as u8);
    buf.put_u8((v >> 8) as u8);
    buf.put_u8(v as u8);
}

fn read_u24(b: &[u8]) -> u32 {
    (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2])
}
