//! ffmpeg-backed [`FrameDecoder`] (libavformat + libavcodec).

use crate::media::{MediaError, MediaHandle, MediaInfo};
use crate::player::FrameDecoder;
use facescope_core::Frame;
use ffmpeg_next::format::context::Input;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;
use std::time::Duration;

/// Per-open decoding state.
struct OpenStream {
    input: Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    time_base: f64,
    width: u32,
    height: u32,
    flushing: bool,
    done: bool,
}

// Safety: the decoder is owned by the player thread and never shared; the
// raw ffmpeg pointers inside are not aliased across threads.
unsafe impl Send for OpenStream {}

/// Decodes the best video stream of a container to RGB24 frames.
#[derive(Default)]
pub struct FfmpegDecoder {
    stream: Option<OpenStream>,
    sequence: u64,
}

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

fn open_failed(media: &MediaHandle, reason: impl ToString) -> MediaError {
    MediaError::OpenFailed {
        handle: media.to_string(),
        reason: reason.to_string(),
    }
}

fn decode_failed(e: ffmpeg_next::Error) -> MediaError {
    MediaError::DecodeFailed(e.to_string())
}

/// Open `media` and read its stream properties without decoding.
pub fn probe(media: &MediaHandle) -> Result<MediaInfo, MediaError> {
    let mut decoder = FfmpegDecoder::new();
    decoder.open(media)
}

impl FrameDecoder for FfmpegDecoder {
    fn open(&mut self, media: &MediaHandle) -> Result<MediaInfo, MediaError> {
        self.stream = None;
        self.sequence = 0;

        ffmpeg_next::init().map_err(|e| open_failed(media, e))?;
        let input = ffmpeg_next::format::input(&media.as_str()).map_err(|e| open_failed(media, e))?;

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| open_failed(media, "no video stream"))?;
        let stream_index = stream.index();
        let time_base = f64::from(stream.time_base());

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| open_failed(media, e))?;
        let decoder = codec_ctx.decoder().video().map_err(|e| open_failed(media, e))?;

        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let frames = stream.frames();

        let width = decoder.width();
        let height = decoder.height();
        let info = MediaInfo {
            width,
            height,
            fps,
            frame_count: (frames > 0).then_some(frames as u64),
            codec: decoder.codec().map(|c| c.name().to_string()).unwrap_or_default(),
        };

        let scaler = scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| open_failed(media, e))?;

        self.stream = Some(OpenStream {
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            width,
            height,
            flushing: false,
            done: false,
        });

        Ok(info)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, MediaError> {
        let Some(s) = self.stream.as_mut() else {
            return Err(MediaError::NoSource);
        };
        if s.done {
            return Ok(None);
        }

        loop {
            let mut decoded = Video::empty();
            if s.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb = Video::empty();
                s.scaler.run(&decoded, &mut rgb).map_err(decode_failed)?;
                let pixels = extract_rgb_pixels(&rgb, s.width, s.height);
                let timestamp = decoded
                    .timestamp()
                    .map(|pts| Duration::from_secs_f64((pts as f64 * s.time_base).max(0.0)))
                    .unwrap_or_default();
                let frame = Frame::from_rgb(pixels, s.width, s.height, self.sequence, timestamp)
                    .map_err(|e| MediaError::DecodeFailed(e.to_string()))?;
                self.sequence += 1;
                return Ok(Some(frame));
            }

            if s.flushing {
                s.done = true;
                return Ok(None);
            }

            match s.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != s.stream_index {
                        continue;
                    }
                    if let Err(e) = s.decoder.send_packet(&packet) {
                        tracing::debug!(error = %e, "dropping undecodable packet");
                    }
                }
                None => {
                    let _ = s.decoder.send_eof();
                    s.flushing = true;
                }
            }
        }
    }

    fn rewind(&mut self) -> Result<(), MediaError> {
        let Some(s) = self.stream.as_mut() else {
            return Err(MediaError::NoSource);
        };
        s.input.seek(0, ..).map_err(decode_failed)?;
        s.decoder.flush();
        s.flushing = false;
        s.done = false;
        self.sequence = 0;
        Ok(())
    }
}

/// Copy an RGB24 frame into a tightly packed buffer, dropping row padding.
fn extract_rgb_pixels(rgb: &Video, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb.stride(0);
    let data = rgb.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}
