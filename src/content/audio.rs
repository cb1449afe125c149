use crate::error::{PackError, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded multi-channel audio, channels kept separate, samples in [-1, 1].
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
    member_name: Option<String>,
    original_bytes: Option<Vec<u8>>,
}

impl AudioBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            member_name: None,
            original_bytes: None,
        }
    }

    /// Remember the member name this audio originally had inside an archive.
    pub fn with_member_name<S: Into<String>>(mut self, name: S) -> Self {
        self.member_name = Some(name.into());
        self
    }

    /// Keep the original encoded bytes so a re-pack can copy them verbatim
    /// instead of re-encoding the waveform.
    pub fn with_original_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.original_bytes = Some(bytes);
        self
    }

    pub fn member_name(&self) -> Option<&str> {
        self.member_name.as_deref()
    }

    pub fn original_bytes(&self) -> Option<&[u8]> {
        self.original_bytes.as_deref()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_samples(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Decode any supported compressed or PCM format. The extension is a
    /// probe hint only; the container is sniffed from the bytes.
    pub fn decode(bytes: &[u8], ext: &str) -> Result<Self> {
        if ext == "wav" {
            if let Ok(buffer) = Self::decode_wav(bytes) {
                return Ok(buffer);
            }
        }
        Self::decode_with_symphonia(bytes, ext)
    }

    /// Fast path for canonical RIFF/WAVE files: PCM 8/16/24/32-bit and
    /// 32-bit float, without pulling in the full probe machinery.
    fn decode_wav(bytes: &[u8]) -> Result<Self> {
        let malformed = |reason: &str| PackError::Decode {
            what: "wav".to_string(),
            reason: reason.to_string(),
        };

        if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(malformed("not a RIFF/WAVE stream"));
        }

        let mut format_tag = 0u16;
        let mut num_channels = 0usize;
        let mut sample_rate = 0u32;
        let mut bits_per_sample = 0u16;
        let mut data: Option<&[u8]> = None;

        let mut offset = 12;
        while offset + 8 <= bytes.len() {
            let chunk_id = &bytes[offset..offset + 4];
            let chunk_len =
                u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap()) as usize;
            let body_start = offset + 8;
            let body_end = (body_start + chunk_len).min(bytes.len());
            let body = &bytes[body_start..body_end];

            match chunk_id {
                b"fmt " => {
                    if body.len() < 16 {
                        return Err(malformed("truncated fmt chunk"));
                    }
                    format_tag = u16::from_le_bytes(body[0..2].try_into().unwrap());
                    num_channels = u16::from_le_bytes(body[2..4].try_into().unwrap()) as usize;
                    sample_rate = u32::from_le_bytes(body[4..8].try_into().unwrap());
                    bits_per_sample = u16::from_le_bytes(body[14..16].try_into().unwrap());
                }
                b"data" => {
                    data = Some(body);
                }
                _ => {}
            }

            // chunks are word-aligned
            offset = body_start + chunk_len + (chunk_len & 1);
        }

        let data = data.ok_or_else(|| malformed("missing data chunk"))?;
        if num_channels == 0 || sample_rate == 0 {
            return Err(malformed("missing fmt chunk"));
        }

        let bytes_per_sample = (bits_per_sample / 8) as usize;
        if bytes_per_sample == 0 {
            return Err(malformed("zero sample width"));
        }
        let frame_size = bytes_per_sample * num_channels;
        let num_frames = data.len() / frame_size;

        let mut channels = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in 0..num_frames {
            for (ch, channel) in channels.iter_mut().enumerate() {
                let start = frame * frame_size + ch * bytes_per_sample;
                let raw = &data[start..start + bytes_per_sample];
                let sample = match (format_tag, bits_per_sample) {
                    (1, 8) => (raw[0] as f32 - 128.0) / 128.0,
                    (1, 16) => {
                        i16::from_le_bytes(raw.try_into().unwrap()) as f32 / i16::MAX as f32
                    }
                    (1, 24) => {
                        let value =
                            i32::from_le_bytes([0, raw[0], raw[1], raw[2]]) >> 8;
                        value as f32 / 8_388_607.0
                    }
                    (1, 32) => {
                        i32::from_le_bytes(raw.try_into().unwrap()) as f32 / i32::MAX as f32
                    }
                    (3, 32) => f32::from_le_bytes(raw.try_into().unwrap()),
                    _ => {
                        return Err(PackError::Unsupported {
                            what: format!(
                                "wav sample format {} ({}-bit)",
                                format_tag, bits_per_sample
                            ),
                        });
                    }
                };
                channel.push(sample);
            }
        }

        Ok(Self::new(channels, sample_rate))
    }

    fn decode_with_symphonia(bytes: &[u8], ext: &str) -> Result<Self> {
        let decode_error = |reason: String| PackError::Decode {
            what: "audio".to_string(),
            reason,
        };

        let cursor = Cursor::new(bytes.to_vec());
        let stream = MediaSourceStream::new(Box::new(cursor), Default::default());

        let mut hint = Hint::new();
        if !ext.is_empty() {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| decode_error(format!("unrecognized container: {}", e)))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| decode_error("no decodable track".to_string()))?;
        let track_id = track.id;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| decode_error(format!("unsupported codec: {}", e)))?;

        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
        let mut channels: Vec<Vec<f32>> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(decode_error(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    let num_channels = spec.channels.count();
                    if channels.is_empty() {
                        channels = vec![Vec::new(); num_channels];
                    }

                    if sample_buf.is_none() {
                        sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                    }
                    let buf = sample_buf.as_mut().unwrap();
                    buf.copy_interleaved_ref(decoded);

                    for frame in buf.samples().chunks(num_channels) {
                        for (ch, &sample) in frame.iter().enumerate() {
                            channels[ch].push(sample);
                        }
                    }
                }
                // a corrupt packet does not abort the whole stream
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(decode_error(e.to_string())),
            }
        }

        if channels.is_empty() || channels[0].is_empty() {
            return Err(decode_error("stream contained no samples".to_string()));
        }

        Ok(Self::new(channels, sample_rate))
    }

    /// Encode as 16-bit PCM RIFF/WAVE, channels interleaved.
    pub fn encode_wav(&self) -> Result<Vec<u8>> {
        if self.channels.is_empty() || self.num_samples() == 0 {
            return Err(PackError::Decode {
                what: "audio".to_string(),
                reason: "cannot encode empty buffer".to_string(),
            });
        }

        let num_channels = self.channels.len() as u16;
        let num_samples = self.num_samples();
        let bytes_per_frame = num_channels as u32 * 2;
        let data_len = num_samples as u32 * bytes_per_frame;
        let byte_rate = self.sample_rate * bytes_per_frame;

        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&num_channels.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&(bytes_per_frame as u16).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());

        for frame in 0..num_samples {
            for channel in &self.channels {
                let sample = channel.get(frame).copied().unwrap_or(0.0);
                let quantized = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                out.extend_from_slice(&quantized.to_le_bytes());
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_buffer(sample_rate: u32, channels: usize, num_samples: usize) -> AudioBuffer {
        let data: Vec<Vec<f32>> = (0..channels)
            .map(|ch| {
                (0..num_samples)
                    .map(|i| {
                        let t = i as f32 / sample_rate as f32;
                        (t * 440.0 * (ch + 1) as f32 * 2.0 * std::f32::consts::PI).sin() * 0.5
                    })
                    .collect()
            })
            .collect();
        AudioBuffer::new(data, sample_rate)
    }

    #[test]
    fn test_wav_round_trip() {
        let original = sine_buffer(16_000, 2, 1600);
        let bytes = original.encode_wav().unwrap();

        let decoded = AudioBuffer::decode(&bytes, "wav").unwrap();
        assert_eq!(decoded.sample_rate(), 16_000);
        assert_eq!(decoded.num_channels(), 2);
        assert_eq!(decoded.num_samples(), 1600);

        // 16-bit quantization error stays well under 1e-3
        for (a, b) in original.channels()[0]
            .iter()
            .zip(decoded.channels()[0].iter())
        {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_wav_header_layout() {
        let buffer = sine_buffer(8_000, 1, 100);
        let bytes = buffer.encode_wav().unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), 44 + 100 * 2);
    }

    #[test]
    fn test_empty_buffer_rejected() {
        let buffer = AudioBuffer::new(vec![], 44_100);
        assert!(buffer.encode_wav().is_err());

        let buffer = AudioBuffer::new(vec![vec![]], 44_100);
        assert!(buffer.encode_wav().is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(AudioBuffer::decode(b"definitely not audio", "mp3").is_err());
    }

    #[test]
    fn test_wav_fast_path_float32() {
        // hand-build a float32 WAV and make sure the fast path reads it
        let samples: Vec<f32> = vec![0.0, 0.25, -0.25, 1.0];
        let data_len = (samples.len() * 4) as u32;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&3u16.to_le_bytes()); // IEEE float
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&22_050u32.to_le_bytes());
        bytes.extend_from_slice(&(22_050u32 * 4).to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&32u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for sample in &samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        let decoded = AudioBuffer::decode_wav(&bytes).unwrap();
        assert_eq!(decoded.sample_rate(), 22_050);
        assert_eq!(decoded.channels()[0], samples);
    }
}
