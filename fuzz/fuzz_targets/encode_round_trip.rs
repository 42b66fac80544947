#![no_main]

use libfuzzer_sys::fuzz_target;
use qoastream::{AudioFormat, EncoderConfig, QoaEncoder};

fuzz_target!(|data: &[u8]| {
    // Channel count, frame length and chunk size, then samples.
    if data.len() < 4 {
        return;
    }

    let channels = (data[0] % 8) + 1; // 1-8
    let frame_len = usize::from(data[1]) * 20 + 1;
    let chunk = usize::from(data[2]) + 1;
    let sample_rate = 44100u32;

    let sample_bytes = &data[3..];
    let channels_usize = channels as usize;
    let samples_per_channel = sample_bytes.len() / 2 / channels_usize;
    let samples: Vec<i16> = sample_bytes[..samples_per_channel * channels_usize * 2]
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();

    let config = EncoderConfig::default().with_frame_len(frame_len);
    let mut encoder =
        QoaEncoder::with_config(std::io::Cursor::new(Vec::new()), channels, sample_rate, config)
            .expect("valid encoder format");
    for part in samples.chunks(chunk * channels_usize) {
        encoder.write_samples(part).expect("in-memory write");
    }
    let encoded = encoder.finish().expect("in-memory finish").into_inner();

    // The encoder output must always be decodable
    let decoded = qoastream::decode_all(&encoded[..]).expect("encoder output must be valid QOA");

    if samples.is_empty() {
        assert_eq!(decoded.num_channels, 0);
    } else {
        assert_eq!(
            AudioFormat {
                channels: decoded.num_channels,
                sample_rate: decoded.sample_rate
            },
            AudioFormat {
                channels,
                sample_rate
            }
        );
    }
    assert_eq!(decoded.samples.len(), samples.len());
});
