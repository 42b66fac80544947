use qoastream::QoaEncoder;
use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Read};

/// Interleaved samples read per write, per channel.
const CHUNK_SAMPLES: usize = 1024;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() != 5 {
        eprintln!("Usage: encode <input_raw_pcm|-> <output_qoa> <channels> <sample_rate>");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  input_raw_pcm  - Raw PCM audio (16-bit signed little-endian), - for stdin");
        eprintln!("  output_qoa     - Path to output QOA file");
        eprintln!("  channels       - Number of channels (1 for mono, 2 for stereo, etc.)");
        eprintln!("  sample_rate    - Sample rate in Hz (e.g., 44100)");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  ffmpeg -i input.wav -f s16le -ar 44100 -ac 2 - | encode - output.qoa 2 44100");
        std::process::exit(1);
    }

    let channels: u8 = args[3].parse()?;
    let sample_rate: u32 = args[4].parse()?;

    let mut input: Box<dyn Read> = if args[1] == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(File::open(&args[1])?)
    };
    let output = BufWriter::new(File::create(&args[2])?);
    let mut encoder = QoaEncoder::new(output, channels, sample_rate)?;

    let frame_bytes = channels as usize * 2;
    let mut bytes = vec![0u8; CHUNK_SAMPLES * frame_bytes];
    let mut samples = Vec::with_capacity(CHUNK_SAMPLES * channels as usize);
    let mut carry = 0;
    loop {
        let n = input.read(&mut bytes[carry..])?;
        if n == 0 {
            break;
        }
        let filled = carry + n;
        // Only whole sample frames go to the encoder. The rest waits for
        // the next read.
        let usable = filled - filled % frame_bytes;

        samples.clear();
        samples.extend(
            bytes[..usable]
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]])),
        );
        encoder.write_samples(&samples)?;

        bytes.copy_within(usable..filled, 0);
        carry = filled - usable;
    }
    if carry > 0 {
        eprintln!("Warning: discarding {} trailing bytes", carry);
    }

    let samples_per_channel = encoder.samples_written();
    encoder.finish()?;

    println!(
        "Encoded {} samples per channel ({} channels at {} Hz) to {}",
        samples_per_channel, channels, sample_rate, args[2]
    );
    Ok(())
}
