use qoastream::QoaDecoder;
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() != 3 && args.len() != 4 {
        eprintln!("Usage: decode <input.qoa> <output.raw> [start_sample]");
        eprintln!();
        eprintln!("Decodes a QOA file to raw 16-bit signed little-endian PCM,");
        eprintln!("optionally starting at the given sample per channel.");
        std::process::exit(1);
    }

    let mut decoder = QoaDecoder::open(&args[1])?;
    let Some(format) = decoder.format() else {
        println!("{} holds no audio", args[1]);
        return Ok(());
    };

    println!("Audio info:");
    println!("  Channels: {}", format.channels);
    println!("  Sample rate: {} Hz", format.sample_rate);
    println!("  Samples per channel: {}", decoder.len());
    if let Some(duration) = decoder.total_duration() {
        println!("  Duration: {:.2} seconds", duration.as_secs_f64());
    }

    if let Some(start) = args.get(3) {
        decoder.seek(start.parse()?)?;
        println!("  Starting at sample {}", decoder.position());
    }

    let mut output = BufWriter::new(File::create(&args[2])?);
    let mut buf = vec![0i16; 4096 * format.channels as usize];
    let mut written = 0;
    loop {
        let progress = decoder.read_samples(&mut buf)?;
        for sample in &buf[..progress.count] {
            output.write_all(&sample.to_le_bytes())?;
        }
        written += progress.count;
        if progress.end_of_stream {
            break;
        }
    }
    output.flush()?;

    println!("\nDecoded to: {} ({} bytes)", args[2], written * 2);
    Ok(())
}
