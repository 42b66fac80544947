use qoastream::{QoaDecoder, QoaRodioSource};
use rodio::{OutputStream, Sink};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Some(audio_path) = std::env::args().nth(1) else {
        eprintln!("Usage: play <path to qoa file> [start_sample]");
        return Ok(());
    };

    let mut decoder = QoaDecoder::open(audio_path)?;
    if let Some(start) = std::env::args().nth(2) {
        decoder.seek(start.parse()?)?;
    }
    if let Some(format) = decoder.format() {
        println!("Decoded header:");
        println!("\tchannels: {}", format.channels);
        println!("\tsample rate: {}", format.sample_rate);
        println!("\tDuration: {:?}", decoder.total_duration());
    }

    let (_stream, stream_handle) = OutputStream::try_default()?;
    let sink = Sink::try_new(&stream_handle)?;

    println!("Playing...");
    sink.append(QoaRodioSource::new(decoder));
    sink.sleep_until_end();
    Ok(())
}
