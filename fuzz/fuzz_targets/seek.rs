#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u32, &[u8])| {
    let (target, data) = input;
    let Ok(mut decoder) = qoastream::QoaDecoder::new(std::io::Cursor::new(data)) else {
        return
    };
    if decoder.seek(u64::from(target)).is_ok() {
        assert_eq!(decoder.position(), u64::from(target));
        decoder.take_while(|i| matches!(i, Ok(_))).count();
    }
});
