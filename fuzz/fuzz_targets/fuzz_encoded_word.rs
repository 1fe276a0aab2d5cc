#![no_main]

use libfuzzer_sys::fuzz_target;
use tokio_email::{WordDecoder, WordEncoder};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let decoder = WordDecoder::new();
        let _ = decoder.decode(s);
        let _ = decoder.decode_header(s);

        // Anything the encoder produces must decode back to the input.
        let encoded = WordEncoder::QEncoding.encode("UTF-8", s);
        if encoded != s {
            assert_eq!(decoder.decode_header(&encoded).unwrap(), s);
        }
    }
});
