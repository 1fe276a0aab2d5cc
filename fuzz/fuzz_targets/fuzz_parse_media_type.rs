#![no_main]

use libfuzzer_sys::fuzz_target;
use tokio_email::{format_media_type, parse_media_type};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok((media_type, params)) = parse_media_type(s) {
            let _ = format_media_type(&media_type, &params);
        }
    }
});
