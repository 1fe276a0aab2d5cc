#![no_main]

use libfuzzer_sys::fuzz_target;
use tokio::runtime::Builder;
use tokio_email::{Parser, ParserConfig};

fuzz_target!(|data: &[u8]| {
    let rt = Builder::new_current_thread().build().unwrap();

    rt.block_on(async {
        let parser = Parser::with_config(ParserConfig {
            max_depth: 16,
            buffer_size: 64,
            max_part_bytes: 1 << 20,
            ..ParserConfig::default()
        });
        if let Ok(parsed) = parser.parse(data).await {
            // Whatever parses must serialize without panicking.
            let _ = parsed.message.bytes().await;
        }
    });
});
