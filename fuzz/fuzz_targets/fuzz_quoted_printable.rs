#![no_main]

use libfuzzer_sys::fuzz_target;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Builder;
use tokio_email::quotedprintable::{Reader, Writer};

fuzz_target!(|data: &[u8]| {
    let rt = Builder::new_current_thread().build().unwrap();

    rt.block_on(async {
        let mut output = Vec::new();
        let _ = Reader::new(data).take(1024 * 1024).read_to_end(&mut output).await;

        // Binary mode keeps bytes exact, so encoding must round-trip.
        let mut encoded = Vec::new();
        let mut writer = Writer::new(&mut encoded);
        writer.binary = true;
        writer.write_all(data).await.unwrap();
        writer.finish().await.unwrap();

        let mut decoded = Vec::new();
        Reader::new(&encoded[..]).read_to_end(&mut decoded).await.unwrap();
        assert_eq!(decoded, data);
    });
});
