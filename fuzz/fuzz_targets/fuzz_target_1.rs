#![no_main]

use bncs_protocol::core::codec::BncsCodec;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Both directions; stop at the first error like the connection does.
    for mut codec in [BncsCodec::client(), BncsCodec::server()] {
        let mut src = BytesMut::from(data);
        while let Ok(Some(_)) = codec.decode(&mut src) {}
    }
});
