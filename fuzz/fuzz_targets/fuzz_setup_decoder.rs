//! Fuzz target: `codec::decode_setup` / `decode_indexed_block`
//!
//! Arbitrary bytes must either decode to a frame whose length matches its
//! command exactly, or be rejected; the decoders must never panic.
//!
//! cargo fuzz run fuzz_setup_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use mqtt_fuota::protocol::codec::{
    BLOCK_INDEX_LEN, LAST_FW_INFO_LEN, SetupFrame, decode_indexed_block, decode_setup,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = decode_setup(data) {
        let expected = match frame {
            SetupFrame::TriggerCheck | SetupFrame::FuotaStart => 1,
            SetupFrame::LastFirmwareInfo(ref info) => {
                assert_eq!(info.integrity_hash.as_str().len(), 32);
                LAST_FW_INFO_LEN
            }
        };
        assert_eq!(data.len(), expected, "accepted frame with wrong length");
    }

    if let Ok(block) = decode_indexed_block(data) {
        assert_eq!(block.bytes.len() + BLOCK_INDEX_LEN, data.len());
    }
});
