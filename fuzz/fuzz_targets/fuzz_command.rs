#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Anything that decodes must encode again and decode to the same command.
    if let Ok(command) = grimoire_live::protocol::Command::decode(text) {
        if let Ok(frame) = command.encode() {
            let again = grimoire_live::protocol::Command::decode(&frame);
            assert!(again.is_ok(), "re-encoded frame failed to decode: {frame}");
        }
    }
});
