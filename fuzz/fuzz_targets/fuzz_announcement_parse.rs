#![no_main]

use libfuzzer_sys::fuzz_target;
use noisefs::announce::record::Announcement;

fuzz_target!(|data: &[u8]| {
    // Parsing arbitrary wire bytes must never panic, and anything that
    // parses must re-serialize under the wire cap.
    if let Ok(a) = Announcement::from_json(data) {
        let _ = a.validate();
        let _ = a.is_expired(0);
        let _ = a.to_json();
    }
});
