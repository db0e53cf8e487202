#![no_main]

use libfuzzer_sys::fuzz_target;
use noisefs::core::descriptor::Descriptor;

fuzz_target!(|data: &[u8]| {
    if let Ok(d) = Descriptor::from_json(data) {
        // Anything that parses satisfies the structural invariants.
        assert!(d.validate().is_ok());
        let _ = d.to_json();
    }
});
