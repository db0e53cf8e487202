#![no_main]

use libfuzzer_sys::fuzz_target;
use noisefs::announce::store::{record_id, sanitize_component};

fuzz_target!(|input: (&str, Option<&str>)| {
    let (descriptor, nonce) = input;
    if let Ok(name) = sanitize_component(descriptor) {
        assert!(!name.is_empty());
        assert!(name.len() <= 50);
        assert!(name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
    if let Ok(id) = record_id(descriptor, nonce) {
        assert!(!id.contains('/'));
        assert!(!id.contains('\\'));
        assert!(!id.contains(".."));
        assert!(!id.contains('\0'));
    }
});
