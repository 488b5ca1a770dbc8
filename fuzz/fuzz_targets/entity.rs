//! Fuzz target for address parsing

#![no_main]

use corvid_core::Entity;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(entity) = data.parse::<Entity>() {
        let again: Entity = entity
            .to_string()
            .parse()
            .expect("rendered address must parse");
        assert_eq!(again, entity);
    }
});
