//! Fuzz target for daemon address resolution.
//!
//! Run with: cargo +nightly fuzz run fuzz_address_resolve

#![no_main]

use libfuzzer_sys::fuzz_target;
use stevedore_core::{Address, Scheme};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let address = Address::resolve(s);

    // Without a separator the whole input is a local socket path.
    if !s.contains("://") {
        assert_eq!(address.scheme, Scheme::LocalSocket);
        assert_eq!(address.endpoint, s);
    }
    let _ = address.host_header();
    let _ = address.to_string();
});
