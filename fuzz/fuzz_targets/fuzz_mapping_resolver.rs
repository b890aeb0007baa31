// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
// Fuzz target for mapping parsing and document resolution.
// Run with: cargo +nightly fuzz run fuzz_mapping_resolver
//
// Input is split at the first newline: mappings JSON, then a document.
// Neither may panic the resolver, whatever their shape.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tidemark_mapping::Mappings;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    if input.len() > 8192 {
        return;
    }
    let (mappings, doc) = input.split_once('\n').unwrap_or((input, "{}"));

    let Ok(mappings) = serde_json::from_str(mappings).map(Mappings::from_json) else {
        return;
    };
    let Ok(mut mappings) = mappings else {
        return;
    };
    let Ok(serde_json::Value::Object(doc)) = serde_json::from_str(doc) else {
        return;
    };

    if let Ok(promotions) = mappings.resolve_batch([&doc]) {
        mappings.merge(promotions);
        // Once merged, the same document needs no further promotion.
        let again = mappings.resolve_batch([&doc]);
        assert!(again.map(|p| p.is_empty()).unwrap_or(true));
    }
});
