// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
// Fuzz target for WAL frame decoding.
// Run with: cargo +nightly fuzz run fuzz_wal_frame
//
// Arbitrary bytes must be rejected without panicking, and any frame body
// the decoder accepts must re-encode to the same bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tidemark_wal::frame::{decode_frame, encode_frame, LENGTH_PREFIX_SIZE};

fuzz_target!(|data: &[u8]| {
    if let Ok((index, payload)) = decode_frame(data) {
        let mut buffer = Vec::new();
        encode_frame(index, &payload, &mut buffer);
        assert_eq!(&buffer[LENGTH_PREFIX_SIZE..], data);
    }
});
