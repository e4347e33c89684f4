#![no_main]

use libfuzzer_sys::fuzz_target;
use logcrawl::data::LineNumber;
use logcrawl::index::{IndexConfig, MemorySource, index_full};
use logcrawl::utils::CancelToken;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must index without panicking, and every offset must
    // fall inside the file in increasing order
    let source = MemorySource::new(data.to_vec());
    let config = IndexConfig {
        read_block_bytes: 64,
        ..IndexConfig::default()
    };
    let Ok(outcome) = index_full(&source, &config, None, &CancelToken::new(), |_| {}) else {
        return;
    };
    let Some(file) = outcome.completed() else {
        return;
    };

    let offsets: Vec<_> = file.offsets().collect();
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    assert!(offsets.iter().all(|o| o.as_u64() < data.len() as u64));
    for i in 0..offsets.len() {
        let line = LineNumber::new(i as u32);
        assert_eq!(file.line_at_offset(offsets[i]), Some(line));
    }
});
