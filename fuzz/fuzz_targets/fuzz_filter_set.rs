#![no_main]

use libfuzzer_sys::fuzz_target;
use logcrawl::search::{CompiledFilterSet, FilterSet};

fuzz_target!(|data: &str| {
    // Any JSON the store hands over must parse or fail cleanly, and any
    // pattern must compile or fail with an error
    let Ok(set) = FilterSet::from_json(data) else {
        return;
    };
    if let Ok(compiled) = CompiledFilterSet::compile(&set) {
        let _ = compiled.evaluate(data);
    }
});
