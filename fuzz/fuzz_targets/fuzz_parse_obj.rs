#![no_main]

use libfuzzer_sys::fuzz_target;
use meshbridge::{Format, MemoryGeometry, ParserConfig};

fuzz_target!(|data: &[u8]| {
    // Decode straight into a host so per-corner attribute transfer is exercised too
    let mut host = MemoryGeometry::new();
    let _ = meshbridge::load(&mut host, Format::Obj, data, &ParserConfig::default());
});
