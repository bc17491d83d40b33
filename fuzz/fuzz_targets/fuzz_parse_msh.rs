#![no_main]

use libfuzzer_sys::fuzz_target;
use meshbridge::{Format, MeshVariant, ParserConfig};

fuzz_target!(|data: &[u8]| {
    let _ = MeshVariant::from_bytes(Format::Msh, data, &ParserConfig::default());
});
