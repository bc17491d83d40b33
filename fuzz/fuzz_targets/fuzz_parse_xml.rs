#![no_main]

use libfuzzer_sys::fuzz_target;
use meshbridge::{Format, MeshVariant, ParserConfig, WriterConfig};

fuzz_target!(|data: &[u8]| {
    // Covers inline, appended and zlib-compressed arrays
    if let Ok(mesh) = MeshVariant::from_bytes(Format::Vtu, data, &ParserConfig::default()) {
        if !mesh.is_none() {
            let _ = mesh.to_bytes(Format::Vtu, &WriterConfig::new().with_compression(true));
        }
    }
});
