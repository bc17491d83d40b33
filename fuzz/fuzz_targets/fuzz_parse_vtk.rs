#![no_main]

use libfuzzer_sys::fuzz_target;
use meshbridge::{Format, MeshVariant, ParserConfig, WriterConfig};

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must encode again in both encodings
    if let Ok(mesh) = MeshVariant::from_bytes(Format::VtkLegacy, data, &ParserConfig::default()) {
        if !mesh.is_none() {
            let _ = mesh.to_bytes(Format::VtkLegacy, &WriterConfig::default());
        }
    }
    let _ = MeshVariant::from_bytes(
        Format::VtkLegacy,
        data,
        &ParserConfig::new().with_strict(true),
    );
});
