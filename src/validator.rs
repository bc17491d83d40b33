//! Consistency checks run before a mesh is encoded
//!
//! Mesh connectivity is validated when a mesh is built, but the attribute
//! store is public and can drift out of step with the geometry. Writers ask
//! this module which attributes at a location can be emitted; the rest are
//! logged and left out of the file.

use tracing::{debug, warn};

use crate::model::{AttribLocation, Attribute, AttributeKind, MeshVariant};

/// Numeric attributes at `location` whose element count matches the mesh
///
/// None of the VTK or OBJ encoders store categorical attributes.
pub(crate) fn writable_attributes(mesh: &MeshVariant, location: AttribLocation) -> Vec<&Attribute> {
    let Some(store) = mesh.attributes() else {
        return Vec::new();
    };
    let expected = mesh.num_elements(location);
    store
        .iter(location)
        .filter(|attr| {
            if attr.kind() == AttributeKind::Categorical {
                debug!(name = attr.name(), %location, "Categorical attribute not written");
                return false;
            }
            match expected {
                Some(n) if n == attr.element_count() => true,
                Some(n) => {
                    warn!(
                        name = attr.name(),
                        %location,
                        found = attr.element_count(),
                        expected = n,
                        "Attribute length does not match the mesh; not written"
                    );
                    false
                }
                None => {
                    debug!(name = attr.name(), %location, "Location does not apply to this mesh");
                    false
                }
            }
        })
        .collect()
}

/// Attributes stored at locations no writer emits for this mesh
pub(crate) fn report_unwritten(mesh: &MeshVariant, written: &[AttribLocation]) {
    let Some(store) = mesh.attributes() else {
        return;
    };
    for attr in store.iter_all() {
        if !written.contains(&attr.location()) {
            debug!(name = attr.name(), location = %attr.location(), "Attribute location not supported by the format");
        }
    }
}
