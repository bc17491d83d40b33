//! Host → mesh transfer

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::host::{ElementClass, HostAttribInfo, HostGeometry, PrimitiveKind, StorageKind};
use crate::model::{
    AttribLocation, AttributeStore, NumericScalar, Point, PointCloud, PolygonMesh, TetMesh,
};

/// Elements of one primitive kind gathered from the host
struct Population {
    /// Primitive ordinals of the matching kind, in host order
    prims: Vec<usize>,
    /// Host point ordinals referenced by those primitives, ascending
    points: Vec<usize>,
    /// Host vertex ordinals in primitive-then-local order
    corners: Vec<usize>,
    /// Corner point indices renumbered into `points`
    connectivity: Vec<usize>,
    /// Primitives of the matching kind rejected for their corner count
    skipped: usize,
}

impl Population {
    fn collect<H: HostGeometry + ?Sized>(
        host: &H,
        kind: PrimitiveKind,
        accept: impl Fn(usize) -> bool,
    ) -> Self {
        let (prims, rejected): (Vec<usize>, Vec<usize>) = (0..host.num_primitives())
            .filter(|&p| host.primitive_kind(p) == kind)
            .partition(|&p| accept(host.primitive_vertex_count(p)));
        if !rejected.is_empty() {
            debug!(
                count = rejected.len(),
                first = rejected[0],
                ?kind,
                "Skipping primitives with unexpected corner counts"
            );
        }

        let num_corners = prims.iter().map(|&p| host.primitive_vertex_count(p)).sum();
        let mut corners = Vec::with_capacity(num_corners);
        let mut marked = vec![false; host.num_points()];
        for &p in &prims {
            for local in 0..host.primitive_vertex_count(p) {
                let v = host.primitive_vertex(p, local);
                if let Some(m) = marked.get_mut(host.vertex_point(v)) {
                    *m = true;
                }
                corners.push(v);
            }
        }

        let mut remap = vec![usize::MAX; marked.len()];
        let mut points = Vec::new();
        for (host_point, _) in marked.iter().enumerate().filter(|(_, m)| **m) {
            remap[host_point] = points.len();
            points.push(host_point);
        }

        let connectivity = corners
            .iter()
            .map(|&v| remap[host.vertex_point(v)])
            .collect();

        Self {
            prims,
            points,
            corners,
            connectivity,
            skipped: rejected.len(),
        }
    }

    fn positions<H: HostGeometry + ?Sized>(&self, host: &H) -> Vec<Point> {
        self.points.iter().map(|&p| host.point_position(p)).collect()
    }
}

/// Build a point cloud from every host point
///
/// Returns `None` when the host has no points. Point attributes become
/// [`AttribLocation::Vertex`] attributes.
pub fn pull_point_cloud<H: HostGeometry + ?Sized>(host: &H) -> Option<PointCloud> {
    let n = host.num_points();
    if n == 0 {
        return None;
    }
    let positions = (0..n).map(|p| host.point_position(p)).collect();
    let mut cloud = PointCloud::new(positions);
    let all: Vec<usize> = (0..n).collect();
    pull_attributes(
        host,
        ElementClass::Point,
        &all,
        AttribLocation::Vertex,
        &mut cloud.attributes,
    );
    debug!(
        points = n,
        attributes = cloud.attributes.len(),
        "Pulled point cloud"
    );
    Some(cloud)
}

/// Build a polygon mesh from the host's polygons
///
/// Returns `None` when the host has no polygons. Only points referenced by
/// a polygon are kept, renumbered in host order.
pub fn pull_polygon_mesh<H: HostGeometry + ?Sized>(host: &H) -> Option<PolygonMesh> {
    let pop = Population::collect(host, PrimitiveKind::Polygon, |n| n > 0);
    if pop.prims.is_empty() {
        return None;
    }

    let mut offsets = Vec::with_capacity(pop.prims.len() + 1);
    offsets.push(0);
    for &p in &pop.prims {
        let last = offsets[offsets.len() - 1];
        offsets.push(last + host.primitive_vertex_count(p));
    }

    let mut mesh = match PolygonMesh::from_flat(
        pop.positions(host),
        pop.connectivity.clone(),
        offsets,
    ) {
        Ok(mesh) => mesh,
        Err(e) => {
            warn!(error = %e, "Host polygons reference missing points");
            return None;
        }
    };

    pull_attributes(
        host,
        ElementClass::Point,
        &pop.points,
        AttribLocation::Vertex,
        &mut mesh.attributes,
    );
    pull_attributes(
        host,
        ElementClass::Primitive,
        &pop.prims,
        AttribLocation::Face,
        &mut mesh.attributes,
    );
    pull_attributes(
        host,
        ElementClass::Vertex,
        &pop.corners,
        AttribLocation::FaceVertex,
        &mut mesh.attributes,
    );
    debug!(
        points = mesh.num_points(),
        faces = mesh.num_faces(),
        skipped = pop.skipped,
        attributes = mesh.attributes.len(),
        "Pulled polygon mesh"
    );
    Some(mesh)
}

/// Build a tetrahedral mesh from the host's tetrahedra
///
/// Returns `None` when the host has no tetrahedra. Only points referenced
/// by a tetrahedron are kept, renumbered in host order.
pub fn pull_tetmesh<H: HostGeometry + ?Sized>(host: &H) -> Option<TetMesh> {
    let pop = Population::collect(host, PrimitiveKind::Tetrahedron, |n| n == 4);
    if pop.prims.is_empty() {
        return None;
    }

    let mut mesh = match TetMesh::from_flat_indices(pop.positions(host), pop.connectivity.clone())
    {
        Ok(mesh) => mesh,
        Err(e) => {
            warn!(error = %e, "Host tetrahedra reference missing points");
            return None;
        }
    };

    pull_attributes(
        host,
        ElementClass::Point,
        &pop.points,
        AttribLocation::Vertex,
        &mut mesh.attributes,
    );
    pull_attributes(
        host,
        ElementClass::Primitive,
        &pop.prims,
        AttribLocation::Cell,
        &mut mesh.attributes,
    );
    pull_attributes(
        host,
        ElementClass::Vertex,
        &pop.corners,
        AttribLocation::CellVertex,
        &mut mesh.attributes,
    );
    debug!(
        points = mesh.num_points(),
        tets = mesh.num_tets(),
        skipped = pop.skipped,
        attributes = mesh.attributes.len(),
        "Pulled tetrahedral mesh"
    );
    Some(mesh)
}

/// Copy every transferable attribute of one host class into the store
fn pull_attributes<H: HostGeometry + ?Sized>(
    host: &H,
    class: ElementClass,
    elements: &[usize],
    location: AttribLocation,
    store: &mut AttributeStore,
) {
    for info in host.attributes(class) {
        if info.is_position {
            continue;
        }
        if info.tuple_size == 0 {
            debug!(name = %info.name, %class, "Skipping attribute with empty tuple");
            continue;
        }
        match info.storage {
            StorageKind::Bool | StorageKind::I32 => {
                pull_numeric::<i32, H>(host, class, &info, elements, location, store)
            }
            StorageKind::I8 => pull_numeric::<i8, H>(host, class, &info, elements, location, store),
            StorageKind::I64 => {
                pull_numeric::<i64, H>(host, class, &info, elements, location, store)
            }
            StorageKind::F32 => {
                pull_numeric::<f32, H>(host, class, &info, elements, location, store)
            }
            StorageKind::F64 => {
                pull_numeric::<f64, H>(host, class, &info, elements, location, store)
            }
            StorageKind::String => pull_categorical(host, class, &info, elements, location, store),
            StorageKind::Other => {
                debug!(name = %info.name, %class, "Skipping attribute with unsupported storage");
            }
        }
    }
}

fn pull_numeric<T: NumericScalar, H: HostGeometry + ?Sized>(
    host: &H,
    class: ElementClass,
    info: &HostAttribInfo,
    elements: &[usize],
    location: AttribLocation,
    store: &mut AttributeStore,
) {
    let ts = info.tuple_size;
    let mut data = Vec::with_capacity(elements.len() * ts);
    for &elem in elements {
        for comp in 0..ts {
            let value = if T::KIND.is_integer() {
                host.read_i64(class, &info.name, elem, comp).map(T::from_i64)
            } else {
                host.read_f64(class, &info.name, elem, comp).map(T::from_f64)
            };
            data.push(value.unwrap_or_default());
        }
    }
    if let Err(e) = store.add_numeric(location, info.name.as_str(), ts, data) {
        warn!(name = %info.name, error = %e, "Failed to store pulled attribute");
    }
}

/// Compact a string attribute into a first-occurrence string table
fn pull_categorical<H: HostGeometry + ?Sized>(
    host: &H,
    class: ElementClass,
    info: &HostAttribInfo,
    elements: &[usize],
    location: AttribLocation,
    store: &mut AttributeStore,
) {
    let ts = info.tuple_size;
    let mut strings: Vec<String> = Vec::new();
    let mut lookup: HashMap<String, i64> = HashMap::new();
    let mut indices = Vec::with_capacity(elements.len() * ts);
    for &elem in elements {
        for comp in 0..ts {
            let index = match host.read_string(class, &info.name, elem, comp) {
                Some(s) => *lookup.entry(s).or_insert_with_key(|s| {
                    strings.push(s.clone());
                    strings.len() as i64 - 1
                }),
                None => -1,
            };
            indices.push(index);
        }
    }
    if let Err(e) = store.add_categorical(location, info.name.as_str(), ts, strings, indices) {
        warn!(name = %info.name, error = %e, "Failed to store pulled string attribute");
    }
}
