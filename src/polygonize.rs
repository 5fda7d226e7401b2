use std::cmp::Ordering;
use std::collections::HashMap;

use geo::Area;
use geo::algorithm::contains::Contains;
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo_types::{Coord, Line, LineString, Polygon};

use crate::error::Result;

const NODE_TOL: f64 = 1e-10;
const SNAP_GRID: f64 = 1e9;

/// Reconstructs the enclosed regions of a planar line arrangement.
///
/// The input segments do not need to be noded: they are split at every
/// interior intersection and deduplicated first. Counter-clockwise rings of
/// the resulting half-edge graph become region shells; clockwise rings are
/// attached as holes to the smallest shell that contains them. The
/// outermost clockwise ring bounds the unbounded face and is discarded, so
/// only enclosed regions are returned.
pub fn polygonize(segments: Vec<Line<f64>>) -> Result<Vec<Polygon<f64>>> {
    let segments = node_segments(segments);
    if segments.is_empty() {
        return Ok(Vec::new());
    }

    let mut graph = PlanarGraph::build(&segments);
    graph.sort_outgoing();
    graph.prune_dangles();
    let rings = graph.extract_rings();

    Ok(assemble_regions(rings))
}

fn coords_close(a: Coord<f64>, b: Coord<f64>) -> bool {
    (a.x - b.x).abs() < NODE_TOL && (a.y - b.y).abs() < NODE_TOL
}

fn dist2(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

fn is_internal(segment: Line<f64>, point: Coord<f64>) -> bool {
    let tol2 = NODE_TOL * NODE_TOL;
    dist2(segment.start, point) > tol2 && dist2(segment.end, point) > tol2
}

/// Splits every segment at its interior intersections with the others, then
/// deduplicates regardless of direction.
fn node_segments(mut segments: Vec<Line<f64>>) -> Vec<Line<f64>> {
    segments.retain(|line| !coords_close(line.start, line.end));

    let mut splits: Vec<Vec<Coord<f64>>> = vec![Vec::new(); segments.len()];
    for i in 0..segments.len() {
        for j in (i + 1)..segments.len() {
            let (a, b) = (segments[i], segments[j]);
            let Some(hit) = line_intersection(a, b) else {
                continue;
            };
            match hit {
                LineIntersection::SinglePoint {
                    intersection: point,
                    ..
                } => {
                    if is_internal(a, point) {
                        splits[i].push(point);
                    }
                    if is_internal(b, point) {
                        splits[j].push(point);
                    }
                }
                LineIntersection::Collinear {
                    intersection: overlap,
                } => {
                    for point in [overlap.start, overlap.end] {
                        if is_internal(a, point) {
                            splits[i].push(point);
                        }
                        if is_internal(b, point) {
                            splits[j].push(point);
                        }
                    }
                }
            }
        }
    }

    let mut noded = Vec::with_capacity(segments.len());
    for (segment, mut points) in segments.into_iter().zip(splits) {
        if points.is_empty() {
            noded.push(segment);
            continue;
        }
        let start = segment.start;
        points.sort_by(|a, b| {
            dist2(start, *a)
                .partial_cmp(&dist2(start, *b))
                .unwrap_or(Ordering::Equal)
        });
        points.dedup_by(|a, b| coords_close(*a, *b));

        let mut current = start;
        for point in points {
            if !coords_close(current, point) {
                noded.push(Line::new(current, point));
                current = point;
            }
        }
        if !coords_close(current, segment.end) {
            noded.push(Line::new(current, segment.end));
        }
    }

    // Duplicate boundaries collapse to a single undirected segment.
    for line in &mut noded {
        let flip = match line.start.x.partial_cmp(&line.end.x) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => line.start.y > line.end.y,
            _ => false,
        };
        if flip {
            std::mem::swap(&mut line.start, &mut line.end);
        }
    }
    noded.sort_by(|a, b| {
        let ka = (a.start.x, a.start.y, a.end.x, a.end.y);
        let kb = (b.start.x, b.start.y, b.end.x, b.end.y);
        ka.partial_cmp(&kb).unwrap_or(Ordering::Equal)
    });
    noded.dedup_by(|a, b| coords_close(a.start, b.start) && coords_close(a.end, b.end));

    noded
}

struct PlanarNode {
    coordinate: Coord<f64>,
    /// Outgoing half-edge ids, sorted CCW by angle after `sort_outgoing`.
    outgoing: Vec<usize>,
    degree: usize,
}

struct HalfEdge {
    src: usize,
    dst: usize,
    /// Id of the opposite-direction half-edge.
    sym: usize,
    angle: f64,
    visited: bool,
    pruned: bool,
}

struct PlanarGraph {
    nodes: Vec<PlanarNode>,
    half_edges: Vec<HalfEdge>,
    node_ids: HashMap<(i64, i64), usize>,
}

impl PlanarGraph {
    fn build(segments: &[Line<f64>]) -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            half_edges: Vec::new(),
            node_ids: HashMap::new(),
        };
        for segment in segments {
            graph.add_segment(*segment);
        }
        graph
    }

    fn node_for(&mut self, coordinate: Coord<f64>) -> usize {
        let key = (
            (coordinate.x * SNAP_GRID).round() as i64,
            (coordinate.y * SNAP_GRID).round() as i64,
        );
        if let Some(&id) = self.node_ids.get(&key) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(PlanarNode {
            coordinate,
            outgoing: Vec::new(),
            degree: 0,
        });
        self.node_ids.insert(key, id);
        id
    }

    fn add_segment(&mut self, segment: Line<f64>) {
        let u = self.node_for(segment.start);
        let v = self.node_for(segment.end);
        if u == v {
            return;
        }

        let forward = self.half_edges.len();
        let backward = forward + 1;
        let dx = segment.end.x - segment.start.x;
        let dy = segment.end.y - segment.start.y;

        self.half_edges.push(HalfEdge {
            src: u,
            dst: v,
            sym: backward,
            angle: dy.atan2(dx),
            visited: false,
            pruned: false,
        });
        self.half_edges.push(HalfEdge {
            src: v,
            dst: u,
            sym: forward,
            angle: (-dy).atan2(-dx),
            visited: false,
            pruned: false,
        });

        self.nodes[u].outgoing.push(forward);
        self.nodes[u].degree += 1;
        self.nodes[v].outgoing.push(backward);
        self.nodes[v].degree += 1;
    }

    fn sort_outgoing(&mut self) {
        let half_edges = &self.half_edges;
        for node in &mut self.nodes {
            node.outgoing.sort_by(|&a, &b| {
                half_edges[a]
                    .angle
                    .partial_cmp(&half_edges[b].angle)
                    .unwrap_or(Ordering::Equal)
            });
        }
    }

    /// Iteratively removes degree-1 chains; dangling edges cannot bound a
    /// region and would derail ring traversal.
    fn prune_dangles(&mut self) {
        let mut pending: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.degree == 1)
            .map(|(id, _)| id)
            .collect();

        while let Some(node_id) = pending.pop() {
            if self.nodes[node_id].degree != 1 {
                continue;
            }
            self.nodes[node_id].degree = 0;

            let edge = self.nodes[node_id]
                .outgoing
                .iter()
                .copied()
                .find(|&id| !self.half_edges[id].pruned);
            let Some(edge) = edge else {
                continue;
            };
            let sym = self.half_edges[edge].sym;
            self.half_edges[edge].pruned = true;
            self.half_edges[sym].pruned = true;

            let neighbor = self.half_edges[edge].dst;
            if self.nodes[neighbor].degree > 0 {
                self.nodes[neighbor].degree -= 1;
                if self.nodes[neighbor].degree == 1 {
                    pending.push(neighbor);
                }
            }
        }
    }

    /// Traces the face rings of the arrangement with the next-CCW rule: at
    /// each destination node, continue along the edge immediately
    /// counter-clockwise of the arrival edge's reversal.
    fn extract_rings(&mut self) -> Vec<LineString<f64>> {
        let mut rings = Vec::new();

        for start in 0..self.half_edges.len() {
            if self.half_edges[start].visited || self.half_edges[start].pruned {
                continue;
            }

            let mut ring_edges = Vec::new();
            let mut current = start;
            let mut closed = true;

            loop {
                self.half_edges[current].visited = true;
                ring_edges.push(current);

                let dst = self.half_edges[current].dst;
                let sym = self.half_edges[current].sym;
                let outgoing = &self.nodes[dst].outgoing;

                let Some(position) = outgoing.iter().position(|&id| id == sym) else {
                    closed = false;
                    break;
                };

                let mut next = None;
                for offset in 1..=outgoing.len() {
                    let candidate = outgoing[(position + offset) % outgoing.len()];
                    if !self.half_edges[candidate].pruned {
                        next = Some(candidate);
                        break;
                    }
                }
                match next {
                    Some(edge) => current = edge,
                    None => {
                        closed = false;
                        break;
                    }
                }

                if current == start {
                    break;
                }
                if self.half_edges[current].visited {
                    closed = false;
                    break;
                }
            }

            if closed && !ring_edges.is_empty() {
                let mut coords = Vec::with_capacity(ring_edges.len() + 1);
                coords.push(self.nodes[self.half_edges[ring_edges[0]].src].coordinate);
                for &edge in &ring_edges {
                    coords.push(self.nodes[self.half_edges[edge].dst].coordinate);
                }
                rings.push(LineString::new(coords));
            }
        }

        rings
    }
}

/// CCW rings are region shells; CW rings become holes of the smallest shell
/// strictly containing them. The outermost CW ring matches no shell and is
/// dropped along with degenerate rings.
fn assemble_regions(rings: Vec<LineString<f64>>) -> Vec<Polygon<f64>> {
    let mut shells = Vec::new();
    let mut hole_rings = Vec::new();

    for ring in rings {
        let polygon = Polygon::new(ring, vec![]);
        let area = polygon.signed_area();
        if area.abs() < 1e-9 {
            continue;
        }
        if area > 0.0 {
            shells.push(polygon);
        } else {
            hole_rings.push(polygon);
        }
    }

    let mut holes_per_shell: Vec<Vec<LineString<f64>>> = vec![Vec::new(); shells.len()];
    for hole in hole_rings {
        let hole_area = hole.unsigned_area();
        let mut best: Option<(usize, f64)> = None;
        for (index, shell) in shells.iter().enumerate() {
            let shell_area = shell.unsigned_area();
            if shell_area > hole_area + 1e-6
                && shell.contains(&hole)
                && best.map(|(_, area)| shell_area < area).unwrap_or(true)
            {
                best = Some((index, shell_area));
            }
        }
        if let Some((index, _)) = best {
            holes_per_shell[index].push(hole.exterior().clone());
        }
    }

    shells
        .into_iter()
        .zip(holes_per_shell)
        .map(|(shell, holes)| Polygon::new(shell.exterior().clone(), holes))
        .collect()
}
