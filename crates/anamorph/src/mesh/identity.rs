//! Vertex identity groups: vertices that share one spatial position.
//!
//! Seam duplicates (UV seams, hard-edge splits) are separate indices at the
//! same point. Normal averaging and every optimizer mutation act on whole
//! groups so the duplicates never drift apart.
//!
//! Grouping is a sort-by-position pre-pass followed by a sweep over the sorted
//! order. A vertex joins the first open bucket whose representative lies within
//! `eps` in every coordinate; buckets close once the sweep has moved more than
//! `eps` past them along x. With `eps = 0` this is exact positional equality.

use nalgebra::Vector3;

/// Default grouping tolerance (max-abs metric).
pub const IDENTITY_EPS: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq)]
pub struct VertexIdentity {
    groups: Vec<Vec<usize>>,
    group_of: Vec<usize>,
}

impl VertexIdentity {
    /// Group `vertices` by position.
    ///
    /// Groups are ordered by their smallest member; members are ascending.
    pub fn build(vertices: &[Vector3<f64>], eps: f64) -> Self {
        let eps = eps.max(0.0);
        let mut order: Vec<usize> = (0..vertices.len()).collect();
        order.sort_by(|&a, &b| {
            let (p, q) = (vertices[a], vertices[b]);
            p.x.total_cmp(&q.x)
                .then(p.y.total_cmp(&q.y))
                .then(p.z.total_cmp(&q.z))
        });

        // (representative position, bucket index)
        let mut open: Vec<(Vector3<f64>, usize)> = Vec::new();
        let mut buckets: Vec<Vec<usize>> = Vec::new();
        for &i in &order {
            let p = vertices[i];
            open.retain(|(rep, _)| rep.x >= p.x - eps);
            let found = open
                .iter()
                .find(|(rep, _)| (rep - p).amax() <= eps)
                .map(|&(_, b)| b);
            match found {
                Some(b) => buckets[b].push(i),
                None => {
                    open.push((p, buckets.len()));
                    buckets.push(vec![i]);
                }
            }
        }

        for b in buckets.iter_mut() {
            b.sort_unstable();
        }
        buckets.sort_by_key(|b| b[0]);
        let mut group_of = vec![0; vertices.len()];
        for (g, members) in buckets.iter().enumerate() {
            for &i in members {
                group_of[i] = g;
            }
        }
        Self {
            groups: buckets,
            group_of,
        }
    }

    /// Identity group containing vertex `i` (includes `i`).
    #[inline]
    pub fn group_of(&self, i: usize) -> &[usize] {
        &self.groups[self.group_of[i]]
    }

    /// Index of the group containing vertex `i`.
    #[inline]
    pub fn group_id(&self, i: usize) -> usize {
        self.group_of[i]
    }

    #[inline]
    pub fn group(&self, g: usize) -> &[usize] {
        &self.groups[g]
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// Number of groups (logical points).
    #[inline]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of vertices covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.group_of.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.group_of.is_empty()
    }
}
