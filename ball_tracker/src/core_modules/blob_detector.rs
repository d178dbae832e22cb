// THEORY:
// The `blob_detector` is the spatial grouping layer of the detector. It turns a
// picture into a small list of candidate objects and fits a circle to one of
// them. It is a stateless utility; nothing here remembers earlier frames.
//
// Algorithm steps:
// 1.  **Binarization**: convert to 8-bit luma and keep only pixels strictly
//     brighter than a fixed cutoff. The ball is rendered pure white on black,
//     so a high cutoff isolates it from any compression or blending fringe.
// 2.  **Region Growing**: every unvisited foreground pixel seeds a flood fill
//     over its 8-connected neighbours. Seeds are found in raster order, which
//     fixes the order blobs are reported in.
// 3.  **Data Aggregation**: while growing, each blob records its pixel area,
//     bounding box and the leftmost/rightmost pixel of every row it spans.
//     Those row extremes contain the blob's convex hull, which is all a
//     minimum enclosing circle depends on.
// 4.  **Circle Fitting**: hull of the outline points, then the incremental
//     Welzl construction over the hull.

use image::RgbImage;

/// A 2D pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Foreground/background mask of a frame, row-major.
pub struct BinaryMask {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<bool>,
}

impl BinaryMask {
    fn get(&self, x: i32, y: i32) -> bool {
        x >= 0
            && y >= 0
            && (x as u32) < self.width
            && (y as u32) < self.height
            && self.pixels[(y as u32 * self.width + x as u32) as usize]
    }

    pub fn count(&self) -> usize {
        self.pixels.iter().filter(|p| **p).count()
    }
}

/// One 8-connected foreground region of a single frame.
#[derive(Debug, Clone)]
pub struct Blob {
    /// Position in extraction order for this frame only. Not persistent.
    pub id: u64,
    /// Number of foreground pixels in the region.
    pub area: usize,
    /// Top-left and bottom-right pixel of the region.
    pub bounding_box: (Point, Point),
    /// Leftmost and rightmost pixel of each row the region covers.
    pub outline: Vec<Point>,
}

/// A fitted circle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: (f64, f64),
    pub radius: f64,
}

const CONTAINS_EPSILON: f64 = 1e-7;

impl Circle {
    fn contains(&self, p: (f64, f64)) -> bool {
        let dx = p.0 - self.center.0;
        let dy = p.1 - self.center.1;
        (dx * dx + dy * dy).sqrt() <= self.radius + CONTAINS_EPSILON
    }
}

/// Grayscale conversion followed by a fixed binary threshold.
pub fn binarize(image: &RgbImage, threshold: u8) -> BinaryMask {
    let gray = image::imageops::grayscale(image);
    BinaryMask {
        width: gray.width(),
        height: gray.height(),
        pixels: gray.pixels().map(|p| p.0[0] > threshold).collect(),
    }
}

/// Finds every connected foreground region, in raster order of their first pixel.
pub fn find_blobs(mask: &BinaryMask) -> Vec<Blob> {
    let mut visited = vec![false; mask.pixels.len()];
    let mut blobs = Vec::new();
    let mut blob_id_counter = 0;

    for y in 0..mask.height as i32 {
        for x in 0..mask.width as i32 {
            let index = (y as u32 * mask.width + x as u32) as usize;
            if visited[index] || !mask.pixels[index] {
                continue;
            }
            blobs.push(grow_blob(mask, &mut visited, Point { x, y }, blob_id_counter));
            blob_id_counter += 1;
        }
    }

    blobs
}

/// Flood fill from `seed`, collecting the blob's aggregate properties.
fn grow_blob(mask: &BinaryMask, visited: &mut [bool], seed: Point, blob_id: u64) -> Blob {
    let width = mask.width;
    let mut stack = vec![seed];
    visited[(seed.y as u32 * width + seed.x as u32) as usize] = true;

    let (mut min_x, mut min_y) = (seed.x, seed.y);
    let (mut max_x, mut max_y) = (seed.x, seed.y);
    let mut area = 0usize;
    // Row extremes keyed by offset from the seed row; a flood fill started
    // at the first raster pixel never goes above it.
    let mut rows: Vec<Option<(i32, i32)>> = Vec::new();

    while let Some(current) = stack.pop() {
        area += 1;
        min_x = min_x.min(current.x);
        max_x = max_x.max(current.x);
        min_y = min_y.min(current.y);
        max_y = max_y.max(current.y);

        let row = (current.y - seed.y) as usize;
        if rows.len() <= row {
            rows.resize(row + 1, None);
        }
        rows[row] = Some(match rows[row] {
            Some((lo, hi)) => (lo.min(current.x), hi.max(current.x)),
            None => (current.x, current.x),
        });

        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = current.x + dx;
                let ny = current.y + dy;
                if !mask.get(nx, ny) {
                    continue;
                }
                let n_index = (ny as u32 * width + nx as u32) as usize;
                if !visited[n_index] {
                    visited[n_index] = true;
                    stack.push(Point { x: nx, y: ny });
                }
            }
        }
    }

    let mut outline = Vec::with_capacity(rows.len() * 2);
    for (offset, extremes) in rows.into_iter().enumerate() {
        if let Some((lo, hi)) = extremes {
            let y = seed.y + offset as i32;
            outline.push(Point { x: lo, y });
            if hi != lo {
                outline.push(Point { x: hi, y });
            }
        }
    }

    Blob {
        id: blob_id,
        area,
        bounding_box: (Point { x: min_x, y: min_y }, Point { x: max_x, y: max_y }),
        outline,
    }
}

/// The blob with the greatest area. On equal areas the earlier blob wins.
pub fn largest_blob(blobs: &[Blob]) -> Option<&Blob> {
    blobs.iter().fold(None, |best: Option<&Blob>, blob| match best {
        Some(b) if b.area >= blob.area => Some(b),
        _ => Some(blob),
    })
}

/// Andrew's monotone chain. Collinear points are dropped.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts: Vec<Point> = points.to_vec();
    pts.sort_by(|a, b| (a.x, a.y).cmp(&(b.x, b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    fn cross(o: Point, a: Point, b: Point) -> i64 {
        (a.x - o.x) as i64 * (b.y - o.y) as i64 - (a.y - o.y) as i64 * (b.x - o.x) as i64
    }

    let mut hull: Vec<Point> = Vec::with_capacity(pts.len() * 2);
    for &p in pts.iter() {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// Smallest circle containing every point. Returns `None` for no points.
pub fn min_enclosing_circle(points: &[Point]) -> Option<Circle> {
    let hull = convex_hull(points);
    let first = hull.first()?;

    // Work relative to the first point to keep the circumcentre maths exact.
    let origin = (first.x as f64, first.y as f64);
    let pts: Vec<(f64, f64)> = hull
        .iter()
        .map(|p| (p.x as f64 - origin.0, p.y as f64 - origin.1))
        .collect();

    let mut circle = Circle {
        center: pts[0],
        radius: 0.0,
    };
    for i in 1..pts.len() {
        if circle.contains(pts[i]) {
            continue;
        }
        circle = Circle {
            center: pts[i],
            radius: 0.0,
        };
        for j in 0..i {
            if circle.contains(pts[j]) {
                continue;
            }
            circle = circle_from_two(pts[i], pts[j]);
            for k in 0..j {
                if !circle.contains(pts[k]) {
                    circle = circle_from_three(pts[i], pts[j], pts[k]);
                }
            }
        }
    }

    Some(Circle {
        center: (circle.center.0 + origin.0, circle.center.1 + origin.1),
        radius: circle.radius,
    })
}

fn circle_from_two(a: (f64, f64), b: (f64, f64)) -> Circle {
    let center = ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
    let radius = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt() / 2.0;
    Circle { center, radius }
}

fn circle_from_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Circle {
    let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
    if d.abs() < f64::EPSILON {
        // Collinear: the widest pair spans the other point.
        return [circle_from_two(a, b), circle_from_two(a, c), circle_from_two(b, c)]
            .into_iter()
            .fold(circle_from_two(a, b), |widest, candidate| {
                if candidate.radius > widest.radius { candidate } else { widest }
            });
    }
    let a_sq = a.0 * a.0 + a.1 * a.1;
    let b_sq = b.0 * b.0 + b.1 * b.1;
    let c_sq = c.0 * c.0 + c.1 * c.1;
    let ux = (a_sq * (b.1 - c.1) + b_sq * (c.1 - a.1) + c_sq * (a.1 - b.1)) / d;
    let uy = (a_sq * (c.0 - b.0) + b_sq * (a.0 - c.0) + c_sq * (b.0 - a.0)) / d;
    let radius = ((a.0 - ux).powi(2) + (a.1 - uy).powi(2)).sqrt();
    Circle {
        center: (ux, uy),
        radius,
    }
}
