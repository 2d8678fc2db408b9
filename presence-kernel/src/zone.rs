//! Point-in-quadrilateral tests for the user zones.
//!
//! Ray casting to the right in integer arithmetic. Points lying on an edge
//! count as inside. Vertex order is taken as given, so concave and
//! self-intersecting quads evaluate by parity without being rejected.

use crate::models::{Point, Zone};

/// True if `p` is collinear with `a`-`b` and inside the segment's bounding box.
fn on_segment(p: Point, a: Point, b: Point) -> bool {
    let (px, py) = (i64::from(p.x_mm), i64::from(p.y_mm));
    let (ax, ay) = (i64::from(a.x_mm), i64::from(a.y_mm));
    let (bx, by) = (i64::from(b.x_mm), i64::from(b.y_mm));

    let cross = (py - ay) * (bx - ax) - (px - ax) * (by - ay);
    if cross != 0 {
        return false;
    }
    px >= ax.min(bx) && px <= ax.max(bx) && py >= ay.min(by) && py <= ay.max(by)
}

pub fn contains(zone: &Zone, p: Point) -> bool {
    if !zone.enabled {
        return false;
    }

    let v = &zone.vertices;
    let mut inside = false;
    let mut j = v.len() - 1;
    for i in 0..v.len() {
        let (a, b) = (v[j], v[i]);
        j = i;

        if on_segment(p, a, b) {
            return true;
        }
        if (a.y_mm > p.y_mm) == (b.y_mm > p.y_mm) {
            continue;
        }
        let dy = i64::from(b.y_mm) - i64::from(a.y_mm);
        let num = (i64::from(p.y_mm) - i64::from(a.y_mm)) * (i64::from(b.x_mm) - i64::from(a.x_mm));
        // Truncating division, like the sensor firmware's integer math.
        let x_int = i64::from(a.x_mm) + num / dy;
        if x_int >= i64::from(p.x_mm) {
            inside = !inside;
        }
    }
    inside
}

/// Bitmap of zones containing at least one of `points` (bit i = zone i).
pub fn evaluate<'a>(zones: &[Zone], points: impl IntoIterator<Item = &'a Point> + Clone) -> u8 {
    zones
        .iter()
        .enumerate()
        .take(8)
        .filter(|(_, zone)| points.clone().into_iter().any(|p| contains(zone, *p)))
        .fold(0u8, |bits, (i, _)| bits | (1 << i))
}
