/// Iso-line extraction with marching squares
///
/// Works in fractional grid coordinates `(row, col)`; callers map the
/// resulting polylines to physical units with `Grid::to_physical`.

use std::collections::{HashMap, VecDeque};

use crate::data::grid::Grid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub row: f64,
    pub col: f64,
}

impl GridPoint {
    fn near(&self, other: &GridPoint) -> bool {
        (self.row - other.row).abs() < EPS && (self.col - other.col).abs() < EPS
    }
}

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: GridPoint,
    pub end: GridPoint,
}

/// Connected iso-line at one level
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub level: f64,
    pub points: Vec<GridPoint>,
    pub closed: bool,
}

/// Segments of the `level` iso-line across all grid cells.
pub fn march_squares(grid: &Grid, level: f64) -> Vec<Segment> {
    if grid.rows < 2 || grid.cols < 2 || grid.values.len() != grid.rows * grid.cols {
        return Vec::new();
    }
    let mut segments = Vec::new();
    for r in 0..grid.rows - 1 {
        for c in 0..grid.cols - 1 {
            let tl = grid.get(r, c);
            let tr = grid.get(r, c + 1);
            let br = grid.get(r + 1, c + 1);
            let bl = grid.get(r + 1, c);
            if [tl, tr, br, bl].iter().any(|v| v.is_nan()) {
                continue;
            }
            let case = (tl >= level) as u8
                | ((tr >= level) as u8) << 1
                | ((br >= level) as u8) << 2
                | ((bl >= level) as u8) << 3;
            cell_segments(case, r as f64, c as f64, [tl, tr, br, bl], level, &mut segments);
        }
    }
    segments
}

fn cell_segments(
    case: u8,
    r: f64,
    c: f64,
    [tl, tr, br, bl]: [f64; 4],
    level: f64,
    out: &mut Vec<Segment>,
) {
    let top = || crossing((r, c), (r, c + 1.0), tl, tr, level);
    let right = || crossing((r, c + 1.0), (r + 1.0, c + 1.0), tr, br, level);
    let bottom = || crossing((r + 1.0, c), (r + 1.0, c + 1.0), bl, br, level);
    let left = || crossing((r, c), (r + 1.0, c), tl, bl, level);
    let mut push = |start: GridPoint, end: GridPoint| out.push(Segment { start, end });

    match case {
        0 | 15 => {}
        1 | 14 => push(left(), top()),
        2 | 13 => push(top(), right()),
        3 | 12 => push(left(), right()),
        4 | 11 => push(right(), bottom()),
        6 | 9 => push(top(), bottom()),
        7 | 8 => push(left(), bottom()),
        // saddles: resolve with the cell-center average
        5 | 10 => {
            let center_high = (tl + tr + br + bl) / 4.0 >= level;
            if (case == 5) == center_high {
                push(left(), bottom());
                push(top(), right());
            } else {
                push(left(), top());
                push(right(), bottom());
            }
        }
        _ => {}
    }
}

fn crossing(a: (f64, f64), b: (f64, f64), va: f64, vb: f64, level: f64) -> GridPoint {
    let t = if (vb - va).abs() < f64::EPSILON {
        0.5
    } else {
        ((level - va) / (vb - va)).clamp(0.0, 1.0)
    };
    GridPoint {
        row: a.0 + t * (b.0 - a.0),
        col: a.1 + t * (b.1 - a.1),
    }
}

/// Grid-snapped endpoint key. Adjacent cells compute a shared edge
/// crossing from the same inputs, so shared endpoints are bit-identical.
fn endpoint_key(p: &GridPoint) -> (i64, i64) {
    ((p.row / EPS).round() as i64, (p.col / EPS).round() as i64)
}

/// Join unordered segments into polylines, growing each chain at both ends.
pub fn connect_segments(segments: &[Segment], level: f64) -> Vec<Polyline> {
    let mut ends: HashMap<(i64, i64), Vec<usize>> = HashMap::with_capacity(segments.len() * 2);
    for (i, s) in segments.iter().enumerate() {
        ends.entry(endpoint_key(&s.start)).or_default().push(i);
        ends.entry(endpoint_key(&s.end)).or_default().push(i);
    }
    // unused segment touching `p`, with its far endpoint
    let neighbor = |p: &GridPoint, used: &[bool]| -> Option<(usize, GridPoint)> {
        ends.get(&endpoint_key(p))?
            .iter()
            .copied()
            .filter(|&i| !used[i])
            .find_map(|i| {
                let s = &segments[i];
                if s.start.near(p) {
                    Some((i, s.end))
                } else if s.end.near(p) {
                    Some((i, s.start))
                } else {
                    None
                }
            })
    };

    let mut used = vec![false; segments.len()];
    let mut lines = Vec::new();

    for first in 0..segments.len() {
        if used[first] {
            continue;
        }
        used[first] = true;
        let mut points = VecDeque::from([segments[first].start, segments[first].end]);

        loop {
            let (Some(&head), Some(&tail)) = (points.front(), points.back()) else {
                break;
            };
            if let Some((i, p)) = neighbor(&tail, &used) {
                used[i] = true;
                points.push_back(p);
            } else if let Some((i, p)) = neighbor(&head, &used) {
                used[i] = true;
                points.push_front(p);
            } else {
                break;
            }
        }

        let closed = points.len() > 2
            && matches!((points.front(), points.back()), (Some(a), Some(b)) if a.near(b));
        lines.push(Polyline {
            level,
            points: points.into_iter().collect(),
            closed,
        });
    }
    lines
}

/// All polylines for every level, in level order.
pub fn contour_lines(grid: &Grid, levels: &[f64]) -> Vec<Polyline> {
    levels
        .iter()
        .flat_map(|&level| connect_segments(&march_squares(grid, level), level))
        .collect()
}
