//! Line grammar for polygon annotation files.
//!
//! Each region is one line:
//!
//! ```text
//! Tumor [Point: 12.5, 40, Point: 90, 40, Point: 90, 120]
//! ```
//!
//! The label is everything before the first `[`. Vertices are read by
//! scanning the line for signed decimal numbers and pairing them up.

use std::sync::LazyLock;

use geo::Coord;
use regex::Regex;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+\.?\d*").expect("number pattern is valid"));

/// Label of an annotation line, trimmed. Empty when the line has no label.
pub fn parse_label(line: &str) -> &str {
    line.split('[').next().unwrap_or_default().trim()
}

/// Vertices of an annotation line, each shifted by `offset` on both axes.
///
/// A trailing unpaired number is ignored.
pub fn parse_vertices(line: &str, offset: f64) -> Vec<Coord<f64>> {
    let numbers: Vec<f64> = NUMBER
        .find_iter(line)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();

    numbers
        .chunks_exact(2)
        .map(|xy| Coord {
            x: xy[0] + offset,
            y: xy[1] + offset,
        })
        .collect()
}

/// Render a ring as an annotation line.
pub fn format_region_line(label: &str, vertices: &[Coord<f64>]) -> String {
    let points: Vec<String> = vertices
        .iter()
        .map(|c| format!("Point: {}, {}", c.x, c.y))
        .collect();
    format!("{} [{}]", label, points.join(", "))
}
