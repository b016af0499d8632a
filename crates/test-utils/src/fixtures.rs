//! Common fixtures for dataset tests.
//!
//! Keys are given as `(dimension, identifier)` pairs so this crate stays
//! independent of the types it is used to test.

/// Content types exercised across the test suite.
pub mod content_types {
    pub const PNG: &str = "image/png";
    pub const TIFF: &str = "image/tiff";
    pub const JSON: &str = "application/json";
    pub const TEXT: &str = "text/plain";
    pub const BINARY: &str = "application/octet-stream";
}

/// Dimension names used by the tile-pyramid fixtures.
pub mod dimensions {
    pub const ZOOM: &str = "ZOOM";
    pub const ROW: &str = "ROW";
    pub const COL: &str = "COL";
    pub const NAME: &str = "NAME";
    pub const BAND: &str = "BAND";
}

/// Key pairs for a small tile pyramid.
pub mod keys {
    use super::dimensions::{COL, NAME, ROW, ZOOM};

    pub const ROOT_TILE: &[(&str, &str)] = &[(ZOOM, "0"), (ROW, "0"), (COL, "0")];

    pub const NAMED_LAYER: &[(&str, &str)] = &[(NAME, "coastline")];

    /// Every tile of zoom levels 0 and 1.
    pub fn pyramid() -> Vec<Vec<(String, String)>> {
        let mut tiles = Vec::new();
        for zoom in 0..2u32 {
            let side = 1u32 << zoom;
            for row in 0..side {
                for col in 0..side {
                    tiles.push(vec![
                        (ZOOM.to_string(), zoom.to_string()),
                        (ROW.to_string(), row.to_string()),
                        (COL.to_string(), col.to_string()),
                    ]);
                }
            }
        }
        tiles
    }
}

/// Floating values whose text form must round trip to 15 significant digits.
pub mod numbers {
    pub const DOUBLES: &[f64] = &[
        4546.789,
        3.14159,
        -0.5,
        1.0e20,
        1.5e-7,
        0.1,
        123456789.0123456,
        f64::MAX,
        f64::MIN_POSITIVE,
    ];

    pub const FLOATS: &[f32] = &[3.14159, 0.1, -2.5e-3, 16777216.0, f32::MAX];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pyramid_size() {
        // 1 tile at zoom 0, 4 at zoom 1
        assert_eq!(keys::pyramid().len(), 5);
        assert!(keys::pyramid().iter().all(|k| k.len() == 3));
    }
}
