//! Coordinate normalization and site-join helpers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

// WGS84 ellipsoid, UTM zone 50N (EPSG:32650)
const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
pub const UTM_ZONE: u32 = 50;

fn strip_suffixes(raw: &str) -> String {
    raw.replace("°E", "")
        .replace('E', "")
        .replace("°N", "")
        .replace('N', "")
        .trim()
        .to_string()
}

/// Classifies an (easting, northing) string pair.
///
/// Both ≤180/≤90 are taken as decimal degrees (lon, lat) unchanged; both
/// >100000 are UTM 50N and reprojected; anything else is rejected.
pub fn parse_coord(easting: &str, northing: &str) -> Option<GeoPoint> {
    let e: f64 = strip_suffixes(easting).parse().ok()?;
    let n: f64 = strip_suffixes(northing).parse().ok()?;
    if !e.is_finite() || !n.is_finite() {
        return None;
    }
    if e <= 180.0 && n <= 90.0 {
        return Some(GeoPoint { lon: e, lat: n });
    }
    if e > 100_000.0 && n > 100_000.0 {
        return Some(utm_to_wgs84(e, n, UTM_ZONE));
    }
    None
}

/// Inverse transverse Mercator for a northern-hemisphere UTM zone.
pub fn utm_to_wgs84(easting: f64, northing: f64, zone: u32) -> GeoPoint {
    let e2 = F * (2.0 - F);
    let ep2 = e2 / (1.0 - e2);
    let x = easting - FALSE_EASTING;
    let m = northing / K0;
    let mu = m / (A * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2.powi(3) / 256.0));

    let sq = (1.0 - e2).sqrt();
    let e1 = (1.0 - sq) / (1.0 + sq);
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let (sin1, cos1) = phi1.sin_cos();
    let tan1 = phi1.tan();
    let n1 = A / (1.0 - e2 * sin1 * sin1).sqrt();
    let t1 = tan1 * tan1;
    let c1 = ep2 * cos1 * cos1;
    let r1 = A * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
    let d = x / (n1 * K0);

    let lat = phi1
        - (n1 * tan1 / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lon = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d.powi(5)
            / 120.0)
        / cos1;

    let lon0 = (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0;
    GeoPoint {
        lon: lon0 + lon.to_degrees(),
        lat: lat.to_degrees(),
    }
}

/// Last alphabetic word of the upper-cased company name
/// (`"PT. Bukit Makmur"` -> `"MAKMUR"`). Used to join sheets that spell
/// company names differently.
pub fn company_to_code(name: &str) -> String {
    let cleaned: String = name
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || *c == ' ')
        .collect();
    cleaned.split_whitespace().last().unwrap_or("").to_string()
}

pub const COLOR_LIST: [&str; 19] = [
    "red", "blue", "green", "purple", "orange",
    "darkred", "lightred", "beige", "darkblue", "darkgreen",
    "cadetblue", "darkpurple", "white", "pink", "lightblue",
    "lightgreen", "gray", "black", "lightgray",
];

/// Marker colour for `value` by its position in the sorted unique values.
pub fn assign_color(value: &str, unique_values: &[String]) -> &'static str {
    let idx = unique_values.iter().position(|v| v == value).unwrap_or(0);
    COLOR_LIST[idx % COLOR_LIST.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_degrees_pass_through() {
        let p = parse_coord("116.85°E", "-1.25").unwrap();
        assert_eq!(p, GeoPoint { lon: 116.85, lat: -1.25 });
        let p = parse_coord("117", "0.5N").unwrap();
        assert_eq!(p, GeoPoint { lon: 117.0, lat: 0.5 });
    }

    #[test]
    fn utm_pairs_are_reprojected() {
        let p = parse_coord("600000", "100001").unwrap();
        assert!((p.lon - 117.8987).abs() < 0.01, "lon={}", p.lon);
        assert!((p.lat - 0.9046).abs() < 0.01, "lat={}", p.lat);
    }

    #[test]
    fn central_meridian_maps_to_zone_center() {
        let p = utm_to_wgs84(500_000.0, 0.0, 50);
        assert!((p.lon - 117.0).abs() < 1e-9);
        assert!(p.lat.abs() < 1e-9);
    }

    #[test]
    fn mixed_or_garbage_inputs_are_rejected() {
        assert_eq!(parse_coord("500000", "45"), None);
        assert_eq!(parse_coord("200", "95"), None);
        assert_eq!(parse_coord("abc", "1"), None);
        assert_eq!(parse_coord("", ""), None);
        // thresholds are strict
        assert_eq!(parse_coord("600000", "100000"), None);
    }

    #[test]
    fn company_code_takes_last_word() {
        assert_eq!(company_to_code("PT. Bukit Makmur 2"), "MAKMUR");
        assert_eq!(company_to_code("pama"), "PAMA");
        assert_eq!(company_to_code("123"), "");
    }

    #[test]
    fn colors_cycle_through_palette() {
        let uniq: Vec<String> = (0..20).map(|i| format!("C{:02}", i)).collect();
        assert_eq!(assign_color("C00", &uniq), "red");
        assert_eq!(assign_color("C19", &uniq), "red");
        assert_eq!(assign_color("C01", &uniq), "blue");
    }
}
