//! Unit normalization from user units to the application's internal units

/// Millimeters to meters
pub fn mm_to_m(mm: f64) -> f64 {
    positive_zero(mm / 1000.0)
}

/// Degrees to radians
pub fn deg_to_rad(deg: f64) -> f64 {
    positive_zero(deg.to_radians())
}

/// Collapse `-0.0` so it never renders as `-0`
pub fn positive_zero(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}
