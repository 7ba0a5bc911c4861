//! Fixtures shared by the coverage crates' tests.
//!
//! The grid generators write values that encode each pixel's position and
//! layer, so a test can tell which source pixel landed in which output
//! pixel. `assert_close!` compares raster samples, where NaN marks no-data.

pub mod generators;

pub use generators::*;

/// Assert two samples differ by at most `tolerance`.
///
/// Both sides NaN counts as equal, one side NaN does not.
///
/// ```ignore
/// use test_utils::assert_close;
///
/// assert_close!(raster.grid_to_world.scale_x(), 0.1, 1e-9);
/// assert_close!(f32::NAN, f32::NAN, 0.0);
/// ```
#[macro_export]
macro_rules! assert_close {
    ($actual:expr, $wanted:expr, $tolerance:expr $(,)?) => {{
        let actual = $actual as f64;
        let wanted = $wanted as f64;
        let tolerance = $tolerance as f64;
        let missing_differs = actual.is_nan() != wanted.is_nan();
        if missing_differs || (actual - wanted).abs() > tolerance {
            panic!(
                "samples differ: {} is not within {} of {}",
                actual, tolerance, wanted
            );
        }
    }};
}
