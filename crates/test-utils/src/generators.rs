//! Synthetic grids with predictable values.

/// Offset between layers in [`create_layer_grid`].
pub const LAYER_OFFSET: f32 = 1_000_000.0;

/// Grid where each cell is `col * 1000 + row`.
///
/// Row-major, row 0 first.
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0); // col=1, row=0
/// assert_eq!(grid[10], 1.0);   // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push(grid_value(col, row));
        }
    }
    data
}

/// Value [`create_test_grid`] stores at `(col, row)`.
pub fn grid_value(col: usize, row: usize) -> f32 {
    (col * 1000 + row) as f32
}

/// Test grid shifted by `layer * LAYER_OFFSET`, one per image or band.
pub fn create_layer_grid(width: usize, height: usize, layer: usize) -> Vec<f32> {
    let offset = layer as f32 * LAYER_OFFSET;
    create_test_grid(width, height)
        .into_iter()
        .map(|v| v + offset)
        .collect()
}

/// Grid filled with a single value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Test grid where every cell in columns `[from_col, to_col)` holds `fill`.
pub fn create_grid_with_gap(
    width: usize,
    height: usize,
    from_col: usize,
    to_col: usize,
    fill: f32,
) -> Vec<f32> {
    let mut data = create_test_grid(width, height);
    for row in 0..height {
        for col in from_col.min(width)..to_col.min(width) {
            data[row * width + col] = fill;
        }
    }
    data
}
