use ndarray::ArrayView2;

use super::is_valid;

/// Bilinear interpolation between the four pixel centres around (x, y).
pub fn sample(src: &ArrayView2<'_, f64>, x: f64, y: f64, no_data: Option<f64>) -> Option<f64> {
    // centre-based coordinates
    let cx = x - 0.5;
    let cy = y - 0.5;
    let x0 = cx.floor();
    let y0 = cy.floor();

    let (rows, cols) = src.dim();
    if x0 < 0.0 || y0 < 0.0 || x0 + 1.0 >= cols as f64 || y0 + 1.0 >= rows as f64 {
        // exactly on the last centre there is nothing to blend with
        let on_centre = cx == x0 && cy == y0;
        return if on_centre {
            super::nearest::sample(src, x, y, no_data)
        } else {
            None
        };
    }
    let (c, r) = (x0 as usize, y0 as usize);
    let quad = [src[(r, c)], src[(r, c + 1)], src[(r + 1, c)], src[(r + 1, c + 1)]];
    if !quad.iter().all(|&v| is_valid(v, no_data)) {
        return None;
    }

    let dx = cx - x0;
    let dy = cy - y0;
    let top = quad[0] * (1.0 - dx) + quad[1] * dx;
    let bottom = quad[2] * (1.0 - dx) + quad[3] * dx;
    Some(top * (1.0 - dy) + bottom * dy)
}
