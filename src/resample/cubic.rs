//! Cubic convolution over a 4x4 neighbourhood (Keys, a = -0.5).

use ndarray::ArrayView2;

use super::is_valid;

fn keys_weight(t: f64) -> f64 {
    const A: f64 = -0.5;
    let t = t.abs();
    if t <= 1.0 {
        ((A + 2.0) * t - (A + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        ((A * t - 5.0 * A) * t + 8.0 * A) * t - 4.0 * A
    } else {
        0.0
    }
}

pub fn sample(src: &ArrayView2<'_, f64>, x: f64, y: f64, no_data: Option<f64>) -> Option<f64> {
    let cx = x - 0.5;
    let cy = y - 0.5;
    let ix = cx.floor();
    let iy = cy.floor();

    let (rows, cols) = src.dim();
    if ix < 1.0 || iy < 1.0 || ix + 2.0 >= cols as f64 || iy + 2.0 >= rows as f64 {
        return None;
    }
    let (dx, dy) = (cx - ix, cy - iy);
    let (c0, r0) = (ix as usize - 1, iy as usize - 1);

    let wx: [f64; 4] = std::array::from_fn(|i| keys_weight(dx - (i as f64 - 1.0)));
    let wy: [f64; 4] = std::array::from_fn(|j| keys_weight(dy - (j as f64 - 1.0)));

    let mut acc = 0.0;
    for (j, wyj) in wy.iter().enumerate() {
        for (i, wxi) in wx.iter().enumerate() {
            let v = src[(r0 + j, c0 + i)];
            if !is_valid(v, no_data) {
                return None;
            }
            acc += wxi * wyj * v;
        }
    }
    Some(acc)
}
