use ndarray::ArrayView2;

use super::is_valid;

/// Value of the pixel containing (x, y).
pub fn sample(src: &ArrayView2<'_, f64>, x: f64, y: f64, no_data: Option<f64>) -> Option<f64> {
    let col = x.floor();
    let row = y.floor();
    let (rows, cols) = src.dim();
    if col < 0.0 || row < 0.0 || col >= cols as f64 || row >= rows as f64 {
        return None;
    }
    let v = src[(row as usize, col as usize)];
    is_valid(v, no_data).then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_pixel_extent() {
        let arr = array![[1.0, 2.0], [3.0, 4.0]];
        let view = arr.view();
        assert_eq!(sample(&view, 0.0, 0.0, None), Some(1.0));
        assert_eq!(sample(&view, 0.99, 0.5, None), Some(1.0));
        assert_eq!(sample(&view, 1.5, 0.5, None), Some(2.0));
        assert_eq!(sample(&view, 1.5, 1.5, None), Some(4.0));
    }

    #[test]
    fn test_outside() {
        let arr = array![[1.0, 2.0], [3.0, 4.0]];
        let view = arr.view();
        assert_eq!(sample(&view, -0.01, 0.5, None), None);
        assert_eq!(sample(&view, 0.5, 2.0, None), None);
    }

    #[test]
    fn test_invalid_values() {
        let arr = array![[-9999.0, f64::NAN], [3.0, 4.0]];
        let view = arr.view();
        assert_eq!(sample(&view, 0.5, 0.5, Some(-9999.0)), None);
        assert_eq!(sample(&view, 0.5, 0.5, None), Some(-9999.0));
        assert_eq!(sample(&view, 1.5, 0.5, None), None);
    }
}
