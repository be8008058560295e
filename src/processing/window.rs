//! Slices a PreprocessedSeries into overlapping fixed-length windows.
//! Batch layout is channel-major: [windows, channels, window_length].

use ndarray::{Array3, ArrayView3, s};

use super::preprocess::PreprocessedSeries;

#[derive(Debug, Clone, PartialEq)]
pub struct WindowBatch {
    data: Array3<f64>,
}

impl WindowBatch {
    pub fn from_array(data: Array3<f64>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channels(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn window_length(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.len(), self.channels(), self.window_length()]
    }

    pub fn view(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }
}

/// `floor((rows - window_length) / stride) + 1`, or 0 when the series is shorter than a window.
pub fn window_count(rows: usize, window_length: usize, stride: usize) -> usize {
    if rows < window_length || window_length == 0 || stride == 0 {
        return 0;
    }
    (rows - window_length) / stride + 1
}

pub fn create_windows(series: &PreprocessedSeries, window_length: usize, stride: usize) -> WindowBatch {
    let view = series.view();
    let count = window_count(series.rows(), window_length, stride);
    let mut data = Array3::<f64>::zeros((count, series.channels(), window_length));

    for w in 0..count {
        let start = w * stride;
        let window = view.slice(s![start..start + window_length, ..]);
        data.slice_mut(s![w, .., ..]).assign(&window.t());
    }

    WindowBatch { data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn indexed_series(rows: usize) -> PreprocessedSeries {
        let data = Array2::from_shape_fn((rows, 6), |(t, c)| (t * 10 + c) as f64);
        PreprocessedSeries::from_array(data).unwrap()
    }

    #[test]
    fn count_follows_stride_formula() {
        assert_eq!(window_count(110, 100, 10), 2);
        assert_eq!(window_count(100, 100, 10), 1);
        assert_eq!(window_count(99, 100, 10), 0);
        assert_eq!(window_count(125, 20, 7), 16);
    }

    #[test]
    fn windows_are_channel_major_and_strided() {
        let batch = create_windows(&indexed_series(110), 100, 10);
        assert_eq!(batch.shape(), [2, 6, 100]);

        let v = batch.view();
        assert_eq!(v[[0, 0, 0]], 0.0);
        assert_eq!(v[[0, 3, 5]], 53.0);
        // Second window starts one stride later.
        assert_eq!(v[[1, 2, 0]], 102.0);
        assert_eq!(v[[1, 5, 99]], 1095.0);
    }
}
