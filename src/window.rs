use std::collections::VecDeque;

/// Fixed-capacity rolling window over recent power samples.
///
/// Insertion order is time order. At capacity the oldest value is evicted,
/// so the window always holds the last `min(count, capacity)` samples.
/// Single owner, mutated only through `record`; no locking needed.
#[derive(Debug)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    /// `capacity` is clamped to at least 1; a zero-size window would make
    /// every average undefined.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { values: VecDeque::with_capacity(capacity), capacity }
    }

    /// Append one sample value, evicting the oldest when full. O(1) amortized.
    pub fn record(&mut self, power_mw: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(power_mw);
    }

    /// Arithmetic mean of the current contents. An empty window averages to
    /// 0.0, the defined startup state, not an error.
    pub fn average(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_averages_to_zero() {
        let window = RollingWindow::new(60);
        assert_eq!(window.average(), 0.0);
        assert!(window.is_empty());
    }

    #[test]
    fn average_tracks_true_mean_while_filling() {
        let mut window = RollingWindow::new(4);
        let inputs = [10.0, 20.0, 60.0];
        let mut recorded: Vec<f64> = Vec::new();

        for v in inputs {
            window.record(v);
            recorded.push(v);
            let expected = recorded.iter().sum::<f64>() / recorded.len() as f64;
            assert!((window.average() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn overflow_evicts_oldest_fifo() {
        let mut window = RollingWindow::new(2);
        window.record(10.0);
        window.record(20.0);
        window.record(30.0);

        assert_eq!(window.len(), 2);
        assert!((window.average() - 25.0).abs() < 1e-9, "expected (20+30)/2");
    }

    #[test]
    fn average_over_last_n_for_long_sequences() {
        let n = 5;
        let mut window = RollingWindow::new(n);
        let values: Vec<f64> = (1..=100).map(|i| i as f64 * 3.5).collect();

        for (i, &v) in values.iter().enumerate() {
            window.record(v);
            let start = (i + 1).saturating_sub(n);
            let tail = &values[start..=i];
            let expected = tail.iter().sum::<f64>() / tail.len() as f64;
            assert!(
                (window.average() - expected).abs() < 1e-9,
                "mismatch after {} records",
                i + 1
            );
        }
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut window = RollingWindow::new(0);
        window.record(42.0);
        window.record(7.0);
        assert_eq!(window.len(), 1);
        assert!((window.average() - 7.0).abs() < 1e-9);
    }
}
