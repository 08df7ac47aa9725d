//! Streaming statistics over sequences of samples.
//!
//! Posterior sample sequences can be arbitrarily long, so the aggregators in
//! this module never retain past elements: [`StreamingMean`] keeps a running
//! sum and a count, [`RunningMoments`] keeps Welford's running mean and sum
//! of squared deviations.

use crate::types::DVector;
use std::ops::{AddAssign, Div};

/// Iterator adaptor yielding the running arithmetic mean of its input.
///
/// After consuming the k-th input element it yields the mean of the first k
/// elements. The only state besides the inner iterator is the running sum and
/// the element count.
#[derive(Debug, Clone)]
pub struct StreamingMean<I, T> {
    inner: I,
    total: Option<T>,
    count: usize,
}

impl<I, T> StreamingMean<I, T> {
    /// Number of elements consumed so far.
    pub fn consumed(&self) -> usize {
        self.count
    }
}

impl<I, T> Iterator for StreamingMean<I, T>
where
    I: Iterator<Item = T>,
    T: Clone + for<'a> AddAssign<&'a T> + Div<f64, Output = T>,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let value = self.inner.next()?;
        self.count += 1;
        let total = match self.total.take() {
            Some(mut total) => {
                total += &value;
                total
            }
            None => value,
        };
        let mean = total.clone() / self.count as f64;
        self.total = Some(total);
        Some(mean)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Wraps `values` so that each step yields the mean of everything seen so far.
///
/// Works for any value type supporting in-place addition and division by a
/// scalar: `f64`, `DVector<f64>` and `DMatrix<f64>` all qualify.
///
/// ```
/// use bpmf_core::stats::streaming_mean;
///
/// let means: Vec<f64> = streaming_mean(vec![1.0, 3.0, 5.0]).collect();
/// assert_eq!(means, vec![1.0, 2.0, 3.0]);
/// ```
pub fn streaming_mean<I, T>(values: I) -> StreamingMean<I::IntoIter, T>
where
    I: IntoIterator<Item = T>,
    T: Clone + for<'a> AddAssign<&'a T> + Div<f64, Output = T>,
{
    StreamingMean {
        inner: values.into_iter(),
        total: None,
        count: 0,
    }
}

/// Consumes `values` and returns their mean, or `None` for an empty input.
pub fn mean_of<I, T>(values: I) -> Option<T>
where
    I: IntoIterator<Item = T>,
    T: for<'a> AddAssign<&'a T> + Div<f64, Output = T>,
{
    let mut iter = values.into_iter();
    let mut total = iter.next()?;
    let mut count = 1usize;
    for value in iter {
        total += &value;
        count += 1;
    }
    Some(total / count as f64)
}

/// Element-wise running mean and variance (Welford's algorithm).
///
/// Every pushed observation must have the same length as the first one.
#[derive(Debug, Clone)]
pub struct RunningMoments {
    count: usize,
    mean: DVector<f64>,
    m2: DVector<f64>,
}

impl RunningMoments {
    /// Creates an accumulator for observations of length `len`.
    pub fn new(len: usize) -> Self {
        Self {
            count: 0,
            mean: DVector::zeros(len),
            m2: DVector::zeros(len),
        }
    }

    /// Length of each observation.
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    /// True if observations have zero length.
    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Number of observations pushed so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Adds one observation.
    ///
    /// # Panics
    ///
    /// Panics if `x` does not have length [`len`](Self::len).
    pub fn push(&mut self, x: &DVector<f64>) {
        assert_eq!(x.len(), self.mean.len(), "observation length changed");
        self.count += 1;
        let n = self.count as f64;
        for k in 0..x.len() {
            let delta = x[k] - self.mean[k];
            self.mean[k] += delta / n;
            self.m2[k] += delta * (x[k] - self.mean[k]);
        }
    }

    /// Running mean, or `None` before the first observation.
    pub fn mean(&self) -> Option<&DVector<f64>> {
        (self.count > 0).then_some(&self.mean)
    }

    /// Population variance (divisor `n`), or `None` before the first observation.
    pub fn variance(&self) -> Option<DVector<f64>> {
        (self.count > 0).then(|| &self.m2 / self.count as f64)
    }

    /// Sample variance (divisor `n - 1`), or `None` with fewer than two observations.
    pub fn sample_variance(&self) -> Option<DVector<f64>> {
        (self.count > 1).then(|| &self.m2 / (self.count - 1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DMatrix;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_streaming_mean_scalars() {
        let means: Vec<f64> = streaming_mean(vec![2.0, 4.0, 6.0, 8.0]).collect();
        assert_eq!(means, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_streaming_mean_matrices() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = DMatrix::from_row_slice(2, 2, &[3.0, 2.0, 1.0, 0.0]);
        let last = streaming_mean(vec![a, b]).last().unwrap();
        assert_relative_eq!(last, DMatrix::from_element(2, 2, 2.0));
    }

    #[test]
    fn test_streaming_mean_is_lazy() {
        // An unbounded input only produces what is asked for.
        let mut means = streaming_mean((1..).map(|k| k as f64));
        assert_eq!(means.next(), Some(1.0));
        assert_eq!(means.next(), Some(1.5));
        assert_eq!(means.nth(7), Some(5.5));
        assert_eq!(means.consumed(), 10);
    }

    #[test]
    fn test_mean_of() {
        assert_eq!(mean_of(Vec::<f64>::new()), None);
        assert_eq!(mean_of(vec![1.0, 2.0, 6.0]), Some(3.0));
    }

    #[test]
    fn test_running_moments_matches_two_pass() {
        let data = [
            DVector::from_vec(vec![1.0, 10.0]),
            DVector::from_vec(vec![2.0, 20.0]),
            DVector::from_vec(vec![4.0, 5.0]),
            DVector::from_vec(vec![7.0, -3.0]),
        ];
        let mut moments = RunningMoments::new(2);
        for x in &data {
            moments.push(x);
        }

        let n = data.len() as f64;
        let mean = data.iter().fold(DVector::zeros(2), |acc, x| acc + x) / n;
        let var = data
            .iter()
            .fold(DVector::zeros(2), |acc, x| acc + (x - &mean).map(|d| d * d))
            / n;

        assert_eq!(moments.count(), 4);
        assert_relative_eq!(moments.mean().unwrap(), &mean, epsilon = 1e-12);
        assert_relative_eq!(moments.variance().unwrap(), var, max_relative = 1e-12);
        assert!(moments.sample_variance().is_some());
    }

    #[test]
    fn test_running_moments_empty() {
        let moments = RunningMoments::new(3);
        assert!(moments.mean().is_none());
        assert!(moments.variance().is_none());
        assert!(moments.sample_variance().is_none());
    }

    proptest! {
        #[test]
        fn prop_streaming_mean_of_constant_is_constant(
            value in -1e6f64..1e6,
            len in 1usize..200,
        ) {
            for mean in streaming_mean(std::iter::repeat(value).take(len)) {
                prop_assert!((mean - value).abs() <= 1e-9 * value.abs().max(1.0));
            }
        }
    }
}
