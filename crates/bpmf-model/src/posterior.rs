//! Reductions over sequences of posterior samples.
//!
//! Every reduction is a single pass over the samples and keeps O(cells)
//! state, so a stream straight out of
//! [`BayesianFactorizationModel::samples`](crate::bayes::BayesianFactorizationModel::samples)
//! can be consumed without being collected first. Retained samples work just
//! as well: anything iterable over values that borrow as
//! [`PosteriorSample`] is accepted.

use crate::bayes::PosteriorSample;
use bpmf_core::{
    error::{BpmfError, Result},
    stats::{streaming_mean, RunningMoments},
    types::{constants, Cell, DMatrix, DVector},
};
use std::borrow::Borrow;

/// Which cells a reduction covers.
#[derive(Debug, Clone, PartialEq)]
pub enum CellSelector {
    /// Every cell of the grid, enumerated column-major
    All,
    /// The listed cells, in the given order
    Cells(Vec<Cell>),
}

/// How the values of a [`CellEstimates`] map onto the grid.
#[derive(Debug, Clone, PartialEq)]
pub enum CellLayout {
    /// Full `rows × cols` grid in column-major order
    Grid {
        /// Number of rows
        rows: usize,
        /// Number of columns
        cols: usize,
    },
    /// An explicit cell list
    Cells(Vec<Cell>),
}

/// Per-cell results of a reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct CellEstimates {
    layout: CellLayout,
    values: DVector<f64>,
}

impl CellEstimates {
    /// Values in selector order.
    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    /// How [`values`](Self::values) map onto the grid.
    pub fn layout(&self) -> &CellLayout {
        &self.layout
    }

    /// Number of cells covered.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no cells are covered.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value for `(row, col)`, if that cell is covered.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        let position = match &self.layout {
            CellLayout::Grid { rows, cols } => {
                (row < *rows && col < *cols).then(|| col * rows + row)
            }
            CellLayout::Cells(cells) => cells.iter().position(|&c| c == (row, col)),
        }?;
        Some(self.values[position])
    }

    /// The values as a `rows × cols` matrix; `None` for a cell list.
    pub fn to_matrix(&self) -> Option<DMatrix<f64>> {
        match self.layout {
            CellLayout::Grid { rows, cols } => {
                Some(DMatrix::from_column_slice(rows, cols, self.values.as_slice()))
            }
            CellLayout::Cells(_) => None,
        }
    }

    /// `(cell, value)` pairs in selector order.
    pub fn iter(&self) -> impl Iterator<Item = (Cell, f64)> + '_ {
        self.values.iter().enumerate().map(move |(k, &value)| {
            let cell = match &self.layout {
                CellLayout::Grid { rows, .. } => (k % rows, k / rows),
                CellLayout::Cells(cells) => cells[k],
            };
            (cell, value)
        })
    }
}

/// Point estimates, variances and exceedance probabilities over posterior
/// samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorAggregator {
    selector: CellSelector,
}

impl PosteriorAggregator {
    /// Creates an aggregator over the selected cells.
    pub fn new(selector: CellSelector) -> Self {
        Self { selector }
    }

    /// The cell selector.
    pub fn selector(&self) -> &CellSelector {
        &self.selector
    }

    /// Posterior mean of the prediction at every selected cell.
    ///
    /// # Errors
    ///
    /// * [`BpmfError::NoSamples`] for an empty sequence
    /// * [`BpmfError::ShapeMismatch`] if a selected cell is outside the grid
    ///   or the samples disagree on the grid shape
    pub fn point_estimate<I, S>(&self, samples: I) -> Result<CellEstimates>
    where
        I: IntoIterator<Item = S>,
        S: Borrow<PosteriorSample>,
    {
        let mut predictions = self.predictions(samples)?;
        let mean = streaming_mean(predictions.by_ref()).last();
        predictions.finish(mean)
    }

    /// Population variance (divisor = number of samples) of the prediction
    /// at every selected cell.
    ///
    /// # Errors
    ///
    /// As for [`point_estimate`](Self::point_estimate).
    pub fn predictive_variance<I, S>(&self, samples: I) -> Result<CellEstimates>
    where
        I: IntoIterator<Item = S>,
        S: Borrow<PosteriorSample>,
    {
        let mut predictions = self.predictions(samples)?;
        let mut moments = RunningMoments::new(predictions.width());
        for prediction in predictions.by_ref() {
            moments.push(&prediction);
        }
        predictions.finish(moments.variance())
    }

    /// Fraction of samples whose prediction is at least `cutoff`, per
    /// selected cell.
    ///
    /// # Errors
    ///
    /// As for [`point_estimate`](Self::point_estimate).
    pub fn prob_ge_cutoff<I, S>(&self, samples: I, cutoff: f64) -> Result<CellEstimates>
    where
        I: IntoIterator<Item = S>,
        S: Borrow<PosteriorSample>,
    {
        let mut predictions = self.predictions(samples)?;
        let mut counts = DVector::<f64>::zeros(predictions.width());
        let mut total = 0usize;
        for prediction in predictions.by_ref() {
            counts += prediction.map(|x| if x >= cutoff { 1.0 } else { 0.0 });
            total += 1;
        }
        let fraction = (total > 0).then(|| counts / total as f64);
        predictions.finish(fraction)
    }

    /// Root-mean-squared error of the point estimate against `truth`, over
    /// the selected cells.
    ///
    /// # Errors
    ///
    /// * [`BpmfError::ShapeMismatch`] if `truth` does not match the sample
    ///   grid (`All`) or does not contain every selected cell (`Cells`)
    /// * [`BpmfError::InvalidParameter`] if no cells are selected
    /// * anything [`point_estimate`](Self::point_estimate) reports
    pub fn bayes_rmse<I, S>(&self, samples: I, truth: &DMatrix<f64>) -> Result<f64>
    where
        I: IntoIterator<Item = S>,
        S: Borrow<PosteriorSample>,
    {
        if let CellSelector::Cells(cells) = &self.selector {
            check_cells(cells, truth.shape())?;
        }
        let estimate = self.point_estimate(samples)?;
        if let CellLayout::Grid { rows, cols } = estimate.layout {
            if truth.shape() != (rows, cols) {
                return Err(BpmfError::shape_mismatch(
                    constants::shape(rows, cols),
                    constants::shape(truth.nrows(), truth.ncols()),
                ));
            }
        }
        if estimate.is_empty() {
            return Err(BpmfError::invalid_parameter("no cells selected"));
        }

        let sq_err: f64 = estimate
            .iter()
            .map(|((row, col), value)| (truth[(row, col)] - value).powi(2))
            .sum();
        Ok((sq_err / estimate.len() as f64).sqrt())
    }

    fn predictions<I, S>(&self, samples: I) -> Result<Predictions<'_, I::IntoIter>>
    where
        I: IntoIterator<Item = S>,
        S: Borrow<PosteriorSample>,
    {
        let mut inner = samples.into_iter();
        let first = inner.next().ok_or(BpmfError::NoSamples)?;
        let first: &PosteriorSample = first.borrow();
        let shape = first.shape();

        let layout = match &self.selector {
            CellSelector::All => CellLayout::Grid {
                rows: shape.0,
                cols: shape.1,
            },
            CellSelector::Cells(cells) => {
                check_cells(cells, shape)?;
                CellLayout::Cells(cells.clone())
            }
        };

        let pending = extract(&self.selector, first);
        Ok(Predictions {
            selector: &self.selector,
            inner,
            shape,
            layout,
            pending: Some(pending),
            error: None,
        })
    }
}

fn check_cells(cells: &[Cell], (rows, cols): (usize, usize)) -> Result<()> {
    match cells.iter().find(|&&(r, c)| r >= rows || c >= cols) {
        Some(&(r, c)) => Err(BpmfError::shape_mismatch(
            format!("cell inside {}", constants::shape(rows, cols)),
            format!("({}, {})", r, c),
        )),
        None => Ok(()),
    }
}

fn extract(selector: &CellSelector, sample: &PosteriorSample) -> DVector<f64> {
    match selector {
        CellSelector::All => {
            let predicted = sample.predicted_matrix();
            DVector::from_column_slice(predicted.as_slice())
        }
        CellSelector::Cells(cells) => {
            DVector::from_iterator(cells.len(), cells.iter().map(|&(r, c)| sample.predict(r, c)))
        }
    }
}

/// Selected predictions of each sample, in order.
///
/// A sample whose grid differs from the first one ends the iteration and is
/// reported by [`finish`](Self::finish).
struct Predictions<'a, I> {
    selector: &'a CellSelector,
    inner: I,
    shape: (usize, usize),
    layout: CellLayout,
    pending: Option<DVector<f64>>,
    error: Option<BpmfError>,
}

impl<I> Predictions<'_, I> {
    fn width(&self) -> usize {
        match &self.layout {
            CellLayout::Grid { rows, cols } => rows * cols,
            CellLayout::Cells(cells) => cells.len(),
        }
    }

    fn finish(self, values: Option<DVector<f64>>) -> Result<CellEstimates> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let values = values.ok_or(BpmfError::NoSamples)?;
        Ok(CellEstimates {
            layout: self.layout,
            values,
        })
    }
}

impl<I, S> Iterator for Predictions<'_, I>
where
    I: Iterator<Item = S>,
    S: Borrow<PosteriorSample>,
{
    type Item = DVector<f64>;

    fn next(&mut self) -> Option<DVector<f64>> {
        if let Some(first) = self.pending.take() {
            return Some(first);
        }
        if self.error.is_some() {
            return None;
        }
        let sample = self.inner.next()?;
        let sample: &PosteriorSample = sample.borrow();
        if sample.shape() != self.shape {
            self.error = Some(BpmfError::shape_mismatch(
                constants::shape(self.shape.0, self.shape.1),
                constants::shape(sample.shape().0, sample.shape().1),
            ));
            return None;
        }
        Some(extract(self.selector, sample))
    }
}
