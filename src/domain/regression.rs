//! Rolling OLS regressions per ticker and window.
//!
//! A window is the last W complete observations of a ticker, not W panel
//! rows, so gaps in one ticker's history only skip the missing dates. Each
//! fit is stored on the ticker's next complete row: the value at date D is
//! fit on observations strictly before D.

use chrono::NaiveDate;
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use super::error::{PanelError, RegressionError};
use super::panel::{fields, ColumnData, ColumnKey, Field, Panel, PanelFragment};

pub const DEFAULT_WINDOWS: [usize; 5] = [5, 10, 30, 60, 90];

/// Singular values below this fraction of the largest count as zero.
const RANK_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionSpec {
    pub windows: Vec<usize>,
    pub predictors: Vec<String>,
    pub target: String,
}

impl Default for RegressionSpec {
    fn default() -> Self {
        RegressionSpec {
            windows: DEFAULT_WINDOWS.to_vec(),
            predictors: vec![fields::DATES_NUMERIC.to_string()],
            target: fields::ADJ_CLOSE.to_string(),
        }
    }
}

/// Unshifted rolling outputs for one ticker/window.
#[derive(Debug, Clone, PartialEq)]
struct RollingFit {
    intercept: Vec<Option<f64>>,
    coefficients: Vec<Vec<Option<f64>>>,
    std_dev: Vec<Option<f64>>,
}

/// Fits every ticker in parallel and returns the new columns as a fragment.
///
/// Tickers are processed in sorted order and collected in that order, so the
/// column layout is identical between runs. A ticker/window that has too few
/// observations or fails to fit is logged and left out.
pub fn compute_regressions(panel: &Panel, spec: &RegressionSpec) -> PanelFragment {
    let tickers = panel.tickers();
    info!(
        "Computing regressions for {} tickers over windows {:?}",
        tickers.len(),
        spec.windows
    );

    let per_ticker: Vec<Vec<(ColumnKey, ColumnData)>> = tickers
        .par_iter()
        .map(|ticker| regress_ticker(panel, ticker, spec))
        .collect();

    let mut fragment = PanelFragment::new(panel.dates().to_vec());
    for columns in per_ticker {
        for (key, data) in columns {
            fragment.push(key, data);
        }
    }
    fragment
}

/// [`compute_regressions`] merged onto a new panel.
pub fn enrich_with_regressions(panel: Panel, spec: &RegressionSpec) -> Result<Panel, PanelError> {
    let fragment = compute_regressions(&panel, spec);
    panel.merge(fragment)
}

fn regress_ticker(panel: &Panel, ticker: &str, spec: &RegressionSpec) -> Vec<(ColumnKey, ColumnData)> {
    let mut out = Vec::new();

    let Some(target) = panel.numeric_for(&Field::raw(&spec.target), ticker) else {
        warn!("Skipping {ticker}: no {} column", spec.target);
        return out;
    };
    let mut predictors = Vec::with_capacity(spec.predictors.len());
    for name in &spec.predictors {
        match panel.numeric_for(&Field::raw(name), ticker) {
            Some(values) => predictors.push(values),
            None => {
                warn!("Skipping {ticker}: no predictor column {name}");
                return out;
            }
        }
    }

    let complete: Vec<bool> = (0..target.len())
        .map(|i| is_finite(target[i]) && predictors.iter().all(|p| is_finite(p[i])))
        .collect();
    let observations = complete.iter().filter(|&&c| c).count();

    for &window in &spec.windows {
        if window == 0 || observations < window {
            info!(
                "Skipping ticker {ticker} for window {window}: insufficient data ({observations} observations)"
            );
            continue;
        }
        debug!("Processing {ticker}, window {window}, {observations} observations");

        match fit_rolling(panel, target, &predictors, &complete, window) {
            Ok(fit) => {
                out.push((
                    ColumnKey::new(Field::intercept(window), ticker),
                    ColumnData::Numeric(fit.intercept),
                ));
                for (name, coeffs) in spec.predictors.iter().zip(fit.coefficients) {
                    out.push((
                        ColumnKey::new(Field::coefficient(name.clone(), window), ticker),
                        ColumnData::Numeric(coeffs),
                    ));
                }
                out.push((
                    ColumnKey::new(Field::std_dev(window), ticker),
                    ColumnData::Numeric(fit.std_dev),
                ));
            }
            Err(e) => warn!("Error processing {ticker}, window {window}: {e}"),
        }
    }
    out
}

fn is_finite(value: Option<f64>) -> bool {
    value.is_some_and(f64::is_finite)
}

fn fit_rolling(
    panel: &Panel,
    target: &[Option<f64>],
    predictors: &[&[Option<f64>]],
    complete: &[bool],
    window: usize,
) -> Result<RollingFit, RegressionError> {
    let rows = target.len();
    let observed: Vec<usize> = (0..rows).filter(|&i| complete[i]).collect();
    let mut fit = RollingFit {
        intercept: vec![None; rows],
        coefficients: vec![vec![None; rows]; predictors.len()],
        std_dev: vec![None; rows],
    };

    for k in window..observed.len() {
        let sample = &observed[k - window..k];
        let at = observed[k];
        let params = ols(target, predictors, sample, panel.dates()[sample[window - 1]])?;
        fit.intercept[at] = Some(params[0]);
        for (j, column) in fit.coefficients.iter_mut().enumerate() {
            column[at] = Some(params[j + 1]);
        }
        let values: Vec<f64> = sample.iter().filter_map(|&i| target[i]).collect();
        fit.std_dev[at] = population_std(&values);
    }
    Ok(fit)
}

/// Least squares with an intercept column over the `sample` rows.
/// Returns `[intercept, b1, ..., bk]`.
fn ols(
    target: &[Option<f64>],
    predictors: &[&[Option<f64>]],
    sample: &[usize],
    date: NaiveDate,
) -> Result<Vec<f64>, RegressionError> {
    let cols = predictors.len() + 1;
    let x = DMatrix::from_fn(sample.len(), cols, |r, c| {
        if c == 0 {
            1.0
        } else {
            predictors[c - 1][sample[r]].unwrap_or(f64::NAN)
        }
    });
    let y = DVector::from_fn(sample.len(), |r, _| target[sample[r]].unwrap_or(f64::NAN));

    let svd = x.svd(true, true);
    let tol = svd.singular_values.max() * RANK_TOLERANCE;
    let rank = svd.rank(tol);
    if rank < cols {
        return Err(RegressionError::Singular {
            rank,
            columns: cols,
            date,
        });
    }
    let beta = svd
        .solve(&y, tol)
        .map_err(|e| RegressionError::Solve(e.to_string()))?;
    Ok(beta.iter().copied().collect())
}

/// Population (ddof = 0) standard deviation.
fn population_std(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}
