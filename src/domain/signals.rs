//! Theoretical-value predictions and price-deviation scores built from
//! regression outputs.

use chrono::NaiveDate;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

use super::error::{RegtraderError, SignalError};
use super::panel::{fields, ColumnData, ColumnKey, Field, Panel, PanelFragment, RegressionRole};

/// One numeric series per ticker, aligned with the panel's dates.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSeries {
    pub dates: Vec<NaiveDate>,
    pub values: BTreeMap<String, Vec<Option<f64>>>,
}

impl SignalSeries {
    pub fn get(&self, ticker: &str) -> Option<&[Option<f64>]> {
        self.values.get(ticker).map(Vec::as_slice)
    }

    /// Re-keys every ticker's series under `field` for merging.
    pub fn into_fragment(self, field: Field) -> PanelFragment {
        let mut fragment = PanelFragment::new(self.dates);
        for (ticker, values) in self.values {
            fragment.push(
                ColumnKey::new(field.clone(), ticker),
                ColumnData::Numeric(values),
            );
        }
        fragment
    }
}

/// intercept + sum(predictor * coefficient) for every ticker fit over `window`.
///
/// Every coefficient must name a predictor that exists as a value column for
/// that ticker (or as a ticker-independent column); otherwise the regression
/// outputs and the data have drifted apart and the whole call fails.
pub fn predict_linear(panel: &Panel, window: usize) -> Result<SignalSeries, SignalError> {
    let mut intercept_tickers = BTreeSet::new();
    let mut predictors: BTreeSet<&str> = BTreeSet::new();
    let mut coefficient_keys: Vec<(&str, &str)> = Vec::new();

    for key in panel.keys() {
        if let Field::Regression { window: w, role } = &key.field {
            if *w != window {
                continue;
            }
            match role {
                RegressionRole::Intercept => {
                    intercept_tickers.insert(key.ticker.as_str());
                }
                RegressionRole::Coefficient(p) => {
                    predictors.insert(p.as_str());
                    coefficient_keys.push((key.ticker.as_str(), p.as_str()));
                }
                RegressionRole::StdDev => {}
            }
        }
    }

    if intercept_tickers.is_empty() {
        return Err(SignalError::NoIntercept(window));
    }
    for (ticker, predictor) in &coefficient_keys {
        if panel.numeric_for(&Field::raw(*predictor), ticker).is_none() {
            return Err(SignalError::PredictorMissing {
                predictor: predictor.to_string(),
                window,
            });
        }
    }

    let rows = panel.row_count();
    let mut values = BTreeMap::new();
    for ticker in intercept_tickers {
        let Some(intercept) = panel.numeric(&ColumnKey::new(Field::intercept(window), ticker)) else {
            continue;
        };
        let mut terms: Vec<(&[Option<f64>], Option<&[Option<f64>]>)> = Vec::new();
        for predictor in &predictors {
            let coeff = panel.numeric(&ColumnKey::new(Field::coefficient(*predictor, window), ticker));
            match panel.numeric_for(&Field::raw(*predictor), ticker) {
                Some(data) => terms.push((data, coeff)),
                None => {
                    return Err(SignalError::PredictorMissing {
                        predictor: predictor.to_string(),
                        window,
                    });
                }
            }
        }

        let series: Vec<Option<f64>> = (0..rows)
            .map(|i| {
                terms.iter().try_fold(intercept[i]?, |acc, (data, coeff)| {
                    let c = (*coeff)?[i]?;
                    Some(acc + data[i]? * c)
                })
            })
            .collect();
        values.insert(ticker.to_string(), series);
    }

    debug!("Predicted window {window} values for {} tickers", values.len());
    Ok(SignalSeries {
        dates: panel.dates().to_vec(),
        values,
    })
}

/// (theoretical - actual) / std_dev per ticker and date.
///
/// A zero std-dev yields an infinite (or NaN) score rather than an error.
pub fn price_deviation(
    panel: &Panel,
    actual: &Field,
    theoretical: &Field,
    std_dev: &Field,
) -> Result<SignalSeries, SignalError> {
    let tickers: Vec<&str> = panel
        .keys()
        .filter(|k| !k.is_shared() && k.field == *theoretical)
        .map(|k| k.ticker.as_str())
        .collect();
    if tickers.is_empty() {
        return Err(SignalError::MissingField(theoretical.to_string()));
    }

    let mut values = BTreeMap::new();
    for ticker in tickers {
        let (Some(theo), Some(act), Some(std)) = (
            panel.numeric_for(theoretical, ticker),
            panel.numeric_for(actual, ticker),
            panel.numeric_for(std_dev, ticker),
        ) else {
            debug!("No {actual}/{std_dev} for {ticker}; skipping price deviation");
            continue;
        };
        let series = theo
            .iter()
            .zip(act)
            .zip(std)
            .map(|((t, a), s)| Some(((*t)? - (*a)?) / (*s)?))
            .collect();
        values.insert(ticker.to_string(), series);
    }

    Ok(SignalSeries {
        dates: panel.dates().to_vec(),
        values,
    })
}

/// Names of the signal columns derived for one regression window.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub window: usize,
    pub actual_field: String,
    pub theoretical_field: String,
    pub price_diff_field: String,
}

impl SignalSpec {
    pub fn new(window: usize) -> Self {
        SignalSpec {
            window,
            actual_field: fields::ADJ_CLOSE.to_string(),
            theoretical_field: format!("Theo_{window}"),
            price_diff_field: format!("Price_Diff_{window}"),
        }
    }

    pub fn theoretical(&self) -> Field {
        Field::raw(&self.theoretical_field)
    }

    pub fn price_diff(&self) -> Field {
        Field::raw(&self.price_diff_field)
    }

    pub fn std_dev(&self) -> Field {
        Field::std_dev(self.window)
    }
}

/// Adds the theoretical-value and price-deviation columns to a new panel.
pub fn derive_signals(panel: Panel, spec: &SignalSpec) -> Result<Panel, RegtraderError> {
    let theo = predict_linear(&panel, spec.window)?;
    let panel = panel.merge(theo.into_fragment(spec.theoretical()))?;
    let diff = price_deviation(
        &panel,
        &Field::raw(&spec.actual_field),
        &spec.theoretical(),
        &spec.std_dev(),
    )?;
    Ok(panel.merge(diff.into_fragment(spec.price_diff()))?)
}
