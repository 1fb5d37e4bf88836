//! Return-series statistics: CAGR, volatility, drawdown, alpha/beta,
//! Sharpe and Sortino.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::panel::{fields, Field, Panel};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const DAYS_PER_YEAR: f64 = 365.0;

/// A dated series of simple (decimal) returns.
pub type ReturnSeries = Vec<(NaiveDate, f64)>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceStats {
    pub cagr: f64,
    pub volatility: f64,
    /// Largest peak-to-trough loss as a positive fraction.
    pub max_drawdown: f64,
    pub alpha: f64,
    pub beta: f64,
    pub sharpe: f64,
    pub sortino: f64,
}

impl PerformanceStats {
    /// `start` is the date of the valuation the first return is measured
    /// from, so the series spans `start` to the last return's date.
    pub fn compute(
        start: NaiveDate,
        returns: &[(NaiveDate, f64)],
        benchmark: &[(NaiveDate, f64)],
        risk_free_rate: f64,
    ) -> Self {
        let values: Vec<f64> = returns.iter().map(|(_, r)| *r).collect();
        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe, sortino) = compute_risk_adjusted(&values, daily_rf);
        let (alpha, beta) = compute_greeks(returns, benchmark);

        PerformanceStats {
            cagr: compute_cagr(start, returns),
            volatility: population_std(&values) * TRADING_DAYS_PER_YEAR.sqrt(),
            max_drawdown: compute_drawdown(&values),
            alpha,
            beta,
            sharpe,
            sortino,
        }
    }

    pub fn rounded(&self, decimals: i32) -> Self {
        let scale = 10f64.powi(decimals);
        let r = |v: f64| (v * scale).round() / scale;
        PerformanceStats {
            cagr: r(self.cagr),
            volatility: r(self.volatility),
            max_drawdown: r(self.max_drawdown),
            alpha: r(self.alpha),
            beta: r(self.beta),
            sharpe: r(self.sharpe),
            sortino: r(self.sortino),
        }
    }
}

/// Stats for the benchmark and each named portfolio, benchmark first.
pub fn stats_table(
    start: NaiveDate,
    benchmark_name: &str,
    benchmark: &[(NaiveDate, f64)],
    portfolios: &[(String, ReturnSeries)],
    risk_free_rate: f64,
) -> Vec<(String, PerformanceStats)> {
    std::iter::once((
        benchmark_name.to_string(),
        PerformanceStats::compute(start, benchmark, benchmark, risk_free_rate),
    ))
    .chain(portfolios.iter().map(|(name, series)| {
        (
            name.clone(),
            PerformanceStats::compute(start, series, benchmark, risk_free_rate),
        )
    }))
    .collect()
}

/// Day-over-day returns of a ticker's adjusted close, skipping gaps.
pub fn price_returns(panel: &Panel, ticker: &str) -> ReturnSeries {
    let Some(prices) = panel.numeric_for(&Field::raw(fields::ADJ_CLOSE), ticker) else {
        return Vec::new();
    };
    let observed: Vec<(NaiveDate, f64)> = panel
        .dates()
        .iter()
        .zip(prices)
        .filter_map(|(d, p)| Some((*d, (*p)?)))
        .collect();
    observed
        .windows(2)
        .filter(|w| w[0].1 != 0.0)
        .map(|w| (w[1].0, w[1].1 / w[0].1 - 1.0))
        .collect()
}

fn compute_cagr(start: NaiveDate, returns: &[(NaiveDate, f64)]) -> f64 {
    let Some(last) = returns.last() else {
        return 0.0;
    };
    let growth: f64 = returns.iter().map(|(_, r)| 1.0 + r).product();
    let years = (last.0 - start).num_days() as f64 / DAYS_PER_YEAR;
    if years > 0.0 && growth > 0.0 {
        growth.powf(1.0 / years) - 1.0
    } else {
        growth - 1.0
    }
}

fn compute_drawdown(returns: &[f64]) -> f64 {
    let mut wealth = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut max_dd = 0.0_f64;
    for r in returns {
        wealth *= 1.0 + r;
        if wealth > peak {
            peak = wealth;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - wealth) / peak);
        }
    }
    max_dd
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn compute_risk_adjusted(returns: &[f64], daily_rf: f64) -> (f64, f64) {
    if returns.len() < 2 {
        return (0.0, 0.0);
    }
    let n = returns.len() as f64;
    let excess_return = mean(returns) - daily_rf;
    let stddev = population_std(returns);

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}

/// Annualized alpha and beta against the benchmark over shared dates.
fn compute_greeks(returns: &[(NaiveDate, f64)], benchmark: &[(NaiveDate, f64)]) -> (f64, f64) {
    let bench: BTreeMap<NaiveDate, f64> = benchmark.iter().copied().collect();
    let (ours, theirs): (Vec<f64>, Vec<f64>) = returns
        .iter()
        .filter_map(|(d, r)| Some((*r, *bench.get(d)?)))
        .unzip();
    if ours.len() < 2 {
        return (0.0, 0.0);
    }

    let (m_ours, m_theirs) = (mean(&ours), mean(&theirs));
    let covariance = ours
        .iter()
        .zip(&theirs)
        .map(|(a, b)| (a - m_ours) * (b - m_theirs))
        .sum::<f64>()
        / ours.len() as f64;
    let variance = population_std(&theirs).powi(2);
    if variance == 0.0 {
        return (0.0, 0.0);
    }
    let beta = covariance / variance;
    let alpha = (m_ours - beta * m_theirs) * TRADING_DAYS_PER_YEAR;
    (alpha, beta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::panel::{ColumnData, ColumnKey};
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn series(values: &[f64]) -> ReturnSeries {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (start() + Duration::days(i as i64 + 1), *v))
            .collect()
    }

    #[test]
    fn empty_series_is_all_zero() {
        let stats = PerformanceStats::compute(start(), &[], &[], 0.0);
        assert_eq!(stats.cagr, 0.0);
        assert_eq!(stats.max_drawdown, 0.0);
        assert_eq!(stats.sharpe, 0.0);
        assert_eq!(stats.beta, 0.0);
    }

    #[test]
    fn drawdown_from_peak() {
        // wealth: 1.1, 0.88, 0.968, 1.2
        let r = series(&[0.10, -0.20, 0.10, 0.2397]);
        let stats = PerformanceStats::compute(start(), &r, &r, 0.0);
        assert_relative_eq!(stats.max_drawdown, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn cagr_over_calendar_time() {
        let r = vec![(start() + Duration::days(365), 0.21)];
        let stats = PerformanceStats::compute(start(), &r, &r, 0.0);
        assert_relative_eq!(stats.cagr, 0.21, epsilon = 1e-12);
    }

    #[test]
    fn cagr_counts_the_first_interval() {
        // two half-year returns: the year runs from the opening valuation
        let r = vec![
            (start() + Duration::days(182), 0.1),
            (start() + Duration::days(365), 0.1),
        ];
        let stats = PerformanceStats::compute(start(), &r, &r, 0.0);
        assert_relative_eq!(stats.cagr, 0.21, epsilon = 1e-12);
    }

    #[test]
    fn benchmark_against_itself_has_unit_beta() {
        let r = series(&[0.01, -0.02, 0.015, 0.003, -0.007]);
        let stats = PerformanceStats::compute(start(), &r, &r, 0.0);
        assert_relative_eq!(stats.beta, 1.0, epsilon = 1e-12);
        assert_relative_eq!(stats.alpha, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn leveraged_series_doubles_beta() {
        let bench = series(&[0.01, -0.02, 0.015, 0.003, -0.007]);
        let levered: ReturnSeries = bench.iter().map(|(d, r)| (*d, 2.0 * r + 0.001)).collect();
        let stats = PerformanceStats::compute(start(), &levered, &bench, 0.0);
        assert_relative_eq!(stats.beta, 2.0, epsilon = 1e-9);
        assert_relative_eq!(stats.alpha, 0.001 * 252.0, epsilon = 1e-9);
    }

    #[test]
    fn sharpe_and_sortino_signs() {
        let r = series(&[0.01, 0.02, -0.005, 0.015, 0.01]);
        let stats = PerformanceStats::compute(start(), &r, &r, 0.0);
        assert!(stats.sharpe > 0.0);
        assert!(stats.sortino > stats.sharpe);
        assert!(stats.volatility > 0.0);

        let flat = series(&[0.01, 0.01, 0.01]);
        let stats = PerformanceStats::compute(start(), &flat, &flat, 0.0);
        assert_eq!(stats.sharpe, 0.0);
        assert_eq!(stats.sortino, 0.0);
    }

    #[test]
    fn table_puts_benchmark_first() {
        let bench = series(&[0.01, -0.01, 0.02]);
        let ours = series(&[0.02, -0.01, 0.03]);
        let table = stats_table(start(), "SPY", &bench, &[("pf".to_string(), ours)], 0.02);
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].0, "SPY");
        assert_eq!(table[1].0, "pf");
    }

    #[test]
    fn rounding() {
        let stats = PerformanceStats {
            cagr: 0.123456,
            volatility: 0.2,
            max_drawdown: 0.0,
            alpha: -0.00049,
            beta: 1.0,
            sharpe: 1.23456,
            sortino: 2.0,
        }
        .rounded(3);
        assert_eq!(stats.cagr, 0.123);
        assert_eq!(stats.alpha, -0.0);
        assert_eq!(stats.sharpe, 1.235);
    }

    #[test]
    fn price_returns_skip_gaps() {
        let dates: Vec<NaiveDate> = (1..=4)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect();
        let mut panel = Panel::new(dates.clone());
        panel
            .insert(
                ColumnKey::new(Field::raw(fields::ADJ_CLOSE), "SPY"),
                ColumnData::Numeric(vec![Some(100.0), None, Some(110.0), Some(99.0)]),
            )
            .unwrap();
        let r = price_returns(&panel, "SPY");
        assert_eq!(r.len(), 2);
        assert_eq!(r[0].0, dates[2]);
        assert_relative_eq!(r[0].1, 0.1, epsilon = 1e-12);
        assert_relative_eq!(r[1].1, -0.1, epsilon = 1e-12);
        assert!(price_returns(&panel, "QQQ").is_empty());
    }
}
