//! Ranking tickers on a date by a panel metric.

use chrono::NaiveDate;
use log::warn;

use super::panel::{fields, Field, Panel};
use super::position::SizeCategory;
use crate::ports::company_port::CompanyDataPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rank {
    #[default]
    Max,
    Min,
}

/// What to return when fewer tickers qualify than were asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShortfallPolicy {
    /// Nothing.
    #[default]
    Strict,
    /// Every qualifying ticker.
    Permissive,
}

/// Independent filters; each one only applies when set.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionCriteria {
    pub how_many: usize,
    pub rank: Rank,
    pub abs_val: bool,
    pub shortfall: ShortfallPolicy,
    /// Keep only |metric| < value.
    pub extreme_filter: Option<f64>,
    pub min_share_price: Option<f64>,
    pub max_share_price: Option<f64>,
    pub min_market_cap: Option<f64>,
    /// Empty means any category.
    pub size_categories: Vec<SizeCategory>,
    pub min_volume: Option<f64>,
    pub min_volume_value: Option<f64>,
    pub avoid_sectors: Vec<String>,
    pub avoid_industries: Vec<String>,
    pub avoid_countries: Vec<String>,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        SelectionCriteria {
            how_many: 1,
            rank: Rank::Max,
            abs_val: false,
            shortfall: ShortfallPolicy::Strict,
            extreme_filter: None,
            min_share_price: None,
            max_share_price: None,
            min_market_cap: None,
            size_categories: Vec::new(),
            min_volume: None,
            min_volume_value: None,
            avoid_sectors: Vec::new(),
            avoid_industries: Vec::new(),
            avoid_countries: Vec::new(),
        }
    }
}

impl SelectionCriteria {
    fn needs_company_data(&self) -> bool {
        !(self.avoid_sectors.is_empty()
            && self.avoid_industries.is_empty()
            && self.avoid_countries.is_empty())
    }
}

/// Best `how_many` tickers on `date` by `metric`, after filtering.
///
/// A ticker needs a price, a volume and a finite metric on `date` to be a
/// candidate. Ties keep ticker order.
pub fn best_on_date(
    panel: &Panel,
    date: NaiveDate,
    metric: &Field,
    criteria: &SelectionCriteria,
    company: Option<&dyn CompanyDataPort>,
) -> Vec<String> {
    if panel.date_position(date).is_none() {
        warn!("{date} is not in the panel; no tickers selected");
        return Vec::new();
    }
    if criteria.needs_company_data() && company.is_none() {
        warn!("Sector/industry/country filters set without company data; every ticker is excluded");
    }

    let mut candidates: Vec<(String, f64)> = panel
        .tickers()
        .into_iter()
        .filter_map(|ticker| {
            let score = qualify(panel, date, metric, criteria, company, &ticker)?;
            Some((ticker, score))
        })
        .collect();

    if candidates.len() < criteria.how_many {
        warn!(
            "Not enough data on {date} to rank by {metric}: {} candidate(s), {} wanted",
            candidates.len(),
            criteria.how_many
        );
        if criteria.shortfall == ShortfallPolicy::Strict {
            return Vec::new();
        }
    }

    match criteria.rank {
        Rank::Max => candidates.sort_by(|a, b| b.1.total_cmp(&a.1)),
        Rank::Min => candidates.sort_by(|a, b| a.1.total_cmp(&b.1)),
    }
    candidates
        .into_iter()
        .take(criteria.how_many)
        .map(|(ticker, _)| ticker)
        .collect()
}

/// Ranking score for `ticker`, or `None` if any filter rejects it.
fn qualify(
    panel: &Panel,
    date: NaiveDate,
    metric: &Field,
    criteria: &SelectionCriteria,
    company: Option<&dyn CompanyDataPort>,
    ticker: &str,
) -> Option<f64> {
    let number = |name: &str| panel.value(date, &Field::raw(name), ticker).ok();

    let value = panel.value(date, metric, ticker).ok().filter(|v| v.is_finite())?;
    let price = number(fields::ADJ_CLOSE)?;
    let volume = number(fields::VOLUME)?;

    if criteria.extreme_filter.is_some_and(|limit| value.abs() >= limit) {
        return None;
    }
    if criteria.min_share_price.is_some_and(|min| price < min)
        || criteria.max_share_price.is_some_and(|max| price > max)
    {
        return None;
    }
    if let Some(min) = criteria.min_volume {
        if volume <= min {
            return None;
        }
    }
    if let Some(min) = criteria.min_volume_value {
        if number(fields::VOLUME_VALUE)? <= min {
            return None;
        }
    }
    if let Some(min) = criteria.min_market_cap {
        if number(fields::MARKET_CAP)? <= min {
            return None;
        }
    }
    if !criteria.size_categories.is_empty() {
        let category = panel
            .category(date, &Field::raw(fields::SIZE_CATEGORY), ticker)
            .ok()?
            .parse::<SizeCategory>()
            .ok()?;
        if !criteria.size_categories.contains(&category) {
            return None;
        }
    }

    if criteria.needs_company_data() {
        let company = company?;
        let avoided = |list: &[String], attr: Option<String>| match attr {
            Some(a) => list.contains(&a),
            None => true,
        };
        if (!criteria.avoid_sectors.is_empty() && avoided(&criteria.avoid_sectors, company.sector(ticker)))
            || (!criteria.avoid_industries.is_empty()
                && avoided(&criteria.avoid_industries, company.industry(ticker)))
            || (!criteria.avoid_countries.is_empty()
                && avoided(&criteria.avoid_countries, company.country(ticker)))
        {
            return None;
        }
    }

    Some(if criteria.abs_val { value.abs() } else { value })
}
