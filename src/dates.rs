//! Calendar arithmetic: year/day-of-year conversions, missing-date
//! resolution and coverage verification.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;

use crate::error::{Error, Result};

/// Derives the calendar date for a `(year, day_of_year)` pair as
/// `Jan 1 of year + (day_of_year - 1) days`.
pub fn date_from_year_day(year: i32, day_of_year: u32) -> Result<NaiveDate> {
    NaiveDate::from_yo_opt(year, day_of_year).ok_or_else(|| Error::Configuration(format!(
        "day {} is out of range for year {}",
        day_of_year, year
    )))
}

/// Inverse of [`date_from_year_day`]. Round-trips exactly.
pub fn year_day_from_date(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.ordinal())
}

/// Computes the dates absent from `valid` over the inclusive window
/// `[first_date, before_date]`, restricted to the requested years.
/// Returns an empty list when nothing is missing.
pub fn missing_dates(
    valid: &[NaiveDate],
    years: &[i32],
    first_date: NaiveDate,
    before_date: NaiveDate,
) -> Vec<NaiveDate> {
    let in_window = |date: &NaiveDate| {
        *date >= first_date && *date <= before_date && years.contains(&date.year())
    };

    let held: BTreeSet<NaiveDate> = valid.iter().copied().filter(in_window).collect();

    let mut missing = Vec::new();
    let mut date = first_date;
    while date <= before_date {
        if years.contains(&date.year()) && !held.contains(&date) {
            missing.push(date);
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    missing
}

/// The distinct years covered by `dates`, ascending. Used to scope the
/// remote query by year rather than by individual date.
pub fn missing_years(dates: &[NaiveDate]) -> Vec<i32> {
    let years: BTreeSet<i32> = dates.iter().map(|d| d.year()).collect();
    years.into_iter().collect()
}

/// What to do when the requested range still has gaps after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MissingDatesPolicy {
    /// Fail the run.
    Raise,
    /// Report the gaps and proceed.
    Warn,
    /// Proceed silently.
    Ignore,
}

impl std::fmt::Display for MissingDatesPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MissingDatesPolicy::Raise => "raise",
            MissingDatesPolicy::Warn => "warn",
            MissingDatesPolicy::Ignore => "ignore",
        })
    }
}

/// Checks that `available` covers the whole window for the requested years.
///
/// Zero available dates in range is fatal under every policy.
pub fn verify_coverage(
    available: &[NaiveDate],
    years: &[i32],
    first_date: NaiveDate,
    before_date: NaiveDate,
    policy: MissingDatesPolicy,
) -> Result<()> {
    let in_range = available
        .iter()
        .filter(|d| **d >= first_date && **d <= before_date && years.contains(&d.year()))
        .count();
    if in_range == 0 {
        return Err(Error::NoAvailableDates);
    }

    let missing = missing_dates(available, years, first_date, before_date);
    if missing.is_empty() {
        return Ok(());
    }

    match policy {
        MissingDatesPolicy::Raise => Err(Error::Coverage { missing }),
        MissingDatesPolicy::Warn => {
            eprintln!(
                "Warning: {} dates missing in the requested range ({} to {})",
                missing.len(),
                missing.first().unwrap(),
                missing.last().unwrap()
            );
            Ok(())
        }
        MissingDatesPolicy::Ignore => Ok(()),
    }
}

// -- Tests -------------------------------------------------------------------
