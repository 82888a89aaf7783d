//! Domain Models
//!
//! Knowledge summaries and climate records returned by the data sources.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A short encyclopedia summary
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Page title
    pub title: String,

    /// Intro text
    pub text: String,
}

impl Summary {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }
}

/// One NOAA CDO observation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// ISO timestamp as returned by the API (e.g. `2020-01-01T00:00:00`)
    pub date: String,

    /// Datatype code (`TMAX`, `TMIN`, `PRCP`, ...)
    pub datatype: String,

    pub value: f64,

    #[serde(default)]
    pub station: Option<String>,

    #[serde(default)]
    pub attributes: Option<String>,
}

impl Observation {
    /// Calendar day of the observation
    pub fn day(&self) -> Option<NaiveDate> {
        let day = self.date.get(..10)?;
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }
}

/// One table row: a day and its datatype values
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClimateRow {
    pub date: NaiveDate,
    pub values: BTreeMap<String, f64>,
}

/// Observations pivoted by date, one column per datatype
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateTable {
    /// Datatype columns, sorted
    pub columns: Vec<String>,

    /// Rows sorted by date
    pub rows: Vec<ClimateRow>,
}

impl ClimateTable {
    /// Pivot observations into a date × datatype table.
    ///
    /// Several values for the same cell (e.g. from different stations) are
    /// averaged. Observations with an unreadable date are skipped.
    pub fn pivot(observations: &[Observation]) -> Self {
        let mut cells: BTreeMap<NaiveDate, BTreeMap<String, (f64, u32)>> = BTreeMap::new();
        let mut columns = BTreeSet::new();

        for obs in observations {
            let Some(day) = obs.day() else {
                tracing::warn!(date = %obs.date, "Skipping observation with unreadable date");
                continue;
            };
            columns.insert(obs.datatype.clone());
            let cell = cells
                .entry(day)
                .or_default()
                .entry(obs.datatype.clone())
                .or_insert((0.0, 0));
            cell.0 += obs.value;
            cell.1 += 1;
        }

        let rows = cells
            .into_iter()
            .map(|(date, values)| ClimateRow {
                date,
                values: values
                    .into_iter()
                    .map(|(k, (sum, n))| (k, sum / f64::from(n)))
                    .collect(),
            })
            .collect();

        Self {
            columns: columns.into_iter().collect(),
            rows,
        }
    }

    /// Values of one column, `None` where a day has no value
    pub fn column(&self, datatype: &str) -> Vec<Option<f64>> {
        self.rows
            .iter()
            .map(|r| r.values.get(datatype).copied())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(date: &str, datatype: &str, value: f64) -> Observation {
        Observation {
            date: date.into(),
            datatype: datatype.into(),
            value,
            station: None,
            attributes: None,
        }
    }

    #[test]
    fn test_pivot_groups_by_day_and_datatype() {
        let table = ClimateTable::pivot(&[
            obs("2020-01-02T00:00:00", "TMAX", 12.0),
            obs("2020-01-01T00:00:00", "TMAX", 10.0),
            obs("2020-01-01T00:00:00", "PRCP", 3.5),
            obs("2020-01-01T00:00:00", "TMIN", 1.0),
        ]);

        assert_eq!(table.columns, vec!["PRCP", "TMAX", "TMIN"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(table.column("TMAX"), vec![Some(10.0), Some(12.0)]);
        assert_eq!(table.column("PRCP"), vec![Some(3.5), None]);
    }

    #[test]
    fn test_pivot_averages_duplicates() {
        let table = ClimateTable::pivot(&[
            obs("2020-06-01T00:00:00", "TMAX", 30.0),
            obs("2020-06-01T00:00:00", "TMAX", 32.0),
            obs("not a date", "TMAX", 99.0),
        ]);
        assert_eq!(table.column("TMAX"), vec![Some(31.0)]);
    }

    #[test]
    fn test_pivot_empty() {
        assert!(ClimateTable::pivot(&[]).is_empty());
    }
}
