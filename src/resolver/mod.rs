//! Location lookup over raw spreadsheet-shaped rows.
//!
//! Station and origin tables arrive as string cells; a `ColumnMap` built once
//! per table maps logical fields to column indexes. Rows with malformed
//! numeric cells are skipped, never an error.

use serde::{Deserialize, Serialize};

use crate::models::location::LocationConfig;

pub const DEFAULT_RADIUS_M: f64 = 200.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMap {
    pub key: usize,
    pub name: usize,
    pub lat: usize,
    pub lng: usize,
    pub radius: usize,
    pub route_code: Option<usize>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            key: 0,
            name: 1,
            lat: 2,
            lng: 3,
            radius: 4,
            route_code: Some(5),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigTable {
    #[serde(default)]
    pub columns: ColumnMap,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

impl ConfigTable {
    pub fn new(columns: ColumnMap, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    fn cell<'a>(&self, row: &'a [String], index: usize) -> &'a str {
        row.get(index).map(|cell| cell.trim()).unwrap_or("")
    }

    fn numeric_cell(&self, row: &[String], index: usize) -> Option<f64> {
        self.cell(row, index)
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
    }
}

#[derive(Debug, Clone)]
pub struct LocationDirectory {
    pub station: ConfigTable,
    pub origin: ConfigTable,
    pub default_radius_m: f64,
}

impl LocationDirectory {
    pub fn new(station: ConfigTable, origin: ConfigTable, default_radius_m: f64) -> Self {
        Self {
            station,
            origin,
            default_radius_m,
        }
    }

    pub fn empty(default_radius_m: f64) -> Self {
        Self {
            station: ConfigTable::default(),
            origin: ConfigTable::default(),
            default_radius_m,
        }
    }

    /// Station domain first, then origin; first row whose key matches and
    /// whose lat/lng/radius all parse wins.
    pub fn resolve_by_code(&self, code: &str) -> Option<LocationConfig> {
        let target = code.trim().to_uppercase();
        if target.is_empty() {
            return None;
        }
        self.lookup_code(&self.station, &target)
            .or_else(|| self.lookup_code(&self.origin, &target))
    }

    fn lookup_code(&self, table: &ConfigTable, target: &str) -> Option<LocationConfig> {
        let columns = &table.columns;
        for row in &table.rows {
            let key = table.cell(row, columns.key).to_uppercase();
            if key != target {
                continue;
            }
            let (Some(lat), Some(lng), Some(radius)) = (
                table.numeric_cell(row, columns.lat),
                table.numeric_cell(row, columns.lng),
                table.numeric_cell(row, columns.radius),
            ) else {
                continue;
            };
            let name = table.cell(row, columns.name);
            return Some(LocationConfig {
                code: key.clone(),
                name: if name.is_empty() { key } else { name.to_string() },
                lat,
                lng,
                radius_m: radius,
            });
        }
        None
    }

    /// Match the first 3 characters of `route` against the first 3 characters
    /// of each origin row's route code. Radius falls back to the directory
    /// default when missing or non-positive.
    pub fn resolve_by_route_prefix(&self, route: &str) -> Option<LocationConfig> {
        let prefix: String = route.trim().chars().take(3).collect::<String>().to_uppercase();
        if prefix.is_empty() {
            return None;
        }
        let table = &self.origin;
        let columns = &table.columns;
        let route_code_col = columns.route_code?;

        for row in &table.rows {
            let route_code = table.cell(row, route_code_col);
            if route_code.is_empty() {
                continue;
            }
            let row_prefix: String = route_code.chars().take(3).collect::<String>().to_uppercase();
            if row_prefix != prefix {
                continue;
            }
            let (Some(lat), Some(lng)) = (
                table.numeric_cell(row, columns.lat),
                table.numeric_cell(row, columns.lng),
            ) else {
                continue;
            };
            let radius_m = table
                .numeric_cell(row, columns.radius)
                .filter(|radius| *radius > 0.0)
                .unwrap_or(self.default_radius_m);
            let code = {
                let key = table.cell(row, columns.key).to_uppercase();
                if key.is_empty() { prefix.clone() } else { key }
            };
            let name = table.cell(row, columns.name);
            return Some(LocationConfig {
                code: code.clone(),
                name: if name.is_empty() { code } else { name.to_string() },
                lat,
                lng,
                radius_m,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnMap, ConfigTable, LocationDirectory, DEFAULT_RADIUS_M};

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|cell| cell.to_string()).collect()
    }

    fn directory(station_rows: Vec<Vec<String>>, origin_rows: Vec<Vec<String>>) -> LocationDirectory {
        LocationDirectory::new(
            ConfigTable::new(ColumnMap::default(), station_rows),
            ConfigTable::new(ColumnMap::default(), origin_rows),
            DEFAULT_RADIUS_M,
        )
    }

    #[test]
    fn station_domain_takes_precedence_over_origin() {
        let dir = directory(
            vec![row(&["STN1", "Station One", "13.75", "100.50", "150", ""])],
            vec![row(&["STN1", "Origin One", "14.00", "101.00", "300", "STN"])],
        );
        let config = dir.resolve_by_code("stn1").unwrap();
        assert_eq!(config.name, "Station One");
        assert_eq!(config.radius_m, 150.0);
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let dir = directory(
            vec![
                row(&["STN1", "Broken", "not-a-number", "100.50", "150", ""]),
                row(&["STN1", "Good", "13.75", "100.50", "150", ""]),
            ],
            vec![],
        );
        let config = dir.resolve_by_code("STN1").unwrap();
        assert_eq!(config.name, "Good");
    }

    #[test]
    fn code_lookup_requires_parseable_radius() {
        let dir = directory(
            vec![row(&["STN1", "No Radius", "13.75", "100.50", "", ""])],
            vec![],
        );
        assert!(dir.resolve_by_code("STN1").is_none());
    }

    #[test]
    fn unknown_code_resolves_to_none() {
        let dir = directory(vec![], vec![]);
        assert!(dir.resolve_by_code("NOPE").is_none());
        assert!(dir.resolve_by_code("   ").is_none());
    }

    #[test]
    fn route_prefix_matches_first_three_characters() {
        let dir = directory(
            vec![],
            vec![row(&["ORG1", "Depot", "13.60", "100.40", "250", "BKK01"])],
        );
        let config = dir.resolve_by_route_prefix("bkk-route-7").unwrap();
        assert_eq!(config.code, "ORG1");
        assert_eq!(config.radius_m, 250.0);
    }

    #[test]
    fn route_prefix_defaults_radius_when_non_positive() {
        let dir = directory(
            vec![],
            vec![
                row(&["ORG1", "Zero Radius", "13.60", "100.40", "0", "BKK01"]),
            ],
        );
        let config = dir.resolve_by_route_prefix("BKK99").unwrap();
        assert_eq!(config.radius_m, DEFAULT_RADIUS_M);
    }

    #[test]
    fn route_prefix_first_matching_row_wins() {
        let dir = directory(
            vec![],
            vec![
                row(&["ORG1", "First", "13.60", "100.40", "250", "BKK01"]),
                row(&["ORG2", "Second", "13.70", "100.45", "250", "BKK02"]),
            ],
        );
        let config = dir.resolve_by_route_prefix("BKK77").unwrap();
        assert_eq!(config.name, "First");
    }

    #[test]
    fn route_prefix_skips_rows_without_route_code() {
        let dir = directory(
            vec![],
            vec![
                row(&["ORG1", "No Route", "13.60", "100.40", "250", ""]),
                row(&["ORG2", "Routed", "13.70", "100.45", "250", "BKK01"]),
            ],
        );
        let config = dir.resolve_by_route_prefix("BKK01").unwrap();
        assert_eq!(config.name, "Routed");
    }
}
