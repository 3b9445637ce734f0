//! Monthly measurement import from CSV.
//!
//! Spreadsheet exports rename and reorder columns freely. Headers are mapped
//! through a declarative alias table once per file; everything downstream only
//! sees the fixed `Column` schema.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use crate::schema::{FlowVolumeDef, MonthlyMeasurementsDef, SiteProject};
use crate::{ProjectError, ProjectResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Year,
    Month,
    RainfallMm,
    EvaporationMm,
    OreTonnes,
    From,
    To,
    VolumeM3,
    Facility,
    FacilityEvaporationMm,
    LevelM3,
}

/// Accepted header spellings, after normalisation (lowercase, `_` separators).
const ALIASES: &[(Column, &[&str])] = &[
    (Column::Year, &["year", "yr", "calendar_year"]),
    (Column::Month, &["month", "mon", "month_no", "month_number"]),
    (
        Column::RainfallMm,
        &["rainfall_mm", "rainfall", "rain_mm", "rain"],
    ),
    (
        Column::EvaporationMm,
        &["evaporation_mm", "evaporation", "regional_evaporation_mm", "evap_mm", "evap"],
    ),
    (
        Column::OreTonnes,
        &["ore_tonnes", "ore_t", "tonnes_milled", "ore_milled_t", "tonnes"],
    ),
    (Column::From, &["from", "from_code", "source", "from_structure"]),
    (Column::To, &["to", "to_code", "destination", "to_structure"]),
    (
        Column::VolumeM3,
        &["volume_m3", "volume", "flow_m3", "m3", "flow_volume_m3"],
    ),
    (Column::Facility, &["facility", "facility_code", "dam", "storage"]),
    (
        Column::FacilityEvaporationMm,
        &["facility_evaporation_mm", "facility_evap_mm", "local_evaporation_mm"],
    ),
    (
        Column::LevelM3,
        &["level_m3", "closing_volume_m3", "storage_m3", "closing_m3"],
    ),
];

fn normalise(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    for ch in header.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Header positions resolved against the alias table.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    positions: HashMap<Column, usize>,
    /// Headers that matched nothing, kept for reporting.
    pub unmapped: Vec<String>,
}

impl ColumnMap {
    pub fn resolve<'a>(headers: impl IntoIterator<Item = &'a str>) -> ProjectResult<Self> {
        let mut map = ColumnMap::default();
        for (idx, raw) in headers.into_iter().enumerate() {
            let header = normalise(raw);
            let column = ALIASES
                .iter()
                .find(|(_, aliases)| aliases.contains(&header.as_str()))
                .map(|(column, _)| *column);
            match column {
                Some(column) => {
                    if map.positions.insert(column, idx).is_some() {
                        return Err(ProjectError::Column {
                            what: format!("{:?} matched by more than one header ('{}')", column, raw),
                        });
                    }
                }
                None => map.unmapped.push(raw.to_string()),
            }
        }
        for required in [Column::Year, Column::Month] {
            if !map.positions.contains_key(&required) {
                return Err(ProjectError::Column {
                    what: format!("required column {:?} not found", required),
                });
            }
        }
        Ok(map)
    }

    pub fn position(&self, column: Column) -> Option<usize> {
        self.positions.get(&column).copied()
    }

    fn text<'r>(&self, record: &'r csv::StringRecord, column: Column) -> Option<&'r str> {
        self.position(column)
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn number(
        &self,
        record: &csv::StringRecord,
        column: Column,
        line: usize,
    ) -> ProjectResult<Option<f64>> {
        match self.text(record, column) {
            None => Ok(None),
            Some(raw) => raw
                .replace(',', "")
                .parse::<f64>()
                .map(Some)
                .map_err(|_| ProjectError::Column {
                    what: format!("line {}: {:?} value '{}' is not a number", line, column, raw),
                }),
        }
    }
}

/// Read a long-format measurement sheet into per-month records.
///
/// Each row carries `year` and `month` plus any subset of: site rainfall,
/// regional evaporation and ore tonnage; a metered flow (`from`, `to`,
/// `volume_m3`); a facility with a closing level and/or local evaporation.
pub fn read_measurements_csv<R: Read>(reader: R) -> ProjectResult<Vec<MonthlyMeasurementsDef>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let columns = ColumnMap::resolve(headers.iter())?;

    let mut months: BTreeMap<(i32, u32), MonthlyMeasurementsDef> = BTreeMap::new();
    for (i, record) in csv_reader.records().enumerate() {
        let record = record?;
        let line = i + 2;
        let year = columns
            .number(&record, Column::Year, line)?
            .ok_or_else(|| missing(line, Column::Year))? as i32;
        let month = columns
            .number(&record, Column::Month, line)?
            .ok_or_else(|| missing(line, Column::Month))? as u32;
        let entry = months
            .entry((year, month))
            .or_insert_with(|| MonthlyMeasurementsDef::new(year, month));

        if let Some(v) = columns.number(&record, Column::RainfallMm, line)? {
            entry.rainfall_mm = Some(v);
        }
        if let Some(v) = columns.number(&record, Column::EvaporationMm, line)? {
            entry.regional_evaporation_mm = Some(v);
        }
        if let Some(v) = columns.number(&record, Column::OreTonnes, line)? {
            entry.ore_tonnes = Some(v);
        }

        let from = columns.text(&record, Column::From);
        let to = columns.text(&record, Column::To);
        let volume = columns.number(&record, Column::VolumeM3, line)?;
        match (from, to, volume) {
            (Some(from), Some(to), Some(volume_m3)) => entry.flows.push(FlowVolumeDef {
                from: from.to_string(),
                to: to.to_string(),
                volume_m3,
            }),
            (None, None, None) => {}
            _ => {
                return Err(ProjectError::Column {
                    what: format!("line {}: flow rows need from, to and volume_m3", line),
                })
            }
        }

        if let Some(facility) = columns.text(&record, Column::Facility) {
            if let Some(level) = columns.number(&record, Column::LevelM3, line)? {
                entry.storage_volumes_m3.insert(facility.to_string(), level);
            }
            if let Some(evap) = columns.number(&record, Column::FacilityEvaporationMm, line)? {
                entry
                    .facility_evaporation_mm
                    .insert(facility.to_string(), evap);
            }
        }
    }

    Ok(months.into_values().collect())
}

fn missing(line: usize, column: Column) -> ProjectError {
    ProjectError::Column {
        what: format!("line {}: missing {:?}", line, column),
    }
}

/// Merge imported months into a project. Imported values win; flows are
/// replaced per (from, to) key.
pub fn merge_measurements(project: &mut SiteProject, imported: Vec<MonthlyMeasurementsDef>) {
    for month in imported {
        let existing = project
            .measurements
            .iter_mut()
            .find(|m| m.year == month.year && m.month == month.month);
        let Some(existing) = existing else {
            project.measurements.push(month);
            continue;
        };
        if month.rainfall_mm.is_some() {
            existing.rainfall_mm = month.rainfall_mm;
        }
        if month.regional_evaporation_mm.is_some() {
            existing.regional_evaporation_mm = month.regional_evaporation_mm;
        }
        if month.ore_tonnes.is_some() {
            existing.ore_tonnes = month.ore_tonnes;
        }
        for flow in month.flows {
            existing
                .flows
                .retain(|f| !(f.from == flow.from && f.to == flow.to));
            existing.flows.push(flow);
        }
        existing
            .facility_evaporation_mm
            .extend(month.facility_evaporation_mm);
        existing.storage_volumes_m3.extend(month.storage_volumes_m3);
    }
    project
        .measurements
        .sort_by_key(|m| (m.year, m.month));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalise_headers() {
        assert_eq!(normalise("  Rainfall (mm) "), "rainfall_mm");
        assert_eq!(normalise("Volume m3"), "volume_m3");
        assert_eq!(normalise("FROM"), "from");
    }

    #[test]
    fn resolves_aliases_in_any_order() {
        let map = ColumnMap::resolve(["Flow m3", "Source", "Yr", "Month No", "Destination", "Notes"])
            .unwrap();
        assert_eq!(map.position(Column::VolumeM3), Some(0));
        assert_eq!(map.position(Column::From), Some(1));
        assert_eq!(map.position(Column::Year), Some(2));
        assert_eq!(map.position(Column::Month), Some(3));
        assert_eq!(map.position(Column::To), Some(4));
        assert_eq!(map.unmapped, vec!["Notes".to_string()]);
    }

    #[test]
    fn missing_required_column_fails() {
        let err = ColumnMap::resolve(["Year", "Rainfall"]).unwrap_err();
        assert!(err.to_string().contains("Month"));
    }

    #[test]
    fn ambiguous_headers_fail() {
        assert!(ColumnMap::resolve(["Year", "Month", "Rain", "Rainfall"]).is_err());
    }

    #[test]
    fn reads_mixed_rows() {
        let data = "\
Year,Month,Rainfall (mm),Evap mm,From,To,Volume m3,Facility,Closing m3
2025,8,12.5,150,,,,,
2025,8,,,BH1,RWD,\"1,000\",,
2025,8,,,,,,RWD,9500
2025,9,3,,,,,,
";
        let months = read_measurements_csv(data.as_bytes()).unwrap();
        assert_eq!(months.len(), 2);
        let aug = &months[0];
        assert_eq!(aug.rainfall_mm, Some(12.5));
        assert_eq!(aug.regional_evaporation_mm, Some(150.0));
        assert_eq!(aug.flow_volume("BH1", "RWD"), Some(1000.0));
        assert_eq!(aug.storage_volumes_m3.get("RWD"), Some(&9500.0));
        assert_eq!(months[1].month, 9);
    }

    #[test]
    fn partial_flow_row_fails() {
        let data = "Year,Month,From,Volume\n2025,8,BH1,100\n";
        assert!(read_measurements_csv(data.as_bytes()).is_err());
    }

    #[test]
    fn merge_replaces_matching_flows() {
        let mut project = SiteProject::new("p");
        let mut existing = MonthlyMeasurementsDef::new(2025, 8);
        existing.rainfall_mm = Some(1.0);
        existing.flows.push(FlowVolumeDef {
            from: "A".into(),
            to: "B".into(),
            volume_m3: 5.0,
        });
        project.measurements.push(existing);

        let mut imported = MonthlyMeasurementsDef::new(2025, 8);
        imported.flows.push(FlowVolumeDef {
            from: "A".into(),
            to: "B".into(),
            volume_m3: 7.0,
        });
        merge_measurements(&mut project, vec![imported, MonthlyMeasurementsDef::new(2025, 7)]);

        assert_eq!(project.measurements.len(), 2);
        assert_eq!(project.measurements[0].month, 7);
        let aug = project.measurements_for(2025, 8).unwrap();
        assert_eq!(aug.rainfall_mm, Some(1.0));
        assert_eq!(aug.flow_volume("A", "B"), Some(7.0));
        assert_eq!(aug.flows.len(), 1);
    }
}
