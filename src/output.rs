//! Rendering of engine results: ranking printouts and the CSV summary.

use anyhow::Result;
use csv::WriterBuilder;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use crate::engine::types::{JurisdictionRate, StratifiedReport};
use crate::population::ALL_AGES;

/// Prints every age group's ranking, ascending by per-million rate, followed
/// by the jurisdictions excluded for insufficient data.
pub fn print_rankings(report: &StratifiedReport) {
    for (age_group, entries) in &report.groups {
        println!("== {age_group}");
        for entry in entries {
            println!(
                "{:5.0} excess/1M {:20} {:7.0} excess",
                entry.per_million,
                entry.jurisdiction,
                entry.excess()
            );
        }
        for (jurisdiction, group) in &report.excluded {
            if group == age_group {
                println!("  N/A excess/1M {jurisdiction:20} insufficient data");
            }
        }
    }
}

/// Prints the whole-population ranking, ascending.
pub fn print_rates(rates: &[JurisdictionRate]) {
    for rate in rates {
        println!("{:.0} {}", rate.per_million, rate.jurisdiction);
    }
}

/// Writes the per-jurisdiction summary CSV: total excess, optionally the
/// source's own estimate for comparison, and per-age-group excess columns.
///
/// Rows are ordered by the official estimate descending when one is given,
/// by our estimate descending otherwise.
pub fn write_summary(
    path: &str,
    report: &StratifiedReport,
    official: Option<&BTreeMap<String, f64>>,
) -> Result<()> {
    let groups: Vec<&String> = report.groups.keys().filter(|g| *g != ALL_AGES).collect();

    let mut writer = WriterBuilder::new().from_writer(File::create(Path::new(path))?);

    let mut header = vec![
        "Jurisdiction".to_string(),
        "Official Excess".to_string(),
        "Our Excess".to_string(),
        "Difference Percent".to_string(),
    ];
    header.extend(groups.iter().map(|g| format!("Excess {g}")));
    writer.write_record(&header)?;

    let empty = Vec::new();
    let mut totals = report.groups.get(ALL_AGES).unwrap_or(&empty).clone();
    totals.sort_by(|a, b| {
        let key = |j: &str, excess: f64| match official {
            Some(map) => map.get(j).copied().unwrap_or(f64::MIN),
            None => excess,
        };
        key(&b.jurisdiction, b.excess()).total_cmp(&key(&a.jurisdiction, a.excess()))
    });

    for entry in &totals {
        let ours = entry.excess();
        let theirs = official.and_then(|map| map.get(&entry.jurisdiction).copied());

        let mut row = vec![
            entry.jurisdiction.clone(),
            theirs.map(|t| format!("{t:.0}")).unwrap_or_default(),
            format!("{ours:.0}"),
            theirs
                .map(|t| format!("{:.2}", (ours / t - 1.0) * 100.0))
                .unwrap_or_default(),
        ];
        for group in &groups {
            let cell = report
                .entry(group.as_str(), &entry.jurisdiction)
                .map(|e| format!("{:.0}", e.excess()))
                .unwrap_or_default();
            row.push(cell);
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}
