// 📄 CSV import/export of allocation lists
//
// Format: header row `account_id,goal_id,percent`, one allocation per line.
// Import does no validation; the rows go through the matrix + validator
// like any other input.

use crate::allocation::Allocation;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct AllocationRow {
    account_id: String,
    goal_id: String,
    percent: f64,
}

impl From<AllocationRow> for Allocation {
    fn from(row: AllocationRow) -> Self {
        Allocation {
            account_id: row.account_id,
            goal_id: row.goal_id,
            percent: row.percent,
        }
    }
}

impl From<&Allocation> for AllocationRow {
    fn from(allocation: &Allocation) -> Self {
        AllocationRow {
            account_id: allocation.account_id.clone(),
            goal_id: allocation.goal_id.clone(),
            percent: allocation.percent,
        }
    }
}

pub fn read_allocations<R: Read>(reader: R) -> Result<Vec<Allocation>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut allocations = Vec::new();
    for (index, result) in rdr.deserialize::<AllocationRow>().enumerate() {
        // +2: header line and 1-based numbering
        let row = result.with_context(|| format!("Invalid allocation on line {}", index + 2))?;
        allocations.push(row.into());
    }

    Ok(allocations)
}

pub fn read_allocations_csv(path: &Path) -> Result<Vec<Allocation>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;
    read_allocations(file)
}

pub fn write_allocations<W: Write>(writer: W, allocations: &[Allocation]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for allocation in allocations {
        wtr.serialize(AllocationRow::from(allocation))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_allocations_csv(path: &Path, allocations: &[Allocation]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
    write_allocations(file, allocations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_allocations() {
        let data = "account_id,goal_id,percent\nA, G1 ,60\nA,G2,40.5\n";
        let allocations = read_allocations(data.as_bytes()).unwrap();

        assert_eq!(
            allocations,
            vec![
                Allocation::new("A", "G1", 60.0),
                Allocation::new("A", "G2", 40.5),
            ]
        );
    }

    #[test]
    fn test_read_reports_bad_line() {
        let data = "account_id,goal_id,percent\nA,G1,60\nA,G2,lots\n";
        let err = read_allocations(data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allocations.csv");
        let allocations = vec![
            Allocation::new("A", "G1", 100.0),
            Allocation::new("B", "G2", 33.33),
        ];

        write_allocations_csv(&path, &allocations).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("account_id,goal_id,percent\n"));
        assert_eq!(read_allocations_csv(&path).unwrap(), allocations);
    }
}
