//! Index-addressed result storage with ordered snapshots

use parking_lot::RwLock;
use serde::Serialize;

use crate::types::{Record, Row, Schema, DOCUMENT_NAME_HEADER, MISSING_VALUE, SERIAL_NUMBER_HEADER};

/// Result cell for one input document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSlot {
    /// Not attempted yet
    Pending,
    /// Extracted fields
    Success(Record),
    /// Extraction failed with a human-readable reason
    Failure(String),
}

impl ResultSlot {
    pub fn is_pending(&self) -> bool {
        matches!(self, ResultSlot::Pending)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ResultSlot::Failure(_))
    }
}

/// Cell value written into every content column of a failed row
pub fn failure_marker(reason: &str) -> String {
    format!("Error: {}", reason)
}

/// Slot counts by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlotCounts {
    pub pending: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Fixed-size slot array, one slot per input document.
///
/// Workers write disjoint indices; the lock only keeps writes atomic with
/// respect to concurrent snapshots.
#[derive(Debug)]
pub struct ResultTable {
    filenames: Vec<String>,
    slots: RwLock<Vec<ResultSlot>>,
}

impl ResultTable {
    /// Table with one Pending slot per filename
    pub fn new(filenames: Vec<String>) -> Self {
        let slots = vec![ResultSlot::Pending; filenames.len()];
        Self {
            filenames,
            slots: RwLock::new(slots),
        }
    }

    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }

    /// Filename at an index
    pub fn filename(&self, index: usize) -> Option<&str> {
        self.filenames.get(index).map(String::as_str)
    }

    /// Overwrite a slot. Out-of-range indices are ignored and logged.
    pub fn write(&self, index: usize, slot: ResultSlot) {
        let mut slots = self.slots.write();
        match slots.get_mut(index) {
            Some(existing) => *existing = slot,
            None => tracing::error!("Result slot {} out of range (table size {})", index, self.filenames.len()),
        }
    }

    /// Copy of one slot
    pub fn slot(&self, index: usize) -> Option<ResultSlot> {
        self.slots.read().get(index).cloned()
    }

    /// Indices whose latest attempt failed
    pub fn failed_indices(&self) -> Vec<usize> {
        self.slots
            .read()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_failure())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn counts(&self) -> SlotCounts {
        let slots = self.slots.read();
        slots.iter().fold(SlotCounts::default(), |mut counts, slot| {
            match slot {
                ResultSlot::Pending => counts.pending += 1,
                ResultSlot::Success(_) => counts.succeeded += 1,
                ResultSlot::Failure(_) => counts.failed += 1,
            }
            counts
        })
    }

    /// Ordered rows for every written slot.
    ///
    /// Pending indices are skipped. `S.No` is dense over the emitted rows,
    /// so it is 1-based position in the output, not the original index.
    pub fn snapshot(&self, schema: &Schema) -> Vec<Row> {
        let slots = self.slots.read();
        let mut rows = Vec::with_capacity(slots.len());

        for (index, slot) in slots.iter().enumerate() {
            if slot.is_pending() {
                continue;
            }
            let serial = rows.len() + 1;
            rows.push(self.build_row(schema, serial, &self.filenames[index], slot));
        }

        rows
    }

    fn build_row(&self, schema: &Schema, serial: usize, filename: &str, slot: &ResultSlot) -> Row {
        let mut row = Row::with_capacity(schema.len());

        for header in schema.headers() {
            let value = match header.as_str() {
                SERIAL_NUMBER_HEADER => serial.to_string(),
                DOCUMENT_NAME_HEADER => filename.to_string(),
                content => match slot {
                    ResultSlot::Success(record) => record.get(content).unwrap_or(MISSING_VALUE).to_string(),
                    ResultSlot::Failure(reason) => failure_marker(reason),
                    ResultSlot::Pending => MISSING_VALUE.to_string(),
                },
            };
            row.push(header.clone(), value);
        }

        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(n: usize) -> ResultTable {
        ResultTable::new((0..n).map(|i| format!("doc{}.pdf", i)).collect())
    }

    fn record(pairs: &[(&str, &str)]) -> Record {
        let mut record = Record::new();
        for (k, v) in pairs {
            record.insert(*k, Some(v.to_string()));
        }
        record
    }

    #[test]
    fn test_new_table_is_all_pending() {
        let table = table(3);
        let schema = Schema::new(["S.No", "Total"]).unwrap();
        assert!(table.snapshot(&schema).is_empty());
        assert_eq!(table.counts(), SlotCounts { pending: 3, succeeded: 0, failed: 0 });
    }

    #[test]
    fn test_snapshot_numbers_densely_in_index_order() {
        let table = table(5);
        let schema = Schema::new(["S.No", "Document Name", "Total"]).unwrap();

        // Out-of-order completion: 3, then 1
        table.write(3, ResultSlot::Success(record(&[("Total", "30")])));
        table.write(1, ResultSlot::Success(record(&[("Total", "10")])));

        let rows = table.snapshot(&schema);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("S.No"), Some("1"));
        assert_eq!(rows[0].get("Document Name"), Some("doc1.pdf"));
        assert_eq!(rows[1].get("S.No"), Some("2"));
        assert_eq!(rows[1].get("Document Name"), Some("doc3.pdf"));
        assert_eq!(rows[1].get("Total"), Some("30"));
    }

    #[test]
    fn test_missing_and_failed_cells() {
        let table = table(2);
        let schema = Schema::new(["Vendor", "S.No", "Total"]).unwrap();

        table.write(0, ResultSlot::Success(record(&[("Vendor", "ACME")])));
        table.write(1, ResultSlot::Failure("rate limited".to_string()));

        let rows = table.snapshot(&schema);
        let headers: Vec<_> = rows[0].cells().iter().map(|(h, _)| h.as_str()).collect();
        assert_eq!(headers, vec!["Vendor", "S.No", "Total"]);
        assert_eq!(rows[0].get("Total"), Some(MISSING_VALUE));
        assert_eq!(rows[1].get("Vendor"), Some("Error: rate limited"));
        assert_eq!(rows[1].get("S.No"), Some("2"));
        assert_eq!(table.failed_indices(), vec![1]);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let table = table(3);
        let schema = Schema::new(["S.No", "Total"]).unwrap();
        for i in 0..3 {
            table.write(i, ResultSlot::Success(record(&[("Total", "ok")])));
        }
        table.write(1, ResultSlot::Failure("boom".to_string()));
        table.write(1, ResultSlot::Success(record(&[("Total", "fixed")])));

        let rows = table.snapshot(&schema);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].get("Total"), Some("fixed"));
        assert_eq!(rows[1].get("S.No"), Some("2"));
        assert!(table.failed_indices().is_empty());
    }

    #[test]
    fn test_out_of_range_write_ignored() {
        let table = table(1);
        table.write(5, ResultSlot::Failure("x".to_string()));
        assert_eq!(table.counts().pending, 1);
        assert!(table.slot(5).is_none());
    }
}
