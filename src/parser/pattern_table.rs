use crate::diagnostics::DiagnosticSink;
use crate::error::Anomaly;
use crate::parser::kseq_types::{
    FileLayout, PatternRecord, PatternTable, PATTERN_RECORD_SIZE, PATTERN_SLOT_COUNT,
    PATTERN_TABLE_OFFSET,
};
use crate::parser::primitive_parser::{parse_pattern_pointer, parse_u8};
use nom::{IResult, Parser};

/// Parse one 9-byte slot, a zero status byte marks an unused slot.
pub fn parse_pattern_slot(i: &[u8]) -> IResult<&[u8], Option<PatternRecord>> {
    let (i, (status, time_signature_code, bar_count, start, end)) = (
        parse_u8,              // status
        parse_u8,              // time signature code
        parse_u8,              // bar count
        parse_pattern_pointer, // start
        parse_pattern_pointer, // end
    )
        .parse(i)?;
    let record = (status != 0).then_some(PatternRecord {
        bar_count,
        time_signature_code,
        start,
        end,
    });
    Ok((i, record))
}

/// Read the 99 pattern slots.
///
/// Slots cut short by the end of the file are kept as unused so indices
/// never move.
pub fn read_pattern_table(
    data: &[u8],
    layout: &FileLayout,
    sink: &mut dyn DiagnosticSink,
) -> PatternTable {
    let base = layout.offset(PATTERN_TABLE_OFFSET);
    let mut slots = Vec::with_capacity(PATTERN_SLOT_COUNT);
    for index in 0..PATTERN_SLOT_COUNT {
        let record = base
            .map(|base| base + index * PATTERN_RECORD_SIZE)
            .and_then(|offset| data.get(offset..offset + PATTERN_RECORD_SIZE))
            .and_then(|bytes| parse_pattern_slot(bytes).ok());
        match record {
            Some((_rest, slot)) => slots.push(slot),
            None => {
                sink.anomaly(&Anomaly::TruncatedPatternRecord { index });
                slots.push(None);
            }
        }
    }
    let table = PatternTable { slots };
    log::debug!(
        "Pattern table: {} slots, {} used",
        table.len(),
        table.used_count()
    );
    table
}

/// Render the table for the debug trace.
pub fn dump_pattern_table(table: &PatternTable, sink: &mut dyn DiagnosticSink) {
    sink.line(&format!("Pattern table size: {}", table.len()));
    for (index, slot) in table.slots.iter().enumerate() {
        match slot {
            None => sink.line(&format!("  Entry {index}: UNUSED")),
            Some(p) => sink.line(&format!(
                "  Entry {index}/{index:X}: bars={}, timeSig=0x{:02X}, start(msb={:02X} mid={:02X} lsb={:02X})={}, end={}",
                p.bar_count,
                p.time_signature_code,
                p.start.msb,
                p.start.mid,
                p.start.lsb,
                p.start.value(),
                p.end.value()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::parser::kseq_types::{FileVariant, PatternPointer};

    #[test]
    fn test_parse_used_slot() {
        let bytes = [0x01, 0x1C, 0x02, 0x00, 0x00, 0x10, 0x00, 0x01, 0x20];
        let (rest, slot) = parse_pattern_slot(&bytes).unwrap();
        assert!(rest.is_empty());
        let record = slot.unwrap();
        assert_eq!(record.bar_count, 2);
        assert_eq!(record.time_signature_code, 0x1C);
        assert_eq!(record.start, PatternPointer::new(0, 0, 0x10));
        assert_eq!(record.end.value(), 0x120);
        assert_eq!(record.length_in_ticks(), 768);
    }

    #[test]
    fn test_parse_unused_slot() {
        let bytes = [0x00, 0x1C, 0x02, 0x00, 0x00, 0x10, 0x00, 0x00, 0x20];
        let (_rest, slot) = parse_pattern_slot(&bytes).unwrap();
        assert_eq!(slot, None);
    }

    #[test]
    fn test_read_table_preserves_holes() {
        let layout = FileLayout::new(FileVariant::Kseq, 0);
        let mut data = vec![0u8; 0x1000];
        // slot 0 used, slot 1 unused, slot 2 used
        for index in [0usize, 2] {
            let ofs = PATTERN_TABLE_OFFSET + index * PATTERN_RECORD_SIZE;
            data[ofs..ofs + PATTERN_RECORD_SIZE]
                .copy_from_slice(&[0x01, 0x0C, 0x01, 0, 0, index as u8, 0, 0, 0x40]);
        }
        let mut sink = CollectingSink::default();
        let table = read_pattern_table(&data, &layout, &mut sink);
        assert_eq!(table.len(), PATTERN_SLOT_COUNT);
        assert_eq!(table.used_count(), 2);
        assert!(table.slots[1].is_none());
        assert_eq!(table.slots[2].unwrap().start.value(), 2);
        assert!(sink.anomalies.is_empty());
    }

    #[test]
    fn test_read_truncated_table() {
        let layout = FileLayout::new(FileVariant::Kseq, 0);
        // room for exactly two records
        let data = vec![0x01u8; PATTERN_TABLE_OFFSET + 2 * PATTERN_RECORD_SIZE + 4];
        let mut sink = CollectingSink::default();
        let table = read_pattern_table(&data, &layout, &mut sink);
        assert_eq!(table.len(), PATTERN_SLOT_COUNT);
        assert_eq!(table.used_count(), 2);
        assert_eq!(sink.anomalies.len(), PATTERN_SLOT_COUNT - 2);
        assert_eq!(
            sink.anomalies[0],
            Anomaly::TruncatedPatternRecord { index: 2 }
        );
    }
}
