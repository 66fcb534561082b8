use crate::parser::kseq_types::{
    FileLayout, FileVariant, ANCHOR_MARKER, HEADER_ID_LENGTH, KSEQ_ANCHOR_OFFSET,
};
use crate::parser::primitive_parser::parse_text_field;
use crate::KseqError;

/// Identify the dump variant and locate its song data block.
///
/// The anchor is looked up at the variant's default offset first, then
/// anywhere in the buffer. The shift is measured against the standalone
/// layout, so a full dump with its anchor where expected gets 0x400.
pub fn detect_format(data: &[u8]) -> Result<FileLayout, KseqError> {
    let (_rest, identifier) = parse_text_field(HEADER_ID_LENGTH)(data).map_err(|_err| {
        KseqError::FormatError(format!(
            "file too short for a {HEADER_ID_LENGTH} bytes identifier ({} bytes)",
            data.len()
        ))
    })?;

    let variant = FileVariant::from_identifier(&identifier).ok_or_else(|| {
        KseqError::FormatError(format!("not a KSEQ or AllData file (identifier {identifier:?})"))
    })?;

    let default_anchor = variant.default_anchor_offset();
    let anchor = if has_anchor_at(data, default_anchor) {
        default_anchor
    } else {
        log::debug!("Anchor marker not at 0x{default_anchor:X}, scanning the whole file");
        find_anchor(data).ok_or_else(|| {
            KseqError::FormatError(format!("COM-KSEQ marker not found in {variant} file"))
        })?
    };

    let shift = anchor as isize - KSEQ_ANCHOR_OFFSET as isize;
    log::debug!("Detected {variant} file, anchor at 0x{anchor:X}, shift {shift}");
    Ok(FileLayout::new(variant, shift))
}

fn has_anchor_at(data: &[u8], offset: usize) -> bool {
    data.get(offset..offset + ANCHOR_MARKER.len()) == Some(ANCHOR_MARKER)
}

fn find_anchor(data: &[u8]) -> Option<usize> {
    data.windows(ANCHOR_MARKER.len())
        .position(|window| window == ANCHOR_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::kseq_types::ALL_DATA_ANCHOR_OFFSET;

    fn image(identifier: &[u8], anchor: Option<usize>, len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        data[..identifier.len()].copy_from_slice(identifier);
        if let Some(anchor) = anchor {
            data[anchor..anchor + ANCHOR_MARKER.len()].copy_from_slice(ANCHOR_MARKER);
        }
        data
    }

    #[test]
    fn test_kseq_anchor_at_default_offset() {
        let data = image(b"SY1_SEQALL", Some(KSEQ_ANCHOR_OFFSET), 0x1000);
        let layout = detect_format(&data).unwrap();
        assert_eq!(layout.variant, FileVariant::Kseq);
        assert_eq!(layout.shift, 0);
    }

    #[test]
    fn test_kseq_anchor_moved() {
        let data = image(b"SY1_SEQALL", Some(KSEQ_ANCHOR_OFFSET + 0x20), 0x1000);
        let layout = detect_format(&data).unwrap();
        assert_eq!(layout.shift, 0x20);
        assert_eq!(layout.offset(0x041C), Some(0x043C));
        assert_eq!(layout.offset(0x1000), Some(0x1020));
    }

    #[test]
    fn test_all_data_anchor_at_default_offset() {
        let data = image(b"SY1 ALL   ", Some(ALL_DATA_ANCHOR_OFFSET), 0x1000);
        let layout = detect_format(&data).unwrap();
        assert_eq!(layout.variant, FileVariant::AllData);
        assert_eq!(layout.shift, 0x400);
    }

    #[test]
    fn test_all_data_identifier_padded_with_nul() {
        let data = image(b"SY1 ALL\0\0\0", Some(0x900), 0x1000);
        let layout = detect_format(&data).unwrap();
        assert_eq!(layout.variant, FileVariant::AllData);
        assert_eq!(layout.shift, 0x500);
    }

    #[test]
    fn test_unknown_identifier() {
        let data = image(b"GUITAR PRO", Some(KSEQ_ANCHOR_OFFSET), 0x1000);
        let err = detect_format(&data).unwrap_err();
        assert!(matches!(err, KseqError::FormatError(_)));
    }

    #[test]
    fn test_missing_anchor() {
        let data = image(b"SY1_SEQALL", None, 0x1000);
        let err = detect_format(&data).unwrap_err();
        assert!(matches!(err, KseqError::FormatError(_)));
    }

    #[test]
    fn test_too_short() {
        let err = detect_format(b"SY1").unwrap_err();
        assert!(matches!(err, KseqError::FormatError(_)));
    }
}
