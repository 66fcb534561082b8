use crate::parser::kseq_types::PatternPointer;
use encoding_rs::WINDOWS_1252;
use nom::combinator::{map, verify};
use nom::{bytes, number, IResult, Parser};

/// Parse unsigned byte
pub fn parse_u8(i: &[u8]) -> IResult<&[u8], u8> {
    number::complete::le_u8(i)
}

/// Parse a data byte, only the 7 low bits are significant
pub fn parse_u7(i: &[u8]) -> IResult<&[u8], u8> {
    map(parse_u8, |b| b & 0x7F).parse(i)
}

/// Parse two data bytes into a 14 bit value, most significant first
pub fn parse_u14_msb_first(i: &[u8]) -> IResult<&[u8], u16> {
    map((parse_u7, parse_u7), |(hi, lo)| {
        (u16::from(hi) << 7) | u16::from(lo)
    })
    .parse(i)
}

/// Parse two data bytes into a 14 bit value, least significant first
pub fn parse_u14_lsb_first(i: &[u8]) -> IResult<&[u8], u16> {
    map((parse_u7, parse_u7), |(lo, hi)| {
        (u16::from(hi) << 7) | u16::from(lo)
    })
    .parse(i)
}

/// Match one exact byte
pub fn parse_marker(marker: u8) -> impl FnMut(&[u8]) -> IResult<&[u8], u8> {
    move |i: &[u8]| verify(parse_u8, |b: &u8| *b == marker).parse(i)
}

/// Match one byte whose bits under `mask` equal `pattern`
pub fn parse_masked(mask: u8, pattern: u8) -> impl FnMut(&[u8]) -> IResult<&[u8], u8> {
    move |i: &[u8]| verify(parse_u8, |b: &u8| b & mask == pattern).parse(i)
}

/// Parse a 3-byte pattern table pointer
pub fn parse_pattern_pointer(i: &[u8]) -> IResult<&[u8], PatternPointer> {
    map((parse_u8, parse_u8, parse_u8), |(msb, mid, lsb)| {
        PatternPointer::new(msb, mid, lsb)
    })
    .parse(i)
}

/// Materialize properly encoded String
fn make_string(i: &[u8]) -> String {
    let (cow, encoding_used, had_errors) = WINDOWS_1252.decode(i);
    if had_errors {
        log::debug!("Error parsing string with {encoding_used:?}");
        String::from_utf8_lossy(i).into_owned()
    } else {
        cow.to_string()
    }
}

/// Parse a fixed size text field, padding (blanks and NULs) is trimmed.
pub fn parse_text_field(size: usize) -> impl FnMut(&[u8]) -> IResult<&[u8], String> {
    move |i: &[u8]| {
        let (rest, field) = bytes::complete::take(size)(i)?;
        log::debug!("Raw text field raw={field:02X?}");
        let text = make_string(field);
        Ok((rest, text.trim_matches(|c: char| c <= ' ').to_string()))
    }
}
