pub mod event_decoder;
pub mod format_detector;
pub mod kseq_types;
pub mod pattern_chain;
pub mod pattern_table;
mod primitive_parser;
pub mod song_parser;
pub mod time_signature;
