pub mod parser;
pub mod token;
pub mod tokenizer;

pub use parser::{SpillRequest, parse_function, parse_program, parse_spill_request};
