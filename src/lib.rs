pub mod analysis;
pub mod backend;
pub mod cli;
pub mod driver;
pub mod error;
pub mod frontend;
pub mod ir;
pub mod registers;
pub mod verification;

#[cfg(test)]
mod test_helpers;
