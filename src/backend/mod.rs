use crate::error::Result;
use crate::registers::Allocation;

pub mod x86_64;

pub trait Backend {
    fn generate_assembly(&self, allocation: &Allocation) -> Result<String>;
}
