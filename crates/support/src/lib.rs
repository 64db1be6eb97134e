pub mod constants;
pub mod fs;
