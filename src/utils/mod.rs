pub mod git;
pub mod io;
pub mod process;
