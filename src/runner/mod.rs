/// Runner module spawns the interpreter for one piece of code at a time,
/// capturing its merged output and cleaning up after it.
pub mod basic;
pub mod errors;
pub mod workspace;
