// Command recording and shader loading

pub mod commands;
pub mod shader;
