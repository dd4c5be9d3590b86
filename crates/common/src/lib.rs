// trackbench-common: shared types and pure helpers for the trackbench workspace

pub mod protocol;
pub mod track;
