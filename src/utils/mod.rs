// Utility functions

pub mod text;

pub use text::truncate_for_log;
