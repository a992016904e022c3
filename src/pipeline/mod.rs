pub mod levels;
pub mod overlay;
pub mod threshold;
