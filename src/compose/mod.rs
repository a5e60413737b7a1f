pub mod lifecycle;
pub mod stack;
