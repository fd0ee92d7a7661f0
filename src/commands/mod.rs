// Engine binaries
pub mod engine;

// Stack operations
pub mod stacks;
