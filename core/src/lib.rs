pub mod debuggable;
pub mod tc02;
pub mod tickable;
pub mod types;

#[cfg(test)]
pub mod test;
