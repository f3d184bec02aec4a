pub mod failure;
pub mod jwt;
pub mod manager;
pub mod token;

#[cfg(test)]
mod tests;
