pub mod health;
pub mod sts;
