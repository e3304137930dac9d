pub mod engine;
pub mod predictor;
pub mod safe_zone;
pub mod velocity;
