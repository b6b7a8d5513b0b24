pub mod registrar;
pub mod report;
pub mod verifier;
