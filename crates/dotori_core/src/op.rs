pub mod batch_norm;
