//! End-to-end scenarios through the contract facade.
