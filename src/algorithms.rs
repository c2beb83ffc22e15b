pub mod analysis;
pub mod bipartite;
pub mod label_store;
pub mod multinomial;
pub mod partition;
pub mod slpa;
