//! Ledger integration tests
//!
//! Drive the ledger, engine, pool and shard router together the way a node
//! does, with a recording transport standing in for the network.
