pub mod scan_chain;
