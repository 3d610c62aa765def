mod common;

mod endpoint;
mod fragmentation;
mod handshake;
mod resumption;
mod retransmit;
mod tamper;
