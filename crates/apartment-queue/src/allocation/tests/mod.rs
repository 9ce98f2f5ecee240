mod cascade;
mod common;
mod intake;
