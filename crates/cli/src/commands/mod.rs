// CLI subcommands

pub mod activities;
pub mod publish;
pub mod tail;
pub mod token;
