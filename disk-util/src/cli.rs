use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect disk images through the kernel block-storage stack
#[derive(Parser)]
pub struct Cli {
    /// Image of the master drive (disk 0)
    #[arg(long)]
    pub disk0: PathBuf,

    /// Image of the slave drive (disk 1)
    #[arg(long)]
    pub disk1: Option<PathBuf>,

    /// Drive holding the partition table
    #[arg(long, short, default_value_t = 0)]
    pub boot_dev: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the four MBR partition entries
    Fdisk,

    /// Dump the EXT2 superblock of a partition
    Dumpe2fs {
        /// Partition number as discovered at scan time
        #[arg(default_value_t = 0)]
        partition: usize,
    },

    /// Hex dump one raw sector
    Readsect {
        /// Absolute sector number
        sector: u32,

        /// Drive to read from
        #[arg(long, short, default_value_t = 0)]
        dev: u32,
    },
}
