//! `zemu` CLI: load a guest kernel (and optional disk image) and run it.
use std::io::Read;
use std::path::PathBuf;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use zemu::emu::Emu;
use zemu::error::EmulatorError;

/// A user-space RISC-V (RV64IMA, partial) emulator for running small guest kernels.
#[derive(Debug, Parser)]
#[command(name = "zemu", version, about)]
struct Args {
    /// Raw guest kernel image, loaded at the DRAM base. No ELF parsing.
    kernel: Option<PathBuf>,
    /// Optional virtio backing disk image, mapped byte-for-byte.
    disk: Option<PathBuf>,
}

fn init_logger() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> Result<()> {
    init_logger();

    let args = Args::parse();
    let Some(kernel_path) = args.kernel else {
        bail!("Usage: zemu <kernel-binary> [<disk-image>]");
    };

    let kernel = std::fs::read(&kernel_path).map_err(|source| EmulatorError::KernelRead {
        path: kernel_path.clone(),
        source,
    })?;

    let disk = match &args.disk {
        Some(path) => std::fs::read(path)
            .map_err(|source| EmulatorError::DiskRead { path: path.clone(), source })?,
        None => Vec::new(),
    };

    info!(
        kernel = %kernel_path.display(),
        kernel_bytes = kernel.len(),
        disk_bytes = disk.len(),
        "starting hart"
    );
    let mut emu = Emu::new(kernel, disk);

    // The UART reader thread is the core's only external collaborator: it
    // owns blocking reads from host stdin and hands bytes to the hart
    // thread through `Uart::receive_byte`'s mutex/condvar.
    let uart = emu.cpu.bus.uart.clone();
    thread::spawn(move || {
        let mut byte = [0u8; 1];
        loop {
            match std::io::stdin().read(&mut byte) {
                // Exiting here is deliberate: the emulator terminates once
                // the host input stream is closed.
                Ok(0) => std::process::exit(0),
                Ok(_) => uart.receive_byte(byte[0]),
                Err(_) => std::process::exit(0),
            }
        }
    });

    match emu.run() {
        Some(e) => Err(EmulatorError::Fatal(e)).context("fatal emulation fault"),
        None => Ok(()),
    }
}
