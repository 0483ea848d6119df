use memforge_primitives::seg_ptr::MemError;
use memforge_query::checksum::checksum;
use memforge_query::datagen::DataGenerator;
use memforge_query::pinning;
use memforge_query::pipeline::run_query;
use memforge_query::tables::{TableR, TableS};
use memforge_runtime::PinPolicy;
use tracing_subscriber::EnvFilter;

/// Rows in table R.
const DATA_AMOUNT: usize = 128 * 1024 * 1024;
/// Rows in table S.
const KEY_AMOUNT: usize = 1024;
/// Workers per thread group.
const WORKERS: usize = 5;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    std::process::exit(run());
}

fn run() -> i32 {
    let memory_amount = 2 * DATA_AMOUNT * std::mem::size_of::<i64>()
        + DATA_AMOUNT * std::mem::size_of::<u32>()
        + KEY_AMOUNT * std::mem::size_of::<u32>();

    let (r, s) = match generate_tables() {
        Ok(tables) => tables,
        Err(e) => {
            eprintln!("table allocation failed: {e}");
            return 1;
        }
    };

    // Pin to the reference topology when the host has it; anywhere else the
    // run stays correct, just unpinned.
    let range = pinning::active_ranges();
    let (policy, range) = if pinning::host_covers(&range) {
        (PinPolicy::Automatic, range)
    } else {
        eprintln!("host exposes fewer CPUs than the reference topology, running unpinned");
        (PinPolicy::Manual, Vec::new())
    };

    let outcome = match run_query(&r, &s, WORKERS, policy, range) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("query failed: {e}");
            return 1;
        }
    };

    let safe_sum = checksum(&r, &s);
    let throughput_bps = memory_amount as f64 / outcome.seconds;

    println!("{}", outcome.final_sum);
    println!("{safe_sum}");
    println!("{throughput_bps}");
    // The second throughput line is kept for output compatibility.
    println!("{throughput_bps}");

    if outcome.final_sum == safe_sum {
        0
    } else {
        eprintln!("query result and reference checksum do not match");
        1
    }
}

fn generate_tables() -> Result<(TableR, TableS), MemError> {
    let mut r = TableR::allocate(DATA_AMOUNT)?;
    let mut s = TableS::allocate(KEY_AMOUNT)?;

    let mut datagen = DataGenerator::from_entropy();
    datagen.basic_uniform_i64(r.a.as_mut_slice(), 1, 10000);
    datagen.basic_uniform_i64(r.b.as_mut_slice(), 1, 10000);
    datagen.basic_uniform_u32(r.fk.as_mut_slice(), 0, (KEY_AMOUNT * 3) as u32);
    datagen.id_u32(s.pk.as_mut_slice());

    Ok((r, s))
}
