use clap::Parser;

use perfteam::config::Backend;
use perfteam::soft::SoftEvent;

/// List the event names a counting facility accepts.
#[derive(Parser)]
#[command(name = "perfteam-list", version)]
struct Args {
    #[arg(long, value_enum, default_value = "perf", env = "PERFTEAM_BACKEND")]
    backend: Backend,
}

fn print_counter(id: &str, desc: &str) {
    println!("{}:", id);

    let desc_words: Vec<&str> = desc.split(' ').collect();
    let mut chars = 0;
    print!("\t");
    for word in desc_words {
        if word.len() + chars > 60 {
            println!();
            print!("\t");
            chars = 0;
        }
        print!("{} ", word);
        chars += word.len();
    }
    println!(" ");
    println!(" ");
}

#[cfg(target_os = "linux")]
fn list_perf() -> usize {
    use perfteam::linux::{HardwareEventType, SoftwareEventType, PRESETS};

    let mut count = 0;
    for (name, desc) in PRESETS.iter() {
        print_counter(name, desc);
        count += 1;
    }
    for ev in HardwareEventType::ALL.iter() {
        print_counter(ev.name(), "Generic hardware event.");
        count += 1;
    }
    for ev in SoftwareEventType::ALL.iter() {
        print_counter(ev.name(), "Kernel software event.");
        count += 1;
    }
    for (name, desc) in perfteam::intel::available() {
        print_counter(name, desc);
        count += 1;
    }
    count
}

#[cfg(not(target_os = "linux"))]
fn list_perf() -> usize {
    println!("perf events are only available on Linux.");
    0
}

fn list_soft() -> usize {
    for ev in SoftEvent::ALL.iter() {
        print_counter(ev.name(), ev.description());
    }
    SoftEvent::ALL.len()
}

fn main() {
    let args = Args::parse();
    println!("All supported events for the {:?} backend:", args.backend);
    println!("----------------------------------------------------------");

    let count = match args.backend {
        Backend::Perf => list_perf(),
        Backend::Soft => list_soft(),
    };
    println!("Total events: {}", count);
}
