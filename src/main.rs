use std::error::Error;
use std::io;

use log::{error, info};
use vm_simulator::paging::AddressTranslator;
use vm_simulator::repl::REPL;
use vm_simulator::scenarios::{fork_demo, mmu_directory, TRANSLATION_CASES};
use vm_simulator::DefaultSimulator;

fn run_translation_demo() {
    println!("---- Two-level address translation ----");
    let directory = mmu_directory();
    let translator = AddressTranslator::new(&directory);
    for case in TRANSLATION_CASES.iter() {
        let access = if case.is_write { "write" } else { "read" };
        match translator.translate(case.virtual_address, case.is_write) {
            Ok(pa) => println!("0x{:08X} ({}) -> {}", case.virtual_address, access, pa),
            Err(fault) => println!(
                "0x{:08X} ({}) -> {}: {}",
                case.virtual_address,
                access,
                fault.kind(),
                fault
            ),
        }
    }
}

fn run_fork_demo() -> Result<(), Box<dyn Error>> {
    println!("---- Copy-on-write fork ----");
    let (mut simulator, parent, child) = fork_demo()?;
    for pid in [parent, child] {
        if let Some(dump) = simulator.dump(pid) {
            println!("{}", dump);
        }
    }

    println!("Child {} writes to page 1", child);
    let pa = simulator.write(child, 0x0000_1000)?;
    println!("  -> now backed by {}", pa);
    for pid in [parent, child] {
        if let Some(dump) = simulator.dump(pid) {
            println!("{}", dump);
        }
    }

    let released = simulator.exit(child)?;
    println!("Child {} exited, {} frame(s) released", child, released);
    println!("{}", simulator.frames());
    simulator.check_share_counts()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "demo".to_string());
    match mode.as_str() {
        "demo" => {
            run_translation_demo();
            run_fork_demo()?;
        }
        "repl" => {
            let mut simulator = DefaultSimulator::init();
            let pid = simulator.create_initial_process()?;
            info!("REPL started with process {}", pid);
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            REPL::new(stdin.lock()).run(&mut stdout, &mut simulator)?;
        }
        other => {
            error!("unknown mode '{}', expected 'demo' or 'repl'", other);
            std::process::exit(2);
        }
    }
    Ok(())
}
